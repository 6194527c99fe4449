// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exercises `VaultClient` against a real in-process `VaultService`, over an
//! actual TCP connection, backed by `vaultbackend::storage::fake::InMemoryStorage`
//! rather than Postgres.

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

use vaultbackend::storage::fake::InMemoryStorage;
use vaultbackend::Processor;
use vaultcommon::Cipher;
use vaultclient::VaultClient;
use vaultprotos::v1::vault_service_server::VaultServiceServer;

use vault_server::{Dispatcher, VaultService};

const HEADER: &str = "token";

async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind random port");
    let addr = listener.local_addr().expect("local addr");

    let cipher = Cipher::new("client-integration-test-secret");
    let processor = Processor::new(cipher.clone(), InMemoryStorage::new());
    let dispatcher = Dispatcher::new(cipher, HEADER.to_string());
    let service = VaultService::new(processor, dispatcher);

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(VaultServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("server crashed");
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn register_then_round_trips_a_bank_card() {
    let addr = spawn_server().await;
    let client = VaultClient::connect(addr, HEADER).await.expect("connect");

    client.register("alice", "p@ss").await.expect("register");
    assert!(client.token().is_some());

    client
        .post_bank_card("card1", "4111111111111111", "ALICE", "123", "visa")
        .await
        .expect("post_bank_card");

    let cards = client.get_bank_cards().await.expect("get_bank_cards");
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].identifier, "card1");
    assert_eq!(cards[0].number, "4111111111111111");
}

#[tokio::test]
async fn login_recovers_the_same_session_as_register() {
    let addr = spawn_server().await;
    let client = VaultClient::connect(addr, HEADER).await.expect("connect");

    client.register("bob", "hunter2").await.expect("register");
    let register_token = client.token().expect("token after register");

    client.login("bob", "hunter2").await.expect("login");
    let login_token = client.token().expect("token after login");

    assert_eq!(register_token, login_token);
}

#[tokio::test]
async fn posting_without_a_token_fails() {
    let addr = spawn_server().await;
    let client = VaultClient::connect(addr, HEADER).await.expect("connect");

    let err = client
        .post_text_binary("note1", "hello", "")
        .await
        .unwrap_err();
    assert!(matches!(err, vaultclient::ClientError::NoToken));
}

#[tokio::test]
async fn delete_then_get_no_longer_returns_the_entry() {
    let addr = spawn_server().await;
    let client = VaultClient::connect(addr, HEADER).await.expect("connect");

    client.register("carol", "p@ss").await.expect("register");
    client
        .post_login_password("site1", "carol", "hunter2", "")
        .await
        .expect("post_login_password");
    client
        .delete_login_password("site1")
        .await
        .expect("delete_login_password");

    let entries = client.get_logins_passwords().await.expect("get_logins_passwords");
    assert!(entries.is_empty());
}
