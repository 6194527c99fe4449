// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end coverage of dispatcher + processor + storage wiring through
//! `VaultService`'s public `tonic` trait, run against
//! `vaultbackend::storage::fake::InMemoryStorage` rather than a live Postgres
//! instance (spec §8 testable properties 1-8, exercised at the transport-facing
//! layer instead of unit-by-unit).

use tonic::metadata::MetadataValue;
use tonic::{Code, Request};

use vaultbackend::storage::fake::InMemoryStorage;
use vaultbackend::Processor;
use vaultcommon::Cipher;
use vaultprotos::v1::vault_service_server::VaultService as VaultServiceTrait;
use vaultprotos::v1::*;

use vault_server::{Dispatcher, VaultService};

const HEADER: &str = "token";

fn wired_service() -> VaultService<InMemoryStorage> {
    let cipher = Cipher::new("service-test-secret");
    let processor = Processor::new(cipher.clone(), InMemoryStorage::new());
    let dispatcher = Dispatcher::new(cipher, HEADER.to_string());
    VaultService::new(processor, dispatcher)
}

fn token_of(response: &tonic::Response<impl std::fmt::Debug>) -> String {
    response
        .metadata()
        .get(HEADER)
        .expect("response must carry a token header")
        .to_str()
        .unwrap()
        .to_string()
}

fn authed(token: &str) -> Request<()> {
    let mut req = Request::new(());
    req.metadata_mut()
        .insert(HEADER, MetadataValue::try_from(token).unwrap());
    req
}

fn with_body<T>(template: &Request<()>, body: T) -> Request<T> {
    let mut req = Request::new(body);
    *req.metadata_mut() = template.metadata().clone();
    req
}

#[tokio::test]
async fn register_then_login_yields_tokens_for_the_same_user() {
    let service = wired_service();

    let register = service
        .register(Request::new(RegisterRequest {
            login: "alice".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();
    let register_token = token_of(&register);
    assert!(!register_token.is_empty());

    let login = service
        .login(Request::new(LoginRequest {
            login: "alice".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();
    let login_token = token_of(&login);

    assert_eq!(register_token, login_token);
}

#[tokio::test]
async fn duplicate_register_is_unauthenticated() {
    let service = wired_service();
    service
        .register(Request::new(RegisterRequest {
            login: "alice".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();

    let err = service
        .register(Request::new(RegisterRequest {
            login: "alice".into(),
            password: "different".into(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthenticated() {
    let service = wired_service();
    service
        .register(Request::new(RegisterRequest {
            login: "alice".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();

    let err = service
        .login(Request::new(LoginRequest {
            login: "alice".into(),
            password: "wrong".into(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn gated_rpc_without_a_token_is_unauthenticated() {
    let service = wired_service();
    let err = service
        .get_bank_cards(Request::new(GetBankCardsRequest {}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn post_then_get_bank_card_round_trips_plaintext_fields() {
    let service = wired_service();
    let register = service
        .register(Request::new(RegisterRequest {
            login: "alice".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();
    let token = token_of(&register);
    let template = authed(&token);

    service
        .post_bank_card(with_body(
            &template,
            PostBankCardRequest {
                identifier: "card1".into(),
                number: "4111111111111111".into(),
                holder: "ALICE".into(),
                cvv: "123".into(),
                meta: "visa".into(),
            },
        ))
        .await
        .unwrap();

    let cards = service
        .get_bank_cards(with_body(&template, GetBankCardsRequest {}))
        .await
        .unwrap()
        .into_inner()
        .cards;

    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].identifier, "card1");
    assert_eq!(cards[0].number, "4111111111111111");
    assert_eq!(cards[0].holder, "ALICE");
    assert_eq!(cards[0].cvv, "123");
    assert_eq!(cards[0].meta, "visa");
}

#[tokio::test]
async fn posting_the_same_identifier_twice_conflicts() {
    let service = wired_service();
    let register = service
        .register(Request::new(RegisterRequest {
            login: "alice".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();
    let template = authed(&token_of(&register));

    let card = || PostTextBinaryRequest {
        identifier: "note1".into(),
        entry: "hello".into(),
        meta: "".into(),
    };
    service
        .post_text_binary(with_body(&template, card()))
        .await
        .unwrap();

    let err = service
        .post_text_binary(with_body(&template, card()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn delete_then_get_no_longer_returns_the_entry() {
    let service = wired_service();
    let register = service
        .register(Request::new(RegisterRequest {
            login: "alice".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();
    let template = authed(&token_of(&register));

    service
        .post_login_password(with_body(
            &template,
            PostLoginPasswordRequest {
                identifier: "site1".into(),
                login: "bob".into(),
                password: "hunter2".into(),
                meta: "".into(),
            },
        ))
        .await
        .unwrap();

    service
        .delete_login_password(with_body(
            &template,
            DeleteLoginPasswordRequest {
                identifier: "site1".into(),
            },
        ))
        .await
        .unwrap();

    let entries = service
        .get_logins_passwords(with_body(&template, GetLoginsPasswordsRequest {}))
        .await
        .unwrap()
        .into_inner()
        .entries;
    assert!(entries.is_empty());
}

#[tokio::test]
async fn a_token_cannot_read_another_users_entries() {
    let service = wired_service();

    let alice = service
        .register(Request::new(RegisterRequest {
            login: "alice".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();
    let alice_template = authed(&token_of(&alice));
    service
        .post_bank_card(with_body(
            &alice_template,
            PostBankCardRequest {
                identifier: "card1".into(),
                number: "4111111111111111".into(),
                holder: "ALICE".into(),
                cvv: "123".into(),
                meta: "".into(),
            },
        ))
        .await
        .unwrap();

    let bob = service
        .register(Request::new(RegisterRequest {
            login: "bob".into(),
            password: "p@ss".into(),
        }))
        .await
        .unwrap();
    let bob_template = authed(&token_of(&bob));

    let bobs_cards = service
        .get_bank_cards(with_body(&bob_template, GetBankCardsRequest {}))
        .await
        .unwrap()
        .into_inner()
        .cards;
    assert!(bobs_cards.is_empty());
}
