// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry point: parses config, wires the cipher/storage/processor/dispatcher
//! together, and serves `VaultService` over gRPC until a shutdown signal
//! arrives.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use vaultbackend::{Processor, Storage, StorageConfig};
use vaultcommon::{Cipher, TableTag};
use vaultprotos::v1::vault_service_server::VaultServiceServer;

use vault_server::{Dispatcher, VaultService};

/// Config recognized via env or flag (flag wins over env wins over default;
/// there is no JSON file layer here, see `DESIGN.md`).
#[derive(Debug, Parser)]
#[command(name = "vault-server", about = "Personal secrets vault gRPC server")]
struct Args {
    /// Listen address.
    #[arg(long, env = "SERVER_ADDRESS", default_value = "0.0.0.0:50051")]
    server_address: SocketAddr,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_DSN")]
    database_dsn: String,

    /// Secret the AEAD key is derived from.
    #[arg(long, env = "USER_KEY")]
    user_key: String,

    /// Name of the request metadata header carrying the bearer token.
    #[arg(long, env = "AUTH_BEARER_NAME", default_value = "token")]
    auth_bearer_name: String,

    /// Logical table-tag string the client uses for bank card entries.
    #[arg(long, env = "BANK_CARD_DB", default_value = "bankCard")]
    bank_card_db: String,

    /// Logical table-tag string the client uses for login/password entries.
    #[arg(long, env = "LOGIN_PASSWORD_DB", default_value = "loginPassword")]
    login_password_db: String,

    /// Logical table-tag string the client uses for text/binary entries.
    #[arg(long, env = "TEXT_BINARY_DB", default_value = "textBinary")]
    text_binary_db: String,

    /// Per-request deadline, in milliseconds.
    #[arg(long, env = "HANDLERS_TO", default_value_t = 500)]
    handlers_to: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // The client addresses entries through dedicated per-kind RPCs rather than a
    // single generic one parameterized by table tag, so these three strings
    // don't drive a runtime dispatch branch here — they're validated at startup
    // so a typo in config fails fast instead of silently diverging from the
    // fixed `TableTag` names the coalescer and storage engine use internally
    // (see `DESIGN.md`).
    for configured in [&args.bank_card_db, &args.login_password_db, &args.text_binary_db] {
        TableTag::from_str(configured).map_err(|err| format!("invalid table tag config: {err}"))?;
    }

    let shutdown = CancellationToken::new();

    let cipher = Cipher::new(&args.user_key);
    let (storage, coalescer_handle) = Storage::connect(
        StorageConfig {
            database_url: args.database_dsn.clone(),
            handlers_timeout: Duration::from_millis(args.handlers_to),
        },
        shutdown.clone(),
    )
    .await?;
    let processor = Processor::new(cipher.clone(), storage);
    let dispatcher = Dispatcher::new(cipher, args.auth_bearer_name.clone());
    let service = VaultService::new(processor, dispatcher);

    tracing::info!(address = %args.server_address, "starting vault-server");

    tonic::transport::Server::builder()
        .layer(TraceLayer::new_for_grpc())
        .add_service(VaultServiceServer::new(service))
        .serve_with_shutdown(args.server_address, shutdown_signal(shutdown))
        .await?;

    // The gRPC server stops accepting new RPCs as soon as `serve_with_shutdown`
    // resolves, which can be almost immediate with no in-flight requests. Await
    // the coalescer explicitly so its final drain-and-commit finishes before the
    // runtime tears down, rather than leaving it detached (spec §6).
    coalescer_handle.await?;

    Ok(())
}

/// Resolves once `SIGINT`, `SIGTERM`, or `SIGQUIT` is received, and trips
/// `shutdown` so the storage engine's delete coalescer starts draining
/// (spec §4.D's Running → Draining → Closed states) concurrently with the
/// in-flight gRPC server shutting down.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl_c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigquit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigquit.recv() => {},
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining");
    shutdown.cancel();
}
