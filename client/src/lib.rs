// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thin RPC-calling surface over `VaultService` (spec §4.E): a `Clone` struct
//! wrapping the generated tonic client plus the bearer token issued by
//! `Register`/`Login`, mirroring the shape of the teacher's `apiclient` crate
//! (one struct per remote service, holding a `tonic::transport`-backed client
//! by value, one method per RPC). No retry policy, no connection pooling
//! beyond what `tonic::transport::Channel` already gives for free, and no
//! cache: see [`cache::ReplicatingCache`] for the contract a real one would
//! fulfill.

pub mod cache;

use std::sync::{Arc, Mutex};

use tonic::metadata::{MetadataKey, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use vaultprotos::v1::vault_service_client::VaultServiceClient;
use vaultprotos::v1::*;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("failed to connect to vault server: {0}")]
    Connect(#[from] tonic::transport::Error),
    #[error(transparent)]
    Rpc(#[from] tonic::Status),
    #[error("no bearer token: call register or login first")]
    NoToken,
    #[error("server response did not carry a token header")]
    MissingTokenHeader,
}

/// Wraps the generated `VaultServiceClient` and the bearer token minted by
/// `Register`/`Login`. The token lives behind a `Mutex` rather than being
/// threaded through `&mut self`: spec §4.E's sketch of client replication has
/// `Sync` firing the three `Get*` RPCs concurrently, which wants a client that
/// can be shared (`Clone`, cheap, `Channel` is itself a handle) across tasks
/// without each needing its own mutable borrow.
#[derive(Clone)]
pub struct VaultClient {
    inner: VaultServiceClient<Channel>,
    header_name: String,
    token: Arc<Mutex<Option<String>>>,
}

impl VaultClient {
    /// Connects lazily-resolved-DNS included; `endpoint` is anything
    /// `tonic::transport::Endpoint` accepts, e.g. `"http://127.0.0.1:50051"`.
    pub async fn connect(
        endpoint: impl Into<String>,
        header_name: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let channel = Endpoint::new(endpoint.into())?.connect().await?;
        Ok(Self {
            inner: VaultServiceClient::new(channel),
            header_name: header_name.into(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// The token currently held, if `register`/`login` has succeeded at least
    /// once. `None` otherwise (spec §4.E: fully client-side, nothing else
    /// tracks session state).
    pub fn token(&self) -> Option<String> {
        self.token.lock().expect("token mutex poisoned").clone()
    }

    fn store_token(&self, response: &tonic::Response<impl std::fmt::Debug>) -> Result<(), ClientError> {
        let value = response
            .metadata()
            .get(self.header_name.as_str())
            .ok_or(ClientError::MissingTokenHeader)?
            .to_str()
            .map_err(|_| ClientError::MissingTokenHeader)?
            .to_string();
        *self.token.lock().expect("token mutex poisoned") = Some(value);
        Ok(())
    }

    fn authed_request<T>(&self, body: T) -> Result<Request<T>, ClientError> {
        let token = self.token().ok_or(ClientError::NoToken)?;
        let key = MetadataKey::from_bytes(self.header_name.as_bytes()).map_err(|_| ClientError::NoToken)?;
        let value = MetadataValue::try_from(token.as_str()).map_err(|_| ClientError::NoToken)?;
        let mut request = Request::new(body);
        request.metadata_mut().insert(key, value);
        Ok(request)
    }

    pub async fn register(
        &self,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), ClientError> {
        let request = Request::new(RegisterRequest {
            login: login.into(),
            password: password.into(),
        });
        let response = self.inner.clone().register(request).await?;
        self.store_token(&response)
    }

    pub async fn login(
        &self,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), ClientError> {
        let request = Request::new(LoginRequest {
            login: login.into(),
            password: password.into(),
        });
        let response = self.inner.clone().login(request).await?;
        self.store_token(&response)
    }

    pub async fn post_bank_card(
        &self,
        identifier: impl Into<String>,
        number: impl Into<String>,
        holder: impl Into<String>,
        cvv: impl Into<String>,
        meta: impl Into<String>,
    ) -> Result<(), ClientError> {
        let request = self.authed_request(PostBankCardRequest {
            identifier: identifier.into(),
            number: number.into(),
            holder: holder.into(),
            cvv: cvv.into(),
            meta: meta.into(),
        })?;
        self.inner.clone().post_bank_card(request).await?;
        Ok(())
    }

    pub async fn post_login_password(
        &self,
        identifier: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
        meta: impl Into<String>,
    ) -> Result<(), ClientError> {
        let request = self.authed_request(PostLoginPasswordRequest {
            identifier: identifier.into(),
            login: login.into(),
            password: password.into(),
            meta: meta.into(),
        })?;
        self.inner.clone().post_login_password(request).await?;
        Ok(())
    }

    pub async fn post_text_binary(
        &self,
        identifier: impl Into<String>,
        entry: impl Into<String>,
        meta: impl Into<String>,
    ) -> Result<(), ClientError> {
        let request = self.authed_request(PostTextBinaryRequest {
            identifier: identifier.into(),
            entry: entry.into(),
            meta: meta.into(),
        })?;
        self.inner.clone().post_text_binary(request).await?;
        Ok(())
    }

    pub async fn delete_bank_card(&self, identifier: impl Into<String>) -> Result<(), ClientError> {
        let request = self.authed_request(DeleteBankCardRequest {
            identifier: identifier.into(),
        })?;
        self.inner.clone().delete_bank_card(request).await?;
        Ok(())
    }

    pub async fn delete_login_password(&self, identifier: impl Into<String>) -> Result<(), ClientError> {
        let request = self.authed_request(DeleteLoginPasswordRequest {
            identifier: identifier.into(),
        })?;
        self.inner.clone().delete_login_password(request).await?;
        Ok(())
    }

    pub async fn delete_text_binary(&self, identifier: impl Into<String>) -> Result<(), ClientError> {
        let request = self.authed_request(DeleteTextBinaryRequest {
            identifier: identifier.into(),
        })?;
        self.inner.clone().delete_text_binary(request).await?;
        Ok(())
    }

    pub async fn get_bank_cards(&self) -> Result<Vec<BankCardEntry>, ClientError> {
        let request = self.authed_request(GetBankCardsRequest {})?;
        Ok(self.inner.clone().get_bank_cards(request).await?.into_inner().cards)
    }

    pub async fn get_logins_passwords(&self) -> Result<Vec<LoginPasswordEntry>, ClientError> {
        let request = self.authed_request(GetLoginsPasswordsRequest {})?;
        Ok(self
            .inner
            .clone()
            .get_logins_passwords(request)
            .await?
            .into_inner()
            .entries)
    }

    pub async fn get_texts_binaries(&self) -> Result<Vec<TextBinaryEntry>, ClientError> {
        let request = self.authed_request(GetTextsBinariesRequest {})?;
        Ok(self
            .inner
            .clone()
            .get_texts_binaries(request)
            .await?
            .into_inner()
            .entries)
    }
}
