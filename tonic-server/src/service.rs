// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `VaultService` gRPC service implementation: one inherent `async fn` per
//! RPC (spec §6), each delegating to [`Processor`] after the dispatcher's
//! per-method policy check. Mirrors the teacher's service-impl shape — a
//! `Clone` struct built via `::new()`, holding its collaborators by value since
//! both are cheap to clone.

use tonic::metadata::{MetadataKey, MetadataValue};
use tonic::{async_trait, Request, Response, Status};

use vaultbackend::{Processor, ProcessorError, Storage, StorageBackend};
use vaultcommon::TableTag;
use vaultprotos::v1::vault_service_server::VaultService as VaultServiceTrait;
use vaultprotos::v1::*;

use crate::dispatcher::{bearer_token, Dispatcher};

/// Generic over [`StorageBackend`] (defaulting to the real Postgres-backed
/// [`Storage`]) purely so integration tests can wire this service against
/// `vaultbackend::storage::fake::InMemoryStorage` instead; `vault-server`'s
/// `main.rs` always instantiates the default.
#[derive(Clone)]
pub struct VaultService<S: StorageBackend = Storage> {
    processor: Processor<S>,
    dispatcher: Dispatcher,
}

impl<S: StorageBackend> VaultService<S> {
    pub fn new(processor: Processor<S>, dispatcher: Dispatcher) -> Self {
        Self {
            processor,
            dispatcher,
        }
    }

    /// Runs the dispatcher's gate for `method`, then re-derives the caller's
    /// `user_id` from the same header (spec §4.B's documented redundancy).
    fn authenticated_user_id<T>(
        &self,
        method: &'static str,
        request: &Request<T>,
    ) -> Result<String, Status> {
        self.dispatcher.authenticate(method, request.metadata())?;
        let token = bearer_token(request.metadata(), self.dispatcher.header_name())?;
        Ok(self.processor.user_id_from_token(token)?)
    }

    /// Register/Login collapse every storage error to `UNAUTHENTICATED`
    /// (spec §7), regardless of the richer code the same error would carry for
    /// any other RPC (see `From<ProcessorError> for Status`).
    fn auth_rpc_error(err: ProcessorError) -> Status {
        Status::unauthenticated(err.to_string())
    }

    fn issue_token_header<T>(&self, response: &mut Response<T>, token: &str) -> Result<(), Status> {
        let key = MetadataKey::from_bytes(self.dispatcher.header_name().as_bytes())
            .map_err(|_| Status::internal("invalid auth header name"))?;
        let value = MetadataValue::try_from(token)
            .map_err(|_| Status::internal("failed to encode token header"))?;
        response.metadata_mut().insert(key, value);
        Ok(())
    }
}

#[async_trait]
impl<S: StorageBackend> VaultServiceTrait for VaultService<S> {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();
        let token = self
            .processor
            .register(&req.login, &req.password)
            .await
            .map_err(Self::auth_rpc_error)?;

        let mut response = Response::new(RegisterResponse {});
        self.issue_token_header(&mut response, &token)?;
        Ok(response)
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();
        let token = self
            .processor
            .login(&req.login, &req.password)
            .await
            .map_err(Self::auth_rpc_error)?;

        let mut response = Response::new(LoginResponse {});
        self.issue_token_header(&mut response, &token)?;
        Ok(response)
    }

    async fn post_bank_card(
        &self,
        request: Request<PostBankCardRequest>,
    ) -> Result<Response<PostBankCardResponse>, Status> {
        let user_id = self.authenticated_user_id("PostBankCard", &request)?;
        let req = request.into_inner();
        self.processor
            .post_bank_card(&user_id, &req.identifier, &req.number, &req.holder, &req.cvv, &req.meta)
            .await?;
        Ok(Response::new(PostBankCardResponse {}))
    }

    async fn post_login_password(
        &self,
        request: Request<PostLoginPasswordRequest>,
    ) -> Result<Response<PostLoginPasswordResponse>, Status> {
        let user_id = self.authenticated_user_id("PostLoginPassword", &request)?;
        let req = request.into_inner();
        self.processor
            .post_login_password(&user_id, &req.identifier, &req.login, &req.password, &req.meta)
            .await?;
        Ok(Response::new(PostLoginPasswordResponse {}))
    }

    async fn post_text_binary(
        &self,
        request: Request<PostTextBinaryRequest>,
    ) -> Result<Response<PostTextBinaryResponse>, Status> {
        let user_id = self.authenticated_user_id("PostTextBinary", &request)?;
        let req = request.into_inner();
        self.processor
            .post_text_binary(&user_id, &req.identifier, &req.entry, &req.meta)
            .await?;
        Ok(Response::new(PostTextBinaryResponse {}))
    }

    async fn delete_bank_card(
        &self,
        request: Request<DeleteBankCardRequest>,
    ) -> Result<Response<DeleteBankCardResponse>, Status> {
        let user_id = self.authenticated_user_id("DeleteBankCard", &request)?;
        let req = request.into_inner();
        self.processor.delete(&user_id, &req.identifier, TableTag::BankCard);
        Ok(Response::new(DeleteBankCardResponse {}))
    }

    async fn delete_login_password(
        &self,
        request: Request<DeleteLoginPasswordRequest>,
    ) -> Result<Response<DeleteLoginPasswordResponse>, Status> {
        let user_id = self.authenticated_user_id("DeleteLoginPassword", &request)?;
        let req = request.into_inner();
        self.processor.delete(&user_id, &req.identifier, TableTag::LoginPassword);
        Ok(Response::new(DeleteLoginPasswordResponse {}))
    }

    async fn delete_text_binary(
        &self,
        request: Request<DeleteTextBinaryRequest>,
    ) -> Result<Response<DeleteTextBinaryResponse>, Status> {
        let user_id = self.authenticated_user_id("DeleteTextBinary", &request)?;
        let req = request.into_inner();
        self.processor.delete(&user_id, &req.identifier, TableTag::TextBinary);
        Ok(Response::new(DeleteTextBinaryResponse {}))
    }

    async fn get_bank_cards(
        &self,
        request: Request<GetBankCardsRequest>,
    ) -> Result<Response<GetBankCardsResponse>, Status> {
        let user_id = self.authenticated_user_id("GetBankCards", &request)?;
        let entries = self.processor.get_bank_cards(&user_id).await?;
        let cards = entries
            .into_iter()
            .map(|e| BankCardEntry {
                identifier: e.identifier,
                number: e.number,
                holder: e.holder,
                cvv: e.cvv,
                meta: e.meta,
            })
            .collect();
        Ok(Response::new(GetBankCardsResponse { cards }))
    }

    async fn get_logins_passwords(
        &self,
        request: Request<GetLoginsPasswordsRequest>,
    ) -> Result<Response<GetLoginsPasswordsResponse>, Status> {
        let user_id = self.authenticated_user_id("GetLoginsPasswords", &request)?;
        let entries = self.processor.get_logins_passwords(&user_id).await?;
        let entries = entries
            .into_iter()
            .map(|e| LoginPasswordEntry {
                identifier: e.identifier,
                login: e.login,
                password: e.password,
                meta: e.meta,
            })
            .collect();
        Ok(Response::new(GetLoginsPasswordsResponse { entries }))
    }

    async fn get_texts_binaries(
        &self,
        request: Request<GetTextsBinariesRequest>,
    ) -> Result<Response<GetTextsBinariesResponse>, Status> {
        let user_id = self.authenticated_user_id("GetTextsBinaries", &request)?;
        let entries = self.processor.get_texts_binaries(&user_id).await?;
        let entries = entries
            .into_iter()
            .map(|e| TextBinaryEntry {
                identifier: e.identifier,
                entry: e.entry,
                meta: e.meta,
            })
            .collect();
        Ok(Response::new(GetTextsBinariesResponse { entries }))
    }
}
