// SPDX-License-Identifier: MIT OR Apache-2.0

//! Library half of the `vault-server` binary, split out so integration tests
//! under `tests/` can exercise the dispatcher and service wiring directly
//! instead of only through the compiled binary.

pub mod dispatcher;
pub mod service;

pub use dispatcher::Dispatcher;
pub use service::VaultService;
