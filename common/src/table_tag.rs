// SPDX-License-Identifier: MIT OR Apache-2.0

//! The discriminator the delete coalescer switches on, and that the client uses to
//! pick which `Get`/`Delete` RPC family it is calling.

use std::fmt;
use std::str::FromStr;

/// One of the three tables an entry can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableTag {
    BankCard,
    LoginPassword,
    TextBinary,
}

/// A table tag string that didn't match any known [`TableTag`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}: invalid table identifier")]
pub struct UnknownTableTag(pub String);

impl TableTag {
    pub const fn table_name(self) -> &'static str {
        match self {
            TableTag::BankCard => "bank_cards",
            TableTag::LoginPassword => "logins_passwords",
            TableTag::TextBinary => "texts_binaries",
        }
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            TableTag::BankCard => "bankCard",
            TableTag::LoginPassword => "loginPassword",
            TableTag::TextBinary => "textBinary",
        };
        f.write_str(tag)
    }
}

impl FromStr for TableTag {
    type Err = UnknownTableTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bankCard" => Ok(TableTag::BankCard),
            "loginPassword" => Ok(TableTag::LoginPassword),
            "textBinary" => Ok(TableTag::TextBinary),
            other => Err(UnknownTableTag(other.to_string())),
        }
    }
}
