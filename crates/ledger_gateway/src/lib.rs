use async_trait::async_trait;
use shared::{
    domain::RegistryKind,
    protocol::{ReadCall, ReadValue, SubmitRequest, TransactionOutcome},
};
use thiserror::Error;

mod deadline;
mod http;
pub mod reads;

pub use deadline::DeadlineGateway;
pub use http::HttpLedgerGateway;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("ledger reverted: {message}")]
    Reverted { message: String },
    #[error("transport failure: {cause}")]
    Transport { cause: String },
    #[error("malformed ledger response: {cause}")]
    Decode { cause: String },
    #[error("{registry} registry does not expose {method}")]
    Unsupported {
        registry: RegistryKind,
        method: &'static str,
    },
}

impl GatewayError {
    pub fn reverted(message: impl Into<String>) -> Self {
        Self::Reverted {
            message: message.into(),
        }
    }

    pub fn transport(cause: impl ToString) -> Self {
        Self::Transport {
            cause: cause.to_string(),
        }
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, GatewayError::Reverted { .. })
    }
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn read(&self, registry: RegistryKind, call: ReadCall)
        -> Result<ReadValue, GatewayError>;

    /// Issues exactly one mutating call. The fee is consumed by the ledger for
    /// `Confirmed` and `Reverted` outcomes alike.
    async fn submit(&self, request: SubmitRequest) -> TransactionOutcome;

    fn supports_listing(&self, registry: RegistryKind) -> bool;
}
