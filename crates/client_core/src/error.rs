use ledger_gateway::GatewayError;
use shared::domain::{Address, ChainId};
use thiserror::Error;

use crate::{session::WalletError, types::ActionKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("not owner")]
    NotOwner,
    #[error("on cooldown ({} minutes remaining)", minutes_rounded_up(.remaining_secs))]
    OnCooldown { remaining_secs: i64 },
    #[error("target not found")]
    TargetNotFound,
    #[error("account already owns a zombie")]
    AlreadyOwnsZombie,
}

fn minutes_rounded_up(secs: &i64) -> i64 {
    (secs + 59) / 60
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionFailure {
    #[error("cancelled")]
    Cancelled,
    #[error("precondition denied: {0}")]
    PreconditionDenied(Denial),
    #[error("ledger reverted: {message}")]
    LedgerReverted { message: String },
    #[error("transport failed: {cause}")]
    TransportFailed { cause: String },
    #[error("no candidates found after probing {probed} ids{}", bound_hint(.bound_reached))]
    DiscoveryExhausted { probed: u64, bound_reached: bool },
    #[error("session changed")]
    SessionChanged,
    #[error("no active session; connect a wallet first")]
    NoActiveSession,
    #[error("a {kind} action is already in flight for {address}")]
    AlreadyInFlight { kind: ActionKind, address: Address },
    #[error("network changed; re-initialization required")]
    ReinitializationRequired,
}

fn bound_hint(bound_reached: &bool) -> &'static str {
    if *bound_reached {
        " (probe bound reached; candidates may exist beyond it)"
    } else {
        ""
    }
}

impl From<GatewayError> for ActionFailure {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Reverted { message } => ActionFailure::LedgerReverted { message },
            other => ActionFailure::TransportFailed {
                cause: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("registry contracts not deployed to detected network {chain}")]
    NotDeployed { chain: ChainId },
    #[error("invalid rpc url '{url}': {cause}")]
    InvalidRpcUrl { url: String, cause: String },
}
