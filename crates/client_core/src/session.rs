use async_trait::async_trait;
use shared::domain::{Address, ChainId};
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::error::ActionFailure;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSession {
    pub address: Option<Address>,
    pub chain_id: Option<ChainId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub address: Address,
    pub chain_id: ChainId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AddressChanged(Option<Address>),
    ChainChanged(ChainId),
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    Cleared,
    AddressSwitched(Address),
    RebindRequired(ChainId),
    Unchanged,
}

impl ActiveSession {
    pub fn connected(info: SessionInfo) -> Self {
        Self {
            address: Some(info.address),
            chain_id: Some(info.chain_id),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    pub fn apply(&self, event: &SessionEvent) -> (ActiveSession, SessionEffect) {
        match event {
            SessionEvent::AddressChanged(None) | SessionEvent::Disconnected => {
                (ActiveSession::default(), SessionEffect::Cleared)
            }
            SessionEvent::AddressChanged(Some(address))
                if self.address.as_ref() == Some(address) =>
            {
                (self.clone(), SessionEffect::Unchanged)
            }
            SessionEvent::AddressChanged(Some(address)) => (
                ActiveSession {
                    address: Some(address.clone()),
                    chain_id: self.chain_id.clone(),
                },
                SessionEffect::AddressSwitched(address.clone()),
            ),
            SessionEvent::ChainChanged(chain_id) => (
                ActiveSession {
                    address: self.address.clone(),
                    chain_id: Some(chain_id.clone()),
                },
                SessionEffect::RebindRequired(chain_id.clone()),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
    #[error("no accounts found; please connect your wallet")]
    NoAccounts,
    #[error("wallet connection rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait WalletSession: Send + Sync {
    async fn connect(&self) -> Result<SessionInfo, WalletError>;
    fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent>;
}

pub struct StaticWallet {
    info: Option<SessionInfo>,
    events: broadcast::Sender<SessionEvent>,
}

impl StaticWallet {
    pub fn new(address: Address, chain_id: ChainId) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            info: Some(SessionInfo { address, chain_id }),
            events,
        }
    }

    pub fn without_accounts() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { info: None, events }
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl WalletSession for StaticWallet {
    async fn connect(&self) -> Result<SessionInfo, WalletError> {
        self.info.clone().ok_or(WalletError::NoAccounts)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

pub struct SessionGuard {
    expected: ActiveSession,
    address: Address,
    rx: watch::Receiver<ActiveSession>,
}

impl SessionGuard {
    pub fn new(rx: watch::Receiver<ActiveSession>) -> Result<Self, ActionFailure> {
        let expected = rx.borrow().clone();
        let address = expected
            .address
            .clone()
            .ok_or(ActionFailure::NoActiveSession)?;
        Ok(Self {
            expected,
            address,
            rx,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn is_current(&self) -> bool {
        *self.rx.borrow() == self.expected
    }

    pub fn ensure_current(&self) -> Result<(), ActionFailure> {
        if self.is_current() {
            Ok(())
        } else {
            Err(ActionFailure::SessionChanged)
        }
    }

    pub async fn changed(&mut self) -> ActionFailure {
        loop {
            if !self.is_current() {
                return ActionFailure::SessionChanged;
            }
            if self.rx.changed().await.is_err() {
                return ActionFailure::SessionChanged;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
