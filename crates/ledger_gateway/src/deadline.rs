use std::time::Duration;

use async_trait::async_trait;
use shared::{
    domain::RegistryKind,
    protocol::{ReadCall, ReadValue, SubmitRequest, TransactionOutcome},
};
use tracing::warn;

use crate::{GatewayError, LedgerGateway};

pub struct DeadlineGateway<G> {
    inner: G,
    deadline: Duration,
}

impl<G> DeadlineGateway<G> {
    pub fn new(inner: G, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl<G: LedgerGateway> LedgerGateway for DeadlineGateway<G> {
    async fn read(
        &self,
        registry: RegistryKind,
        call: ReadCall,
    ) -> Result<ReadValue, GatewayError> {
        let method = call.method_name();
        match tokio::time::timeout(self.deadline, self.inner.read(registry, call)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(registry = %registry, method, deadline = ?self.deadline, "ledger read timed out");
                Err(GatewayError::Transport {
                    cause: format!("{method} timed out after {:?}", self.deadline),
                })
            }
        }
    }

    async fn submit(&self, request: SubmitRequest) -> TransactionOutcome {
        let method = request.call.method_name();
        match tokio::time::timeout(self.deadline, self.inner.submit(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(method, deadline = ?self.deadline, "ledger submit timed out");
                TransactionOutcome::TransportFailed {
                    cause: format!("{method} timed out after {:?}", self.deadline),
                }
            }
        }
    }

    fn supports_listing(&self, registry: RegistryKind) -> bool {
        self.inner.supports_listing(registry)
    }
}
