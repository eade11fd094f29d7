use async_trait::async_trait;
use futures::future::try_join_all;
use ledger_gateway::{
    reads::{self, RegistryRecord},
    GatewayError, LedgerGateway,
};
use shared::domain::{Address, TokenId};
use tracing::{debug, warn};

use crate::config::EnumerationStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStop {
    Listed,
    EndOfIdSpace { probed: u64 },
    BoundReached { bound: u64 },
}

impl ProbeStop {
    pub fn probed(&self) -> u64 {
        match self {
            ProbeStop::Listed => 0,
            ProbeStop::EndOfIdSpace { probed } => *probed,
            ProbeStop::BoundReached { bound } => *bound,
        }
    }

    pub fn bound_reached(&self) -> bool {
        matches!(self, ProbeStop::BoundReached { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery<R> {
    pub records: Vec<R>,
    pub stop: ProbeStop,
}

#[async_trait]
pub trait Enumerable<R: RegistryRecord>: Send + Sync {
    async fn enumerate_owned(
        &self,
        gateway: &dyn LedgerGateway,
        owner: &Address,
    ) -> Result<Discovery<R>, GatewayError>;

    fn strategy(&self) -> EnumerationStrategy;
}

pub struct NativeEnumeration;

#[async_trait]
impl<R: RegistryRecord> Enumerable<R> for NativeEnumeration {
    async fn enumerate_owned(
        &self,
        gateway: &dyn LedgerGateway,
        owner: &Address,
    ) -> Result<Discovery<R>, GatewayError> {
        let ids = reads::list_owned(gateway, R::REGISTRY, owner).await?;
        debug!(registry = %R::REGISTRY, owner = %owner, count = ids.len(), "listed owned tokens");
        let records = try_join_all(ids.into_iter().map(|id| reads::record_of::<R, _>(gateway, id))).await?;
        Ok(Discovery {
            records,
            stop: ProbeStop::Listed,
        })
    }

    fn strategy(&self) -> EnumerationStrategy {
        EnumerationStrategy::Native
    }
}

pub struct ProbingEnumeration {
    max_attempts: u64,
}

impl ProbingEnumeration {
    pub fn new(max_attempts: u64) -> Self {
        Self { max_attempts }
    }
}

#[async_trait]
impl<R: RegistryRecord> Enumerable<R> for ProbingEnumeration {
    async fn enumerate_owned(
        &self,
        gateway: &dyn LedgerGateway,
        owner: &Address,
    ) -> Result<Discovery<R>, GatewayError> {
        let mut records = Vec::new();
        let mut id = 0u64;
        let mut attempts = 0u64;

        while attempts < self.max_attempts {
            let holder = match reads::owner_of(gateway, R::REGISTRY, TokenId(id)).await {
                Ok(holder) => holder,
                Err(err) if err.is_revert() => {
                    debug!(registry = %R::REGISTRY, id, error = %err, "probe reached end of id space");
                    return Ok(Discovery {
                        records,
                        stop: ProbeStop::EndOfIdSpace { probed: attempts },
                    });
                }
                Err(err) => return Err(err),
            };

            if holder == *owner {
                debug!(registry = %R::REGISTRY, id, "found owned token");
                records.push(reads::record_of::<R, _>(gateway, TokenId(id)).await?);
            }
            id += 1;
            attempts += 1;
        }

        debug!(registry = %R::REGISTRY, bound = self.max_attempts, found = records.len(), "probe bound reached");
        Ok(Discovery {
            records,
            stop: ProbeStop::BoundReached {
                bound: self.max_attempts,
            },
        })
    }

    fn strategy(&self) -> EnumerationStrategy {
        EnumerationStrategy::Probing
    }
}

pub fn enumerator_for<R: RegistryRecord>(
    strategy: EnumerationStrategy,
    gateway: &dyn LedgerGateway,
    max_attempts: u64,
) -> Box<dyn Enumerable<R>> {
    match strategy {
        EnumerationStrategy::Native if gateway.supports_listing(R::REGISTRY) => {
            Box::new(NativeEnumeration)
        }
        EnumerationStrategy::Native => {
            warn!(registry = %R::REGISTRY, "registry cannot list per owner; probing instead");
            Box::new(ProbingEnumeration::new(max_attempts))
        }
        EnumerationStrategy::Probing => Box::new(ProbingEnumeration::new(max_attempts)),
    }
}

pub async fn discover_all<R: RegistryRecord>(
    gateway: &dyn LedgerGateway,
    max_attempts: u64,
) -> Result<Discovery<R>, GatewayError> {
    let mut records = Vec::new();
    for id in 0..max_attempts {
        match reads::record_of::<R, _>(gateway, TokenId(id)).await {
            Ok(record) if record.is_populated() => records.push(record),
            Ok(_) => {}
            Err(err) if err.is_revert() => {
                debug!(registry = %R::REGISTRY, id, "no more records");
                return Ok(Discovery {
                    records,
                    stop: ProbeStop::EndOfIdSpace { probed: id },
                });
            }
            Err(err) => return Err(err),
        }
    }

    Ok(Discovery {
        records,
        stop: ProbeStop::BoundReached {
            bound: max_attempts,
        },
    })
}

#[cfg(test)]
#[path = "tests/enumerator_tests.rs"]
mod tests;
