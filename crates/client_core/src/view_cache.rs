use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use ledger_gateway::{reads::RegistryRecord, LedgerGateway};
use shared::domain::{Address, KittyRecord, RegistryKind, ZombieId, ZombieRecord};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::{
    config::EnumerationStrategy,
    enumerator::enumerator_for,
    error::ActionFailure,
    session::ActiveSession,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalView {
    pub address: Option<Address>,
    pub zombies: Vec<ZombieRecord>,
    pub kitties: Vec<KittyRecord>,
}

impl LocalView {
    pub fn zombie(&self, id: ZombieId) -> Option<&ZombieRecord> {
        self.zombies.iter().find(|zombie| zombie.id == id)
    }
}

pub struct LocalViewCache {
    zombie_strategy: EnumerationStrategy,
    kitty_strategy: EnumerationStrategy,
    max_attempts: u64,
    session: watch::Receiver<ActiveSession>,
    next_stamp: AtomicU64,
    slot: RwLock<ViewSlot>,
}

// Each half remembers the stamp of the refresh that produced it; a refresh
// that started earlier never replaces it.
#[derive(Default)]
struct ViewSlot {
    view: Arc<LocalView>,
    zombies_stamp: u64,
    kitties_stamp: u64,
}

struct Rediscovered {
    stamp: u64,
    address: Address,
    zombies: Option<Vec<ZombieRecord>>,
    kitties: Option<Vec<KittyRecord>>,
}

impl LocalViewCache {
    pub fn new(
        zombie_strategy: EnumerationStrategy,
        kitty_strategy: EnumerationStrategy,
        max_attempts: u64,
        session: watch::Receiver<ActiveSession>,
    ) -> Self {
        Self {
            zombie_strategy,
            kitty_strategy,
            max_attempts,
            session,
            next_stamp: AtomicU64::new(1),
            slot: RwLock::new(ViewSlot::default()),
        }
    }

    fn stamp(&self) -> u64 {
        self.next_stamp.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Arc<LocalView> {
        Arc::clone(&self.slot.read().await.view)
    }

    pub async fn clear(&self) {
        let mut slot = self.slot.write().await;
        let stamp = self.stamp();
        *slot = ViewSlot {
            view: Arc::new(LocalView::default()),
            zombies_stamp: stamp,
            kitties_stamp: stamp,
        };
        debug!("view: cleared");
    }

    pub async fn refresh(
        &self,
        gateway: &dyn LedgerGateway,
        address: &Address,
    ) -> Result<Arc<LocalView>, ActionFailure> {
        let stamp = self.stamp();
        let (zombies, kitties) = tokio::try_join!(
            self.discover::<ZombieRecord>(self.zombie_strategy, gateway, address),
            self.discover::<KittyRecord>(self.kitty_strategy, gateway, address),
        )?;

        self.install(Rediscovered {
            stamp,
            address: address.clone(),
            zombies: Some(zombies),
            kitties: Some(kitties),
        })
        .await
    }

    pub async fn refresh_kind(
        &self,
        kind: RegistryKind,
        gateway: &dyn LedgerGateway,
        address: &Address,
    ) -> Result<Arc<LocalView>, ActionFailure> {
        if self.snapshot().await.address.as_ref() != Some(address) {
            return self.refresh(gateway, address).await;
        }

        let stamp = self.stamp();
        let mut update = Rediscovered {
            stamp,
            address: address.clone(),
            zombies: None,
            kitties: None,
        };
        match kind {
            RegistryKind::Zombie => {
                update.zombies = Some(
                    self.discover::<ZombieRecord>(self.zombie_strategy, gateway, address)
                        .await?,
                );
            }
            RegistryKind::Kitty => {
                update.kitties = Some(
                    self.discover::<KittyRecord>(self.kitty_strategy, gateway, address)
                        .await?,
                );
            }
        }
        self.install(update).await
    }

    async fn discover<R: RegistryRecord>(
        &self,
        strategy: EnumerationStrategy,
        gateway: &dyn LedgerGateway,
        address: &Address,
    ) -> Result<Vec<R>, ActionFailure> {
        let enumerator = enumerator_for::<R>(strategy, gateway, self.max_attempts);
        let discovery = enumerator.enumerate_owned(gateway, address).await?;
        if discovery.stop.bound_reached() {
            info!(
                "view: {} probe stopped at bound {}; owned tokens past it are not shown",
                R::REGISTRY,
                self.max_attempts
            );
        }
        Ok(discovery.records)
    }

    // Splices the rediscovered halves into whatever view is current now.
    async fn install(&self, update: Rediscovered) -> Result<Arc<LocalView>, ActionFailure> {
        let mut slot = self.slot.write().await;
        if self.session.borrow().address.as_ref() != Some(&update.address) {
            debug!("view: dropping refresh for an address that is no longer active");
            return Err(ActionFailure::SessionChanged);
        }

        let stamp = update.stamp;
        let zombies = update.zombies.filter(|_| stamp > slot.zombies_stamp);
        let kitties = update.kitties.filter(|_| stamp > slot.kitties_stamp);
        let same_address = slot.view.address.as_ref() == Some(&update.address);
        if !same_address && (zombies.is_none() || kitties.is_none()) {
            debug!("view: dropping refresh started before the view was reset");
            return Err(ActionFailure::SessionChanged);
        }
        if zombies.is_none() && kitties.is_none() {
            debug!("view: refresh {stamp} superseded by a newer one");
            return Ok(Arc::clone(&slot.view));
        }

        let mut view = if same_address {
            LocalView::clone(&slot.view)
        } else {
            LocalView {
                address: Some(update.address),
                ..LocalView::default()
            }
        };
        if let Some(zombies) = zombies {
            view.zombies = zombies;
            slot.zombies_stamp = stamp;
        }
        if let Some(kitties) = kitties {
            view.kitties = kitties;
            slot.kitties_stamp = stamp;
        }
        let view = Arc::new(view);
        slot.view = Arc::clone(&view);
        debug!(
            "view: installed zombies={} kitties={}",
            view.zombies.len(),
            view.kitties.len()
        );
        Ok(view)
    }
}

#[cfg(test)]
#[path = "tests/view_cache_tests.rs"]
mod tests;
