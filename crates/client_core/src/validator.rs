use ledger_gateway::{reads, GatewayError, LedgerGateway};
use shared::domain::{Address, KittyId, KittyRecord, RegistryKind, ZombieId, ZombieRecord};

use crate::error::Denial;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied(Denial),
}

/// `None` means the ledger reverted the read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedObservation {
    pub zombie_owner: Option<Address>,
    pub zombie: Option<ZombieRecord>,
    pub target: Option<KittyRecord>,
}

pub async fn observe_feed(
    gateway: &dyn LedgerGateway,
    zombie_id: ZombieId,
    kitty_id: KittyId,
) -> Result<FeedObservation, GatewayError> {
    let (owner, zombie, target) = tokio::join!(
        reads::owner_of(gateway, RegistryKind::Zombie, zombie_id.into()),
        reads::record_of::<ZombieRecord, _>(gateway, zombie_id.into()),
        reads::record_of::<KittyRecord, _>(gateway, kitty_id.into()),
    );

    Ok(FeedObservation {
        zombie_owner: absent_on_revert(owner)?,
        zombie: absent_on_revert(zombie)?,
        target: absent_on_revert(target)?,
    })
}

fn absent_on_revert<T>(read: Result<T, GatewayError>) -> Result<Option<T>, GatewayError> {
    match read {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_revert() => Ok(None),
        Err(err) => Err(err),
    }
}

pub fn decide_feed(observation: &FeedObservation, active: &Address, now: i64) -> Verdict {
    if observation.zombie_owner.as_ref() != Some(active) {
        return Verdict::Denied(Denial::NotOwner);
    }

    // An owned id whose record cannot be read has no known ready time.
    let Some(zombie) = &observation.zombie else {
        return Verdict::Denied(Denial::NotOwner);
    };
    if zombie.is_on_cooldown(now) {
        return Verdict::Denied(Denial::OnCooldown {
            remaining_secs: zombie.cooldown_remaining(now),
        });
    }

    match &observation.target {
        Some(kitty) if kitty.exists() => Verdict::Allowed,
        _ => Verdict::Denied(Denial::TargetNotFound),
    }
}

pub async fn observe_owner(
    gateway: &dyn LedgerGateway,
    zombie_id: ZombieId,
) -> Result<Option<Address>, GatewayError> {
    absent_on_revert(reads::owner_of(gateway, RegistryKind::Zombie, zombie_id.into()).await)
}

pub fn decide_level_up(owner: Option<&Address>, active: &Address) -> Verdict {
    if owner == Some(active) {
        Verdict::Allowed
    } else {
        Verdict::Denied(Denial::NotOwner)
    }
}

pub fn decide_create_zombie(owned_zombies: usize) -> Verdict {
    if owned_zombies == 0 {
        Verdict::Allowed
    } else {
        Verdict::Denied(Denial::AlreadyOwnsZombie)
    }
}

#[cfg(test)]
#[path = "tests/validator_tests.rs"]
mod tests;
