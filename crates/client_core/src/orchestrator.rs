//! Until `Submitting` starts a run aborts as soon as its session changes.
//! Once the submit is issued it always runs to an outcome.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use ledger_gateway::LedgerGateway;
use shared::{
    domain::{Address, KittyId, KittyRecord, Wei, ZombieRecord},
    protocol::{SubmitCall, SubmitRequest, TransactionOutcome},
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::{EnumerationStrategy, Settings},
    decision::{CreationDecision, DecisionMaker, Selection},
    enumerator::{discover_all, enumerator_for, ProbeStop},
    error::ActionFailure,
    session::SessionGuard,
    types::{ActionKind, ActionPhase, ActionRequest, ActionResult, ActionSuccess},
    validator::{self, Verdict},
    view_cache::{LocalView, LocalViewCache},
    ClientEvent,
};

const GENES_MODULUS: u128 = 10_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub zombie_enumeration: EnumerationStrategy,
    pub probe_max_attempts: u64,
    pub level_up_fee: Wei,
    pub gas_limit: u64,
}

impl From<&Settings> for OrchestratorSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            zombie_enumeration: settings.zombie_enumeration,
            probe_max_attempts: settings.probe_max_attempts,
            level_up_fee: settings.level_up_fee(),
            gas_limit: settings.gas_limit,
        }
    }
}

#[derive(Default)]
pub struct InFlightActions {
    slots: Mutex<HashSet<(Address, ActionKind)>>,
}

pub struct InFlightSlot<'a> {
    slots: &'a Mutex<HashSet<(Address, ActionKind)>>,
    key: (Address, ActionKind),
}

impl InFlightActions {
    pub fn claim(
        &self,
        address: Address,
        kind: ActionKind,
    ) -> Result<InFlightSlot<'_>, ActionFailure> {
        let key = (address, kind);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.insert(key.clone()) {
            let (address, kind) = key;
            return Err(ActionFailure::AlreadyInFlight { kind, address });
        }
        Ok(InFlightSlot {
            slots: &self.slots,
            key,
        })
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct ActionOrchestrator {
    gateway: Arc<dyn LedgerGateway>,
    cache: Arc<LocalViewCache>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
    in_flight: Arc<InFlightActions>,
    events: broadcast::Sender<ClientEvent>,
}

struct Progress<'a> {
    action_id: Uuid,
    kind: ActionKind,
    phase: ActionPhase,
    events: &'a broadcast::Sender<ClientEvent>,
}

impl<'a> Progress<'a> {
    fn start(kind: ActionKind, events: &'a broadcast::Sender<ClientEvent>) -> Self {
        let progress = Self {
            action_id: Uuid::new_v4(),
            kind,
            phase: ActionPhase::Idle,
            events,
        };
        info!("action {}: {} started", progress.action_id, kind);
        progress.publish();
        progress
    }

    fn enter(&mut self, phase: ActionPhase) {
        info!(
            "action {}: {} {:?} -> {:?}",
            self.action_id, self.kind, self.phase, phase
        );
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        let _ = self.events.send(ClientEvent::ActionPhase {
            action_id: self.action_id,
            kind: self.kind,
            phase: self.phase,
        });
    }

    fn finish(mut self, result: Result<ActionSuccess, ActionFailure>) -> ActionResult {
        match &result {
            Ok(success) => {
                info!(
                    "action {}: {} confirmed tx={}",
                    self.action_id, self.kind, success.receipt.tx_hash
                );
                self.enter(ActionPhase::Succeeded);
            }
            Err(ActionFailure::Cancelled) => {
                info!("action {}: {} cancelled", self.action_id, self.kind);
                self.enter(ActionPhase::Failed);
            }
            Err(failure) => {
                warn!("action {}: {} failed: {failure}", self.action_id, self.kind);
                self.enter(ActionPhase::Failed);
            }
        }
        result.into()
    }
}

impl ActionOrchestrator {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        cache: Arc<LocalViewCache>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
        in_flight: Arc<InFlightActions>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            gateway,
            cache,
            clock,
            settings,
            in_flight,
            events,
        }
    }

    pub async fn run(
        &self,
        request: ActionRequest,
        mut guard: SessionGuard,
        decisions: &dyn DecisionMaker,
    ) -> ActionResult {
        let _slot = match self.in_flight.claim(guard.address().clone(), request.kind()) {
            Ok(slot) => slot,
            Err(failure) => return ActionResult::Failed(failure),
        };
        let mut progress = Progress::start(request.kind(), &self.events);
        let result = self
            .execute(&mut progress, request, &mut guard, decisions)
            .await;
        progress.finish(result)
    }

    async fn execute(
        &self,
        progress: &mut Progress<'_>,
        request: ActionRequest,
        guard: &mut SessionGuard,
        decisions: &dyn DecisionMaker,
    ) -> Result<ActionSuccess, ActionFailure> {
        guard.ensure_current()?;
        let address = guard.address().clone();

        let call = match request {
            ActionRequest::CreateZombie { name } => {
                progress.enter(ActionPhase::Validating);
                let owned = self.owned_zombie_count(&address).await?;
                permit(validator::decide_create_zombie(owned))?;
                SubmitCall::CreateRandomZombie { name }
            }
            ActionRequest::CreateKitty { genes } => SubmitCall::CreateKitty {
                genes: genes.unwrap_or_else(random_genes),
            },
            ActionRequest::LevelUp { zombie_id } => {
                progress.enter(ActionPhase::Validating);
                let owner = validator::observe_owner(self.gateway.as_ref(), zombie_id).await?;
                permit(validator::decide_level_up(owner.as_ref(), &address))?;
                SubmitCall::LevelUp { zombie_id }
            }
            ActionRequest::FeedOnKitty {
                zombie_id,
                kitty_id,
            } => {
                let kitty_id = match kitty_id {
                    Some(kitty_id) => kitty_id,
                    None => self.choose_target(progress, guard, decisions).await?,
                };
                guard.ensure_current()?;
                progress.enter(ActionPhase::Validating);
                let observation =
                    validator::observe_feed(self.gateway.as_ref(), zombie_id, kitty_id).await?;
                permit(validator::decide_feed(
                    &observation,
                    &address,
                    self.clock.now(),
                ))?;
                SubmitCall::FeedOnKitty {
                    zombie_id,
                    kitty_id,
                }
            }
        };

        guard.ensure_current()?;
        self.submit_and_reconcile(progress, call, &address).await
    }

    async fn owned_zombie_count(&self, address: &Address) -> Result<usize, ActionFailure> {
        let enumerator = enumerator_for::<ZombieRecord>(
            self.settings.zombie_enumeration,
            self.gateway.as_ref(),
            self.settings.probe_max_attempts,
        );
        let discovery = enumerator
            .enumerate_owned(self.gateway.as_ref(), address)
            .await?;
        Ok(discovery.records.len())
    }

    async fn choose_target(
        &self,
        progress: &mut Progress<'_>,
        guard: &mut SessionGuard,
        decisions: &dyn DecisionMaker,
    ) -> Result<KittyId, ActionFailure> {
        progress.enter(ActionPhase::Discovering);
        let mut discovery =
            discover_all::<KittyRecord>(self.gateway.as_ref(), self.settings.probe_max_attempts)
                .await?;

        if discovery.records.is_empty() {
            guard.ensure_current()?;
            let decision = tokio::select! {
                decision = decisions.offer_creation() => decision,
                failure = guard.changed() => return Err(failure),
            };
            let genes = match decision {
                CreationDecision::Create { genes } => genes,
                CreationDecision::Decline => return Err(exhausted(&discovery.stop)),
            };

            info!(
                "action {}: no feed targets found; creating a kitty first",
                progress.action_id
            );
            guard.ensure_current()?;
            let address = guard.address().clone();
            let _creation_slot = self
                .in_flight
                .claim(address.clone(), ActionKind::CreateKitty)?;
            let mut creation = Progress::start(ActionKind::CreateKitty, &self.events);
            let call = SubmitCall::CreateKitty {
                genes: genes.unwrap_or_else(random_genes),
            };
            let created = self
                .submit_and_reconcile(&mut creation, call, &address)
                .await;
            creation.finish(created).into_result()?;

            guard.ensure_current()?;
            discovery = discover_all::<KittyRecord>(
                self.gateway.as_ref(),
                self.settings.probe_max_attempts,
            )
            .await?;
            if discovery.records.is_empty() {
                return Err(exhausted(&discovery.stop));
            }
        }

        guard.ensure_current()?;
        progress.enter(ActionPhase::AwaitingSelection);
        let selection = tokio::select! {
            selection = decisions.select_target(&discovery.records) => selection,
            failure = guard.changed() => return Err(failure),
        };
        match selection {
            Selection::Chosen(kitty_id) => Ok(kitty_id),
            Selection::Cancelled => Err(ActionFailure::Cancelled),
        }
    }

    async fn submit_and_reconcile(
        &self,
        progress: &mut Progress<'_>,
        call: SubmitCall,
        address: &Address,
    ) -> Result<ActionSuccess, ActionFailure> {
        let fee = match call {
            SubmitCall::LevelUp { .. } => self.settings.level_up_fee,
            _ => Wei::ZERO,
        };
        progress.enter(ActionPhase::Submitting);
        let request = SubmitRequest {
            call,
            from: address.clone(),
            fee,
            gas_limit: self.settings.gas_limit,
        };

        match self.gateway.submit(request).await {
            TransactionOutcome::Confirmed(receipt) => {
                progress.enter(ActionPhase::Reconciling);
                let (view, view_reconciled) = self.reconcile(address).await;
                Ok(ActionSuccess {
                    action_id: progress.action_id,
                    kind: progress.kind,
                    receipt,
                    view,
                    view_reconciled,
                })
            }
            TransactionOutcome::Reverted { reason } => {
                progress.enter(ActionPhase::Reconciling);
                let _ = self.reconcile(address).await;
                Err(ActionFailure::LedgerReverted { message: reason })
            }
            TransactionOutcome::TransportFailed { cause } => {
                Err(ActionFailure::TransportFailed { cause })
            }
        }
    }

    async fn reconcile(&self, address: &Address) -> (Arc<LocalView>, bool) {
        match self.cache.refresh(self.gateway.as_ref(), address).await {
            Ok(view) => {
                let _ = self.events.send(ClientEvent::ViewRefreshed(Arc::clone(&view)));
                (view, true)
            }
            Err(err) => {
                warn!("reconcile: view refresh failed after submit: {err}");
                (self.cache.snapshot().await, false)
            }
        }
    }
}

fn permit(verdict: Verdict) -> Result<(), ActionFailure> {
    match verdict {
        Verdict::Allowed => Ok(()),
        Verdict::Denied(denial) => Err(ActionFailure::PreconditionDenied(denial)),
    }
}

fn exhausted(stop: &ProbeStop) -> ActionFailure {
    ActionFailure::DiscoveryExhausted {
        probed: stop.probed(),
        bound_reached: stop.bound_reached(),
    }
}

pub fn random_genes() -> u64 {
    let genes = Uuid::new_v4().as_u128() % GENES_MODULUS;
    genes.max(1) as u64
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
