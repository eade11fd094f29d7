use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use ledger_gateway::{GatewayError, LedgerGateway};
use shared::{
    domain::{Address, KittyId, KittyRecord, RegistryKind, TokenId, Wei, ZombieId, ZombieRecord},
    protocol::{ReadCall, ReadValue, SubmitCall, SubmitRequest, TransactionOutcome, TxReceipt},
};

use crate::{
    clock::Clock,
    decision::{CreationDecision, DecisionMaker, Selection},
};

pub const NOW: i64 = 1_700_000_000;
pub const FEED_COOLDOWN_SECS: i64 = 86_400;
pub const LEVEL_UP_FEE: Wei = Wei(1_000_000_000_000_000);

pub fn alice() -> Address {
    Address::parse("0x22D0970775E3CCb1FF250f34971D01cE976b5eF2").expect("alice")
}

pub fn bob() -> Address {
    Address::parse("0x5B38Da6a701c568545dCfcB03FcB875f56beddC4").expect("bob")
}

pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now),
        })
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct LedgerState {
    zombies: Vec<(ZombieRecord, Address)>,
    kitties: Vec<(KittyRecord, Address)>,
    reads: Vec<(RegistryKind, ReadCall)>,
    submits: Vec<SubmitRequest>,
    fees_consumed: u128,
    scripted: VecDeque<TransactionOutcome>,
    failing_ids: HashSet<(RegistryKind, u64)>,
    tx_counter: u64,
}

pub struct SimulatedLedger {
    state: Mutex<LedgerState>,
    clock: Arc<ManualClock>,
    zombie_listing: bool,
}

impl SimulatedLedger {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Self::build(clock, true)
    }

    pub fn without_listing(clock: Arc<ManualClock>) -> Arc<Self> {
        Self::build(clock, false)
    }

    fn build(clock: Arc<ManualClock>, zombie_listing: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LedgerState::default()),
            clock,
            zombie_listing,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("ledger state poisoned")
    }

    pub fn add_zombie(&self, owner: &Address, name: &str, ready_time: i64) -> ZombieId {
        let mut state = self.lock();
        let id = ZombieId(state.zombies.len() as u64);
        state.zombies.push((
            ZombieRecord {
                id,
                name: name.to_string(),
                dna: dna_for(name),
                level: 1,
                ready_time,
                win_count: 0,
                loss_count: 0,
            },
            owner.clone(),
        ));
        id
    }

    pub fn add_kitty(&self, owner: &Address, genes: u64) -> KittyId {
        let mut state = self.lock();
        let id = KittyId(state.kitties.len() as u64);
        state.kitties.push((
            KittyRecord {
                id,
                genes,
                generation: 0,
            },
            owner.clone(),
        ));
        id
    }

    pub fn zombie(&self, id: ZombieId) -> Option<ZombieRecord> {
        self.lock()
            .zombies
            .get(id.0 as usize)
            .map(|(record, _)| record.clone())
    }

    pub fn transfer_zombie(&self, id: ZombieId, to: &Address) {
        if let Some(entry) = self.lock().zombies.get_mut(id.0 as usize) {
            entry.1 = to.clone();
        }
    }

    pub fn script_outcome(&self, outcome: TransactionOutcome) {
        self.lock().scripted.push_back(outcome);
    }

    pub fn fail_reads_for(&self, registry: RegistryKind, id: u64) {
        self.lock().failing_ids.insert((registry, id));
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads.len()
    }

    pub fn reads(&self) -> Vec<(RegistryKind, ReadCall)> {
        self.lock().reads.clone()
    }

    pub fn submits(&self) -> Vec<SubmitRequest> {
        self.lock().submits.clone()
    }

    pub fn fees_consumed(&self) -> u128 {
        self.lock().fees_consumed
    }

    fn read_value(
        &self,
        state: &LedgerState,
        registry: RegistryKind,
        call: &ReadCall,
    ) -> Result<ReadValue, GatewayError> {
        let missing = || GatewayError::reverted("invalid opcode: token id out of range");
        match (registry, call) {
            (RegistryKind::Zombie, ReadCall::OwnerOf { id }) => state
                .zombies
                .get(id.0 as usize)
                .map(|(_, owner)| ReadValue::Owner {
                    address: owner.clone(),
                })
                .ok_or_else(missing),
            (RegistryKind::Zombie, ReadCall::RecordOf { id }) => state
                .zombies
                .get(id.0 as usize)
                .map(|(record, _)| ReadValue::Zombie(record.clone()))
                .ok_or_else(missing),
            (RegistryKind::Zombie, ReadCall::ListOwned { owner }) if self.zombie_listing => {
                Ok(ReadValue::TokenIds {
                    ids: state
                        .zombies
                        .iter()
                        .filter(|(_, holder)| holder == owner)
                        .map(|(record, _)| TokenId::from(record.id))
                        .collect(),
                })
            }
            (RegistryKind::Kitty, ReadCall::OwnerOf { id }) => state
                .kitties
                .get(id.0 as usize)
                .map(|(_, owner)| ReadValue::Owner {
                    address: owner.clone(),
                })
                .ok_or_else(missing),
            (RegistryKind::Kitty, ReadCall::RecordOf { id }) => state
                .kitties
                .get(id.0 as usize)
                .map(|(record, _)| ReadValue::Kitty(record.clone()))
                .ok_or_else(missing),
            (registry, ReadCall::ListOwned { .. }) => Err(GatewayError::Unsupported {
                registry,
                method: "listOwned",
            }),
        }
    }

    fn execute(&self, state: &mut LedgerState, request: &SubmitRequest) -> Result<(), String> {
        let now = self.clock.now();
        match &request.call {
            SubmitCall::CreateRandomZombie { name } => {
                if state.zombies.iter().any(|(_, owner)| *owner == request.from) {
                    return Err("revert".to_string());
                }
                let id = ZombieId(state.zombies.len() as u64);
                state.zombies.push((
                    ZombieRecord {
                        id,
                        name: name.clone(),
                        dna: dna_for(name),
                        level: 1,
                        ready_time: now,
                        win_count: 0,
                        loss_count: 0,
                    },
                    request.from.clone(),
                ));
            }
            SubmitCall::LevelUp { zombie_id } => {
                if request.fee != LEVEL_UP_FEE {
                    return Err("revert: level up fee required".to_string());
                }
                let (zombie, _) = state
                    .zombies
                    .get_mut(zombie_id.0 as usize)
                    .ok_or_else(|| "revert: unknown zombie".to_string())?;
                zombie.level += 1;
            }
            SubmitCall::FeedOnKitty {
                zombie_id,
                kitty_id,
            } => {
                let genes = state
                    .kitties
                    .get(kitty_id.0 as usize)
                    .map(|(kitty, _)| kitty.genes)
                    .ok_or_else(|| "revert: unknown kitty".to_string())?;
                let (zombie, owner) = state
                    .zombies
                    .get_mut(zombie_id.0 as usize)
                    .ok_or_else(|| "revert: unknown zombie".to_string())?;
                if *owner != request.from {
                    return Err("revert: not owner".to_string());
                }
                if zombie.ready_time > now {
                    return Err("revert: zombie not ready".to_string());
                }
                zombie.ready_time = now + FEED_COOLDOWN_SECS;
                let dna = ((zombie.dna + genes % 10_000_000_000_000_000) / 2) / 100 * 100 + 99;
                let id = ZombieId(state.zombies.len() as u64);
                state.zombies.push((
                    ZombieRecord {
                        id,
                        name: "NoName".to_string(),
                        dna,
                        level: 1,
                        ready_time: now,
                        win_count: 0,
                        loss_count: 0,
                    },
                    request.from.clone(),
                ));
            }
            SubmitCall::CreateKitty { genes } => {
                if *genes == 0 {
                    return Err("revert: genes must be non-zero".to_string());
                }
                let id = KittyId(state.kitties.len() as u64);
                state.kitties.push((
                    KittyRecord {
                        id,
                        genes: *genes,
                        generation: 0,
                    },
                    request.from.clone(),
                ));
            }
        }
        Ok(())
    }
}

fn dna_for(name: &str) -> u64 {
    name.bytes()
        .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
        % 10_000_000_000_000_000
}

#[async_trait]
impl LedgerGateway for SimulatedLedger {
    async fn read(
        &self,
        registry: RegistryKind,
        call: ReadCall,
    ) -> Result<ReadValue, GatewayError> {
        let mut state = self.lock();
        state.reads.push((registry, call.clone()));
        let id = match &call {
            ReadCall::OwnerOf { id } | ReadCall::RecordOf { id } => Some(id.0),
            ReadCall::ListOwned { .. } => None,
        };
        if id.is_some_and(|id| state.failing_ids.contains(&(registry, id))) {
            return Err(GatewayError::transport("connection reset by peer"));
        }
        self.read_value(&state, registry, &call)
    }

    async fn submit(&self, request: SubmitRequest) -> TransactionOutcome {
        let mut state = self.lock();
        state.submits.push(request.clone());

        if let Some(outcome) = state.scripted.pop_front() {
            if outcome.reached_ledger() {
                state.fees_consumed += request.fee.0;
            }
            return outcome;
        }

        state.fees_consumed += request.fee.0;
        match self.execute(&mut state, &request) {
            Ok(()) => {
                state.tx_counter += 1;
                TransactionOutcome::Confirmed(TxReceipt {
                    tx_hash: format!("0x{:064x}", state.tx_counter),
                    fee_paid: request.fee,
                })
            }
            Err(reason) => TransactionOutcome::Reverted { reason },
        }
    }

    fn supports_listing(&self, registry: RegistryKind) -> bool {
        registry == RegistryKind::Zombie && self.zombie_listing
    }
}

#[derive(Default)]
pub struct ScriptedDecisions {
    selections: Mutex<VecDeque<Selection>>,
    creations: Mutex<VecDeque<CreationDecision>>,
    seen_candidates: Mutex<Vec<Vec<KittyRecord>>>,
    creation_offers: Mutex<usize>,
}

impl ScriptedDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(self, selection: Selection) -> Self {
        self.selections
            .lock()
            .expect("selections")
            .push_back(selection);
        self
    }

    pub fn on_creation(self, decision: CreationDecision) -> Self {
        self.creations.lock().expect("creations").push_back(decision);
        self
    }

    pub fn seen_candidates(&self) -> Vec<Vec<KittyRecord>> {
        self.seen_candidates.lock().expect("candidates").clone()
    }

    pub fn creation_offers(&self) -> usize {
        *self.creation_offers.lock().expect("offers")
    }
}

#[async_trait]
impl DecisionMaker for ScriptedDecisions {
    async fn select_target(&self, candidates: &[KittyRecord]) -> Selection {
        self.seen_candidates
            .lock()
            .expect("candidates")
            .push(candidates.to_vec());
        self.selections
            .lock()
            .expect("selections")
            .pop_front()
            .unwrap_or(Selection::Cancelled)
    }

    async fn offer_creation(&self) -> CreationDecision {
        *self.creation_offers.lock().expect("offers") += 1;
        self.creations
            .lock()
            .expect("creations")
            .pop_front()
            .unwrap_or(CreationDecision::Decline)
    }
}
