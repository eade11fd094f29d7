use serde::{Deserialize, Serialize};

use crate::domain::{
    Address, KittyId, KittyRecord, RegistryKind, TokenId, Wei, ZombieId, ZombieRecord,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ReadCall {
    OwnerOf { id: TokenId },
    RecordOf { id: TokenId },
    ListOwned { owner: Address },
}

impl ReadCall {
    pub fn method_name(&self) -> &'static str {
        match self {
            ReadCall::OwnerOf { .. } => "ownerOf",
            ReadCall::RecordOf { .. } => "recordOf",
            ReadCall::ListOwned { .. } => "listOwned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ReadValue {
    Owner { address: Address },
    Zombie(ZombieRecord),
    Kitty(KittyRecord),
    TokenIds { ids: Vec<TokenId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SubmitCall {
    CreateRandomZombie { name: String },
    LevelUp { zombie_id: ZombieId },
    FeedOnKitty { zombie_id: ZombieId, kitty_id: KittyId },
    CreateKitty { genes: u64 },
}

impl SubmitCall {
    pub fn registry(&self) -> RegistryKind {
        match self {
            SubmitCall::CreateKitty { .. } => RegistryKind::Kitty,
            _ => RegistryKind::Zombie,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            SubmitCall::CreateRandomZombie { .. } => "createRandomZombie",
            SubmitCall::LevelUp { .. } => "levelUp",
            SubmitCall::FeedOnKitty { .. } => "feedOnKitty",
            SubmitCall::CreateKitty { .. } => "createTestKitty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub call: SubmitCall,
    pub from: Address,
    pub fee: Wei,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    #[serde(default)]
    pub fee_paid: Wei,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Confirmed(TxReceipt),
    Reverted { reason: String },
    /// The call never reliably reached the ledger; no fee was consumed.
    TransportFailed { cause: String },
}

impl TransactionOutcome {
    pub fn reached_ledger(&self) -> bool {
        !matches!(self, TransactionOutcome::TransportFailed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryBindings {
    pub zombie: Address,
    pub kitty: Address,
}

impl RegistryBindings {
    pub fn contract_for(&self, registry: RegistryKind) -> &Address {
        match registry {
            RegistryKind::Zombie => &self.zombie,
            RegistryKind::Kitty => &self.kitty,
        }
    }
}
