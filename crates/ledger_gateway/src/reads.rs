use shared::{
    domain::{Address, KittyRecord, RegistryKind, TokenId, ZombieRecord},
    protocol::{ReadCall, ReadValue},
};

use crate::{GatewayError, LedgerGateway};

pub trait RegistryRecord: Clone + Send + Sync + 'static {
    const REGISTRY: RegistryKind;

    fn token_id(&self) -> TokenId;

    fn is_populated(&self) -> bool;

    fn from_value(value: ReadValue) -> Result<Self, GatewayError>;
}

impl RegistryRecord for ZombieRecord {
    const REGISTRY: RegistryKind = RegistryKind::Zombie;

    fn token_id(&self) -> TokenId {
        self.id.into()
    }

    fn is_populated(&self) -> bool {
        true
    }

    fn from_value(value: ReadValue) -> Result<Self, GatewayError> {
        match value {
            ReadValue::Zombie(record) => Ok(record),
            other => Err(unexpected("zombie record", &other)),
        }
    }
}

impl RegistryRecord for KittyRecord {
    const REGISTRY: RegistryKind = RegistryKind::Kitty;

    fn token_id(&self) -> TokenId {
        self.id.into()
    }

    fn is_populated(&self) -> bool {
        self.exists()
    }

    fn from_value(value: ReadValue) -> Result<Self, GatewayError> {
        match value {
            ReadValue::Kitty(record) => Ok(record),
            other => Err(unexpected("kitty record", &other)),
        }
    }
}

pub async fn owner_of<G>(
    gateway: &G,
    registry: RegistryKind,
    id: TokenId,
) -> Result<Address, GatewayError>
where
    G: LedgerGateway + ?Sized,
{
    match gateway.read(registry, ReadCall::OwnerOf { id }).await? {
        ReadValue::Owner { address } => Ok(address),
        other => Err(unexpected("owner address", &other)),
    }
}

pub async fn record_of<R, G>(gateway: &G, id: TokenId) -> Result<R, GatewayError>
where
    R: RegistryRecord,
    G: LedgerGateway + ?Sized,
{
    let value = gateway.read(R::REGISTRY, ReadCall::RecordOf { id }).await?;
    R::from_value(value)
}

pub async fn list_owned<G>(
    gateway: &G,
    registry: RegistryKind,
    owner: &Address,
) -> Result<Vec<TokenId>, GatewayError>
where
    G: LedgerGateway + ?Sized,
{
    if !gateway.supports_listing(registry) {
        return Err(GatewayError::Unsupported {
            registry,
            method: "listOwned",
        });
    }
    let call = ReadCall::ListOwned {
        owner: owner.clone(),
    };
    match gateway.read(registry, call).await? {
        ReadValue::TokenIds { ids } => Ok(ids),
        other => Err(unexpected("token id list", &other)),
    }
}

fn unexpected(expected: &str, got: &ReadValue) -> GatewayError {
    GatewayError::Decode {
        cause: format!("expected {expected}, got {got:?}"),
    }
}
