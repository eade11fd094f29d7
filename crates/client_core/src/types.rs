use std::{fmt, sync::Arc};

use shared::{
    domain::{KittyId, ZombieId},
    protocol::TxReceipt,
};
use uuid::Uuid;

use crate::{error::ActionFailure, view_cache::LocalView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CreateZombie,
    CreateKitty,
    LevelUp,
    FeedOnKitty,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::CreateZombie => "create-zombie",
            ActionKind::CreateKitty => "create-kitty",
            ActionKind::LevelUp => "level-up",
            ActionKind::FeedOnKitty => "feed-on-kitty",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    CreateZombie {
        name: String,
    },
    CreateKitty {
        genes: Option<u64>,
    },
    LevelUp {
        zombie_id: ZombieId,
    },
    FeedOnKitty {
        zombie_id: ZombieId,
        kitty_id: Option<KittyId>,
    },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::CreateZombie { .. } => ActionKind::CreateZombie,
            ActionRequest::CreateKitty { .. } => ActionKind::CreateKitty,
            ActionRequest::LevelUp { .. } => ActionKind::LevelUp,
            ActionRequest::FeedOnKitty { .. } => ActionKind::FeedOnKitty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Idle,
    Discovering,
    AwaitingSelection,
    Validating,
    Submitting,
    Reconciling,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ActionSuccess {
    pub action_id: Uuid,
    pub kind: ActionKind,
    pub receipt: TxReceipt,
    pub view: Arc<LocalView>,
    /// False when the rebuild failed and `view` is the last cached snapshot.
    pub view_reconciled: bool,
}

#[derive(Debug, Clone)]
pub enum ActionResult {
    Succeeded(ActionSuccess),
    Failed(ActionFailure),
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Succeeded(_))
    }

    pub fn failure(&self) -> Option<&ActionFailure> {
        match self {
            ActionResult::Failed(failure) => Some(failure),
            ActionResult::Succeeded(_) => None,
        }
    }

    pub fn into_result(self) -> Result<ActionSuccess, ActionFailure> {
        match self {
            ActionResult::Succeeded(success) => Ok(success),
            ActionResult::Failed(failure) => Err(failure),
        }
    }
}

impl From<Result<ActionSuccess, ActionFailure>> for ActionResult {
    fn from(value: Result<ActionSuccess, ActionFailure>) -> Self {
        match value {
            Ok(success) => ActionResult::Succeeded(success),
            Err(failure) => ActionResult::Failed(failure),
        }
    }
}
