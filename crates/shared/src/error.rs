use serde::{Deserialize, Serialize};

pub const EXECUTION_REVERTED: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn reverted(message: impl Into<String>) -> Self {
        Self::new(EXECUTION_REVERTED, message)
    }

    pub fn is_revert(&self) -> bool {
        self.code == EXECUTION_REVERTED || self.message.to_ascii_lowercase().contains("revert")
    }
}
