use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ReconcileError;

/// Order identifier (`ord_xxx`), generator-assigned and opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Result<Self, ReconcileError> {
        let id = id.into();
        if !id.starts_with("ord_") {
            return Err(ReconcileError::Validation(format!(
                "OrderId must start with ord_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(format!("ord_{}", Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// User identifier (`usr_xxx`). Users are owned elsewhere; we only validate
/// the shape so a forged callback can't smuggle arbitrary keys into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, ReconcileError> {
        let id = id.into();
        if !id.starts_with("usr_") {
            return Err(ReconcileError::Validation(format!(
                "UserId must start with usr_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}
