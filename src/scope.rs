//! Caller scope supplied by the external authorization layer
//!
//! The engine never authenticates anyone. It receives an already-decided
//! scope and only checks client membership against it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{FatigueError, Result};
use crate::models::{ClientId, TrainerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    /// Sees every client
    Admin,
    /// Sees only the listed clients
    Trainer {
        trainer_id: TrainerId,
        allowed_client_ids: BTreeSet<ClientId>,
    },
}

impl AccessScope {
    pub fn trainer(trainer_id: TrainerId, clients: impl IntoIterator<Item = ClientId>) -> Self {
        AccessScope::Trainer {
            trainer_id,
            allowed_client_ids: clients.into_iter().collect(),
        }
    }

    pub fn permits(&self, client_id: ClientId) -> bool {
        match self {
            AccessScope::Admin => true,
            AccessScope::Trainer {
                allowed_client_ids, ..
            } => allowed_client_ids.contains(&client_id),
        }
    }

    /// Fail with [`FatigueError::ScopeViolation`] unless the client is in scope
    pub fn check(&self, client_id: ClientId) -> Result<()> {
        if self.permits(client_id) {
            Ok(())
        } else {
            Err(FatigueError::ScopeViolation { client_id })
        }
    }

    pub fn trainer_id(&self) -> Option<TrainerId> {
        match self {
            AccessScope::Admin => None,
            AccessScope::Trainer { trainer_id, .. } => Some(*trainer_id),
        }
    }
}
