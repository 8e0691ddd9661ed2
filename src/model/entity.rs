use std::fmt;

use serde::{Deserialize, Serialize};

use crate::controller::UpdateContext;
use crate::error::SimResult;

/// Identifier of a simulated entity; allocated by the registry, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Vehicle,
}

/// Anything the orchestrator advances once per fixed step.
pub trait Updatable {
    fn id(&self) -> EntityId;

    fn update(&mut self, ctx: &mut UpdateContext<'_>, dt: f32) -> SimResult<()>;
}
