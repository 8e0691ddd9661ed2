use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityKind};
use super::state::CharacterStateId;
use super::vehicle::{SeatRef, VehicleKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CharacterStateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<SeatRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_kind: Option<VehicleKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
