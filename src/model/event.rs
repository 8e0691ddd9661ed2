use super::entity::{EntityId, EntityKind};
use super::state::CharacterStateId;
use super::vehicle::SeatRef;
use crate::controller::input::InputFocus;
use crate::error::SeatDenied;

/// Observable things that happened during a tick, drained by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Spawned { entity: EntityId, kind: EntityKind },
    Despawned { entity: EntityId },
    StateChanged { entity: EntityId, from: CharacterStateId, to: CharacterStateId },
    TransitionRejected { entity: EntityId, from: CharacterStateId, to: CharacterStateId },
    AnimationRequested { entity: EntityId, clip: String, fade: f32 },
    SeatGranted { character: EntityId, seat: SeatRef },
    SeatDenied { character: EntityId, reason: SeatDenied },
    SeatReleased { character: EntityId, seat: SeatRef },
    DoorChanged { seat: SeatRef, open: bool },
    FocusChanged { from: InputFocus, to: InputFocus },
}
