// Character states and the transition graph between them.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::vehicle::SeatRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterStateId {
    Idle,
    StartWalkLeft,
    StartWalkRight,
    StartWalkBackLeft,
    StartWalkBackRight,
    Walk,
    Sprint,
    EndWalk,
    JumpIdle,
    JumpRunning,
    Falling,
    DropIdle,
    DropRunning,
    DropRolling,
    OpenVehicleDoor,
    EnteringVehicle,
    CloseVehicleDoorInside,
    Driving,
    Sitting,
    SwitchingSeats,
    ExitingVehicle,
    ExitingAirplane,
    CloseVehicleDoorOutside,
}

use CharacterStateId as Id;

const START_WALKS: [Id; 4] = [Id::StartWalkLeft, Id::StartWalkRight, Id::StartWalkBackLeft, Id::StartWalkBackRight];

impl CharacterStateId {
    pub const ALL: [CharacterStateId; 23] = [
        Id::Idle,
        Id::StartWalkLeft,
        Id::StartWalkRight,
        Id::StartWalkBackLeft,
        Id::StartWalkBackRight,
        Id::Walk,
        Id::Sprint,
        Id::EndWalk,
        Id::JumpIdle,
        Id::JumpRunning,
        Id::Falling,
        Id::DropIdle,
        Id::DropRunning,
        Id::DropRolling,
        Id::OpenVehicleDoor,
        Id::EnteringVehicle,
        Id::CloseVehicleDoorInside,
        Id::Driving,
        Id::Sitting,
        Id::SwitchingSeats,
        Id::ExitingVehicle,
        Id::ExitingAirplane,
        Id::CloseVehicleDoorOutside,
    ];

    /// States reachable from `self` through a regular transition.
    pub fn successors(self) -> &'static [CharacterStateId] {
        match self {
            Id::Idle => &[
                Id::StartWalkLeft,
                Id::StartWalkRight,
                Id::StartWalkBackLeft,
                Id::StartWalkBackRight,
                Id::Walk,
                Id::Sprint,
                Id::JumpIdle,
                Id::Falling,
                Id::OpenVehicleDoor,
                Id::EnteringVehicle,
            ],
            Id::StartWalkLeft | Id::StartWalkRight | Id::StartWalkBackLeft | Id::StartWalkBackRight => &[
                Id::Idle,
                Id::Walk,
                Id::Sprint,
                Id::EndWalk,
                Id::JumpRunning,
                Id::Falling,
                Id::OpenVehicleDoor,
                Id::EnteringVehicle,
            ],
            Id::Walk => &[
                Id::Sprint,
                Id::EndWalk,
                Id::JumpRunning,
                Id::Falling,
                Id::OpenVehicleDoor,
                Id::EnteringVehicle,
            ],
            Id::Sprint => &[
                Id::Walk,
                Id::EndWalk,
                Id::JumpRunning,
                Id::Falling,
                Id::OpenVehicleDoor,
                Id::EnteringVehicle,
            ],
            Id::EndWalk | Id::DropIdle => &[
                Id::Idle,
                Id::StartWalkLeft,
                Id::StartWalkRight,
                Id::StartWalkBackLeft,
                Id::StartWalkBackRight,
                Id::Walk,
                Id::Sprint,
                Id::JumpIdle,
                Id::Falling,
                Id::OpenVehicleDoor,
                Id::EnteringVehicle,
            ],
            Id::JumpIdle | Id::JumpRunning | Id::Falling => &[
                Id::Falling,
                Id::Idle,
                Id::Walk,
                Id::Sprint,
                Id::DropIdle,
                Id::DropRunning,
                Id::DropRolling,
            ],
            Id::DropRunning => &[Id::Walk, Id::Sprint, Id::EndWalk, Id::JumpRunning, Id::Falling],
            Id::DropRolling => &[Id::Walk, Id::EndWalk, Id::Falling],
            Id::OpenVehicleDoor => &[Id::EnteringVehicle, Id::Idle],
            Id::EnteringVehicle => &[Id::CloseVehicleDoorInside, Id::Driving, Id::Sitting, Id::Idle],
            Id::CloseVehicleDoorInside => &[Id::Driving, Id::Sitting],
            Id::Driving | Id::Sitting => &[Id::SwitchingSeats, Id::ExitingVehicle, Id::ExitingAirplane],
            Id::SwitchingSeats => &[Id::Driving, Id::Sitting],
            Id::ExitingVehicle => &[Id::CloseVehicleDoorOutside, Id::Idle, Id::Falling],
            Id::ExitingAirplane => &[Id::Falling, Id::Idle],
            Id::CloseVehicleDoorOutside => &[Id::Idle, Id::Falling],
        }
    }

    pub fn can_transition_to(self, next: CharacterStateId) -> bool {
        self.successors().contains(&next)
    }

    /// Animation clip played while in this state.
    pub fn animation(self) -> &'static str {
        match self {
            Id::Idle => "idle",
            Id::StartWalkLeft => "start_left",
            Id::StartWalkRight => "start_right",
            Id::StartWalkBackLeft => "start_back_left",
            Id::StartWalkBackRight => "start_back_right",
            Id::Walk => "walk",
            Id::Sprint => "sprint",
            Id::EndWalk => "stop",
            Id::JumpIdle => "jump_idle",
            Id::JumpRunning => "jump_running",
            Id::Falling => "falling",
            Id::DropIdle => "drop_idle",
            Id::DropRunning => "drop_running",
            Id::DropRolling => "drop_running_roll",
            Id::OpenVehicleDoor => "open_door",
            Id::EnteringVehicle => "sit_down",
            Id::CloseVehicleDoorInside => "close_door_sitting",
            Id::Driving => "driving",
            Id::Sitting => "sitting",
            Id::SwitchingSeats => "switch_seats",
            Id::ExitingVehicle => "stand_up",
            Id::ExitingAirplane => "jump_out",
            Id::CloseVehicleDoorOutside => "close_door_standing",
        }
    }

    /// Grounded on-foot states; losing ground contact in one of these falls.
    pub fn needs_ground(self) -> bool {
        matches!(
            self,
            Id::Idle | Id::Walk | Id::Sprint | Id::EndWalk | Id::DropIdle | Id::DropRunning | Id::DropRolling | Id::CloseVehicleDoorOutside
        ) || START_WALKS.contains(&self)
    }

    pub fn can_enter_vehicles(self) -> bool {
        matches!(self, Id::Idle | Id::Walk | Id::Sprint | Id::EndWalk | Id::DropIdle) || START_WALKS.contains(&self)
    }

    /// States during which the body is switched off and the pose follows a seat.
    pub fn is_in_vehicle(self) -> bool {
        matches!(
            self,
            Id::EnteringVehicle | Id::CloseVehicleDoorInside | Id::Driving | Id::Sitting | Id::SwitchingSeats
        )
    }

    pub fn is_airborne(self) -> bool {
        matches!(self, Id::JumpIdle | Id::JumpRunning | Id::Falling | Id::ExitingAirplane)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartDirection {
    Left,
    Right,
    BackLeft,
    BackRight,
}

impl StartDirection {
    /// Pick a start variant from the signed angle between facing and the
    /// desired direction (positive turns right). `None` means close enough
    /// to walk straight off.
    pub fn from_angle(angle: f32) -> Option<Self> {
        use std::f32::consts::FRAC_PI_4;
        let magnitude = angle.abs();
        if magnitude < FRAC_PI_4 {
            None
        } else if magnitude < 3.0 * FRAC_PI_4 {
            Some(if angle > 0.0 { Self::Right } else { Self::Left })
        } else {
            Some(if angle > 0.0 { Self::BackRight } else { Self::BackLeft })
        }
    }

    pub fn id(self) -> CharacterStateId {
        match self {
            Self::Left => Id::StartWalkLeft,
            Self::Right => Id::StartWalkRight,
            Self::BackLeft => Id::StartWalkBackLeft,
            Self::BackRight => Id::StartWalkBackRight,
        }
    }
}

/// Pose captured when a seat was granted, used to blend into the seat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryAnchor {
    pub position: Vec3,
    pub yaw: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CharacterState {
    #[default]
    Idle,
    StartWalk { direction: StartDirection, timer: f32 },
    Walk,
    Sprint,
    EndWalk { timer: f32 },
    JumpIdle { timer: f32, jumped: bool },
    JumpRunning { timer: f32, jumped: bool },
    Falling,
    DropIdle { timer: f32 },
    DropRunning { timer: f32 },
    DropRolling { timer: f32 },
    OpenVehicleDoor { seat: SeatRef, timer: f32, anchor: EntryAnchor },
    EnteringVehicle { seat: SeatRef, timer: f32, anchor: EntryAnchor },
    CloseVehicleDoorInside { seat: SeatRef, timer: f32 },
    Driving { seat: SeatRef },
    Sitting { seat: SeatRef },
    SwitchingSeats { from: SeatRef, to: SeatRef, timer: f32 },
    ExitingVehicle { seat: SeatRef, timer: f32 },
    ExitingAirplane { seat: SeatRef, timer: f32 },
    CloseVehicleDoorOutside { seat: SeatRef, timer: f32 },
    /// Ghost driven by remote snapshots; shows the remote state, runs no logic.
    Replicated { id: CharacterStateId },
}

impl CharacterState {
    pub fn id(&self) -> CharacterStateId {
        match self {
            CharacterState::Idle => Id::Idle,
            CharacterState::StartWalk { direction, .. } => direction.id(),
            CharacterState::Walk => Id::Walk,
            CharacterState::Sprint => Id::Sprint,
            CharacterState::EndWalk { .. } => Id::EndWalk,
            CharacterState::JumpIdle { .. } => Id::JumpIdle,
            CharacterState::JumpRunning { .. } => Id::JumpRunning,
            CharacterState::Falling => Id::Falling,
            CharacterState::DropIdle { .. } => Id::DropIdle,
            CharacterState::DropRunning { .. } => Id::DropRunning,
            CharacterState::DropRolling { .. } => Id::DropRolling,
            CharacterState::OpenVehicleDoor { .. } => Id::OpenVehicleDoor,
            CharacterState::EnteringVehicle { .. } => Id::EnteringVehicle,
            CharacterState::CloseVehicleDoorInside { .. } => Id::CloseVehicleDoorInside,
            CharacterState::Driving { .. } => Id::Driving,
            CharacterState::Sitting { .. } => Id::Sitting,
            CharacterState::SwitchingSeats { .. } => Id::SwitchingSeats,
            CharacterState::ExitingVehicle { .. } => Id::ExitingVehicle,
            CharacterState::ExitingAirplane { .. } => Id::ExitingAirplane,
            CharacterState::CloseVehicleDoorOutside { .. } => Id::CloseVehicleDoorOutside,
            CharacterState::Replicated { id } => *id,
        }
    }

    pub fn start_walk(direction: StartDirection) -> Self {
        CharacterState::StartWalk { direction, timer: 0.0 }
    }

    pub fn jump_idle() -> Self {
        CharacterState::JumpIdle { timer: 0.0, jumped: false }
    }

    pub fn jump_running() -> Self {
        CharacterState::JumpRunning { timer: 0.0, jumped: false }
    }

    /// Build the data-free variant for `id`; seat-bound states return `None`.
    pub fn on_foot(id: CharacterStateId) -> Option<Self> {
        Some(match id {
            Id::Idle => CharacterState::Idle,
            Id::StartWalkLeft => Self::start_walk(StartDirection::Left),
            Id::StartWalkRight => Self::start_walk(StartDirection::Right),
            Id::StartWalkBackLeft => Self::start_walk(StartDirection::BackLeft),
            Id::StartWalkBackRight => Self::start_walk(StartDirection::BackRight),
            Id::Walk => CharacterState::Walk,
            Id::Sprint => CharacterState::Sprint,
            Id::EndWalk => CharacterState::EndWalk { timer: 0.0 },
            Id::JumpIdle => Self::jump_idle(),
            Id::JumpRunning => Self::jump_running(),
            Id::Falling => CharacterState::Falling,
            Id::DropIdle => CharacterState::DropIdle { timer: 0.0 },
            Id::DropRunning => CharacterState::DropRunning { timer: 0.0 },
            Id::DropRolling => CharacterState::DropRolling { timer: 0.0 },
            _ => return None,
        })
    }

    pub fn timer(&self) -> Option<f32> {
        match self {
            CharacterState::StartWalk { timer, .. }
            | CharacterState::EndWalk { timer }
            | CharacterState::JumpIdle { timer, .. }
            | CharacterState::JumpRunning { timer, .. }
            | CharacterState::DropIdle { timer }
            | CharacterState::DropRunning { timer }
            | CharacterState::DropRolling { timer }
            | CharacterState::OpenVehicleDoor { timer, .. }
            | CharacterState::EnteringVehicle { timer, .. }
            | CharacterState::CloseVehicleDoorInside { timer, .. }
            | CharacterState::SwitchingSeats { timer, .. }
            | CharacterState::ExitingVehicle { timer, .. }
            | CharacterState::ExitingAirplane { timer, .. }
            | CharacterState::CloseVehicleDoorOutside { timer, .. } => Some(*timer),
            _ => None,
        }
    }

    pub fn timer_mut(&mut self) -> Option<&mut f32> {
        match self {
            CharacterState::StartWalk { timer, .. }
            | CharacterState::EndWalk { timer }
            | CharacterState::JumpIdle { timer, .. }
            | CharacterState::JumpRunning { timer, .. }
            | CharacterState::DropIdle { timer }
            | CharacterState::DropRunning { timer }
            | CharacterState::DropRolling { timer }
            | CharacterState::OpenVehicleDoor { timer, .. }
            | CharacterState::EnteringVehicle { timer, .. }
            | CharacterState::CloseVehicleDoorInside { timer, .. }
            | CharacterState::SwitchingSeats { timer, .. }
            | CharacterState::ExitingVehicle { timer, .. }
            | CharacterState::ExitingAirplane { timer, .. }
            | CharacterState::CloseVehicleDoorOutside { timer, .. } => Some(timer),
            _ => None,
        }
    }

    /// Seat this state is bound to, if any.
    pub fn seat(&self) -> Option<SeatRef> {
        match self {
            CharacterState::OpenVehicleDoor { seat, .. }
            | CharacterState::EnteringVehicle { seat, .. }
            | CharacterState::CloseVehicleDoorInside { seat, .. }
            | CharacterState::Driving { seat }
            | CharacterState::Sitting { seat }
            | CharacterState::ExitingVehicle { seat, .. }
            | CharacterState::ExitingAirplane { seat, .. }
            | CharacterState::CloseVehicleDoorOutside { seat, .. } => Some(*seat),
            CharacterState::SwitchingSeats { to, .. } => Some(*to),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn every_state_has_an_exit_and_an_entry() {
        for id in CharacterStateId::ALL {
            assert!(!id.successors().is_empty(), "{id:?} is a dead end");
            let reachable = CharacterStateId::ALL.iter().any(|from| from.can_transition_to(id));
            assert!(reachable || id == Id::Idle, "{id:?} is unreachable");
        }
    }

    #[test]
    fn grounded_states_can_fall() {
        for id in CharacterStateId::ALL.into_iter().filter(|id| id.needs_ground()) {
            assert!(id.can_transition_to(Id::Falling), "{id:?} cannot fall");
        }
    }

    #[test]
    fn vehicle_states_cannot_start_walking() {
        assert!(!Id::Driving.can_transition_to(Id::Walk));
        assert!(!Id::Sitting.can_transition_to(Id::Idle));
        assert!(Id::Driving.can_transition_to(Id::ExitingVehicle));
    }

    #[test]
    fn start_direction_from_angle() {
        assert_eq!(StartDirection::from_angle(0.2), None);
        assert_eq!(StartDirection::from_angle(PI / 2.0), Some(StartDirection::Right));
        assert_eq!(StartDirection::from_angle(-PI / 2.0), Some(StartDirection::Left));
        assert_eq!(StartDirection::from_angle(PI), Some(StartDirection::BackRight));
        assert_eq!(StartDirection::from_angle(-2.8), Some(StartDirection::BackLeft));
    }

    #[test]
    fn on_foot_round_trips_ids() {
        for id in CharacterStateId::ALL {
            if let Some(state) = CharacterState::on_foot(id) {
                assert_eq!(state.id(), id);
            }
        }
        assert!(CharacterState::on_foot(Id::Driving).is_none());
    }

    #[test]
    fn timers_advance_in_place() {
        let mut state = CharacterState::jump_idle();
        *state.timer_mut().unwrap() += 0.5;
        assert_eq!(state.timer(), Some(0.5));
        assert_eq!(CharacterState::Walk.timer(), None);
    }
}
