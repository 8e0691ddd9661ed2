// CONTROLLER: Input, entity behaviour and the update loop
pub mod animation;
pub mod character_controller;
pub mod frame_loop;
pub mod input;
pub mod seats;
pub mod vehicle_controller;

use crate::model::SeatPoses;
use crate::physics::PhysicsWorld;

pub use animation::{AnimationProvider, ClipTable};
pub use frame_loop::{FrameReport, SimulationWorld, WorldCommand};
pub use input::{InputEvent, InputFocus, InputReceiver, InputRouter, MouseButton};
pub use seats::{SeatGrant, SeatRelease, WorldRequest};

/// What an entity may touch while it updates. Anything that crosses entity
/// boundaries goes through `requests` and is applied after all updates.
pub struct UpdateContext<'a> {
    pub physics: &'a mut PhysicsWorld,
    pub seat_poses: &'a SeatPoses,
    pub animations: &'a dyn AnimationProvider,
    pub requests: &'a mut Vec<WorldRequest>,
}
