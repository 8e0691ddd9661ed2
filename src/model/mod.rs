// MODEL: Simulation state and data
pub mod character;
pub mod entity;
pub mod event;
pub mod scene;
pub mod snapshot;
pub mod spring;
pub mod state;
pub mod vehicle;

pub use character::{Character, GroundContact};
pub use entity::{EntityId, EntityKind, Updatable};
pub use event::SimEvent;
pub use scene::{Removed, Scene};
pub use snapshot::{EntitySnapshot, WorldSnapshot};
pub use spring::{RelativeSpringSimulator, SpringParams, SpringSimulator, VectorSpringSimulator};
pub use state::{CharacterState, CharacterStateId, StartDirection};
pub use vehicle::{Seat, SeatPose, SeatPoses, SeatRef, SeatRole, Vehicle, VehicleBlueprint, VehicleControls, VehicleKind, Wheel};
