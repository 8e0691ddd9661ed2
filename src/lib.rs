// Character and vehicle simulation core
pub mod config;
pub mod error;
pub mod logging;
pub mod physics;
pub mod utils;

// MVC Architecture, minus the view: presentation belongs to the host
pub mod model;
pub mod controller;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use config::SimConfig;
pub use controller::{
    AnimationProvider, ClipTable, FrameReport, InputEvent, InputFocus, InputReceiver, MouseButton, SeatGrant,
    SeatRelease, SimulationWorld, WorldCommand,
};
pub use error::{ConfigError, PhysicsError, SeatDenied, SimError, SimResult};
pub use model::{
    CharacterState, CharacterStateId, EntityId, EntityKind, EntitySnapshot, SeatRef, SeatRole, SimEvent,
    VehicleKind, WorldSnapshot,
};
