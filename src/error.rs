use crate::model::{CharacterStateId, EntityId};

/// Why a seat request (enter, switch or release) was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeatDenied {
    #[error("seat {seat} of vehicle {vehicle} is already occupied by {occupant}")]
    SeatOccupied {
        vehicle: EntityId,
        seat: usize,
        occupant: EntityId,
    },

    #[error("character is {distance:.2}m from the entry point, interaction range is {range:.2}m")]
    OutOfInteractionRange { distance: f32, range: f32 },

    #[error("character {0} already occupies a seat")]
    AlreadySeated(EntityId),

    #[error("character {0} is not seated")]
    NotSeated(EntityId),

    #[error("no vehicle with id {0}")]
    UnknownVehicle(EntityId),

    #[error("vehicle {vehicle} has no seat {seat}")]
    UnknownSeat { vehicle: EntityId, seat: usize },

    #[error("no character with id {0}")]
    UnknownCharacter(EntityId),

    #[error("character cannot interact with vehicles while in {0:?}")]
    Unavailable(CharacterStateId),
}

/// Physics-world failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    #[error("invalid collision shape: {0}")]
    InvalidShape(&'static str),

    #[error("body mass must be finite and positive, got {0}")]
    InvalidMass(f32),

    #[error("unknown body handle {0}")]
    UnknownBody(u32),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Fatal or defensive simulation errors.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("entity {0} has no physics body")]
    MissingPhysicsBody(EntityId),

    #[error("no entity with id {0}")]
    UnknownEntity(EntityId),

    #[error("invalid state transition {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: CharacterStateId,
        to: CharacterStateId,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

pub type SimResult<T> = Result<T, SimError>;
