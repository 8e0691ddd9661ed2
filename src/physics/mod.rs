// PHYSICS: rapier3d bodies for characters and vehicles, plus the previous
// transforms renderers interpolate from.

pub mod body;
pub mod world;

pub use body::{BodyDesc, BodyHandle, BodyState, Shape, ShapePart};
pub use world::{PhysicsWorld, RayHit, StaticCollider};
