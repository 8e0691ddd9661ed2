use std::fmt;

use glam::{Quat, Vec3};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude::*;

use crate::error::PhysicsError;

/// Handle to a body in a [`PhysicsWorld`](super::PhysicsWorld).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) RigidBodyHandle);

impl BodyHandle {
    pub fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self(RigidBodyHandle::from_raw_parts(index, generation))
    }

    pub fn index(self) -> u32 {
        self.0.into_raw_parts().0
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, generation) = self.0.into_raw_parts();
        write!(f, "body#{index}v{generation}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    /// Vertical capsule: a segment of `2 * half_height` capped by hemispheres.
    Capsule { radius: f32, half_height: f32 },
    Cuboid { half_extents: Vec3 },
    Compound(Vec<ShapePart>),
}

/// A primitive placed at an offset inside a compound shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapePart {
    pub offset: Vec3,
    pub shape: Shape,
}

impl ShapePart {
    pub fn new(offset: Vec3, shape: Shape) -> Self {
        Self { offset, shape }
    }
}

impl Shape {
    pub fn validate(&self) -> Result<(), PhysicsError> {
        match self {
            Shape::Sphere { radius } if !(*radius > 0.0) => Err(PhysicsError::InvalidShape("sphere radius must be positive")),
            Shape::Capsule { radius, half_height } if !(*radius > 0.0 && *half_height >= 0.0) => {
                Err(PhysicsError::InvalidShape("capsule needs a positive radius"))
            }
            Shape::Cuboid { half_extents } if half_extents.min_element() <= 0.0 || !half_extents.is_finite() => {
                Err(PhysicsError::InvalidShape("cuboid half extents must be positive"))
            }
            Shape::Compound(parts) => {
                if parts.is_empty() {
                    return Err(PhysicsError::InvalidShape("compound shape has no parts"));
                }
                for part in parts {
                    if matches!(part.shape, Shape::Compound(_)) {
                        return Err(PhysicsError::InvalidShape("compound shapes cannot nest"));
                    }
                    part.shape.validate()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn to_shared(&self) -> SharedShape {
        match self {
            Shape::Sphere { radius } => SharedShape::ball(*radius),
            Shape::Capsule { radius, half_height } => SharedShape::capsule_y(*half_height, *radius),
            Shape::Cuboid { half_extents } => SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z),
            Shape::Compound(parts) => SharedShape::compound(
                parts
                    .iter()
                    .map(|p| (Isometry::translation(p.offset.x, p.offset.y, p.offset.z), p.shape.to_shared()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub shape: Shape,
    pub mass: f32,
    pub position: Vec3,
    pub rotation: Quat,
    /// Rotation is driven externally and never integrated.
    pub fixed_rotation: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub friction: f32,
}

impl BodyDesc {
    pub fn new(shape: Shape, mass: f32) -> Self {
        Self {
            shape,
            mass,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fixed_rotation: false,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            friction: 0.6,
        }
    }

    pub fn at(mut self, position: Vec3, rotation: Quat) -> Self {
        self.position = position;
        self.rotation = rotation;
        self
    }

    pub fn fixed_rotation(mut self) -> Self {
        self.fixed_rotation = true;
        self
    }

    pub fn damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub(crate) fn build(&self) -> Result<(RigidBody, Collider), PhysicsError> {
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(PhysicsError::InvalidMass(self.mass));
        }
        self.shape.validate()?;

        let mut body = RigidBodyBuilder::dynamic()
            .translation(to_vector(self.position))
            .linear_damping(self.linear_damping)
            .angular_damping(self.angular_damping)
            .gravity_scale(self.gravity_scale)
            .can_sleep(false)
            .build();
        body.set_rotation(to_rotation(self.rotation), false);
        if self.fixed_rotation {
            body.lock_rotations(true, false);
        }

        // Frictionless wins so characters slide along whatever they touch.
        let collider = ColliderBuilder::new(self.shape.to_shared())
            .mass(self.mass)
            .friction(self.friction)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .build();
        Ok((body, collider))
    }
}

/// Read-only copy of a body's state after the last step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub center_of_mass: Vec3,
    mass: f32,
    enabled: bool,
}

impl BodyState {
    pub(crate) fn of(body: &RigidBody) -> Self {
        Self {
            position: from_vector(body.translation()),
            rotation: from_rotation(body.rotation()),
            linear_velocity: from_vector(body.linvel()),
            angular_velocity: from_vector(body.angvel()),
            center_of_mass: from_point(body.center_of_mass()),
            mass: body.mass(),
            enabled: body.is_enabled(),
        }
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn velocity_at_point(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.center_of_mass)
    }
}

pub(crate) fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

pub(crate) fn to_point(v: Vec3) -> Point<Real> {
    point![v.x, v.y, v.z]
}

pub(crate) fn to_rotation(q: Quat) -> UnitQuaternion<Real> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

pub(crate) fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub(crate) fn from_point(p: &Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

pub(crate) fn from_rotation(q: &UnitQuaternion<Real>) -> Quat {
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_shapes_and_mass() {
        assert!(BodyDesc::new(Shape::Sphere { radius: 0.0 }, 1.0).build().is_err());
        assert_eq!(
            BodyDesc::new(Shape::Sphere { radius: 1.0 }, 0.0).build().err(),
            Some(PhysicsError::InvalidMass(0.0))
        );
        assert!(BodyDesc::new(Shape::Compound(vec![]), 1.0).build().is_err());
        let nested = Shape::Compound(vec![ShapePart::new(
            Vec3::ZERO,
            Shape::Compound(vec![ShapePart::new(Vec3::ZERO, Shape::Sphere { radius: 1.0 })]),
        )]);
        assert!(nested.validate().is_err());
    }

    #[test]
    fn rotation_conversion_keeps_orientation() {
        let q = Quat::from_rotation_y(0.7) * Quat::from_rotation_x(-0.3);
        let back = from_rotation(&to_rotation(q));
        assert!(back.dot(q).abs() > 0.9999);
        let v = Vec3::new(1.0, 2.0, 3.0);
        let rotated = to_rotation(q) * to_vector(v);
        assert!(from_vector(&rotated).distance(q * v) < 1e-5);
    }

    #[test]
    fn compound_keeps_every_part() {
        let shape = Shape::Compound(vec![
            ShapePart::new(Vec3::ZERO, Shape::Cuboid { half_extents: Vec3::new(1.0, 0.5, 0.5) }),
            ShapePart::new(Vec3::new(0.0, -1.0, 0.0), Shape::Sphere { radius: 0.25 }),
        ]);
        let shared = shape.to_shared();
        let compound = shared.as_compound().unwrap();
        assert_eq!(compound.shapes().len(), 2);
        assert!((compound.shapes()[1].0.translation.y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn fixed_rotation_locks_the_body() {
        let desc = BodyDesc::new(Shape::Capsule { radius: 0.25, half_height: 0.25 }, 1.0).fixed_rotation();
        let (body, _) = desc.build().unwrap();
        assert!(body.locked_axes().contains(LockedAxes::ROTATION_LOCKED));
    }

    #[test]
    fn velocity_at_point_adds_spin() {
        let state = BodyState {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::X,
            angular_velocity: Vec3::Y,
            center_of_mass: Vec3::ZERO,
            mass: 1.0,
            enabled: true,
        };
        let v = state.velocity_at_point(Vec3::Z);
        assert!(v.distance(Vec3::new(2.0, 0.0, 0.0)) < 1e-6);
    }
}
