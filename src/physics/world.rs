use std::collections::HashMap;

use glam::{Quat, Vec3};
use rapier3d::na::Unit;
use rapier3d::prelude::*;
use tracing::{debug, trace};

use super::body::{from_point, from_vector, to_point, to_rotation, to_vector, BodyDesc, BodyHandle, BodyState};
use crate::error::PhysicsError;

/// Immovable level geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticCollider {
    /// Points with `normal . p < distance` are inside.
    Plane { normal: Vec3, distance: f32 },
    Cuboid { center: Vec3, half_extents: Vec3 },
}

impl StaticCollider {
    pub fn ground(height: f32) -> Self {
        StaticCollider::Plane {
            normal: Vec3::Y,
            distance: height,
        }
    }

    fn build(&self) -> Collider {
        match self {
            StaticCollider::Plane { normal, distance } => {
                let normal = normal.normalize_or_zero();
                let anchor = normal * *distance;
                ColliderBuilder::halfspace(Unit::new_normalize(to_vector(normal)))
                    .translation(to_vector(anchor))
                    .build()
            }
            StaticCollider::Cuboid { center, half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
                    .translation(to_vector(*center))
                    .build()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    /// `None` when the ray hit static geometry.
    pub body: Option<BodyHandle>,
}

/// Owner of the rapier pipeline and every body in it; stepped at a fixed
/// rate by the orchestrator.
pub struct PhysicsWorld {
    pub gravity: Vec3,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    /// Transforms before the last step, for render interpolation.
    previous: HashMap<RigidBodyHandle, (Vec3, Quat)>,
}

impl PhysicsWorld {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            previous: HashMap::new(),
        }
    }

    pub fn add_body(&mut self, desc: BodyDesc) -> Result<BodyHandle, PhysicsError> {
        let (body, collider) = desc.build()?;
        let handle = self.bodies.insert(body);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.previous.insert(handle, (desc.position, desc.rotation.normalize()));
        self.query_pipeline.update(&self.colliders);
        let handle = BodyHandle(handle);
        debug!(%handle, "added rigid body");
        Ok(handle)
    }

    /// Remove a body and its collider. Returns whether it existed.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.previous.remove(&handle.0);
        let removed = self
            .bodies
            .remove(
                handle.0,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some();
        if removed {
            self.query_pipeline.update(&self.colliders);
        }
        removed
    }

    pub fn add_static(&mut self, collider: StaticCollider) {
        self.colliders.insert(collider.build());
        self.query_pipeline.update(&self.colliders);
    }

    pub fn body(&self, handle: BodyHandle) -> Option<BodyState> {
        self.bodies.get(handle.0).map(BodyState::of)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn rigid_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody, PhysicsError> {
        self.bodies.get_mut(handle.0).ok_or(PhysicsError::UnknownBody(handle.index()))
    }

    /// Disabled bodies are neither simulated nor hit by rays.
    pub fn set_enabled(&mut self, handle: BodyHandle, enabled: bool) -> Result<(), PhysicsError> {
        let body = self.rigid_mut(handle)?;
        body.set_enabled(enabled);
        if !enabled {
            body.set_linvel(Vector::zeros(), false);
            body.set_angvel(Vector::zeros(), false);
        }
        Ok(())
    }

    /// Forces last for the next step only.
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec3) -> Result<(), PhysicsError> {
        self.rigid_mut(handle)?.add_force(to_vector(force), true);
        Ok(())
    }

    pub fn apply_force_at_point(&mut self, handle: BodyHandle, force: Vec3, point: Vec3) -> Result<(), PhysicsError> {
        self.rigid_mut(handle)?.add_force_at_point(to_vector(force), to_point(point), true);
        Ok(())
    }

    pub fn apply_torque(&mut self, handle: BodyHandle, torque: Vec3) -> Result<(), PhysicsError> {
        self.rigid_mut(handle)?.add_torque(to_vector(torque), true);
        Ok(())
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) -> Result<(), PhysicsError> {
        self.rigid_mut(handle)?.set_linvel(to_vector(velocity), true);
        Ok(())
    }

    /// Move the body as part of regular motion; interpolation still blends from
    /// the previous step.
    pub fn set_pose(&mut self, handle: BodyHandle, position: Vec3, rotation: Quat) -> Result<(), PhysicsError> {
        let body = self.rigid_mut(handle)?;
        body.set_translation(to_vector(position), true);
        body.set_rotation(to_rotation(rotation.normalize()), true);
        Ok(())
    }

    /// Place the body without sweeping; interpolation restarts from here.
    pub fn teleport(&mut self, handle: BodyHandle, position: Vec3, rotation: Quat) -> Result<(), PhysicsError> {
        let rotation = rotation.normalize();
        let body = self.rigid_mut(handle)?;
        body.set_translation(to_vector(position), true);
        body.set_rotation(to_rotation(rotation), true);
        self.previous.insert(handle.0, (position, rotation));
        Ok(())
    }

    /// Transform blended between the previous and current step.
    pub fn interpolated_transform(&self, handle: BodyHandle, alpha: f32) -> Option<(Vec3, Quat)> {
        let current = BodyState::of(self.bodies.get(handle.0)?);
        let (prev_position, prev_rotation) = self
            .previous
            .get(&handle.0)
            .copied()
            .unwrap_or((current.position, current.rotation));
        let alpha = alpha.clamp(0.0, 1.0);
        Some((
            prev_position.lerp(current.position, alpha),
            prev_rotation.slerp(current.rotation, alpha),
        ))
    }

    /// Advance every enabled body by `dt`.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        for (handle, body) in self.bodies.iter() {
            let state = BodyState::of(body);
            self.previous.insert(handle, (state.position, state.rotation));
        }

        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &to_vector(self.gravity),
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        // rapier keeps user forces until reset.
        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);
        }
    }

    /// Closest hit along `direction` within `max_distance`, skipping `exclude`.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, exclude: Option<BodyHandle>) -> Option<RayHit> {
        let dir = direction.try_normalize()?;
        let ray = Ray::new(to_point(origin), to_vector(dir));
        let bodies = &self.bodies;
        let enabled = |_: ColliderHandle, collider: &Collider| {
            collider.parent().and_then(|parent| bodies.get(parent)).map_or(true, |b| b.is_enabled())
        };
        let mut filter = QueryFilter::default().predicate(&enabled);
        if let Some(exclude) = exclude {
            filter = filter.exclude_rigid_body(exclude.0);
        }

        let (collider, hit) =
            self.query_pipeline
                .cast_ray_and_get_normal(&self.bodies, &self.colliders, &ray, max_distance, true, filter)?;
        let hit = RayHit {
            point: from_point(&ray.point_at(hit.time_of_impact)),
            normal: from_vector(&hit.normal),
            distance: hit.time_of_impact,
            body: self.colliders.get(collider).and_then(Collider::parent).map(BodyHandle),
        };
        trace!(distance = hit.distance, body = ?hit.body, "raycast hit");
        Some(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Shape, ShapePart};

    const DT: f32 = 1.0 / 60.0;

    fn world_with_ground() -> PhysicsWorld {
        let mut world = PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0));
        world.add_static(StaticCollider::ground(0.0));
        world
    }

    #[test]
    fn box_comes_to_rest_on_ground() {
        let mut world = world_with_ground();
        let desc = BodyDesc::new(Shape::Cuboid { half_extents: Vec3::new(1.0, 0.5, 0.5) }, 10.0)
            .at(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY);
        let handle = world.add_body(desc).unwrap();
        for _ in 0..240 {
            world.step(DT);
        }
        let body = world.body(handle).unwrap();
        assert!((body.position.y - 0.5).abs() < 0.05, "resting at {}", body.position.y);
        assert!(body.linear_velocity.length() < 0.2);
        assert!((body.mass() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn raycast_hits_ground_and_respects_length() {
        let world = world_with_ground();
        let hit = world.raycast(Vec3::new(0.0, 0.5, 0.0), Vec3::NEG_Y, 0.57, None).unwrap();
        assert!((hit.distance - 0.5).abs() < 1e-4);
        assert!(hit.normal.distance(Vec3::Y) < 1e-4);
        assert!(hit.body.is_none());
        assert!(world.raycast(Vec3::new(0.0, 1.0, 0.0), Vec3::NEG_Y, 0.57, None).is_none());
    }

    #[test]
    fn raycast_excludes_own_body_and_sees_others() {
        let mut world = world_with_ground();
        let own = world
            .add_body(BodyDesc::new(Shape::Sphere { radius: 0.3 }, 1.0).at(Vec3::new(0.0, 3.0, 0.0), Quat::IDENTITY))
            .unwrap();
        let roof = world
            .add_body(
                BodyDesc::new(Shape::Cuboid { half_extents: Vec3::new(1.0, 0.1, 1.0) }, 5.0)
                    .at(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY),
            )
            .unwrap();
        let hit = world.raycast(Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y, 10.0, Some(own)).unwrap();
        assert_eq!(hit.body, Some(roof));
        assert!((hit.point.y - 1.1).abs() < 1e-4);
    }

    #[test]
    fn disabled_bodies_are_frozen_and_invisible() {
        let mut world = world_with_ground();
        let handle = world
            .add_body(BodyDesc::new(Shape::Sphere { radius: 0.5 }, 1.0).at(Vec3::new(0.0, 5.0, 0.0), Quat::IDENTITY))
            .unwrap();
        world.set_enabled(handle, false).unwrap();
        world.step(DT);
        let body = world.body(handle).unwrap();
        assert!(!body.is_enabled());
        assert_eq!(body.position.y, 5.0);
        assert!(world.raycast(Vec3::new(0.0, 8.0, 0.0), Vec3::NEG_Y, 10.0, None).unwrap().body.is_none());
    }

    #[test]
    fn capsule_is_pushed_out_of_vehicle_box() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let capsule = world
            .add_body(
                BodyDesc::new(Shape::Capsule { radius: 0.25, half_height: 0.25 }, 1.0)
                    .fixed_rotation()
                    .at(Vec3::new(1.1, 0.0, 0.0), Quat::IDENTITY),
            )
            .unwrap();
        let shape = Shape::Compound(vec![ShapePart::new(Vec3::ZERO, Shape::Cuboid { half_extents: Vec3::ONE })]);
        world.add_body(BodyDesc::new(shape, 100.0)).unwrap();
        for _ in 0..30 {
            world.step(DT);
        }
        assert!(world.body(capsule).unwrap().position.x >= 1.2);
    }

    #[test]
    fn forces_last_one_step() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let handle = world.add_body(BodyDesc::new(Shape::Sphere { radius: 0.5 }, 2.0)).unwrap();
        world.step(DT);
        world.apply_force(handle, Vec3::X * 120.0).unwrap();
        world.step(DT);
        let after_push = world.body(handle).unwrap().linear_velocity.x;
        assert!((after_push - 1.0).abs() < 0.05, "vx = {after_push}");
        world.step(DT);
        let coasting = world.body(handle).unwrap().linear_velocity.x;
        assert!((coasting - after_push).abs() < 1e-4);
    }

    #[test]
    fn interpolation_blends_steps() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let handle = world.add_body(BodyDesc::new(Shape::Sphere { radius: 0.5 }, 1.0)).unwrap();
        world.set_linear_velocity(handle, Vec3::X * 6.0).unwrap();
        world.step(0.5);
        let (half, _) = world.interpolated_transform(handle, 0.5).unwrap();
        assert!((half.x - 1.5).abs() < 1e-3);
        let (full, _) = world.interpolated_transform(handle, 1.0).unwrap();
        assert!((full.x - 3.0).abs() < 1e-3);

        world.set_pose(handle, Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY).unwrap();
        let (from, _) = world.interpolated_transform(handle, 0.0).unwrap();
        assert!((from.x - 0.0).abs() < 1e-3);

        world.teleport(handle, Vec3::new(-4.0, 0.0, 0.0), Quat::IDENTITY).unwrap();
        let (start, _) = world.interpolated_transform(handle, 0.0).unwrap();
        assert_eq!(start, Vec3::new(-4.0, 0.0, 0.0));
    }

    #[test]
    fn unknown_handles_are_errors() {
        let mut world = world_with_ground();
        let stale = BodyHandle::from_raw_parts(7, 0);
        assert_eq!(world.set_enabled(stale, true), Err(PhysicsError::UnknownBody(7)));
        let handle = world.add_body(BodyDesc::new(Shape::Sphere { radius: 1.0 }, 1.0)).unwrap();
        assert!(world.remove_body(handle));
        assert!(world.body(handle).is_none());
        assert_eq!(world.body_count(), 0);
    }
}
