// CONTROLLER: vehicle input and per-kind force models

use glam::{Quat, Vec3};
use tracing::trace;

use super::input::{
    InputReceiver, KeyBindings, MouseButton, VehicleAction, AIRPLANE_BINDINGS, CAR_BINDINGS, HELICOPTER_BINDINGS,
};
use super::seats::WorldRequest;
use super::UpdateContext;
use crate::error::{SimError, SimResult};
use crate::model::spring::wrap_angle;
use crate::model::{EntityId, Updatable, Vehicle, VehicleControls, VehicleKind};

/// Ray length for the aircraft ground clearance check.
const CLEARANCE_RAY: f32 = 100.0;
/// Airplane speed at which control surfaces reach full authority.
const FULL_AUTHORITY_SPEED: f32 = 15.0;
const PITCH_LIMIT: f32 = 1.4;

impl Updatable for Vehicle {
    fn id(&self) -> EntityId {
        self.id
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>, dt: f32) -> SimResult<()> {
        update(self, ctx, dt)
    }
}

pub fn update(v: &mut Vehicle, ctx: &mut UpdateContext<'_>, dt: f32) -> SimResult<()> {
    let body = ctx.physics.body(v.body).ok_or(SimError::MissingPhysicsBody(v.id))?;
    v.position = body.position;
    v.rotation = body.rotation;
    v.velocity = body.linear_velocity;
    v.angular_velocity = body.angular_velocity;

    if v.is_ghost() {
        return Ok(());
    }

    if v.kind.is_aircraft() {
        let clearance = ctx
            .physics
            .raycast(v.position, Vec3::NEG_Y, CLEARANCE_RAY, Some(v.body))
            .map_or(f32::INFINITY, |hit| hit.distance);
        v.airborne = clearance > v.config.airborne_height;
    }

    if !v.is_occupied() {
        return Ok(());
    }

    if v.is_controlled() {
        let driver = v.driver_seat().and_then(|i| v.seats[i].occupant());
        if let Some(character) = driver {
            if v.actions.just_pressed(VehicleAction::ExitVehicle) {
                ctx.requests.push(WorldRequest::ExitVehicle { character });
            } else if v.actions.just_pressed(VehicleAction::SeatSwitch) {
                ctx.requests.push(WorldRequest::SwitchSeat { character });
            }
        }
        v.controls = resolve_controls(v);
    }

    match v.kind {
        VehicleKind::Car => drive_car(v, ctx, dt),
        VehicleKind::Helicopter => fly_helicopter(v, ctx),
        VehicleKind::Airplane => fly_airplane(v, ctx),
    }
}

/// Turn held actions into control axes for the vehicle's kind.
pub fn resolve_controls(v: &Vehicle) -> VehicleControls {
    let held = |action| if v.actions.is_pressed(action) { 1.0 } else { 0.0 };
    let axis = |pos, neg| held(pos) - held(neg);
    use VehicleAction::*;

    match v.kind {
        VehicleKind::Car => VehicleControls {
            throttle: axis(Throttle, Reverse),
            brake: held(Brake),
            steering: axis(Right, Left),
            ..Default::default()
        },
        VehicleKind::Helicopter => VehicleControls {
            lift: axis(Ascend, Descend),
            pitch: axis(PitchUp, PitchDown),
            roll: axis(RollRight, RollLeft),
            yaw: axis(YawRight, YawLeft),
            ..Default::default()
        },
        VehicleKind::Airplane => VehicleControls {
            throttle: held(Throttle),
            brake: held(Brake),
            pitch: axis(PitchUp, PitchDown),
            roll: axis(RollRight, RollLeft),
            yaw: axis(YawRight, YawLeft),
            ..Default::default()
        },
    }
}

/// Raycast suspension with per-wheel drive, brake and lateral grip.
fn drive_car(v: &mut Vehicle, ctx: &mut UpdateContext<'_>, dt: f32) -> SimResult<()> {
    let car = v.config.car.clone();
    let controls = v.controls;
    v.steering.target = controls.steering * car.max_steer;
    v.steering.simulate(dt);
    let steer = v.steering.position;

    let body = ctx.physics.body(v.body).ok_or(SimError::MissingPhysicsBody(v.id))?;
    let (pos, rot) = (body.position, body.rotation);
    let (linear, angular) = (body.linear_velocity, body.angular_velocity);
    let up = rot * Vec3::Y;
    let forward = rot * Vec3::X;

    let max_length = car.suspension_rest_length + car.wheel_radius;
    let driven = v.wheels.iter().filter(|w| w.driven).count().max(1) as f32;
    let wheel_count = v.wheels.len().max(1) as f32;
    let reverse_scale = if controls.throttle < 0.0 { 0.5 } else { 1.0 };
    let drive_force = controls.throttle * car.engine_force * reverse_scale / driven;
    let resistance = (controls.brake * car.brake_force + car.rolling_resistance) / wheel_count;

    let mut forces = Vec::with_capacity(v.wheels.len() * 2);
    for wheel in &mut v.wheels {
        wheel.steer_angle = if wheel.steerable { steer } else { 0.0 };
        let anchor = pos + rot * wheel.anchor;
        let Some(hit) = ctx.physics.raycast(anchor, -up, max_length, Some(v.body)) else {
            wheel.in_contact = false;
            wheel.compression = 0.0;
            continue;
        };

        let compression = (max_length - hit.distance).clamp(0.0, car.suspension_rest_length);
        let compression_speed = if dt > 0.0 { (compression - wheel.compression) / dt } else { 0.0 };
        wheel.compression = compression;
        wheel.in_contact = true;
        let suspension = (car.suspension_stiffness * compression + car.suspension_damping * compression_speed).max(0.0);
        forces.push((up * suspension, anchor));

        let wheel_forward = Quat::from_axis_angle(up, -wheel.steer_angle) * forward;
        let wheel_right = wheel_forward.cross(up);
        let point_velocity = linear + angular.cross(hit.point - pos);
        let longitudinal = point_velocity.dot(wheel_forward);
        let lateral = point_velocity.dot(wheel_right);

        let mut traction = -wheel_right * lateral * car.grip;
        if wheel.driven {
            traction += wheel_forward * drive_force;
        }
        traction -= wheel_forward * longitudinal.clamp(-1.0, 1.0) * resistance;
        forces.push((traction, hit.point));

        wheel.spin = wrap_angle(wheel.spin + longitudinal / car.wheel_radius * dt);
    }

    for (force, point) in forces {
        ctx.physics.apply_force_at_point(v.body, force, point)?;
    }
    trace!(vehicle = %v.id, steer, throttle = controls.throttle, "car forces applied");
    Ok(())
}

fn fly_helicopter(v: &mut Vehicle, ctx: &mut UpdateContext<'_>) -> SimResult<()> {
    if !v.is_controlled() {
        return Ok(());
    }
    let heli = &v.config.helicopter;
    let c = v.controls;
    let gravity = ctx.physics.gravity.length();
    let body = ctx.physics.body(v.body).ok_or(SimError::MissingPhysicsBody(v.id))?;

    let up = body.rotation * Vec3::Y;
    let forward = body.rotation * Vec3::X;
    let right = forward.cross(up);

    let hover = body.mass() * gravity;
    ctx.physics.apply_force(v.body, up * hover * (1.0 + heli.climb_authority * c.lift))?;

    let mut torque = right * c.pitch * heli.pitch_torque + forward * c.roll * heli.roll_torque - up * c.yaw * heli.yaw_torque;
    // Rotates `up` back towards world up.
    torque += up.cross(Vec3::Y) * heli.stabilisation;
    ctx.physics.apply_torque(v.body, torque)?;
    Ok(())
}

fn fly_airplane(v: &mut Vehicle, ctx: &mut UpdateContext<'_>) -> SimResult<()> {
    if !v.is_controlled() {
        return Ok(());
    }
    let plane = &v.config.airplane;
    let c = v.controls;
    let airborne = v.airborne;
    let gravity = ctx.physics.gravity.length();
    let body = ctx.physics.body(v.body).ok_or(SimError::MissingPhysicsBody(v.id))?;

    let up = body.rotation * Vec3::Y;
    let forward = body.rotation * Vec3::X;
    let right = forward.cross(up);
    let velocity = body.linear_velocity;
    let speed = velocity.dot(forward);
    let mass = body.mass();

    let mut force = forward * c.throttle * plane.thrust;
    let lift = (plane.lift_coefficient * speed.max(0.0).powi(2)).min(2.0 * mass * gravity);
    force += up * lift;
    force -= velocity * velocity.length() * plane.drag_coefficient;
    if !airborne && c.brake > 0.0 && speed.abs() > 0.1 {
        force -= forward * speed.signum() * c.brake * plane.brake_force;
    }
    ctx.physics.apply_force(v.body, force)?;

    let authority = (speed / FULL_AUTHORITY_SPEED).clamp(0.0, 1.0) * mass;
    let torque = right * c.pitch * plane.pitch_authority + forward * c.roll * plane.roll_authority
        - up * c.yaw * plane.yaw_authority;
    ctx.physics.apply_torque(v.body, torque * authority)?;
    Ok(())
}

fn bindings(kind: VehicleKind) -> &'static KeyBindings<VehicleAction> {
    match kind {
        VehicleKind::Car => &*CAR_BINDINGS,
        VehicleKind::Helicopter => &*HELICOPTER_BINDINGS,
        VehicleKind::Airplane => &*AIRPLANE_BINDINGS,
    }
}

impl InputReceiver for Vehicle {
    fn handle_key(&mut self, key: &str, pressed: bool) {
        if let Some(action) = bindings(self.kind).action_for_key(key) {
            self.actions.set(action, pressed);
        }
    }

    fn handle_mouse_move(&mut self, dx: f32, dy: f32) {
        self.view_yaw = wrap_angle(self.view_yaw + dx * self.mouse_sensitivity);
        self.view_pitch = (self.view_pitch - dy * self.mouse_sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    fn handle_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if let Some(action) = bindings(self.kind).action_for_button(button) {
            self.actions.set(action, pressed);
        }
    }

    fn reset_controls(&mut self) {
        self.actions.release_all();
        self.controls = VehicleControls::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnimationConfig, VehicleConfig};
    use crate::controller::ClipTable;
    use crate::model::{SeatPoses, VehicleBlueprint};
    use crate::physics::{BodyDesc, PhysicsWorld, StaticCollider};

    const DT: f32 = 1.0 / 60.0;

    struct Rig {
        physics: PhysicsWorld,
        clips: ClipTable,
        poses: SeatPoses,
        requests: Vec<WorldRequest>,
        vehicle: Vehicle,
    }

    impl Rig {
        fn new(kind: VehicleKind, height: f32) -> Self {
            let config = VehicleConfig::default();
            let blueprint = VehicleBlueprint::for_kind(kind, &config);
            let mut physics = PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0));
            physics.add_static(StaticCollider::ground(0.0));
            let mut desc = BodyDesc::new(blueprint.shape.clone(), blueprint.mass)
                .at(Vec3::new(0.0, height, 0.0), Quat::IDENTITY)
                .damping(blueprint.linear_damping, blueprint.angular_damping);
            desc.friction = blueprint.friction;
            let body = physics.add_body(desc).unwrap();
            let mut vehicle = Vehicle::new(EntityId(1), body, blueprint, config);
            vehicle.seats[0].set_occupant(Some(EntityId(2)));
            vehicle.set_controlled(true);
            Self {
                physics,
                clips: ClipTable::from_config(&AnimationConfig::default()),
                poses: SeatPoses::new(),
                requests: Vec::new(),
                vehicle,
            }
        }

        fn tick(&mut self) {
            self.physics.step(DT);
            let mut ctx = UpdateContext {
                physics: &mut self.physics,
                seat_poses: &self.poses,
                animations: &self.clips,
                requests: &mut self.requests,
            };
            update(&mut self.vehicle, &mut ctx, DT).unwrap();
            self.vehicle.actions.end_tick();
        }

        fn run(&mut self, ticks: usize) {
            for _ in 0..ticks {
                self.tick();
            }
        }
    }

    #[test]
    fn controls_follow_held_actions() {
        let mut rig = Rig::new(VehicleKind::Car, 1.0);
        rig.vehicle.handle_key("w", true);
        rig.vehicle.handle_key("a", true);
        let controls = resolve_controls(&rig.vehicle);
        assert_eq!(controls.throttle, 1.0);
        assert_eq!(controls.steering, -1.0);
        rig.vehicle.reset_controls();
        assert_eq!(resolve_controls(&rig.vehicle), VehicleControls::default());
    }

    #[test]
    fn car_settles_on_suspension_and_drives_forward() {
        let mut rig = Rig::new(VehicleKind::Car, 1.0);
        rig.run(120);
        assert!(rig.vehicle.wheels.iter().all(|w| w.in_contact));
        let start = rig.vehicle.position;
        rig.vehicle.handle_key("w", true);
        rig.run(120);
        let moved = rig.vehicle.position - start;
        assert!(moved.x > 2.0, "car moved {moved}");
        assert!(moved.z.abs() < 0.5, "car drifted sideways {moved}");
    }

    #[test]
    fn steering_turns_front_wheels_right() {
        let mut rig = Rig::new(VehicleKind::Car, 1.0);
        rig.vehicle.handle_key("d", true);
        rig.run(30);
        let front = &rig.vehicle.wheels[0];
        assert!(front.steer_angle > 0.3, "steer {}", front.steer_angle);
        assert_eq!(rig.vehicle.wheels[2].steer_angle, 0.0);
    }

    #[test]
    fn uncontrolled_car_ignores_held_throttle() {
        let mut rig = Rig::new(VehicleKind::Car, 1.0);
        rig.vehicle.set_controlled(false);
        rig.vehicle.handle_key("w", true);
        rig.run(60);
        assert!(rig.vehicle.velocity.x.abs() < 0.2, "velocity {}", rig.vehicle.velocity);
    }

    #[test]
    fn helicopter_climbs_and_becomes_airborne() {
        let mut rig = Rig::new(VehicleKind::Helicopter, 1.0);
        rig.run(30);
        assert!(!rig.vehicle.airborne);
        rig.vehicle.handle_key("Shift", true);
        rig.run(120);
        assert!(rig.vehicle.position.y > 3.0, "height {}", rig.vehicle.position.y);
        assert!(rig.vehicle.airborne);
        assert!(rig.vehicle.up().y > 0.95, "should stay level");
    }

    #[test]
    fn exit_key_requests_exit_for_driver() {
        let mut rig = Rig::new(VehicleKind::Car, 1.0);
        rig.vehicle.handle_key("f", true);
        rig.tick();
        assert_eq!(rig.requests, vec![WorldRequest::ExitVehicle { character: EntityId(2) }]);
    }

    #[test]
    fn missing_body_is_an_error() {
        let mut rig = Rig::new(VehicleKind::Airplane, 1.5);
        rig.physics.remove_body(rig.vehicle.body);
        let mut ctx = UpdateContext {
            physics: &mut rig.physics,
            seat_poses: &rig.poses,
            animations: &rig.clips,
            requests: &mut rig.requests,
        };
        assert!(matches!(update(&mut rig.vehicle, &mut ctx, DT), Err(SimError::MissingPhysicsBody(_))));
    }
}
