// CONTROLLER: character sensing, state dispatch and body write-back

use glam::Vec3;
use tracing::trace;

use super::animation::state_duration;
use super::input::{CharacterAction, InputReceiver, MouseButton, CHARACTER_BINDINGS};
use super::seats::WorldRequest;
use super::UpdateContext;
use crate::error::{SimError, SimResult};
use crate::model::spring::wrap_angle;
use crate::model::state::EntryAnchor;
use crate::model::{
    Character, CharacterState, CharacterStateId, EntityId, GroundContact, SeatPose, SeatRef, SeatRole,
    StartDirection, Updatable,
};
use crate::utils::{horizontal, yaw_of_direction};

/// Minimum time in the air before a jump can land again.
const MIN_AIR_TIME: f32 = 0.1;
/// A start-walk released sooner than this returns straight to idle.
const TAP_TIME: f32 = 0.1;
const PITCH_LIMIT: f32 = 1.4;

impl Updatable for Character {
    fn id(&self) -> EntityId {
        self.id
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>, dt: f32) -> SimResult<()> {
        update(self, ctx, dt)
    }
}

pub fn update(ch: &mut Character, ctx: &mut UpdateContext<'_>, dt: f32) -> SimResult<()> {
    if ch.is_ghost() {
        return Ok(());
    }

    if ch.physics_enabled() {
        sense(ch, ctx, dt)?;
        if !ch.ground.is_grounded() && ch.state_id().needs_ground() {
            ch.set_state(CharacterState::Falling);
        }
    }

    if ch.actions.take_changed() {
        on_input_change(ch, ctx);
    }

    advance_state(ch, ctx, dt);

    if ch.physics_enabled() {
        drive_body(ch, ctx, dt)?;
    }
    Ok(())
}

fn sense(ch: &mut Character, ctx: &mut UpdateContext<'_>, dt: f32) -> SimResult<()> {
    let body = ctx.physics.body(ch.body).ok_or(SimError::MissingPhysicsBody(ch.id))?;
    let velocity = body.linear_velocity;
    // Ground contacts may already have stopped the body this step.
    ch.fall_speed = (-ch.velocity.y).max(-velocity.y).max(0.0);
    if dt > 0.0 {
        ch.acceleration = (velocity - ch.velocity) / dt;
    }
    ch.velocity = velocity;
    ch.position = body.position;

    let cfg = &ch.config;
    let reach = cfg.ray_cast_length + if ch.ground.is_grounded() { cfg.ray_safe_offset } else { 0.0 };
    ch.ground = match ctx.physics.raycast(ch.position, Vec3::NEG_Y, reach, Some(ch.body)) {
        Some(hit) => GroundContact::Grounded {
            point: hit.point,
            normal: hit.normal,
            body: hit.body,
        },
        None => GroundContact::NoGroundContact,
    };
    Ok(())
}

/// React to a press or release. Runs before the per-tick logic.
fn on_input_change(ch: &mut Character, ctx: &mut UpdateContext<'_>) {
    let id = ch.state_id();
    let jump = ch.actions.just_pressed(CharacterAction::Jump);
    let direction = ch.input_direction();
    let running = ch.is_running();

    if id.can_enter_vehicles() {
        let role = if ch.actions.just_pressed(CharacterAction::Enter) {
            Some(SeatRole::Driver)
        } else if ch.actions.just_pressed(CharacterAction::EnterPassenger) {
            Some(SeatRole::Passenger)
        } else {
            None
        };
        if let Some(role) = role {
            ctx.requests.push(WorldRequest::EnterNearest { character: ch.id, role });
            return;
        }
    }

    match ch.state() {
        CharacterState::Idle | CharacterState::EndWalk { .. } | CharacterState::DropIdle { .. } => {
            if jump {
                ch.set_state(CharacterState::jump_idle());
            } else if let Some(direction) = direction {
                start_moving(ch, direction);
            }
        }
        CharacterState::StartWalk { timer, .. } => {
            if jump {
                ch.set_state(CharacterState::jump_running());
            } else if direction.is_none() {
                let next = if *timer < TAP_TIME { CharacterState::Idle } else { CharacterState::EndWalk { timer: 0.0 } };
                ch.set_state(next);
            } else if running {
                ch.set_state(CharacterState::Sprint);
            }
        }
        CharacterState::Walk | CharacterState::DropRunning { .. } => {
            if jump {
                ch.set_state(CharacterState::jump_running());
            } else if direction.is_none() {
                ch.set_state(CharacterState::EndWalk { timer: 0.0 });
            } else if running {
                ch.set_state(CharacterState::Sprint);
            }
        }
        CharacterState::Sprint => {
            if jump {
                ch.set_state(CharacterState::jump_running());
            } else if direction.is_none() {
                ch.set_state(CharacterState::EndWalk { timer: 0.0 });
            } else if !running {
                ch.set_state(CharacterState::Walk);
            }
        }
        CharacterState::Driving { .. } | CharacterState::Sitting { .. } => {
            if ch.actions.just_pressed(CharacterAction::Enter) {
                ctx.requests.push(WorldRequest::ExitVehicle { character: ch.id });
            } else if ch.actions.just_pressed(CharacterAction::SeatSwitch) {
                ctx.requests.push(WorldRequest::SwitchSeat { character: ch.id });
            }
        }
        _ => {}
    }
}

fn start_moving(ch: &mut Character, direction: Vec3) {
    let Some(target_yaw) = yaw_of_direction(direction) else { return };
    let angle = wrap_angle(target_yaw - ch.facing_yaw());
    let next = match StartDirection::from_angle(angle) {
        Some(start) => CharacterState::start_walk(start),
        None if ch.is_running() => CharacterState::Sprint,
        None => CharacterState::Walk,
    };
    ch.set_state(next);
}

fn face_input(ch: &mut Character) {
    if let Some(yaw) = ch.input_direction().and_then(yaw_of_direction) {
        ch.orientation_target = yaw;
    }
}

/// Pick the landing state from the downward speed at touchdown.
fn landing_state(ch: &Character) -> CharacterState {
    let cfg = &ch.config;
    let fall_speed = ch.fall_speed;
    if fall_speed > cfg.roll_threshold {
        CharacterState::DropRolling { timer: 0.0 }
    } else if ch.has_direction() {
        if fall_speed > cfg.hard_landing_threshold {
            CharacterState::DropRunning { timer: 0.0 }
        } else if ch.is_running() {
            CharacterState::Sprint
        } else {
            CharacterState::Walk
        }
    } else if fall_speed > cfg.hard_landing_threshold {
        CharacterState::DropIdle { timer: 0.0 }
    } else {
        CharacterState::Idle
    }
}

fn walk_or_stop(ch: &Character) -> CharacterState {
    match (ch.has_direction(), ch.is_running()) {
        (true, true) => CharacterState::Sprint,
        (true, false) => CharacterState::Walk,
        (false, _) => CharacterState::EndWalk { timer: 0.0 },
    }
}

fn seated_state(ch: &Character, seat: SeatRef, pose: &SeatPose, ctx: &mut UpdateContext<'_>) -> CharacterState {
    match pose.role {
        SeatRole::Driver => {
            ctx.requests.push(WorldRequest::StartControlling { character: ch.id, seat });
            CharacterState::Driving { seat }
        }
        SeatRole::Passenger => CharacterState::Sitting { seat },
    }
}

fn follow(ch: &mut Character, position: Vec3, yaw: f32, velocity: Vec3) {
    ch.position = position;
    ch.velocity = velocity;
    ch.set_facing(yaw);
}

fn advance_state(ch: &mut Character, ctx: &mut UpdateContext<'_>, dt: f32) {
    if let Some(timer) = ch.state_mut().timer_mut() {
        *timer += dt;
    }
    let duration = state_duration(ctx.animations, ch.state_id());
    let timer = ch.state().timer().unwrap_or(0.0);
    let finished = timer >= duration;
    let cfg = ch.config.clone();

    match ch.state().clone() {
        CharacterState::Idle | CharacterState::Replicated { .. } => {}
        CharacterState::StartWalk { .. } => {
            face_input(ch);
            if finished {
                let next = walk_or_stop(ch);
                ch.set_state(next);
            }
        }
        CharacterState::Walk | CharacterState::Sprint => face_input(ch),
        CharacterState::EndWalk { .. } | CharacterState::DropIdle { .. } => {
            if finished {
                ch.set_state(CharacterState::Idle);
            }
        }
        CharacterState::JumpIdle { jumped, .. } | CharacterState::JumpRunning { jumped, .. } => {
            let running = ch.state_id() == CharacterStateId::JumpRunning;
            let delay = if running { cfg.running_jump_delay } else { cfg.jump_delay };
            if running {
                face_input(ch);
            }
            if !jumped {
                if timer >= delay {
                    ch.wants_to_jump = true;
                    if let CharacterState::JumpIdle { jumped, .. } | CharacterState::JumpRunning { jumped, .. } =
                        ch.state_mut()
                    {
                        *jumped = true;
                    }
                }
            } else if timer > delay + MIN_AIR_TIME && ch.ground.is_grounded() {
                let next = landing_state(ch);
                ch.set_state(next);
            } else if finished && !ch.ground.is_grounded() {
                ch.set_state(CharacterState::Falling);
            }
        }
        CharacterState::Falling => {
            face_input(ch);
            ch.arcade_velocity_target = if ch.has_direction() { Vec3::X * cfg.walk_multiplier } else { Vec3::ZERO };
            if ch.ground.is_grounded() {
                let next = landing_state(ch);
                ch.set_state(next);
            }
        }
        CharacterState::DropRunning { .. } => {
            face_input(ch);
            if finished {
                let next = walk_or_stop(ch);
                ch.set_state(next);
            }
        }
        CharacterState::DropRolling { .. } => {
            if finished {
                let next = if ch.has_direction() { CharacterState::Walk } else { CharacterState::EndWalk { timer: 0.0 } };
                ch.set_state(next);
            }
        }
        CharacterState::OpenVehicleDoor { seat, anchor, .. } => {
            let Some(pose) = ctx.seat_poses.get(&seat).copied() else { return };
            let t = (timer / duration).clamp(0.0, 1.0);
            follow(ch, anchor.position.lerp(pose.entry_point, t), pose.yaw, pose.velocity);
            if finished {
                let anchor = EntryAnchor {
                    position: ch.position,
                    yaw: pose.yaw,
                };
                ch.set_state(CharacterState::EnteringVehicle { seat, timer: 0.0, anchor });
            }
        }
        CharacterState::EnteringVehicle { seat, anchor, .. } => {
            let Some(pose) = ctx.seat_poses.get(&seat).copied() else { return };
            let t = (timer / duration).clamp(0.0, 1.0);
            let yaw = anchor.yaw + wrap_angle(pose.yaw - anchor.yaw) * t;
            follow(ch, anchor.position.lerp(pose.position, t), yaw, pose.velocity);
            if finished {
                let next = if pose.door_open {
                    CharacterState::CloseVehicleDoorInside { seat, timer: 0.0 }
                } else {
                    seated_state(ch, seat, &pose, ctx)
                };
                ch.set_state(next);
            }
        }
        CharacterState::CloseVehicleDoorInside { seat, .. } => {
            let Some(pose) = ctx.seat_poses.get(&seat).copied() else { return };
            follow(ch, pose.position, pose.yaw, pose.velocity);
            if finished {
                ctx.requests.push(WorldRequest::SetDoor { seat, open: false });
                let next = seated_state(ch, seat, &pose, ctx);
                ch.set_state(next);
            }
        }
        CharacterState::Driving { seat } | CharacterState::Sitting { seat } => {
            if let Some(pose) = ctx.seat_poses.get(&seat).copied() {
                follow(ch, pose.position, pose.yaw, pose.velocity);
            }
        }
        CharacterState::SwitchingSeats { from, to, .. } => {
            let (Some(start), Some(end)) = (ctx.seat_poses.get(&from).copied(), ctx.seat_poses.get(&to).copied()) else {
                return;
            };
            let t = (timer / duration).clamp(0.0, 1.0);
            follow(ch, start.position.lerp(end.position, t), end.yaw, end.velocity);
            if finished {
                let next = seated_state(ch, to, &end, ctx);
                ch.set_state(next);
            }
        }
        CharacterState::ExitingVehicle { seat, .. } => {
            let Some(pose) = ctx.seat_poses.get(&seat).copied() else { return };
            let t = (timer / duration).clamp(0.0, 1.0);
            follow(ch, pose.position.lerp(pose.exit_point, t), pose.yaw, pose.velocity);
            if finished {
                ctx.requests.push(WorldRequest::ReleaseSeat { character: ch.id });
            }
        }
        CharacterState::ExitingAirplane { .. } => {
            if timer > MIN_AIR_TIME && ch.ground.is_grounded() {
                let next = landing_state(ch);
                if ch.state_id().can_transition_to(next.id()) {
                    ch.set_state(next);
                } else {
                    ch.set_state(CharacterState::Idle);
                }
            } else if finished {
                ch.set_state(CharacterState::Falling);
            }
        }
        CharacterState::CloseVehicleDoorOutside { seat, .. } => {
            if finished {
                ctx.requests.push(WorldRequest::SetDoor { seat, open: false });
                ch.set_state(CharacterState::Idle);
            }
        }
    }
}

/// Run the springs and hand the resulting velocity to the body.
fn drive_body(ch: &mut Character, ctx: &mut UpdateContext<'_>, dt: f32) -> SimResult<()> {
    ch.velocity_simulator.target = ch.arcade_velocity_target;
    ch.velocity_simulator.simulate(dt);
    ch.rotation_simulator.target = ch.orientation_target;
    ch.rotation_simulator.simulate(dt);

    let desired = ch.desired_velocity();
    let platform = match ch.ground {
        GroundContact::Grounded { point, body: Some(handle), .. } => {
            ctx.physics.body(handle).map_or(Vec3::ZERO, |b| b.velocity_at_point(point))
        }
        _ => Vec3::ZERO,
    };

    let cfg = &ch.config;
    let orientation = ch.orientation();
    let body = ctx.physics.body(ch.body).ok_or(SimError::MissingPhysicsBody(ch.id))?;
    let mut position = body.position;
    let mut velocity = body.linear_velocity;

    if ch.wants_to_jump {
        velocity = horizontal(desired + platform) + Vec3::Y * (cfg.jump_speed + platform.y.max(0.0));
        ch.wants_to_jump = false;
        ch.ground = GroundContact::NoGroundContact;
        trace!(entity = %ch.id, vy = velocity.y, "jump");
    } else if let GroundContact::Grounded { point, .. } = ch.ground {
        velocity = horizontal(desired + platform) + Vec3::Y * platform.y;
        position.y = point.y + cfg.ray_cast_length;
    } else {
        let current = horizontal(velocity);
        let steered = current.lerp(horizontal(desired), cfg.air_control);
        velocity = steered + Vec3::Y * velocity.y;
    }

    ctx.physics.set_pose(ch.body, position, orientation)?;
    ctx.physics.set_linear_velocity(ch.body, velocity)?;
    ch.position = position;
    ch.velocity = velocity;
    Ok(())
}

impl InputReceiver for Character {
    fn handle_key(&mut self, key: &str, pressed: bool) {
        if let Some(action) = CHARACTER_BINDINGS.action_for_key(key) {
            self.actions.set(action, pressed);
        }
    }

    fn handle_mouse_move(&mut self, dx: f32, dy: f32) {
        let sensitivity = self.config.mouse_sensitivity;
        self.view_yaw = wrap_angle(self.view_yaw + dx * sensitivity);
        self.view_pitch = (self.view_pitch - dy * sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    fn handle_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if let Some(action) = CHARACTER_BINDINGS.action_for_button(button) {
            self.actions.set(action, pressed);
        }
    }

    fn reset_controls(&mut self) {
        self.actions.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnimationConfig, CharacterConfig};
    use crate::controller::ClipTable;
    use crate::model::SeatPoses;
    use crate::physics::{BodyDesc, PhysicsWorld, Shape, StaticCollider};
    use glam::Quat;

    const DT: f32 = 1.0 / 60.0;

    struct Rig {
        physics: PhysicsWorld,
        clips: ClipTable,
        poses: SeatPoses,
        requests: Vec<WorldRequest>,
        ch: Character,
    }

    impl Rig {
        fn new(height: f32) -> Self {
            let cfg = CharacterConfig::default();
            let mut physics = PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0));
            physics.add_static(StaticCollider::ground(0.0));
            let shape = Shape::Capsule { radius: cfg.capsule_radius, half_height: cfg.capsule_half_height };
            let body = physics
                .add_body(BodyDesc::new(shape, cfg.mass).fixed_rotation().at(Vec3::new(0.0, height, 0.0), Quat::IDENTITY))
                .unwrap();
            Self {
                physics,
                clips: ClipTable::from_config(&AnimationConfig::default()),
                poses: SeatPoses::new(),
                requests: Vec::new(),
                ch: Character::new(EntityId(1), body, Vec3::new(0.0, height, 0.0), cfg),
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
            update(&mut self.ch, &mut ctx, DT).unwrap();
            self.ch.actions.end_tick();
        }
    }

    #[test]
    fn forward_input_walks_immediately() {
        let mut rig = Rig::new(0.55);
        rig.tick();
        assert_eq!(rig.ch.state_id(), CharacterStateId::Idle);
        rig.ch.handle_key("w", true);
        rig.tick();
        assert_eq!(rig.ch.state_id(), CharacterStateId::Walk);
    }

    #[test]
    fn sideways_input_starts_with_a_turn() {
        let mut rig = Rig::new(0.55);
        rig.tick();
        rig.ch.handle_key("d", true);
        rig.tick();
        assert_eq!(rig.ch.state_id(), CharacterStateId::StartWalkRight);
        for _ in 0..40 {
            rig.tick();
        }
        assert_eq!(rig.ch.state_id(), CharacterStateId::Walk);
        assert!(rig.ch.facing_yaw() > 1.0, "should have turned right, yaw {}", rig.ch.facing_yaw());
    }

    #[test]
    fn standing_jump_leaves_and_lands() {
        let mut rig = Rig::new(0.55);
        rig.tick();
        rig.ch.handle_key(" ", true);
        rig.tick();
        assert_eq!(rig.ch.state_id(), CharacterStateId::JumpIdle);
        let mut peak: f32 = 0.0;
        let mut landed = false;
        for _ in 0..120 {
            rig.tick();
            peak = peak.max(rig.ch.position.y);
            if rig.ch.state_id() == CharacterStateId::Idle {
                landed = true;
                break;
            }
        }
        assert!(peak > 1.0, "peak {peak}");
        assert!(landed, "still in {:?}", rig.ch.state_id());
    }

    #[test]
    fn unsupported_character_falls_then_rolls_on_hard_landing() {
        let mut rig = Rig::new(6.0);
        rig.tick();
        assert_eq!(rig.ch.state_id(), CharacterStateId::Falling);
        let mut ids = Vec::new();
        for _ in 0..120 {
            rig.tick();
            ids.push(rig.ch.state_id());
        }
        assert!(ids.contains(&CharacterStateId::DropIdle) || ids.contains(&CharacterStateId::DropRolling));
        assert!(!rig.ch.state_id().is_airborne());
    }

    #[test]
    fn grounded_states_fall_when_the_ground_goes() {
        let seat = SeatRef::new(EntityId(9), 0);
        for id in CharacterStateId::ALL.into_iter().filter(|id| id.needs_ground()) {
            let state = match id {
                CharacterStateId::CloseVehicleDoorOutside => CharacterState::CloseVehicleDoorOutside { seat, timer: 0.0 },
                _ => CharacterState::on_foot(id).unwrap(),
            };
            let mut rig = Rig::new(0.55);
            rig.tick();
            assert!(rig.ch.ground.is_grounded());
            rig.ch.force_state(state);
            rig.physics.teleport(rig.ch.body, Vec3::new(0.0, 20.0, 0.0), Quat::IDENTITY).unwrap();
            rig.tick();
            assert_eq!(rig.ch.state_id(), CharacterStateId::Falling, "{id:?} did not fall");
        }
    }

    #[test]
    fn enter_key_requests_nearest_driver_seat() {
        let mut rig = Rig::new(0.55);
        rig.tick();
        rig.ch.handle_key("f", true);
        rig.tick();
        assert_eq!(
            rig.requests,
            vec![WorldRequest::EnterNearest { character: EntityId(1), role: SeatRole::Driver }]
        );
    }

    #[test]
    fn missing_body_is_an_error() {
        let mut rig = Rig::new(0.55);
        rig.physics.remove_body(rig.ch.body);
        let mut ctx = UpdateContext {
            physics: &mut rig.physics,
            seat_poses: &rig.poses,
            animations: &rig.clips,
            requests: &mut rig.requests,
        };
        assert!(matches!(update(&mut rig.ch, &mut ctx, DT), Err(SimError::MissingPhysicsBody(_))));
    }

    #[test]
    fn mouse_look_turns_view_not_body() {
        let mut rig = Rig::new(0.55);
        rig.ch.handle_mouse_move(500.0, 0.0);
        assert!((rig.ch.view_yaw - 1.0).abs() < 1e-5);
        assert_eq!(rig.ch.facing_yaw(), 0.0);
    }
}
