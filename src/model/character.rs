use glam::{Quat, Vec3};
use tracing::{debug, warn};

use super::entity::EntityId;
use super::event::SimEvent;
use super::spring::{RelativeSpringSimulator, VectorSpringSimulator};
use super::state::{CharacterState, CharacterStateId};
use super::vehicle::SeatRef;
use crate::config::CharacterConfig;
use crate::error::{SimError, SimResult};
use crate::controller::input::{ActionSet, CharacterAction};
use crate::physics::BodyHandle;
use crate::utils::{forward_from_yaw, right_from_yaw, yaw_to_quat};

/// Result of the downward ground ray. Missing ground is a normal
/// condition the state machine reacts to, not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum GroundContact {
    Grounded {
        point: Vec3,
        normal: Vec3,
        /// Body stood on, `None` for static geometry.
        body: Option<BodyHandle>,
    },
    #[default]
    NoGroundContact,
}

impl GroundContact {
    pub fn is_grounded(&self) -> bool {
        matches!(self, GroundContact::Grounded { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Character {
    pub id: EntityId,
    pub body: BodyHandle,
    /// Body centre, mirrored from physics while the body is enabled.
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    /// Downward speed seen by the last ground ray, before contacts
    /// could cancel it. Drives the landing choice.
    pub fall_speed: f32,
    /// Smoothed local velocity as a fraction of move speed (+X forward).
    pub velocity_simulator: VectorSpringSimulator,
    pub rotation_simulator: RelativeSpringSimulator,
    pub arcade_velocity_target: Vec3,
    /// Yaw the rotation spring is heading for.
    pub orientation_target: f32,
    pub view_yaw: f32,
    pub view_pitch: f32,
    pub ground: GroundContact,
    pub actions: ActionSet<CharacterAction>,
    pub config: CharacterConfig,
    pub(crate) wants_to_jump: bool,
    state: CharacterState,
    physics_enabled: bool,
    ghost: bool,
    outbox: Vec<SimEvent>,
    pending_animation: Option<&'static str>,
}

impl Character {
    pub fn new(id: EntityId, body: BodyHandle, position: Vec3, config: CharacterConfig) -> Self {
        Self {
            id,
            body,
            position,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            fall_speed: 0.0,
            velocity_simulator: VectorSpringSimulator::new(config.velocity_spring),
            rotation_simulator: RelativeSpringSimulator::new(config.rotation_spring),
            arcade_velocity_target: Vec3::ZERO,
            orientation_target: 0.0,
            view_yaw: 0.0,
            view_pitch: 0.0,
            ground: GroundContact::NoGroundContact,
            actions: ActionSet::default(),
            config,
            wants_to_jump: false,
            state: CharacterState::Idle,
            physics_enabled: true,
            ghost: false,
            outbox: Vec::new(),
            pending_animation: Some(CharacterStateId::Idle.animation()),
        }
    }

    pub fn state(&self) -> &CharacterState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut CharacterState {
        &mut self.state
    }

    pub fn state_id(&self) -> CharacterStateId {
        self.state.id()
    }

    /// Transition along the state graph. Illegal transitions are logged and
    /// leave the current state untouched.
    pub fn try_set_state(&mut self, next: CharacterState) -> SimResult<()> {
        let (from, to) = (self.state.id(), next.id());
        let replicated = matches!(self.state, CharacterState::Replicated { .. })
            || matches!(next, CharacterState::Replicated { .. });
        if !replicated && !from.can_transition_to(to) {
            warn!(entity = %self.id, ?from, ?to, "rejected state transition");
            self.outbox.push(SimEvent::TransitionRejected { entity: self.id, from, to });
            return Err(SimError::InvalidStateTransition { from, to });
        }
        self.enter(next);
        Ok(())
    }

    pub fn set_state(&mut self, next: CharacterState) -> bool {
        self.try_set_state(next).is_ok()
    }

    /// Skip the graph check. Only for vehicle removal and replication.
    pub(crate) fn force_state(&mut self, next: CharacterState) {
        debug!(entity = %self.id, from = ?self.state.id(), to = ?next.id(), "forced state change");
        self.enter(next);
    }

    fn enter(&mut self, next: CharacterState) {
        let (from, to) = (self.state.id(), next.id());
        debug!(entity = %self.id, ?from, ?to, "state change");
        self.outbox.push(SimEvent::StateChanged { entity: self.id, from, to });
        self.pending_animation = Some(to.animation());
        self.wants_to_jump = false;

        let cfg = &self.config;
        match &next {
            CharacterState::Idle
            | CharacterState::EndWalk { .. }
            | CharacterState::JumpIdle { .. }
            | CharacterState::DropIdle { .. } => self.arcade_velocity_target = Vec3::ZERO,
            CharacterState::StartWalk { .. } | CharacterState::Walk | CharacterState::DropRunning { .. } => {
                self.arcade_velocity_target = Vec3::X * cfg.walk_multiplier
            }
            CharacterState::Sprint => self.arcade_velocity_target = Vec3::X * cfg.sprint_multiplier,
            CharacterState::DropRolling { .. } => self.arcade_velocity_target = Vec3::X * cfg.roll_multiplier,
            // Keep the run-up speed through the jump.
            CharacterState::JumpRunning { .. } => self.arcade_velocity_target = self.velocity_simulator.position,
            CharacterState::Falling | CharacterState::Replicated { .. } => {}
            _ => {
                self.arcade_velocity_target = Vec3::ZERO;
                self.velocity_simulator.reset(Vec3::ZERO);
            }
        }
        self.state = next;
    }

    pub fn seat(&self) -> Option<SeatRef> {
        self.state.seat()
    }

    pub fn facing_yaw(&self) -> f32 {
        self.rotation_simulator.position
    }

    pub fn orientation(&self) -> Quat {
        yaw_to_quat(self.facing_yaw())
    }

    /// Snap facing without spring travel.
    pub fn set_facing(&mut self, yaw: f32) {
        self.rotation_simulator.reset(yaw);
        self.orientation_target = self.rotation_simulator.position;
    }

    /// Ghosts never simulate; the seated/free flag underneath survives
    /// the ghost period.
    pub fn physics_enabled(&self) -> bool {
        self.physics_enabled && !self.ghost
    }

    pub(crate) fn set_physics_enabled(&mut self, enabled: bool) {
        self.physics_enabled = enabled;
    }

    pub fn is_ghost(&self) -> bool {
        self.ghost
    }

    pub(crate) fn set_ghost(&mut self, ghost: bool) {
        self.ghost = ghost;
    }

    /// Movement input as (forward, 0, right), each component -1, 0 or 1.
    pub fn local_input(&self) -> Vec3 {
        let axis = |pos: CharacterAction, neg: CharacterAction| {
            (self.actions.is_pressed(pos) as i32 - self.actions.is_pressed(neg) as i32) as f32
        };
        Vec3::new(
            axis(CharacterAction::Up, CharacterAction::Down),
            0.0,
            axis(CharacterAction::Right, CharacterAction::Left),
        )
    }

    /// Camera-relative movement direction in the ground plane.
    pub fn input_direction(&self) -> Option<Vec3> {
        let local = self.local_input();
        if local == Vec3::ZERO {
            return None;
        }
        let world = forward_from_yaw(self.view_yaw) * local.x + right_from_yaw(self.view_yaw) * local.z;
        world.try_normalize()
    }

    pub fn has_direction(&self) -> bool {
        self.input_direction().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.actions.is_pressed(CharacterAction::Run)
    }

    /// Velocity the springs currently ask for, in world space.
    pub fn desired_velocity(&self) -> Vec3 {
        self.orientation() * (self.velocity_simulator.position * self.config.move_speed)
    }

    pub(crate) fn take_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn take_pending_animation(&mut self) -> Option<&'static str> {
        self.pending_animation.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character() -> Character {
        Character::new(EntityId(1), BodyHandle::from_raw_parts(0, 0), Vec3::ZERO, CharacterConfig::default())
    }

    #[test]
    fn illegal_transition_is_rejected_and_reported() {
        let mut ch = character();
        ch.take_events();
        let result = ch.try_set_state(CharacterState::Driving {
            seat: SeatRef::new(EntityId(2), 0),
        });
        assert!(matches!(
            result,
            Err(SimError::InvalidStateTransition {
                from: CharacterStateId::Idle,
                to: CharacterStateId::Driving
            })
        ));
        assert_eq!(ch.state_id(), CharacterStateId::Idle);
        assert!(matches!(ch.take_events().as_slice(), [SimEvent::TransitionRejected { .. }]));
    }

    #[test]
    fn ghosting_suspends_physics_and_restores_it() {
        let mut ch = character();
        ch.set_ghost(true);
        assert!(!ch.physics_enabled());
        ch.set_ghost(false);
        assert!(ch.physics_enabled());

        ch.set_physics_enabled(false);
        ch.set_ghost(true);
        ch.set_ghost(false);
        assert!(!ch.physics_enabled(), "a seated character stays parked");
    }

    #[test]
    fn walking_sets_arcade_target_and_animation() {
        let mut ch = character();
        ch.take_pending_animation();
        assert!(ch.set_state(CharacterState::Walk));
        assert_eq!(ch.arcade_velocity_target, Vec3::X * 0.8);
        assert_eq!(ch.take_pending_animation(), Some("walk"));
        assert!(ch.set_state(CharacterState::Sprint));
        assert_eq!(ch.arcade_velocity_target, Vec3::X * 1.4);
    }

    #[test]
    fn input_direction_is_camera_relative() {
        let mut ch = character();
        assert!(ch.input_direction().is_none());
        ch.actions.set(CharacterAction::Up, true);
        ch.view_yaw = std::f32::consts::FRAC_PI_2;
        let dir = ch.input_direction().unwrap();
        assert!(dir.distance(Vec3::Z) < 1e-5);
        ch.actions.set(CharacterAction::Down, true);
        assert!(!ch.has_direction(), "opposite keys cancel");
    }
}
