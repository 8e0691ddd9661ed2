// FRAME LOOP: fixed steps, entity registry and input focus

use std::collections::VecDeque;

use glam::{Quat, Vec3};
use tracing::{debug, error, info, warn};

use super::animation::{AnimationProvider, ClipTable, DEFAULT_FADE};
use super::input::{InputEvent, InputFocus, InputRouter};
use super::seats::WorldRequest;
use super::UpdateContext;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::model::{
    Character, CharacterState, EntityId, EntityKind, EntitySnapshot, Removed, Scene, SeatRef, SimEvent, Updatable,
    Vehicle, VehicleBlueprint, VehicleKind, WorldSnapshot,
};
use crate::physics::{BodyDesc, BodyHandle, PhysicsWorld, Shape};
use crate::utils::{yaw_of, yaw_to_quat};

/// Deferred mutations, applied at the start of the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldCommand {
    SpawnCharacter { position: Vec3 },
    SpawnVehicle { kind: VehicleKind, position: Vec3, yaw: f32 },
    Despawn(EntityId),
    SetGhost { entity: EntityId, ghost: bool },
    ApplyRemote(EntitySnapshot),
}

/// What one call to [`SimulationWorld::frame`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub steps: u32,
    /// Simulated seconds, `steps * fixed_delta`.
    pub simulated: f32,
    /// Interpolation factor between the last two physics states.
    pub alpha: f32,
}

pub struct SimulationWorld {
    pub(crate) config: SimConfig,
    pub(crate) physics: PhysicsWorld,
    pub(crate) scene: Scene,
    pub(crate) router: InputRouter,
    pub(crate) animations: Box<dyn AnimationProvider>,
    pub(crate) events: Vec<SimEvent>,
    commands: VecDeque<WorldCommand>,
    accumulator: f32,
    alpha: f32,
    tick: u64,
    initial_focus_given: bool,
}

impl SimulationWorld {
    /// Static geometry is added by the host through `physics_mut`.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let physics = PhysicsWorld::new(config.physics.gravity);
        let animations = Box::new(ClipTable::from_config(&config.animations));
        info!(physics_hz = config.time.physics_hz, "simulation world created");
        Ok(Self {
            config,
            physics,
            scene: Scene::new(),
            router: InputRouter::new(),
            animations,
            events: Vec::new(),
            commands: VecDeque::new(),
            accumulator: 0.0,
            alpha: 0.0,
            tick: 0,
            initial_focus_given: false,
        })
    }

    pub fn with_animation_provider(mut self, provider: Box<dyn AnimationProvider>) -> Self {
        self.animations = provider;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn character(&self, id: EntityId) -> Option<&Character> {
        self.scene.character(id)
    }

    pub fn vehicle(&self, id: EntityId) -> Option<&Vehicle> {
        self.scene.vehicle(id)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn focus(&self) -> InputFocus {
        self.router.focus()
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    // Entities ---------------------------------------------------------------

    /// The first character ever spawned receives input focus.
    pub fn spawn_character(&mut self, position: Vec3) -> SimResult<EntityId> {
        let cfg = &self.config.character;
        let shape = Shape::Capsule {
            radius: cfg.capsule_radius,
            half_height: cfg.capsule_half_height,
        };
        let desc = BodyDesc::new(shape, cfg.mass).fixed_rotation().at(position, Quat::IDENTITY);
        let body = self.physics.add_body(desc)?;
        self.attach_character(body)
    }

    /// Register a character on an existing body.
    pub fn attach_character(&mut self, body: BodyHandle) -> SimResult<EntityId> {
        let id = self.scene.allocate_id();
        let position = self.physics.body(body).ok_or(SimError::MissingPhysicsBody(id))?.position;
        let character = Character::new(id, body, position, self.config.character.clone());
        self.scene.insert_character(character);
        info!(entity = %id, %body, "character spawned");
        self.events.push(SimEvent::Spawned { entity: id, kind: EntityKind::Character });

        if !self.initial_focus_given {
            self.initial_focus_given = true;
            self.set_receiver(InputFocus::Entity(id));
        }
        Ok(id)
    }

    pub fn spawn_vehicle(&mut self, kind: VehicleKind, position: Vec3, yaw: f32) -> SimResult<EntityId> {
        let blueprint = VehicleBlueprint::for_kind(kind, &self.config.vehicles);
        let rotation = yaw_to_quat(yaw);
        let mut desc = BodyDesc::new(blueprint.shape.clone(), blueprint.mass)
            .at(position, rotation)
            .damping(blueprint.linear_damping, blueprint.angular_damping);
        desc.friction = blueprint.friction;
        let body = self.physics.add_body(desc)?;

        let id = self.scene.allocate_id();
        let mut vehicle = Vehicle::new(id, body, blueprint, self.config.vehicles.clone());
        vehicle.position = position;
        vehicle.rotation = rotation;
        vehicle.mouse_sensitivity = self.config.character.mouse_sensitivity;
        self.scene.insert_vehicle(vehicle);
        info!(entity = %id, ?kind, %body, "vehicle spawned");
        self.events.push(SimEvent::Spawned { entity: id, kind: EntityKind::Vehicle });
        Ok(id)
    }

    /// Occupants of a removed vehicle are put back on foot.
    pub fn despawn(&mut self, id: EntityId) -> SimResult<()> {
        match self.scene.kind(id).ok_or(SimError::UnknownEntity(id))? {
            EntityKind::Character => {
                if let Some(seat) = self.seat_of(id) {
                    let driver = self.is_driver_seat(seat);
                    if let Some(vehicle) = self.scene.vehicle_mut(seat.vehicle) {
                        if driver {
                            vehicle.set_controlled(false);
                        }
                        if let Some(slot) = vehicle.seat_mut(seat.seat) {
                            slot.set_occupant(None);
                        }
                    }
                    // Nobody is left to drive it.
                    if driver && self.router.focus() == InputFocus::Entity(seat.vehicle) {
                        self.set_receiver(InputFocus::NoOp);
                    }
                }
            }
            EntityKind::Vehicle => {
                let occupants: Vec<EntityId> = self
                    .scene
                    .vehicle(id)
                    .map(|v| v.seats.iter().filter_map(|s| s.occupant()).collect())
                    .unwrap_or_default();
                for occupant in occupants {
                    if let Err(reason) = self.release_seat(occupant) {
                        warn!(entity = %occupant, %reason, "could not evict occupant");
                    }
                    if let Some(ch) = self.scene.character_mut(occupant) {
                        ch.force_state(CharacterState::Falling);
                    }
                }
            }
        }

        let body = match self.scene.remove(id) {
            Some(Removed::Character(c)) => c.body,
            Some(Removed::Vehicle(v)) => v.body,
            None => return Err(SimError::UnknownEntity(id)),
        };
        self.physics.remove_body(body);
        self.animations.forget(id);
        self.clear_focus_of(id);
        info!(entity = %id, "entity despawned");
        self.events.push(SimEvent::Despawned { entity: id });
        Ok(())
    }

    pub fn enqueue(&mut self, command: WorldCommand) {
        self.commands.push_back(command);
    }

    fn apply_command(&mut self, command: WorldCommand) {
        let result = match command {
            WorldCommand::SpawnCharacter { position } => self.spawn_character(position).map(drop),
            WorldCommand::SpawnVehicle { kind, position, yaw } => self.spawn_vehicle(kind, position, yaw).map(drop),
            WorldCommand::Despawn(id) => self.despawn(id),
            WorldCommand::SetGhost { entity, ghost } => self.set_ghost(entity, ghost),
            WorldCommand::ApplyRemote(snapshot) => self.apply_remote(&snapshot),
        };
        if let Err(err) = result {
            warn!(%err, "world command failed");
        }
    }

    // Input ------------------------------------------------------------------

    pub fn handle_input(&mut self, event: &InputEvent) {
        self.router.route(event, &mut self.scene);
    }

    /// Move input focus. Returns the previous focus.
    pub fn set_receiver(&mut self, focus: InputFocus) -> InputFocus {
        let previous = self.router.set_receiver(focus, &mut self.scene);
        if previous != focus {
            self.events.push(SimEvent::FocusChanged { from: previous, to: focus });
        }
        previous
    }

    /// Give input back to `character` after a UI capture. A character in a
    /// driver seat hands it on to the vehicle.
    pub fn restore_control(&mut self, character: EntityId) -> SimResult<()> {
        let ch = self.scene.character(character).ok_or(SimError::UnknownEntity(character))?;
        let in_vehicle = ch.state_id().is_in_vehicle();
        let focus = match self.seat_of(character) {
            Some(seat) if in_vehicle && self.is_driver_seat(seat) => InputFocus::Entity(seat.vehicle),
            _ => InputFocus::Entity(character),
        };
        self.set_receiver(focus);
        Ok(())
    }

    fn is_driver_seat(&self, seat: SeatRef) -> bool {
        self.scene
            .vehicle(seat.vehicle)
            .and_then(|v| v.seat(seat.seat))
            .is_some_and(|s| s.is_driver())
    }

    fn clear_focus_of(&mut self, id: EntityId) {
        let before = self.router.focus();
        self.router.clear_if_focused(id);
        let after = self.router.focus();
        if before != after {
            self.events.push(SimEvent::FocusChanged { from: before, to: after });
        }
    }

    // Time -------------------------------------------------------------------

    /// Advance by a real frame delta. The delta is capped so one frame never
    /// simulates more than `max_frame_delta`; any backlog beyond
    /// `max_substeps` steps is dropped.
    pub fn frame(&mut self, real_delta: f32) -> FrameReport {
        let time = &self.config.time;
        let dt = time.fixed_delta();
        let max_substeps = time.max_substeps;
        let delta = if real_delta.is_finite() { real_delta.clamp(0.0, time.max_frame_delta) } else { 0.0 };
        self.accumulator += delta * time.time_scale;

        let mut steps = 0;
        while self.accumulator >= dt && steps < max_substeps {
            self.step();
            self.accumulator -= dt;
            steps += 1;
        }
        if self.accumulator >= dt {
            debug!(backlog = self.accumulator, "dropping simulation backlog");
            self.accumulator = self.accumulator.rem_euclid(dt);
        }
        self.alpha = (self.accumulator / dt).clamp(0.0, 1.0);

        FrameReport {
            steps,
            simulated: steps as f32 * dt,
            alpha: self.alpha,
        }
    }

    /// One fixed step.
    pub fn step(&mut self) {
        let dt = self.config.time.fixed_delta();
        while let Some(command) = self.commands.pop_front() {
            self.apply_command(command);
        }

        self.physics.step(dt);
        let seat_poses = self.scene.seat_poses(&self.physics);

        let mut requests: Vec<WorldRequest> = Vec::new();
        let mut broken = Vec::new();
        for id in self.scene.ids() {
            let mut ctx = UpdateContext {
                physics: &mut self.physics,
                seat_poses: &seat_poses,
                animations: self.animations.as_ref(),
                requests: &mut requests,
            };
            let result = match self.scene.kind(id) {
                Some(EntityKind::Character) => self.scene.character_mut(id).map_or(Ok(()), |c| c.update(&mut ctx, dt)),
                Some(EntityKind::Vehicle) => self.scene.vehicle_mut(id).map_or(Ok(()), |v| v.update(&mut ctx, dt)),
                None => Ok(()),
            };
            if let Err(err) = result {
                error!(entity = %id, %err, "entity update failed, removing it");
                broken.push(id);
            }
        }
        for id in broken {
            if let Err(err) = self.despawn(id) {
                error!(entity = %id, %err, "could not remove broken entity");
            }
        }

        for request in requests {
            self.apply_request(request);
        }
        self.collect_entity_output();

        for id in self.scene.ids() {
            if let Some(ch) = self.scene.character_mut(id) {
                ch.actions.end_tick();
            } else if let Some(v) = self.scene.vehicle_mut(id) {
                v.actions.end_tick();
            }
        }
        self.tick += 1;
    }

    fn collect_entity_output(&mut self) {
        for id in self.scene.ids() {
            let Some(ch) = self.scene.character_mut(id) else { continue };
            let events = ch.take_events();
            let clip = ch.take_pending_animation();
            self.events.extend(events);
            if let Some(clip) = clip {
                self.animations.play(id, clip, DEFAULT_FADE);
                self.events.push(SimEvent::AnimationRequested {
                    entity: id,
                    clip: clip.to_string(),
                    fade: DEFAULT_FADE,
                });
            }
        }
    }

    // Presentation and replication -------------------------------------------

    /// Interpolated transform for rendering. Seated characters ride on the
    /// vehicle's interpolated body.
    pub fn render_transform(&self, id: EntityId) -> Option<(Vec3, Quat)> {
        let alpha = self.alpha;
        match self.scene.kind(id)? {
            EntityKind::Vehicle => self.physics.interpolated_transform(self.scene.vehicle(id)?.body, alpha),
            EntityKind::Character => {
                let ch = self.scene.character(id)?;
                if ch.physics_enabled() {
                    return self.physics.interpolated_transform(ch.body, alpha);
                }
                match ch.state() {
                    CharacterState::Driving { seat } | CharacterState::Sitting { seat } => {
                        let vehicle = self.scene.vehicle(seat.vehicle)?;
                        let (position, rotation) = self.physics.interpolated_transform(vehicle.body, alpha)?;
                        let offset = vehicle.seat(seat.seat)?.offset;
                        Some((position + rotation * offset, rotation))
                    }
                    _ => Some((ch.position, ch.orientation())),
                }
            }
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let entities = self
            .scene
            .ids()
            .into_iter()
            .filter_map(|id| match self.scene.kind(id)? {
                EntityKind::Character => {
                    let ch = self.scene.character(id)?;
                    Some(EntitySnapshot {
                        id,
                        kind: EntityKind::Character,
                        position: ch.position,
                        rotation: ch.orientation(),
                        velocity: ch.velocity,
                        state: Some(ch.state_id()),
                        seat: self.seat_of(id),
                        vehicle_kind: None,
                    })
                }
                EntityKind::Vehicle => {
                    let v = self.scene.vehicle(id)?;
                    Some(EntitySnapshot {
                        id,
                        kind: EntityKind::Vehicle,
                        position: v.position,
                        rotation: v.rotation,
                        velocity: v.velocity,
                        state: None,
                        seat: None,
                        vehicle_kind: Some(v.kind),
                    })
                }
            })
            .collect();
        WorldSnapshot {
            tick: self.tick,
            entities,
        }
    }

    /// Ghosts keep their registry slot but their bodies are parked and they
    /// never hold input focus.
    pub fn set_ghost(&mut self, id: EntityId, ghost: bool) -> SimResult<()> {
        match self.scene.kind(id).ok_or(SimError::UnknownEntity(id))? {
            EntityKind::Character => {
                let ch = self.scene.character_mut(id).ok_or(SimError::UnknownEntity(id))?;
                ch.set_ghost(ghost);
                ch.actions.release_all();
                self.physics.set_enabled(ch.body, ch.physics_enabled())?;
                if !ghost && matches!(ch.state(), CharacterState::Replicated { .. }) {
                    ch.set_state(CharacterState::Falling);
                }
            }
            EntityKind::Vehicle => {
                let v = self.scene.vehicle_mut(id).ok_or(SimError::UnknownEntity(id))?;
                v.set_ghost(ghost);
                v.set_controlled(false);
                v.actions.release_all();
                self.physics.set_enabled(v.body, !ghost)?;
            }
        }
        if ghost {
            self.clear_focus_of(id);
        }
        debug!(entity = %id, ghost, "ghost flag changed");
        Ok(())
    }

    /// Write remote state onto an entity, turning it into a ghost first.
    pub fn apply_remote(&mut self, snapshot: &EntitySnapshot) -> SimResult<()> {
        let id = snapshot.id;
        let is_ghost = match self.scene.kind(id).ok_or(SimError::UnknownEntity(id))? {
            EntityKind::Character => self.scene.character(id).is_some_and(Character::is_ghost),
            EntityKind::Vehicle => self.scene.vehicle(id).is_some_and(Vehicle::is_ghost),
        };
        if !is_ghost {
            self.set_ghost(id, true)?;
        }

        let body = if let Some(ch) = self.scene.character_mut(id) {
            ch.position = snapshot.position;
            ch.velocity = snapshot.velocity;
            ch.set_facing(yaw_of(snapshot.rotation));
            if let Some(state) = snapshot.state {
                if ch.state_id() != state || !matches!(ch.state(), CharacterState::Replicated { .. }) {
                    ch.set_state(CharacterState::Replicated { id: state });
                }
            }
            ch.body
        } else if let Some(v) = self.scene.vehicle_mut(id) {
            v.position = snapshot.position;
            v.rotation = snapshot.rotation;
            v.velocity = snapshot.velocity;
            v.body
        } else {
            return Err(SimError::UnknownEntity(id));
        };

        self.physics.teleport(body, snapshot.position, snapshot.rotation)?;
        self.physics.set_linear_velocity(body, snapshot.velocity)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::StaticCollider;

    fn world() -> SimulationWorld {
        let mut world = SimulationWorld::new(SimConfig::default()).unwrap();
        world.physics_mut().add_static(StaticCollider::ground(0.0));
        world
    }

    #[test]
    fn frame_steps_are_bounded() {
        let mut world = world();
        let report = world.frame(5.0);
        assert!(report.steps <= world.config().time.max_substeps);
        assert!(report.simulated <= world.config().time.max_frame_delta + 1e-6);
        assert_eq!(world.tick_count(), report.steps as u64);
        assert!((0.0..=1.0).contains(&report.alpha));
    }

    #[test]
    fn small_frames_accumulate() {
        let mut world = world();
        let dt = world.config().time.fixed_delta();
        assert_eq!(world.frame(dt * 0.6).steps, 0);
        assert_eq!(world.frame(dt * 0.6).steps, 1);
        assert!(world.alpha() > 0.1 && world.alpha() < 0.3);
    }

    #[test]
    fn bad_deltas_are_ignored() {
        let mut world = world();
        assert_eq!(world.frame(f32::NAN).steps, 0);
        assert_eq!(world.frame(-1.0).steps, 0);
    }

    #[test]
    fn first_character_gets_focus() {
        let mut world = world();
        let first = world.spawn_character(Vec3::new(0.0, 0.6, 0.0)).unwrap();
        let _second = world.spawn_character(Vec3::new(3.0, 0.6, 0.0)).unwrap();
        assert_eq!(world.focus(), InputFocus::Entity(first));
        assert!(world
            .drain_events()
            .contains(&SimEvent::FocusChanged { from: InputFocus::NoOp, to: InputFocus::Entity(first) }));
    }

    #[test]
    fn queued_commands_apply_at_tick_start() {
        let mut world = world();
        world.enqueue(WorldCommand::SpawnCharacter { position: Vec3::new(0.0, 0.6, 0.0) });
        assert!(world.scene().is_empty());
        world.step();
        assert_eq!(world.scene().len(), 1);
    }

    #[test]
    fn attach_without_body_registers_nothing() {
        let mut world = world();
        let body = world
            .physics_mut()
            .add_body(BodyDesc::new(Shape::Sphere { radius: 0.3 }, 1.0))
            .unwrap();
        world.physics_mut().remove_body(body);
        assert!(matches!(world.attach_character(body), Err(SimError::MissingPhysicsBody(_))));
        assert!(world.scene().is_empty());
    }

    #[test]
    fn despawning_focused_character_clears_focus() {
        let mut world = world();
        let id = world.spawn_character(Vec3::new(0.0, 0.6, 0.0)).unwrap();
        world.despawn(id).unwrap();
        assert_eq!(world.focus(), InputFocus::NoOp);
        assert_eq!(world.physics().body_count(), 0);
        assert!(matches!(world.despawn(id), Err(SimError::UnknownEntity(_))));
    }

    #[test]
    fn despawn_tells_the_animation_provider() {
        use std::cell::RefCell;
        use std::rc::Rc;

        #[derive(Default)]
        struct Recorder {
            playing: Rc<RefCell<Vec<EntityId>>>,
        }

        impl AnimationProvider for Recorder {
            fn clip_length(&self, _clip: &str) -> Option<f32> {
                Some(0.5)
            }

            fn play(&mut self, entity: EntityId, _clip: &str, _fade: f32) {
                self.playing.borrow_mut().push(entity);
            }

            fn forget(&mut self, entity: EntityId) {
                self.playing.borrow_mut().retain(|&e| e != entity);
            }
        }

        let recorder = Recorder::default();
        let playing = Rc::clone(&recorder.playing);
        let mut world = world().with_animation_provider(Box::new(recorder));
        let id = world.spawn_character(Vec3::new(0.0, 0.6, 0.0)).unwrap();
        world.step();
        assert!(playing.borrow().contains(&id));
        world.despawn(id).unwrap();
        assert!(playing.borrow().is_empty());
    }

    #[test]
    fn update_loop_tolerates_spawns_from_commands() {
        let mut world = world();
        world.spawn_character(Vec3::new(0.0, 0.6, 0.0)).unwrap();
        for i in 0..5 {
            world.enqueue(WorldCommand::SpawnCharacter { position: Vec3::new(i as f32 * 2.0, 0.6, 4.0) });
            world.step();
        }
        assert_eq!(world.scene().len(), 6);
    }

    #[test]
    fn state_changes_request_animations() {
        let mut world = world();
        let id = world.spawn_character(Vec3::new(0.0, 0.6, 0.0)).unwrap();
        world.step();
        let events = world.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            SimEvent::AnimationRequested { entity, clip, .. } if *entity == id && clip == "idle"
        )));
    }

    #[test]
    fn remote_snapshot_drives_ghost() {
        let mut world = world();
        let id = world.spawn_character(Vec3::new(0.0, 0.6, 0.0)).unwrap();
        let mut remote = world.snapshot().entity(id).cloned().unwrap();
        remote.position = Vec3::new(5.0, 2.0, 1.0);
        remote.state = Some(crate::model::CharacterStateId::Sprint);
        world.apply_remote(&remote).unwrap();
        world.step();

        let ch = world.character(id).unwrap();
        assert!(ch.is_ghost());
        assert!(!ch.physics_enabled());
        assert!(!world.physics().body(ch.body).unwrap().is_enabled());
        assert_eq!(ch.position, Vec3::new(5.0, 2.0, 1.0));
        assert_eq!(ch.state_id(), crate::model::CharacterStateId::Sprint);
        assert_eq!(world.focus(), InputFocus::NoOp);
        let snap = world.snapshot();
        assert_eq!(snap.entity(id).and_then(|e| e.state), Some(crate::model::CharacterStateId::Sprint));

        world.set_ghost(id, false).unwrap();
        let ch = world.character(id).unwrap();
        assert!(ch.physics_enabled());
        assert!(world.physics().body(ch.body).unwrap().is_enabled());
        assert_eq!(ch.state_id(), crate::model::CharacterStateId::Falling);
    }

    #[test]
    fn despawning_vehicle_evicts_occupants() {
        let mut world = world();
        let car = world.spawn_vehicle(VehicleKind::Car, Vec3::new(0.0, 0.8, 0.0), 0.0).unwrap();
        let entry = world.vehicle(car).and_then(|v| v.seat_pose(0)).unwrap().entry_point;
        let ch = world.spawn_character(entry).unwrap();
        world.request_seat(ch, crate::model::SeatRef::new(car, 0)).unwrap();
        world.despawn(car).unwrap();

        let character = world.character(ch).unwrap();
        assert!(character.physics_enabled());
        assert_eq!(character.state_id(), crate::model::CharacterStateId::Falling);
        assert_eq!(world.focus(), InputFocus::Entity(ch));
    }
}
