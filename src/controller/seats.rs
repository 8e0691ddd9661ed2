// Seat requests are gathered during updates and applied after every entity ran.

use glam::Vec3;
use tracing::{debug, info, warn};

use super::frame_loop::SimulationWorld;
use super::input::InputFocus;
use crate::error::SeatDenied;
use crate::model::state::EntryAnchor;
use crate::model::{CharacterState, CharacterStateId, EntityId, GroundContact, SeatPose, SeatRef, SeatRole, SimEvent};

/// How far above the exit point the standing ray starts.
const EXIT_RAY_LIFT: f32 = 0.5;

/// Cross-entity effects produced during an update.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldRequest {
    /// Enter the nearest seat with the given role.
    EnterNearest { character: EntityId, role: SeatRole },
    ExitVehicle { character: EntityId },
    SwitchSeat { character: EntityId },
    /// The driver finished sitting down and takes over the vehicle.
    StartControlling { character: EntityId, seat: SeatRef },
    /// Exit animation done; hand the character back to physics.
    ReleaseSeat { character: EntityId },
    SetDoor { seat: SeatRef, open: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeatGrant {
    pub character: EntityId,
    pub seat: SeatRef,
    pub role: SeatRole,
    /// The seat's door was opened for the entry.
    pub door_opened: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeatRelease {
    pub character: EntityId,
    pub seat: SeatRef,
    pub exit_point: Vec3,
}

impl SimulationWorld {
    pub fn seat_of(&self, character: EntityId) -> Option<SeatRef> {
        self.scene
            .vehicles()
            .find_map(|v| v.seat_of(character).map(|index| SeatRef::new(v.id, index)))
    }

    /// Denials change nothing. A driver seat takes input focus from the character.
    pub fn request_seat(&mut self, character: EntityId, seat: SeatRef) -> Result<SeatGrant, SeatDenied> {
        let result = self.check_seat(character, seat).map(|pose| self.grant_seat(character, seat, pose));
        match &result {
            Ok(grant) => {
                info!(%character, vehicle = %seat.vehicle, seat = seat.seat, role = ?grant.role, "seat granted");
                self.events.push(SimEvent::SeatGranted { character, seat });
            }
            Err(reason) => {
                debug!(%character, vehicle = %seat.vehicle, seat = seat.seat, %reason, "seat denied");
                self.events.push(SimEvent::SeatDenied { character, reason: reason.clone() });
            }
        }
        result
    }

    fn check_seat(&self, character: EntityId, seat: SeatRef) -> Result<SeatPose, SeatDenied> {
        let ch = self
            .scene
            .character(character)
            .filter(|c| !c.is_ghost())
            .ok_or(SeatDenied::UnknownCharacter(character))?;
        if self.seat_of(character).is_some() {
            return Err(SeatDenied::AlreadySeated(character));
        }
        let state = ch.state_id();
        if !state.can_enter_vehicles() {
            return Err(SeatDenied::Unavailable(state));
        }

        let vehicle = self
            .scene
            .vehicle(seat.vehicle)
            .filter(|v| !v.is_ghost())
            .ok_or(SeatDenied::UnknownVehicle(seat.vehicle))?;
        let unknown_seat = SeatDenied::UnknownSeat { vehicle: seat.vehicle, seat: seat.seat };
        let slot = vehicle.seat(seat.seat).ok_or_else(|| unknown_seat.clone())?;
        if let Some(occupant) = slot.occupant() {
            return Err(SeatDenied::SeatOccupied { vehicle: seat.vehicle, seat: seat.seat, occupant });
        }

        let pose = vehicle.seat_pose(seat.seat).ok_or(unknown_seat)?;
        let range = ch.config.interaction_range;
        let distance = ch.position.distance(pose.entry_point);
        if distance > range {
            return Err(SeatDenied::OutOfInteractionRange { distance, range });
        }
        Ok(pose)
    }

    /// Apply a grant that `check_seat` already validated.
    fn grant_seat(&mut self, character: EntityId, seat: SeatRef, pose: SeatPose) -> SeatGrant {
        let mut door_opened = false;
        if let Some(slot) = self.scene.vehicle_mut(seat.vehicle).and_then(|v| v.seat_mut(seat.seat)) {
            slot.set_occupant(Some(character));
            if slot.has_door && !slot.door_open {
                slot.door_open = true;
                door_opened = true;
            }
        }
        if door_opened {
            self.events.push(SimEvent::DoorChanged { seat, open: true });
        }

        if let Some(ch) = self.scene.character_mut(character) {
            if let Err(err) = self.physics.set_enabled(ch.body, false) {
                warn!(%character, %err, "could not disable body for seat entry");
            }
            ch.set_physics_enabled(false);
            ch.ground = GroundContact::NoGroundContact;
            let anchor = EntryAnchor {
                position: ch.position,
                yaw: ch.facing_yaw(),
            };
            let next = if door_opened {
                CharacterState::OpenVehicleDoor { seat, timer: 0.0, anchor }
            } else {
                CharacterState::EnteringVehicle { seat, timer: 0.0, anchor }
            };
            ch.set_state(next);
        }

        if pose.role == SeatRole::Driver && self.router.focus() == InputFocus::Entity(character) {
            self.set_receiver(InputFocus::Entity(seat.vehicle));
        }

        SeatGrant {
            character,
            seat,
            role: pose.role,
            door_opened,
        }
    }

    /// Take `character` out of its seat right away, at the seat's exit point.
    pub fn release_seat(&mut self, character: EntityId) -> Result<SeatRelease, SeatDenied> {
        let seat = self.seat_of(character).ok_or(SeatDenied::NotSeated(character))?;
        let vehicle = self
            .scene
            .vehicle_mut(seat.vehicle)
            .ok_or(SeatDenied::UnknownVehicle(seat.vehicle))?;
        let pose = vehicle
            .seat_pose(seat.seat)
            .ok_or(SeatDenied::UnknownSeat { vehicle: seat.vehicle, seat: seat.seat })?;
        let airborne = vehicle.kind.is_aircraft() && vehicle.airborne;
        let door_open = vehicle.seat(seat.seat).is_some_and(|s| s.door_open);
        let vehicle_body = vehicle.body;
        if pose.role == SeatRole::Driver {
            vehicle.set_controlled(false);
        }
        if let Some(slot) = vehicle.seat_mut(seat.seat) {
            slot.set_occupant(None);
        }

        let ch = self
            .scene
            .character_mut(character)
            .ok_or(SeatDenied::UnknownCharacter(character))?;

        // Stand on whatever is just below the exit point.
        let reach = ch.config.ray_cast_length;
        let ray_start = pose.exit_point + Vec3::Y * EXIT_RAY_LIFT;
        let mut exit_point = pose.exit_point;
        ch.ground = GroundContact::NoGroundContact;
        if let Some(hit) = self.physics.raycast(ray_start, Vec3::NEG_Y, reach + 2.0 * EXIT_RAY_LIFT, Some(vehicle_body)) {
            exit_point.y = hit.point.y + reach;
            ch.ground = GroundContact::Grounded {
                point: hit.point,
                normal: hit.normal,
                body: hit.body,
            };
        }

        let orientation = ch.orientation();
        let placed = self
            .physics
            .teleport(ch.body, exit_point, orientation)
            .and_then(|_| self.physics.set_linear_velocity(ch.body, pose.velocity));
        if let Err(err) = placed {
            warn!(%character, %err, "released character has no body");
        }
        if let Err(err) = self.physics.set_enabled(ch.body, true) {
            warn!(%character, %err, "could not re-enable body");
        }
        ch.set_physics_enabled(true);
        ch.position = exit_point;
        ch.velocity = pose.velocity;
        ch.velocity_simulator.reset(Vec3::ZERO);

        let next = if airborne {
            CharacterState::ExitingAirplane { seat, timer: 0.0 }
        } else if door_open {
            CharacterState::CloseVehicleDoorOutside { seat, timer: 0.0 }
        } else {
            CharacterState::Idle
        };
        if ch.state_id().can_transition_to(next.id()) {
            ch.set_state(next);
        } else {
            ch.force_state(next);
        }

        if self.router.focus() == InputFocus::Entity(seat.vehicle) {
            self.set_receiver(InputFocus::Entity(character));
        }

        info!(%character, vehicle = %seat.vehicle, seat = seat.seat, "seat released");
        self.events.push(SimEvent::SeatReleased { character, seat });
        Ok(SeatRelease {
            character,
            seat,
            exit_point,
        })
    }

    /// Pick the closest seat with `role`: a free one in range if there is
    /// one, otherwise the closest overall so the denial names the reason.
    pub(crate) fn enter_nearest(&mut self, character: EntityId, role: SeatRole) {
        let Some(ch) = self.scene.character(character) else { return };
        let (position, range) = (ch.position, ch.config.interaction_range);

        let mut free: Option<(f32, SeatRef)> = None;
        let mut any: Option<(f32, SeatRef)> = None;
        for vehicle in self.scene.vehicles().filter(|v| !v.is_ghost()) {
            for (index, seat) in vehicle.seats.iter().enumerate().filter(|(_, s)| s.role == role) {
                let Some(pose) = vehicle.seat_pose(index) else { continue };
                let candidate = (position.distance(pose.entry_point), SeatRef::new(vehicle.id, index));
                if any.map_or(true, |(d, _)| candidate.0 < d) {
                    any = Some(candidate);
                }
                if !seat.is_occupied() && free.map_or(true, |(d, _)| candidate.0 < d) {
                    free = Some(candidate);
                }
            }
        }

        let target = match (free, any) {
            (Some((distance, seat)), _) if distance <= range => seat,
            (_, Some((_, seat))) => seat,
            _ => {
                debug!(%character, ?role, "no seat to enter");
                return;
            }
        };
        // Outcome is reported through the event stream.
        let _ = self.request_seat(character, target);
    }

    /// Start leaving the current seat. Airborne aircraft drop the character
    /// immediately; everything else plays the exit first.
    pub(crate) fn begin_exit(&mut self, character: EntityId) -> Result<(), SeatDenied> {
        let seat = self.seat_of(character).ok_or(SeatDenied::NotSeated(character))?;
        let state = self
            .scene
            .character(character)
            .ok_or(SeatDenied::UnknownCharacter(character))?
            .state_id();
        if !matches!(state, CharacterStateId::Driving | CharacterStateId::Sitting) {
            return Err(SeatDenied::Unavailable(state));
        }

        let vehicle = self
            .scene
            .vehicle_mut(seat.vehicle)
            .ok_or(SeatDenied::UnknownVehicle(seat.vehicle))?;
        if vehicle.seat(seat.seat).is_some_and(|s| s.is_driver()) {
            vehicle.set_controlled(false);
        }
        if vehicle.kind.is_aircraft() && vehicle.airborne {
            self.release_seat(character)?;
            return Ok(());
        }

        let mut door_opened = false;
        if let Some(slot) = vehicle.seat_mut(seat.seat) {
            if slot.has_door && !slot.door_open {
                slot.door_open = true;
                door_opened = true;
            }
        }
        if door_opened {
            self.events.push(SimEvent::DoorChanged { seat, open: true });
        }
        if let Some(ch) = self.scene.character_mut(character) {
            ch.set_state(CharacterState::ExitingVehicle { seat, timer: 0.0 });
        }
        Ok(())
    }

    /// Move to the first free seat connected to the current one.
    pub(crate) fn switch_seat(&mut self, character: EntityId) -> Result<SeatRef, SeatDenied> {
        let from = self.seat_of(character).ok_or(SeatDenied::NotSeated(character))?;
        let state = self
            .scene
            .character(character)
            .ok_or(SeatDenied::UnknownCharacter(character))?
            .state_id();
        if !matches!(state, CharacterStateId::Driving | CharacterStateId::Sitting) {
            return Err(SeatDenied::Unavailable(state));
        }

        let vehicle = self
            .scene
            .vehicle_mut(from.vehicle)
            .ok_or(SeatDenied::UnknownVehicle(from.vehicle))?;
        let connected = vehicle.seats.get(from.seat).map(|s| s.connected.clone()).unwrap_or_default();
        let free = connected
            .iter()
            .copied()
            .find(|&i| vehicle.seat(i).is_some_and(|s| !s.is_occupied()));
        let Some(index) = free else {
            return Err(match connected.first().and_then(|&i| Some((i, vehicle.seat(i)?.occupant()?))) {
                Some((seat, occupant)) => SeatDenied::SeatOccupied { vehicle: from.vehicle, seat, occupant },
                None => SeatDenied::UnknownSeat { vehicle: from.vehicle, seat: from.seat },
            });
        };

        let to = SeatRef::new(from.vehicle, index);
        let was_driver = vehicle.seat(from.seat).is_some_and(|s| s.is_driver());
        let now_driver = vehicle.seat(index).is_some_and(|s| s.is_driver());
        if let Some(slot) = vehicle.seat_mut(from.seat) {
            slot.set_occupant(None);
        }
        if let Some(slot) = vehicle.seat_mut(index) {
            slot.set_occupant(Some(character));
        }
        if was_driver {
            vehicle.set_controlled(false);
        }
        if let Some(ch) = self.scene.character_mut(character) {
            ch.set_state(CharacterState::SwitchingSeats { from, to, timer: 0.0 });
        }

        let focus = self.router.focus();
        if was_driver && focus == InputFocus::Entity(from.vehicle) {
            self.set_receiver(InputFocus::Entity(character));
        } else if now_driver && focus == InputFocus::Entity(character) {
            self.set_receiver(InputFocus::Entity(from.vehicle));
        }

        debug!(%character, from = from.seat, to = to.seat, vehicle = %from.vehicle, "switched seats");
        self.events.push(SimEvent::SeatReleased { character, seat: from });
        self.events.push(SimEvent::SeatGranted { character, seat: to });
        Ok(to)
    }

    pub(crate) fn apply_request(&mut self, request: WorldRequest) {
        let denied = match request {
            WorldRequest::EnterNearest { character, role } => {
                self.enter_nearest(character, role);
                None
            }
            WorldRequest::ExitVehicle { character } => self.begin_exit(character).err().map(|r| (character, r)),
            WorldRequest::SwitchSeat { character } => self.switch_seat(character).err().map(|r| (character, r)),
            WorldRequest::ReleaseSeat { character } => self.release_seat(character).err().map(|r| (character, r)),
            WorldRequest::StartControlling { character, seat } => {
                match self.scene.vehicle_mut(seat.vehicle) {
                    Some(vehicle) if vehicle.seat(seat.seat).and_then(|s| s.occupant()) == Some(character) => {
                        vehicle.set_controlled(true);
                        debug!(%character, vehicle = %seat.vehicle, "driver took control");
                        if self.router.focus() == InputFocus::Entity(character) {
                            self.set_receiver(InputFocus::Entity(seat.vehicle));
                        }
                    }
                    _ => warn!(%character, vehicle = %seat.vehicle, "control request for a seat not held"),
                }
                None
            }
            WorldRequest::SetDoor { seat, open } => {
                let slot = self.scene.vehicle_mut(seat.vehicle).and_then(|v| v.seat_mut(seat.seat));
                if let Some(slot) = slot.filter(|s| s.has_door && s.door_open != open) {
                    slot.door_open = open;
                    self.events.push(SimEvent::DoorChanged { seat, open });
                }
                None
            }
        };

        if let Some((character, reason)) = denied {
            debug!(%character, %reason, "seat request denied");
            self.events.push(SimEvent::SeatDenied { character, reason });
        }
    }
}
