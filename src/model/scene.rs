use std::collections::{BTreeMap, HashMap};

use super::character::Character;
use super::entity::{EntityId, EntityKind};
use super::vehicle::{SeatPoses, SeatRef, Vehicle};
use crate::controller::input::{InputReceiver, ReceiverSource};
use crate::physics::PhysicsWorld;

/// An entity taken out of the registry.
#[derive(Debug)]
pub enum Removed {
    Character(Character),
    Vehicle(Vehicle),
}

/// Registry of live entities.
///
/// Ids are handed out in increasing order and never reused, so iterating
/// `order` visits entities in registration order.
#[derive(Debug, Default)]
pub struct Scene {
    order: BTreeMap<EntityId, EntityKind>,
    characters: HashMap<EntityId, Character>,
    vehicles: HashMap<EntityId, Vehicle>,
    next_id: u32,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    pub fn insert_character(&mut self, character: Character) {
        self.order.insert(character.id, EntityKind::Character);
        self.characters.insert(character.id, character);
    }

    pub fn insert_vehicle(&mut self, vehicle: Vehicle) {
        self.order.insert(vehicle.id, EntityKind::Vehicle);
        self.vehicles.insert(vehicle.id, vehicle);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Removed> {
        match self.order.remove(&id)? {
            EntityKind::Character => self.characters.remove(&id).map(Removed::Character),
            EntityKind::Vehicle => self.vehicles.remove(&id).map(Removed::Vehicle),
        }
    }

    /// Snapshot of the current ids; safe to hold while entities are added or removed.
    pub fn ids(&self) -> Vec<EntityId> {
        self.order.keys().copied().collect()
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.order.get(&id).copied()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.order.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn character(&self, id: EntityId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn character_mut(&mut self, id: EntityId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    pub fn vehicle(&self, id: EntityId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn vehicle_mut(&mut self, id: EntityId) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(&id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub fn occupant(&self, seat: SeatRef) -> Option<EntityId> {
        self.vehicles.get(&seat.vehicle)?.seat(seat.seat)?.occupant()
    }

    /// World-space pose of every seat, read from the vehicles' bodies.
    pub fn seat_poses(&self, physics: &PhysicsWorld) -> SeatPoses {
        let mut poses = SeatPoses::new();
        for vehicle in self.vehicles.values() {
            let Some(body) = physics.body(vehicle.body) else { continue };
            for index in 0..vehicle.seats.len() {
                if let Some(pose) = vehicle.seat_pose_at(index, body.position, body.rotation, body.linear_velocity) {
                    poses.insert(SeatRef::new(vehicle.id, index), pose);
                }
            }
        }
        poses
    }
}

impl ReceiverSource for Scene {
    fn receiver_mut(&mut self, id: EntityId) -> Option<&mut dyn InputReceiver> {
        match self.order.get(&id)? {
            EntityKind::Character => self
                .characters
                .get_mut(&id)
                .filter(|c| !c.is_ghost())
                .map(|c| c as &mut dyn InputReceiver),
            EntityKind::Vehicle => self
                .vehicles
                .get_mut(&id)
                .filter(|v| !v.is_ghost())
                .map(|v| v as &mut dyn InputReceiver),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CharacterConfig;
    use crate::physics::BodyHandle;
    use glam::Vec3;

    #[test]
    fn ids_are_unique_and_ordered() {
        let mut scene = Scene::new();
        let a = scene.allocate_id();
        let b = scene.allocate_id();
        scene.insert_character(Character::new(b, BodyHandle::from_raw_parts(1, 0), Vec3::ZERO, CharacterConfig::default()));
        scene.insert_character(Character::new(a, BodyHandle::from_raw_parts(0, 0), Vec3::ZERO, CharacterConfig::default()));
        assert_eq!(scene.ids(), vec![a, b]);
        assert!(matches!(scene.remove(a), Some(Removed::Character(_))));
        assert!(scene.remove(a).is_none());
        assert_ne!(scene.allocate_id(), a);
    }

    #[test]
    fn ghosts_do_not_take_input() {
        let mut scene = Scene::new();
        let id = scene.allocate_id();
        let mut ch = Character::new(id, BodyHandle::from_raw_parts(0, 0), Vec3::ZERO, CharacterConfig::default());
        ch.set_ghost(true);
        scene.insert_character(ch);
        assert!(scene.receiver_mut(id).is_none());
    }
}
