use std::collections::HashMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::entity::EntityId;
use super::spring::SpringSimulator;
use crate::config::VehicleConfig;
use crate::controller::input::{ActionSet, VehicleAction};
use crate::physics::{BodyHandle, Shape, ShapePart};
use crate::utils::yaw_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    Car,
    Helicopter,
    Airplane,
}

impl VehicleKind {
    pub fn is_aircraft(self) -> bool {
        matches!(self, VehicleKind::Helicopter | VehicleKind::Airplane)
    }
}

/// A seat on a specific vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatRef {
    pub vehicle: EntityId,
    pub seat: usize,
}

impl SeatRef {
    pub fn new(vehicle: EntityId, seat: usize) -> Self {
        Self { vehicle, seat }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatRole {
    Driver,
    Passenger,
}

/// Seat layout in vehicle-local space (+X forward, +Y up, +Z right).
#[derive(Debug, Clone, PartialEq)]
pub struct Seat {
    pub role: SeatRole,
    /// Where the character's body centre sits.
    pub offset: Vec3,
    pub entry_point: Vec3,
    pub exit_point: Vec3,
    pub has_door: bool,
    pub door_open: bool,
    /// Seats reachable by switching without leaving the vehicle.
    pub connected: Vec<usize>,
    occupant: Option<EntityId>,
}

impl Seat {
    pub fn new(role: SeatRole, offset: Vec3, entry_point: Vec3) -> Self {
        Self {
            role,
            offset,
            entry_point,
            exit_point: entry_point,
            has_door: false,
            door_open: false,
            connected: Vec::new(),
            occupant: None,
        }
    }

    pub fn with_door(mut self) -> Self {
        self.has_door = true;
        self
    }

    pub fn connected_to(mut self, seats: &[usize]) -> Self {
        self.connected = seats.to_vec();
        self
    }

    pub fn occupant(&self) -> Option<EntityId> {
        self.occupant
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    pub fn is_driver(&self) -> bool {
        self.role == SeatRole::Driver
    }

    pub(crate) fn set_occupant(&mut self, occupant: Option<EntityId>) {
        self.occupant = occupant;
    }
}

/// World-space seat placement, recomputed from the vehicle body every step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeatPose {
    pub role: SeatRole,
    pub door_open: bool,
    pub position: Vec3,
    pub entry_point: Vec3,
    pub exit_point: Vec3,
    pub rotation: Quat,
    pub yaw: f32,
    pub velocity: Vec3,
}

pub type SeatPoses = HashMap<SeatRef, SeatPose>;

/// Raycast suspension wheel.
#[derive(Debug, Clone, PartialEq)]
pub struct Wheel {
    /// Suspension top, vehicle-local.
    pub anchor: Vec3,
    pub steerable: bool,
    pub driven: bool,
    pub compression: f32,
    pub in_contact: bool,
    pub steer_angle: f32,
    /// Accumulated rotation for renderers.
    pub spin: f32,
}

impl Wheel {
    pub fn new(anchor: Vec3, steerable: bool, driven: bool) -> Self {
        Self {
            anchor,
            steerable,
            driven,
            compression: 0.0,
            in_contact: false,
            steer_angle: 0.0,
            spin: 0.0,
        }
    }
}

/// Resolved control inputs, each in -1..=1 except where noted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleControls {
    pub throttle: f32,
    /// 0..=1
    pub brake: f32,
    pub steering: f32,
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub lift: f32,
}

/// Everything needed to spawn a vehicle body and its seats.
#[derive(Debug, Clone)]
pub struct VehicleBlueprint {
    pub kind: VehicleKind,
    pub shape: Shape,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub friction: f32,
    pub seats: Vec<Seat>,
    pub wheels: Vec<Wheel>,
}

impl VehicleBlueprint {
    pub fn for_kind(kind: VehicleKind, config: &VehicleConfig) -> Self {
        match kind {
            VehicleKind::Car => Self::car(config),
            VehicleKind::Helicopter => Self::helicopter(config),
            VehicleKind::Airplane => Self::airplane(config),
        }
    }

    fn car(config: &VehicleConfig) -> Self {
        let car = &config.car;
        let half = car.half_extents;
        let anchor_y = -half.y * 0.6;
        let (ax, az) = (half.x * 0.7, half.z * 0.9);
        let wheels = vec![
            Wheel::new(Vec3::new(ax, anchor_y, -az), true, false),
            Wheel::new(Vec3::new(ax, anchor_y, az), true, false),
            Wheel::new(Vec3::new(-ax, anchor_y, -az), false, true),
            Wheel::new(Vec3::new(-ax, anchor_y, az), false, true),
        ];

        // Wheel colliders sit slightly above full extension so the idle car
        // rests on them and the suspension takes over once driven.
        let wheel_drop = (car.suspension_rest_length - 0.1).max(0.0);
        let mut parts = vec![ShapePart::new(Vec3::ZERO, Shape::Cuboid { half_extents: half })];
        parts.extend(wheels.iter().map(|w| {
            ShapePart::new(w.anchor - Vec3::Y * wheel_drop, Shape::Sphere { radius: car.wheel_radius })
        }));

        let rest_height = -anchor_y + wheel_drop + car.wheel_radius;
        let seat_y = 0.2;
        let entry_y = 0.57 - rest_height;
        let door_z = half.z + 0.7;
        let seats = vec![
            Seat::new(SeatRole::Driver, Vec3::new(0.0, seat_y, -half.z * 0.45), Vec3::new(0.0, entry_y, -door_z))
                .with_door()
                .connected_to(&[1]),
            Seat::new(SeatRole::Passenger, Vec3::new(0.0, seat_y, half.z * 0.45), Vec3::new(0.0, entry_y, door_z))
                .with_door()
                .connected_to(&[0]),
        ];

        Self {
            kind: VehicleKind::Car,
            shape: Shape::Compound(parts),
            mass: car.mass,
            linear_damping: 0.05,
            angular_damping: 0.5,
            friction: 0.8,
            seats,
            wheels,
        }
    }

    fn helicopter(config: &VehicleConfig) -> Self {
        let heli = &config.helicopter;
        let half = heli.half_extents;
        let skid_y = -half.y - 0.15;
        let skid = Shape::Cuboid { half_extents: Vec3::new(half.x * 0.7, 0.05, 0.08) };
        let parts = vec![
            ShapePart::new(Vec3::ZERO, Shape::Cuboid { half_extents: half }),
            ShapePart::new(Vec3::new(0.0, skid_y, -half.z * 0.8), skid.clone()),
            ShapePart::new(Vec3::new(0.0, skid_y, half.z * 0.8), skid),
        ];
        let rest_height = -skid_y + 0.05;
        let entry_y = 0.57 - rest_height;
        let side = half.z + 0.7;
        let seats = vec![
            Seat::new(SeatRole::Driver, Vec3::new(half.x * 0.35, 0.1, -half.z * 0.4), Vec3::new(half.x * 0.35, entry_y, -side))
                .connected_to(&[1]),
            Seat::new(SeatRole::Passenger, Vec3::new(half.x * 0.35, 0.1, half.z * 0.4), Vec3::new(half.x * 0.35, entry_y, side))
                .connected_to(&[0]),
        ];

        Self {
            kind: VehicleKind::Helicopter,
            shape: Shape::Compound(parts),
            mass: heli.mass,
            linear_damping: heli.linear_damping,
            angular_damping: heli.angular_damping,
            friction: 0.8,
            seats,
            wheels: Vec::new(),
        }
    }

    fn airplane(config: &VehicleConfig) -> Self {
        let plane = &config.airplane;
        let half = plane.half_extents;
        let fuselage = Vec3::new(half.x, half.y, half.y);
        let gear_radius = 0.25;
        let gear_y = -half.y - 0.3;
        let gear = Shape::Sphere { radius: gear_radius };
        let parts = vec![
            ShapePart::new(Vec3::ZERO, Shape::Cuboid { half_extents: fuselage }),
            ShapePart::new(Vec3::new(half.x * 0.1, half.y * 0.25, 0.0), Shape::Cuboid { half_extents: Vec3::new(0.5, 0.05, half.z) }),
            ShapePart::new(Vec3::new(half.x * 0.5, gear_y, -0.6), gear.clone()),
            ShapePart::new(Vec3::new(half.x * 0.5, gear_y, 0.6), gear.clone()),
            ShapePart::new(Vec3::new(-half.x * 0.8, gear_y, 0.0), gear),
        ];
        let rest_height = -gear_y + gear_radius;
        let entry_y = 0.57 - rest_height;
        let seats = vec![Seat::new(
            SeatRole::Driver,
            Vec3::new(half.x * 0.2, half.y * 0.5, 0.0),
            Vec3::new(half.x * 0.2, entry_y, -(half.y + 0.8)),
        )];

        Self {
            kind: VehicleKind::Airplane,
            shape: Shape::Compound(parts),
            mass: plane.mass,
            linear_damping: 0.0,
            angular_damping: plane.angular_damping,
            // Landing gear rolls.
            friction: 0.05,
            seats,
            wheels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: EntityId,
    pub kind: VehicleKind,
    pub body: BodyHandle,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub seats: Vec<Seat>,
    pub wheels: Vec<Wheel>,
    pub actions: ActionSet<VehicleAction>,
    pub controls: VehicleControls,
    pub steering: SpringSimulator,
    pub view_yaw: f32,
    pub view_pitch: f32,
    /// Aircraft only: clear of the ground by more than the airborne height.
    pub airborne: bool,
    pub config: VehicleConfig,
    pub(crate) mouse_sensitivity: f32,
    controlled: bool,
    ghost: bool,
}

impl Vehicle {
    pub fn new(id: EntityId, body: BodyHandle, blueprint: VehicleBlueprint, config: VehicleConfig) -> Self {
        Self {
            id,
            kind: blueprint.kind,
            body,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            seats: blueprint.seats,
            wheels: blueprint.wheels,
            actions: ActionSet::default(),
            controls: VehicleControls::default(),
            steering: SpringSimulator::new(config.steering_spring),
            view_yaw: 0.0,
            view_pitch: 0.0,
            airborne: false,
            config,
            mouse_sensitivity: 0.002,
            controlled: false,
            ghost: false,
        }
    }

    pub fn seat(&self, index: usize) -> Option<&Seat> {
        self.seats.get(index)
    }

    pub fn seat_mut(&mut self, index: usize) -> Option<&mut Seat> {
        self.seats.get_mut(index)
    }

    pub fn driver_seat(&self) -> Option<usize> {
        self.seats.iter().position(Seat::is_driver)
    }

    pub fn is_occupied(&self) -> bool {
        self.seats.iter().any(Seat::is_occupied)
    }

    pub fn seat_of(&self, character: EntityId) -> Option<usize> {
        self.seats.iter().position(|s| s.occupant == Some(character))
    }

    /// True while a seated driver is actively steering.
    pub fn is_controlled(&self) -> bool {
        self.controlled
    }

    pub(crate) fn set_controlled(&mut self, controlled: bool) {
        self.controlled = controlled;
        if !controlled {
            self.controls = VehicleControls::default();
        }
    }

    pub fn is_ghost(&self) -> bool {
        self.ghost
    }

    pub(crate) fn set_ghost(&mut self, ghost: bool) {
        self.ghost = ghost;
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Seat placement for an arbitrary body transform.
    pub fn seat_pose_at(&self, index: usize, position: Vec3, rotation: Quat, velocity: Vec3) -> Option<SeatPose> {
        let seat = self.seats.get(index)?;
        Some(SeatPose {
            role: seat.role,
            door_open: seat.door_open,
            position: position + rotation * seat.offset,
            entry_point: position + rotation * seat.entry_point,
            exit_point: position + rotation * seat.exit_point,
            rotation,
            yaw: yaw_of(rotation),
            velocity,
        })
    }

    pub fn seat_pose(&self, index: usize) -> Option<SeatPose> {
        self.seat_pose_at(index, self.position, self.rotation, self.velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car() -> Vehicle {
        let config = VehicleConfig::default();
        let blueprint = VehicleBlueprint::for_kind(VehicleKind::Car, &config);
        Vehicle::new(EntityId(1), BodyHandle::from_raw_parts(0, 0), blueprint, config)
    }

    #[test]
    fn blueprints_have_a_driver_and_valid_shapes() {
        let config = VehicleConfig::default();
        for kind in [VehicleKind::Car, VehicleKind::Helicopter, VehicleKind::Airplane] {
            let blueprint = VehicleBlueprint::for_kind(kind, &config);
            blueprint.shape.validate().unwrap();
            assert!(blueprint.seats.iter().any(Seat::is_driver), "{kind:?} has no driver seat");
        }
    }

    #[test]
    fn seat_pose_follows_vehicle_rotation() {
        let mut car = car();
        car.position = Vec3::new(10.0, 1.0, 0.0);
        let straight = car.seat_pose(0).unwrap();
        car.rotation = Quat::from_rotation_y(std::f32::consts::PI);
        let turned = car.seat_pose(0).unwrap();
        let (a, b) = (straight.entry_point - car.position, turned.entry_point - car.position);
        assert!((a.z + b.z).abs() < 1e-4, "entry point should mirror: {a} vs {b}");
        assert!(car.seat_pose(9).is_none());
    }

    #[test]
    fn occupancy_bookkeeping() {
        let mut car = car();
        assert!(!car.is_occupied());
        car.seats[1].set_occupant(Some(EntityId(4)));
        assert!(car.is_occupied());
        assert_eq!(car.seat_of(EntityId(4)), Some(1));
        assert_eq!(car.driver_seat(), Some(0));
    }
}
