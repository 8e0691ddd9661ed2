// Closed-form damped springs: a step is exact for any dt.

use std::f32::consts::{PI, TAU};

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Tuning constants for a spring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringParams {
    pub mass: f32,
    pub stiffness: f32,
    /// 1.0 is critical damping, above is overdamped, below oscillates.
    pub damping_ratio: f32,
}

impl SpringParams {
    pub const fn new(mass: f32, stiffness: f32, damping_ratio: f32) -> Self {
        Self {
            mass,
            stiffness,
            damping_ratio,
        }
    }

    pub fn angular_frequency(&self) -> f32 {
        (self.stiffness / self.mass).sqrt()
    }

    pub fn is_valid(&self) -> bool {
        [self.mass, self.stiffness, self.damping_ratio]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

impl Default for SpringParams {
    fn default() -> Self {
        Self::new(1.0, 100.0, 1.0)
    }
}

/// Advance a spring with displacement `offset` (value minus target) and
/// rate `velocity` by `dt` seconds. Returns the new `(offset, velocity)`.
pub fn step_spring(offset: f32, velocity: f32, params: &SpringParams, dt: f32) -> (f32, f32) {
    if dt <= 0.0 {
        return (offset, velocity);
    }
    let omega = params.angular_frequency();
    let zeta = params.damping_ratio;

    if (zeta - 1.0).abs() < 1e-4 {
        let decay = (-omega * dt).exp();
        let c = velocity + omega * offset;
        let x = (offset + c * dt) * decay;
        let v = (velocity - omega * dt * c) * decay;
        (x, v)
    } else if zeta > 1.0 {
        let root = (zeta * zeta - 1.0).sqrt();
        let r1 = -omega * (zeta - root);
        let r2 = -omega * (zeta + root);
        let c2 = (velocity - r1 * offset) / (r2 - r1);
        let c1 = offset - c2;
        let e1 = (r1 * dt).exp();
        let e2 = (r2 * dt).exp();
        (c1 * e1 + c2 * e2, c1 * r1 * e1 + c2 * r2 * e2)
    } else {
        let omega_d = omega * (1.0 - zeta * zeta).sqrt();
        let a = offset;
        let b = (velocity + zeta * omega * offset) / omega_d;
        let decay = (-zeta * omega * dt).exp();
        let (sin, cos) = (omega_d * dt).sin_cos();
        let x = decay * (a * cos + b * sin);
        let v = decay * ((omega_d * b - zeta * omega * a) * cos - (omega_d * a + zeta * omega * b) * sin);
        (x, v)
    }
}

/// Wrap an angle into `(-PI, PI]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpringSimulator {
    pub position: f32,
    pub velocity: f32,
    pub target: f32,
    pub params: SpringParams,
}

impl SpringSimulator {
    pub fn new(params: SpringParams) -> Self {
        Self {
            position: 0.0,
            velocity: 0.0,
            target: 0.0,
            params,
        }
    }

    pub fn simulate(&mut self, dt: f32) {
        let (offset, velocity) = step_spring(self.position - self.target, self.velocity, &self.params, dt);
        self.position = self.target + offset;
        self.velocity = velocity;
    }

    pub fn reset(&mut self, value: f32) {
        self.position = value;
        self.target = value;
        self.velocity = 0.0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSpringSimulator {
    pub position: Vec3,
    pub velocity: Vec3,
    pub target: Vec3,
    pub params: SpringParams,
}

impl VectorSpringSimulator {
    pub fn new(params: SpringParams) -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            target: Vec3::ZERO,
            params,
        }
    }

    pub fn simulate(&mut self, dt: f32) {
        let offset = self.position - self.target;
        let (x, vx) = step_spring(offset.x, self.velocity.x, &self.params, dt);
        let (y, vy) = step_spring(offset.y, self.velocity.y, &self.params, dt);
        let (z, vz) = step_spring(offset.z, self.velocity.z, &self.params, dt);
        self.position = self.target + Vec3::new(x, y, z);
        self.velocity = Vec3::new(vx, vy, vz);
    }

    pub fn reset(&mut self, value: Vec3) {
        self.position = value;
        self.target = value;
        self.velocity = Vec3::ZERO;
    }
}

/// Spring over an angle; always travels the short way round to its target.
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeSpringSimulator {
    /// Current angle in `(-PI, PI]`.
    pub position: f32,
    /// Angular velocity (rad/s).
    pub velocity: f32,
    pub target: f32,
    pub params: SpringParams,
}

impl RelativeSpringSimulator {
    pub fn new(params: SpringParams) -> Self {
        Self {
            position: 0.0,
            velocity: 0.0,
            target: 0.0,
            params,
        }
    }

    pub fn simulate(&mut self, dt: f32) {
        let offset = wrap_angle(self.position - self.target);
        let (offset, velocity) = step_spring(offset, self.velocity, &self.params, dt);
        self.position = wrap_angle(self.target + offset);
        self.velocity = velocity;
    }

    /// Remaining shortest-path angle to the target.
    pub fn remaining(&self) -> f32 {
        wrap_angle(self.target - self.position)
    }

    pub fn reset(&mut self, angle: f32) {
        self.position = wrap_angle(angle);
        self.target = self.position;
        self.velocity = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn critically_damped_converges_monotonically() {
        let mut spring = SpringSimulator::new(SpringParams::default());
        spring.target = 1.0;

        let mut last = (spring.position - spring.target).abs();
        let mut settled_at = None;
        for tick in 0..600 {
            spring.simulate(DT);
            let dist = (spring.position - spring.target).abs();
            assert!(dist < last || dist < 1e-5, "distance grew at tick {tick}: {last} -> {dist}");
            if dist < 1e-3 && settled_at.is_none() {
                settled_at = Some(tick);
            }
            last = dist;
        }
        let settled = settled_at.expect("spring never settled");
        assert!(settled < 120, "took {settled} ticks");
    }

    #[test]
    fn step_is_independent_of_slicing() {
        let params = SpringParams::new(1.0, 150.0, 1.0);
        let (one, _) = step_spring(2.0, 0.0, &params, 0.1);
        let mut offset = 2.0;
        let mut vel = 0.0;
        for _ in 0..10 {
            (offset, vel) = step_spring(offset, vel, &params, 0.01);
        }
        assert!((one - offset).abs() < 1e-4);
    }

    #[test]
    fn overdamped_and_underdamped_both_settle() {
        for zeta in [0.4, 2.5] {
            let params = SpringParams::new(1.0, 100.0, zeta);
            let (mut x, mut v) = (1.0, 0.0);
            for _ in 0..600 {
                (x, v) = step_spring(x, v, &params, DT);
            }
            assert!(x.abs() < 1e-3, "zeta {zeta} left offset {x}");
        }
    }

    #[test]
    fn vector_spring_tracks_each_axis() {
        let mut spring = VectorSpringSimulator::new(SpringParams::default());
        spring.target = Vec3::new(1.0, -2.0, 0.5);
        for _ in 0..300 {
            spring.simulate(DT);
        }
        assert!(spring.position.distance(spring.target) < 1e-3);
    }

    #[test]
    fn relative_spring_takes_the_short_way() {
        let mut spring = RelativeSpringSimulator::new(SpringParams::default());
        spring.reset(PI - 0.1);
        spring.target = -PI + 0.1;
        spring.simulate(DT);
        // Moving through PI means the angle increases (or wraps negative).
        assert!(spring.position > PI - 0.1 || spring.position < 0.0);
        for _ in 0..300 {
            spring.simulate(DT);
        }
        assert!(spring.remaining().abs() < 1e-3);
    }

    #[test]
    fn wrap_angle_range() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-5);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-5);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-6);
        assert!((wrap_angle(-TAU - 0.5) + 0.5).abs() < 1e-5);
    }
}
