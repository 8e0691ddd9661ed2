// Yaw 0 faces +X; increasing yaw turns towards +Z.

use glam::{Quat, Vec3};

pub fn forward_from_yaw(yaw: f32) -> Vec3 {
    let (sin, cos) = yaw.sin_cos();
    Vec3::new(cos, 0.0, sin)
}

pub fn right_from_yaw(yaw: f32) -> Vec3 {
    forward_from_yaw(yaw).cross(Vec3::Y)
}

pub fn yaw_to_quat(yaw: f32) -> Quat {
    Quat::from_rotation_y(-yaw)
}

/// Yaw of the rotated +X axis projected onto the ground plane.
pub fn yaw_of(rotation: Quat) -> f32 {
    let forward = rotation * Vec3::X;
    forward.z.atan2(forward.x)
}

/// Yaw of a horizontal direction; `None` for (near) vertical vectors.
pub fn yaw_of_direction(direction: Vec3) -> Option<f32> {
    let flat = Vec3::new(direction.x, 0.0, direction.z);
    (flat.length_squared() > 1e-8).then(|| flat.z.atan2(flat.x))
}

pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn yaw_conventions_agree() {
        for yaw in [0.0, 0.7, -2.0, FRAC_PI_2] {
            let q = yaw_to_quat(yaw);
            assert!((q * Vec3::X).distance(forward_from_yaw(yaw)) < 1e-5);
            assert!((yaw_of(q) - yaw).abs() < 1e-5);
        }
        assert!(right_from_yaw(0.0).distance(Vec3::Z) < 1e-6);
    }

    #[test]
    fn vertical_direction_has_no_yaw() {
        assert!(yaw_of_direction(Vec3::Y).is_none());
        let yaw = yaw_of_direction(Vec3::new(0.0, 3.0, 1.0)).unwrap();
        assert!((yaw - FRAC_PI_2).abs() < 1e-6);
    }
}
