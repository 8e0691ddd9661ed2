// CONFIG: tuning values, loaded from JSON or defaulted

use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::SpringParams;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "AVATAR_SIM_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub time: TimeConfig,
    pub physics: PhysicsConfig,
    pub character: CharacterConfig,
    pub vehicles: VehicleConfig,
    pub animations: AnimationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Fixed physics rate in Hz.
    pub physics_hz: f32,
    /// Largest frame delta handed to the simulation (seconds).
    pub max_frame_delta: f32,
    /// Upper bound on physics steps per presentation frame.
    pub max_substeps: u32,
    pub time_scale: f32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            physics_hz: 60.0,
            max_frame_delta: 1.0 / 30.0,
            max_substeps: 4,
            time_scale: 1.0,
        }
    }
}

impl TimeConfig {
    pub fn fixed_delta(&self) -> f32 {
        1.0 / self.physics_hz
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub capsule_radius: f32,
    /// Half length of the capsule's cylindrical segment.
    pub capsule_half_height: f32,
    pub mass: f32,
    /// Ground ray length measured from the body centre.
    pub ray_cast_length: f32,
    /// Extra ray length while already grounded, keeps contact on slopes.
    pub ray_safe_offset: f32,
    pub move_speed: f32,
    pub walk_multiplier: f32,
    pub sprint_multiplier: f32,
    pub roll_multiplier: f32,
    pub jump_speed: f32,
    /// Wind-up before a standing jump leaves the ground.
    pub jump_delay: f32,
    pub running_jump_delay: f32,
    /// Downward speed above which a landing becomes a roll.
    pub roll_threshold: f32,
    /// Downward speed above which a landing plays a drop animation.
    pub hard_landing_threshold: f32,
    /// Fraction of the horizontal velocity error corrected per tick in the air.
    pub air_control: f32,
    pub velocity_spring: SpringParams,
    pub rotation_spring: SpringParams,
    pub interaction_range: f32,
    pub mouse_sensitivity: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            capsule_radius: 0.25,
            capsule_half_height: 0.25,
            mass: 1.0,
            ray_cast_length: 0.57,
            ray_safe_offset: 0.03,
            move_speed: 4.0,
            walk_multiplier: 0.8,
            sprint_multiplier: 1.4,
            roll_multiplier: 0.6,
            jump_speed: 4.0,
            jump_delay: 0.2,
            running_jump_delay: 0.03,
            roll_threshold: 6.0,
            hard_landing_threshold: 2.0,
            air_control: 0.05,
            velocity_spring: SpringParams::new(1.0, 200.0, 1.0),
            rotation_spring: SpringParams::new(1.0, 120.0, 1.0),
            interaction_range: 2.0,
            mouse_sensitivity: 0.002,
        }
    }
}

impl CharacterConfig {
    /// Distance from the capsule centre to its lowest point.
    pub fn capsule_extent(&self) -> f32 {
        self.capsule_half_height + self.capsule_radius
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarConfig {
    pub mass: f32,
    pub half_extents: Vec3,
    pub engine_force: f32,
    pub brake_force: f32,
    /// Maximum front wheel angle in radians.
    pub max_steer: f32,
    pub suspension_rest_length: f32,
    pub suspension_stiffness: f32,
    pub suspension_damping: f32,
    pub wheel_radius: f32,
    /// Lateral friction, newtons per m/s of side slip per wheel.
    pub grip: f32,
    pub rolling_resistance: f32,
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            mass: 200.0,
            half_extents: Vec3::new(1.1, 0.35, 0.6),
            engine_force: 1200.0,
            brake_force: 1500.0,
            max_steer: 0.6,
            suspension_rest_length: 0.35,
            suspension_stiffness: 8000.0,
            suspension_damping: 900.0,
            wheel_radius: 0.3,
            grip: 400.0,
            rolling_resistance: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelicopterConfig {
    pub mass: f32,
    pub half_extents: Vec3,
    /// Extra lift fraction of the hover force at full ascend input.
    pub climb_authority: f32,
    pub pitch_torque: f32,
    pub roll_torque: f32,
    pub yaw_torque: f32,
    /// Torque pulling the airframe back to level, per radian of tilt.
    pub stabilisation: f32,
    pub angular_damping: f32,
    pub linear_damping: f32,
}

impl Default for HelicopterConfig {
    fn default() -> Self {
        Self {
            mass: 150.0,
            half_extents: Vec3::new(1.4, 0.6, 0.6),
            climb_authority: 0.8,
            pitch_torque: 250.0,
            roll_torque: 200.0,
            yaw_torque: 250.0,
            stabilisation: 400.0,
            angular_damping: 0.9,
            linear_damping: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AirplaneConfig {
    pub mass: f32,
    pub half_extents: Vec3,
    pub thrust: f32,
    /// Lift per squared forward speed.
    pub lift_coefficient: f32,
    pub drag_coefficient: f32,
    pub pitch_authority: f32,
    pub roll_authority: f32,
    pub yaw_authority: f32,
    pub brake_force: f32,
    pub angular_damping: f32,
}

impl Default for AirplaneConfig {
    fn default() -> Self {
        Self {
            mass: 150.0,
            half_extents: Vec3::new(1.8, 0.4, 2.2),
            thrust: 900.0,
            lift_coefficient: 2.2,
            drag_coefficient: 0.4,
            pitch_authority: 12.0,
            roll_authority: 14.0,
            yaw_authority: 6.0,
            brake_force: 600.0,
            angular_damping: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub car: CarConfig,
    pub helicopter: HelicopterConfig,
    pub airplane: AirplaneConfig,
    pub steering_spring: SpringParams,
    /// Ground clearance above which an aircraft counts as airborne.
    pub airborne_height: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            car: CarConfig::default(),
            helicopter: HelicopterConfig::default(),
            airplane: AirplaneConfig::default(),
            steering_spring: SpringParams::new(1.0, 60.0, 1.0),
            airborne_height: 1.5,
        }
    }
}

/// Clip name to clip length (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimationConfig(pub BTreeMap<String, f32>);

impl Default for AnimationConfig {
    fn default() -> Self {
        let clips = [
            ("idle", 2.0),
            ("walk", 1.0),
            ("sprint", 0.7),
            ("start_left", 0.4),
            ("start_right", 0.4),
            ("start_back_left", 0.5),
            ("start_back_right", 0.5),
            ("stop", 0.3),
            ("jump_idle", 0.8),
            ("jump_running", 0.6),
            ("falling", 1.0),
            ("drop_idle", 0.3),
            ("drop_running", 0.3),
            ("drop_running_roll", 0.9),
            ("open_door", 0.6),
            ("sit_down", 1.0),
            ("close_door_sitting", 0.5),
            ("driving", 1.0),
            ("sitting", 1.0),
            ("switch_seats", 0.8),
            ("stand_up", 0.9),
            ("jump_out", 0.4),
            ("close_door_standing", 0.5),
        ];
        Self(clips.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Load from the file named by `AVATAR_SIM_CONFIG`, or use defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.time;
        if !(t.physics_hz.is_finite() && t.physics_hz > 0.0) {
            return Err(invalid("time.physics_hz must be positive"));
        }
        if !(t.max_frame_delta >= t.fixed_delta()) {
            return Err(invalid("time.max_frame_delta must be at least one physics step"));
        }
        if t.max_substeps == 0 {
            return Err(invalid("time.max_substeps must be at least 1"));
        }
        if !(t.time_scale.is_finite() && t.time_scale >= 0.0) {
            return Err(invalid("time.time_scale must be non-negative"));
        }

        let c = &self.character;
        if c.capsule_radius <= 0.0 || c.capsule_half_height < 0.0 || c.mass <= 0.0 {
            return Err(invalid("character capsule dimensions and mass must be positive"));
        }
        if c.ray_cast_length <= c.capsule_extent() {
            return Err(invalid("character.ray_cast_length must reach below the capsule"));
        }
        if c.walk_multiplier > c.sprint_multiplier {
            return Err(invalid("character.walk_multiplier must not exceed sprint_multiplier"));
        }
        if c.interaction_range <= 0.0 {
            return Err(invalid("character.interaction_range must be positive"));
        }

        for (name, spring) in [
            ("character.velocity_spring", &c.velocity_spring),
            ("character.rotation_spring", &c.rotation_spring),
            ("vehicles.steering_spring", &self.vehicles.steering_spring),
        ] {
            if !spring.is_valid() {
                return Err(invalid(&format!("{name} needs positive mass, stiffness and damping ratio")));
            }
        }

        if let Some((name, _)) = self.animations.0.iter().find(|(_, len)| !(**len > 0.0)) {
            return Err(invalid(&format!("animation clip {name} must have a positive length")));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().unwrap();
        let t = TimeConfig::default();
        assert!((t.fixed_delta() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SimConfig::from_json_str(r#"{ "character": { "move_speed": 5.0 } }"#).unwrap();
        assert_eq!(config.character.move_speed, 5.0);
        assert_eq!(config.character.walk_multiplier, 0.8);
        assert_eq!(config.time.physics_hz, 60.0);
    }

    #[test]
    fn rejects_frame_cap_below_physics_step() {
        let err = SimConfig::from_json_str(r#"{ "time": { "max_frame_delta": 0.001 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_spring() {
        let err = SimConfig::from_json_str(
            r#"{ "character": { "velocity_spring": { "mass": 1.0, "stiffness": 0.0, "damping_ratio": 1.0 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(SimConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
    }
}
