//! Viewer configuration loading and validation

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, Resource, Serialize, Deserialize, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
    #[serde(default)]
    pub framing: FramingConfig,
    #[serde(default)]
    pub hints: HintConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// glTF/glb asset to inspect
    #[serde(default = "default_model_url")]
    pub url: String,
    /// Shown on the loading overlay
    #[serde(default = "default_model_label")]
    pub label: String,
    /// Base path of the Draco decoder assets; `None` skips the decoder
    #[serde(default = "default_draco_path")]
    pub draco_path: Option<String>,
    /// Whether the host asks for Meshopt support
    #[serde(default = "default_true")]
    pub meshopt: bool,
    /// Bounding diagonal the model is normalized to
    #[serde(default = "default_target_diagonal")]
    pub target_diagonal: f32,
    /// Give up on a load after this many seconds; `None` waits forever
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: default_model_url(),
            label: default_model_label(),
            draco_path: default_draco_path(),
            meshopt: true,
            target_diagonal: default_target_diagonal(),
            load_timeout_secs: default_load_timeout(),
        }
    }
}

fn default_model_url() -> String {
    "/assets/f1-2021-red-bull-rb16b/source/F1 2021 RedBull RB16b.glb".to_string()
}

fn default_model_label() -> String {
    "RB16B Cockpit".to_string()
}

fn default_draco_path() -> Option<String> {
    Some("/draco/gltf/".to_string())
}

fn default_target_diagonal() -> f32 {
    5.0
}

fn default_load_timeout() -> Option<f32> {
    Some(60.0)
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Upper bound for the device pixel ratio used by the surface
    #[serde(default = "default_max_pixel_ratio")]
    pub max_pixel_ratio: f32,
    /// Clear color as sRGB
    #[serde(default = "default_background")]
    pub background: [f32; 3],
    #[serde(default = "default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    /// Camera position before the model arrives
    #[serde(default = "default_provisional_position")]
    pub provisional_position: [f32; 3],
    #[serde(default = "default_provisional_target")]
    pub provisional_target: [f32; 3],
    /// Ambient light brightness (cd/m^2)
    #[serde(default = "default_ambient_brightness")]
    pub ambient_brightness: f32,
    /// Key light illuminance (lux)
    #[serde(default = "default_key_illuminance")]
    pub key_illuminance: f32,
    /// Environment map intensity
    #[serde(default = "default_environment_intensity")]
    pub environment_intensity: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_pixel_ratio: default_max_pixel_ratio(),
            background: default_background(),
            fov_degrees: default_fov_degrees(),
            near: default_near(),
            far: default_far(),
            provisional_position: default_provisional_position(),
            provisional_target: default_provisional_target(),
            ambient_brightness: default_ambient_brightness(),
            key_illuminance: default_key_illuminance(),
            environment_intensity: default_environment_intensity(),
        }
    }
}

fn default_max_pixel_ratio() -> f32 {
    2.0
}

fn default_background() -> [f32; 3] {
    // #0b0b0c
    [11.0 / 255.0, 11.0 / 255.0, 12.0 / 255.0]
}

fn default_fov_degrees() -> f32 {
    70.0
}

fn default_near() -> f32 {
    0.01
}

fn default_far() -> f32 {
    100.0
}

fn default_provisional_position() -> [f32; 3] {
    [0.0, 1.1, 0.8]
}

fn default_provisional_target() -> [f32; 3] {
    [0.0, 1.0, 0.0]
}

fn default_ambient_brightness() -> f32 {
    250.0
}

fn default_key_illuminance() -> f32 {
    6000.0
}

fn default_environment_intensity() -> f32 {
    400.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlsConfig {
    #[serde(default = "default_true")]
    pub enable_damping: bool,
    #[serde(default = "default_damping_factor")]
    pub damping_factor: f32,
    #[serde(default = "default_min_distance")]
    pub min_distance: f32,
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
    /// Polar angle limits in radians, measured from +Y
    #[serde(default = "default_min_polar_angle")]
    pub min_polar_angle: f32,
    #[serde(default = "default_max_polar_angle")]
    pub max_polar_angle: f32,
    #[serde(default = "default_true")]
    pub enable_pan: bool,
    /// Revolutions per minute is `auto_rotate_speed / 2`
    #[serde(default = "default_auto_rotate_speed")]
    pub auto_rotate_speed: f32,
    /// Keyboard translation per rendered frame
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    /// Camera position restored by "Reset View"
    #[serde(default = "default_reset_position")]
    pub reset_position: [f32; 3],
    /// Controls target restored by "Reset View"
    #[serde(default = "default_reset_target")]
    pub reset_target: [f32; 3],
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: default_damping_factor(),
            min_distance: default_min_distance(),
            max_distance: default_max_distance(),
            min_polar_angle: default_min_polar_angle(),
            max_polar_angle: default_max_polar_angle(),
            enable_pan: true,
            auto_rotate_speed: default_auto_rotate_speed(),
            move_speed: default_move_speed(),
            reset_position: default_reset_position(),
            reset_target: default_reset_target(),
        }
    }
}

fn default_damping_factor() -> f32 {
    0.05
}

fn default_min_distance() -> f32 {
    0.5
}

fn default_max_distance() -> f32 {
    8.0
}

fn default_min_polar_angle() -> f32 {
    PI * 0.1
}

fn default_max_polar_angle() -> f32 {
    PI * 0.65
}

fn default_auto_rotate_speed() -> f32 {
    0.5
}

fn default_move_speed() -> f32 {
    0.02
}

fn default_reset_position() -> [f32; 3] {
    [-0.2, 0.5, 1.2]
}

fn default_reset_target() -> [f32; 3] {
    [0.0, 0.3, -0.5]
}

/// Where the camera goes once the model is normalized, relative to its center
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramingConfig {
    #[serde(default = "default_eye_offset")]
    pub eye_offset: [f32; 3],
    #[serde(default = "default_look_offset")]
    pub look_offset: [f32; 3],
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            eye_offset: default_eye_offset(),
            look_offset: default_look_offset(),
        }
    }
}

fn default_eye_offset() -> [f32; 3] {
    [-0.2, 0.5, 1.2]
}

fn default_look_offset() -> [f32; 3] {
    [0.0, 0.3, -0.5]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintConfig {
    /// Seconds after Ready before the hint panel hides itself
    #[serde(default = "default_dismiss_after")]
    pub dismiss_after_secs: f32,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            dismiss_after_secs: default_dismiss_after(),
        }
    }
}

fn default_dismiss_after() -> f32 {
    5.0
}

impl ViewerConfig {
    /// Parse configuration from TOML and validate it
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply a single `?key=value` override from the page URL.
    /// Returns `Ok(false)` for keys the viewer does not own.
    pub fn apply_query_param(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        match key {
            "model" => {
                if value.trim().is_empty() {
                    return Err(invalid_value(key, value));
                }
                self.model.url = value.to_string();
            }
            "draco" => {
                self.model.draco_path = match value {
                    "" | "none" | "off" => None,
                    path => Some(path.to_string()),
                };
            }
            "diagonal" => {
                let diagonal: f32 = value.parse().map_err(|_| invalid_value(key, value))?;
                if !diagonal.is_finite() || diagonal <= 0.0 {
                    return Err(invalid_value(key, value));
                }
                self.model.target_diagonal = diagonal;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Every float must be finite before any range check; NaN slips past comparisons
    fn check_finite(&self) -> Result<(), ConfigError> {
        let (m, r, c) = (&self.model, &self.render, &self.controls);
        let scalars = [
            ("model.target_diagonal", m.target_diagonal),
            ("model.load_timeout_secs", m.load_timeout_secs.unwrap_or(1.0)),
            ("render.max_pixel_ratio", r.max_pixel_ratio),
            ("render.fov_degrees", r.fov_degrees),
            ("render.near", r.near),
            ("render.far", r.far),
            ("render.ambient_brightness", r.ambient_brightness),
            ("render.key_illuminance", r.key_illuminance),
            ("render.environment_intensity", r.environment_intensity),
            ("controls.damping_factor", c.damping_factor),
            ("controls.min_distance", c.min_distance),
            ("controls.max_distance", c.max_distance),
            ("controls.min_polar_angle", c.min_polar_angle),
            ("controls.max_polar_angle", c.max_polar_angle),
            ("controls.auto_rotate_speed", c.auto_rotate_speed),
            ("controls.move_speed", c.move_speed),
            ("hints.dismiss_after_secs", self.hints.dismiss_after_secs),
        ];
        let vectors = [
            ("render.background", r.background),
            ("render.provisional_position", r.provisional_position),
            ("render.provisional_target", r.provisional_target),
            ("controls.reset_position", c.reset_position),
            ("controls.reset_target", c.reset_target),
            ("framing.eye_offset", self.framing.eye_offset),
            ("framing.look_offset", self.framing.look_offset),
        ];

        for (key, value) in scalars {
            if !value.is_finite() {
                return Err(invalid_value(key, &value.to_string()));
            }
        }
        for (key, value) in vectors {
            if value.iter().any(|v| !v.is_finite()) {
                return Err(invalid_value(key, &format!("{:?}", value)));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_finite()?;

        if self.model.target_diagonal <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "model.target_diagonal must be positive, got {}",
                self.model.target_diagonal
            )));
        }
        if let Some(secs) = self.model.load_timeout_secs {
            if secs <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "model.load_timeout_secs must be positive, got {}",
                    secs
                )));
            }
        }
        if self.render.max_pixel_ratio < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "render.max_pixel_ratio must be at least 1.0, got {}",
                self.render.max_pixel_ratio
            )));
        }
        if self.render.near <= 0.0 || self.render.far <= self.render.near {
            return Err(ConfigError::Invalid(format!(
                "render clip planes must satisfy 0 < near < far, got {} / {}",
                self.render.near, self.render.far
            )));
        }
        let c = &self.controls;
        if c.min_distance <= 0.0 || c.max_distance < c.min_distance {
            return Err(ConfigError::Invalid(format!(
                "controls distance range is empty: {}..{}",
                c.min_distance, c.max_distance
            )));
        }
        if c.min_polar_angle < 0.0 || c.max_polar_angle > PI || c.max_polar_angle < c.min_polar_angle {
            return Err(ConfigError::Invalid(format!(
                "controls polar range must lie within 0..PI: {}..{}",
                c.min_polar_angle, c.max_polar_angle
            )));
        }
        if !(0.0..=1.0).contains(&c.damping_factor) {
            return Err(ConfigError::Invalid(format!(
                "controls.damping_factor must be within 0..1, got {}",
                c.damping_factor
            )));
        }
        Ok(())
    }
}

fn invalid_value(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
