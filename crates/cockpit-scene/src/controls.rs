//! Orbit camera controller driven by mouse, wheel and touch input

use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use std::f32::consts::{PI, TAU};

use crate::config::ControlsConfig;
use crate::lifecycle::ViewportSize;

/// Marker for the camera owned by the mounted cockpit scene
#[derive(Component)]
pub struct CockpitCamera;

/// True while the UI overlay owns the pointer; orbit input is ignored then
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerCapture(pub bool);

/// Orbits the camera around `target`. The camera transform is the source of
/// truth: every update re-derives spherical coordinates from it, so other
/// systems may move the camera freely between updates.
#[derive(Component, Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub auto_rotate: bool,
    /// 2.0 is one revolution every 30 seconds
    pub auto_rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub enable_pan: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    // Pending motion, decayed by damping
    spherical_delta: Vec2,
    scale: f32,
    pan_offset: Vec3,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self::from_config(&ControlsConfig::default(), Vec3::ZERO)
    }
}

impl OrbitControls {
    pub fn from_config(config: &ControlsConfig, target: Vec3) -> Self {
        Self {
            target,
            enable_damping: config.enable_damping,
            damping_factor: config.damping_factor,
            auto_rotate: false,
            auto_rotate_speed: config.auto_rotate_speed,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            min_polar_angle: config.min_polar_angle,
            max_polar_angle: config.max_polar_angle,
            enable_pan: config.enable_pan,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            spherical_delta: Vec2::ZERO,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
        }
    }

    /// Orbit horizontally around the target
    pub fn rotate_left(&mut self, angle: f32) {
        self.spherical_delta.x -= angle;
    }

    /// Orbit vertically around the target
    pub fn rotate_up(&mut self, angle: f32) {
        self.spherical_delta.y -= angle;
    }

    /// Scale the distance to the target; factors below 1 move closer
    pub fn dolly(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.scale *= factor;
        }
    }

    /// Per-step wheel zoom factor
    pub fn zoom_scale(&self) -> f32 {
        0.95_f32.powf(self.zoom_speed)
    }

    /// Shift the target in the camera's screen plane by a pixel delta
    pub fn pan(&mut self, delta: Vec2, viewport_height: f32, fov: f32, camera: &Transform) {
        if !self.enable_pan || viewport_height <= 0.0 {
            return;
        }
        let distance = (camera.translation - self.target).length() * (fov * 0.5).tan();
        let world_per_pixel = 2.0 * distance / viewport_height * self.pan_speed;
        self.pan_offset += (*camera.left() * delta.x + *camera.up() * delta.y) * world_per_pixel;
    }

    pub fn toggle_auto_rotate(&mut self) -> bool {
        self.auto_rotate = !self.auto_rotate;
        self.auto_rotate
    }

    /// Place the camera at `position` looking at `target`, dropping any
    /// pending motion, and apply the result immediately
    pub fn set_view(&mut self, camera: &mut Transform, position: Vec3, target: Vec3) {
        camera.translation = position;
        self.target = target;
        self.spherical_delta = Vec2::ZERO;
        self.pan_offset = Vec3::ZERO;
        self.scale = 1.0;
        self.update(camera, 0.0);
    }

    /// Whether damped motion is still settling
    pub fn is_settling(&self) -> bool {
        self.spherical_delta.length_squared() > 1e-10 || self.pan_offset.length_squared() > 1e-10
    }

    /// Advance one frame: apply pending rotation, zoom and pan, clamp to the
    /// configured limits and aim the camera at the target
    pub fn update(&mut self, camera: &mut Transform, delta_secs: f32) {
        let offset = camera.translation - self.target;
        let mut radius = offset.length();
        let (mut theta, mut phi) = if radius > f32::EPSILON {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            radius = self.min_distance;
            (0.0, PI * 0.5)
        };

        if self.auto_rotate {
            self.rotate_left(TAU / 60.0 * self.auto_rotate_speed * delta_secs);
        }

        let blend = if self.enable_damping { self.damping_factor } else { 1.0 };
        theta += self.spherical_delta.x * blend;
        phi += self.spherical_delta.y * blend;
        phi = phi
            .clamp(self.min_polar_angle, self.max_polar_angle)
            .clamp(1e-6, PI - 1e-6);
        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * blend;

        let sin_phi = phi.sin();
        let offset = Vec3::new(radius * sin_phi * theta.sin(), radius * phi.cos(), radius * sin_phi * theta.cos());
        camera.translation = self.target + offset;
        camera.look_at(self.target, Vec3::Y);

        if self.enable_damping {
            self.spherical_delta *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.spherical_delta = Vec2::ZERO;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;
    }
}

/// Feed mouse drag, wheel and touch gestures into the controls
pub fn orbit_pointer_input(
    mut motion: MessageReader<MouseMotion>,
    mut wheel: MessageReader<MouseWheel>,
    buttons: Res<ButtonInput<MouseButton>>,
    touches: Res<Touches>,
    capture: Res<PointerCapture>,
    viewport: Option<Res<ViewportSize>>,
    mut cameras: Query<(&mut OrbitControls, &Transform, &Projection), With<CockpitCamera>>,
) {
    if capture.0 {
        motion.clear();
        wheel.clear();
        return;
    }
    let Ok((mut controls, transform, projection)) = cameras.single_mut() else {
        motion.clear();
        wheel.clear();
        return;
    };

    let height = viewport.map(|v| v.height).filter(|h| *h > 0.0).unwrap_or(1.0);
    let fov = match projection {
        Projection::Perspective(perspective) => perspective.fov,
        _ => PI / 4.0,
    };
    let rotate_per_pixel = TAU / height * controls.rotate_speed;

    let drag: Vec2 = motion.read().map(|m| m.delta).sum();
    if buttons.pressed(MouseButton::Left) {
        controls.rotate_left(drag.x * rotate_per_pixel);
        controls.rotate_up(drag.y * rotate_per_pixel);
    } else if buttons.pressed(MouseButton::Right) || buttons.pressed(MouseButton::Middle) {
        controls.pan(drag, height, fov, transform);
    }

    for event in wheel.read() {
        let scale = controls.zoom_scale();
        if event.y > 0.0 {
            controls.dolly(scale);
        } else if event.y < 0.0 {
            controls.dolly(1.0 / scale);
        }
    }

    let active: Vec<_> = touches.iter().collect();
    match active.as_slice() {
        [finger] => {
            let delta = finger.delta();
            controls.rotate_left(delta.x * rotate_per_pixel);
            controls.rotate_up(delta.y * rotate_per_pixel);
        }
        [a, b] => {
            let before = a.previous_position().distance(b.previous_position());
            let now = a.position().distance(b.position());
            if before > 0.0 && now > 0.0 {
                // Spreading the fingers moves closer
                controls.dolly(before / now);
            }
        }
        _ => {}
    }
}

pub fn update_orbit_controls(
    time: Res<Time>,
    mut cameras: Query<(&mut OrbitControls, &mut Transform), With<CockpitCamera>>,
) {
    for (mut controls, mut transform) in &mut cameras {
        controls.update(&mut transform, time.delta_secs());
    }
}
