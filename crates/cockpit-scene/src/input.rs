//! Keyboard navigation: WASD / arrow keys walk the camera on the ground plane

use bevy::input::keyboard::{KeyboardFocusLost, KeyboardInput};
use bevy::input::ButtonState;
use bevy::prelude::*;

use crate::config::ViewerConfig;
use crate::controls::CockpitCamera;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Forward,
    Back,
    Left,
    Right,
}

impl MoveDirection {
    /// WASD with arrow-key aliases
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::KeyW | KeyCode::ArrowUp => Some(Self::Forward),
            KeyCode::KeyS | KeyCode::ArrowDown => Some(Self::Back),
            KeyCode::KeyA | KeyCode::ArrowLeft => Some(Self::Left),
            KeyCode::KeyD | KeyCode::ArrowRight => Some(Self::Right),
            _ => None,
        }
    }
}

/// Which movement directions are currently held
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputState {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl InputState {
    /// Record a key transition. Returns false for keys that do not move.
    pub fn apply_key(&mut self, key: KeyCode, pressed: bool) -> bool {
        let Some(direction) = MoveDirection::from_key(key) else {
            return false;
        };
        *self.slot(direction) = pressed;
        true
    }

    pub fn is_held(&self, direction: MoveDirection) -> bool {
        match direction {
            MoveDirection::Forward => self.forward,
            MoveDirection::Back => self.back,
            MoveDirection::Left => self.left,
            MoveDirection::Right => self.right,
        }
    }

    pub fn release_all(&mut self) {
        *self = Self::default();
    }

    fn slot(&mut self, direction: MoveDirection) -> &mut bool {
        match direction {
            MoveDirection::Forward => &mut self.forward,
            MoveDirection::Back => &mut self.back,
            MoveDirection::Left => &mut self.left,
            MoveDirection::Right => &mut self.right,
        }
    }
}

/// Camera forward flattened onto the XZ plane and the matching right vector.
/// Both are zero when the camera looks straight up or down.
pub fn ground_basis(camera: &Transform) -> (Vec3, Vec3) {
    let mut forward = *camera.forward();
    forward.y = 0.0;
    let forward = forward.normalize_or_zero();
    let right = forward.cross(Vec3::Y);
    (forward, right)
}

/// Translation for one frame of held keys
pub fn movement_delta(input: &InputState, camera: &Transform, speed: f32) -> Vec3 {
    let (forward, right) = ground_basis(camera);
    let mut delta = Vec3::ZERO;
    if input.forward {
        delta += forward * speed;
    }
    if input.back {
        delta -= forward * speed;
    }
    if input.left {
        delta -= right * speed;
    }
    if input.right {
        delta += right * speed;
    }
    delta
}

pub fn track_keyboard(
    mut keys: MessageReader<KeyboardInput>,
    mut focus_lost: MessageReader<KeyboardFocusLost>,
    input: Option<ResMut<InputState>>,
) {
    let Some(mut input) = input else {
        keys.clear();
        focus_lost.clear();
        return;
    };

    for event in keys.read() {
        input.apply_key(event.key_code, event.state == ButtonState::Pressed);
    }

    // Key-up events never arrive once the window loses focus
    if focus_lost.read().count() > 0 {
        input.release_all();
    }
}

/// Moves at a fixed distance per rendered frame
pub fn apply_keyboard_movement(
    input: Option<Res<InputState>>,
    config: Res<ViewerConfig>,
    mut cameras: Query<&mut Transform, With<CockpitCamera>>,
) {
    let Some(input) = input else {
        return;
    };
    if *input == InputState::default() {
        return;
    }
    for mut transform in &mut cameras {
        let delta = movement_delta(&input, &transform, config.controls.move_speed);
        transform.translation += delta;
    }
}
