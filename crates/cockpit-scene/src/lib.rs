//! Cockpit Scene - interactive 3D inspection of a single car model
//!
//! Mounting the scene builds the camera, lights and environment, loads the
//! configured glTF model, normalizes it to a canonical size and places the
//! camera at the driver eye point. Leaving the host state tears everything
//! down again, so the view can be entered any number of times.

pub mod bounds;
pub mod config;
pub mod controls;
pub mod error;
pub mod hints;
pub mod input;
pub mod lifecycle;
pub mod loader;
pub mod normalize;
pub mod ui;

use bevy::prelude::*;

use controls::{orbit_pointer_input, update_orbit_controls, PointerCapture};
use hints::tick_hint_overlay;
use input::{apply_keyboard_movement, track_keyboard};
use lifecycle::{
    attach_loaded_model, fit_viewport_to_window, frame_attached_model, handle_remount_requests, mount_scene,
    teardown_scene, ActiveMount, MountLedger, RemountRequested, SceneContext, ScenePhase,
};
use loader::{ModelLoadFinished, ModelLoadRequested};

/// Mounts the cockpit scene while the app is in `state`
pub struct CockpitScenePlugin<S: States> {
    pub state: S,
    pub config: ViewerConfig,
}

impl<S: States> CockpitScenePlugin<S> {
    pub fn new(state: S, config: ViewerConfig) -> Self {
        Self { state, config }
    }
}

impl<S: States> Plugin for CockpitScenePlugin<S> {
    fn build(&self, app: &mut App) {
        let mounted = in_state(self.state.clone()).and(resource_exists::<SceneContext>);

        app.insert_resource(self.config.clone())
            .init_resource::<ScenePhase>()
            .init_resource::<ActiveMount>()
            .init_resource::<MountLedger>()
            .init_resource::<PointerCapture>()
            .add_message::<ModelLoadRequested>()
            .add_message::<ModelLoadFinished>()
            .add_message::<RemountRequested>()
            .add_systems(OnEnter(self.state.clone()), mount_scene)
            .add_systems(OnExit(self.state.clone()), teardown_scene)
            .add_systems(
                Update,
                (
                    (
                        track_keyboard,
                        orbit_pointer_input,
                        update_orbit_controls,
                        apply_keyboard_movement,
                    )
                        .chain(),
                    fit_viewport_to_window,
                    tick_hint_overlay,
                )
                    .run_if(mounted),
            )
            // Results for stale mounts still have to be drained after teardown
            .add_systems(Update, (attach_loaded_model, frame_attached_model).chain())
            .add_systems(Update, handle_remount_requests.run_if(in_state(self.state.clone())));
    }
}

pub use config::ViewerConfig;
pub use controls::{CockpitCamera, OrbitControls};
pub use error::{ConfigError, DecoderUnavailable, LoadError};
pub use lifecycle::LifecyclePhase;
pub use loader::{ModelAsset, ModelLoaderPlugin};
pub use ui::ControlsUiPlugin;
