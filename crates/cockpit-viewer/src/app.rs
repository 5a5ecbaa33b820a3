//! Bevy application setup

use bevy::camera::visibility::RenderLayers;
use bevy::prelude::*;
use bevy::winit::{UpdateMode, WinitSettings};
use bevy_egui::{EguiGlobalSettings, EguiPlugin, PrimaryEguiContext};
use bevy_picking::DefaultPickingPlugins;
use std::time::Duration;

use cockpit_scene::{CockpitScenePlugin, ControlsUiPlugin, ModelLoaderPlugin, ViewerConfig};

use crate::ui::NavigationPlugin;

const DEFAULT_CONFIG: &str = include_str!("../cockpit.toml");

/// Host page the cockpit view is mounted into
#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewState {
    #[default]
    Dashboard,
    Cockpit,
}

/// Camera that hosts the egui overlay in both views
#[derive(Component)]
struct OverlayCamera;

pub fn run() {
    let (config, initial_view) = load_config();

    App::new()
        .insert_resource(WinitSettings::desktop_app())
        .add_plugins(DefaultPlugins
            .set(WindowPlugin {
                primary_window: Some(Window {
                    title: "RB16B Cockpit".to_string(),
                    canvas: Some("#cockpit-canvas".to_string()),
                    fit_canvas_to_parent: true,
                    prevent_default_event_handling: true,
                    ..default()
                }),
                ..default()
            })
            .set(AssetPlugin {
                // Models and decoders are served from the site root
                file_path: "".to_string(),
                // Don't look for .meta files - server doesn't have them
                meta_check: bevy::asset::AssetMetaCheck::Never,
                ..default()
            })
        )
        // Must come before EguiPlugin so it can detect PickingPlugin
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(EguiPlugin::default())
        .insert_state(initial_view)
        .add_plugins(CockpitScenePlugin::new(ViewState::Cockpit, config))
        .add_plugins(ModelLoaderPlugin)
        .add_plugins(ControlsUiPlugin)
        .add_plugins(NavigationPlugin)
        .add_systems(Startup, spawn_overlay_camera)
        .add_systems(Update, apply_view_settings)
        .run();
}

/// Embedded defaults, then page query overrides
fn load_config() -> (ViewerConfig, ViewState) {
    let mut config = match ViewerConfig::from_toml(DEFAULT_CONFIG) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Falling back to default viewer config: {}", e);
            ViewerConfig::default()
        }
    };

    let mut view = ViewState::default();
    for (key, value) in query_params() {
        if key == "view" {
            if value == "cockpit" {
                view = ViewState::Cockpit;
            }
            continue;
        }
        match config.apply_query_param(&key, &value) {
            Ok(true) => tracing::info!("Config override from URL: {}={}", key, value),
            Ok(false) => {}
            Err(e) => tracing::warn!("Ignoring URL parameter: {}", e),
        }
    }

    (config, view)
}

#[cfg(target_arch = "wasm32")]
fn query_params() -> Vec<(String, String)> {
    let Some(window) = web_sys::window() else {
        return Vec::new();
    };
    let Ok(location) = window.location().href() else {
        return Vec::new();
    };
    let Ok(url) = web_sys::Url::new(&location) else {
        return Vec::new();
    };

    let params = url.search_params();
    ["view", "model", "draco", "diagonal"]
        .into_iter()
        .filter_map(|key| params.get(key).map(|value| (key.to_string(), value)))
        .collect()
}

#[cfg(not(target_arch = "wasm32"))]
fn query_params() -> Vec<(String, String)> {
    Vec::new()
}

fn spawn_overlay_camera(mut commands: Commands, mut egui_settings: ResMut<EguiGlobalSettings>) {
    // The cockpit camera comes and goes; the overlay must not
    egui_settings.auto_create_primary_context = false;

    commands.spawn((
        Name::new("Overlay Camera"),
        OverlayCamera,
        PrimaryEguiContext,
        Camera2d,
        RenderLayers::none(),
        Camera {
            order: 1,
            ..default()
        },
    ));
}

/// Render continuously only while the cockpit is mounted
fn apply_view_settings(
    view: Res<State<ViewState>>,
    mut winit_settings: ResMut<WinitSettings>,
    mut overlay: Query<&mut Camera, With<OverlayCamera>>,
) {
    if !view.is_changed() {
        return;
    }

    match view.get() {
        ViewState::Cockpit => {
            *winit_settings = WinitSettings::default();
        }
        ViewState::Dashboard => {
            winit_settings.focused_mode = UpdateMode::reactive_low_power(Duration::from_millis(100));
            winit_settings.unfocused_mode = UpdateMode::reactive_low_power(Duration::from_millis(500));
        }
    }

    // Draw over the 3D view when there is one, otherwise clear the surface
    for mut camera in &mut overlay {
        camera.clear_color = match view.get() {
            ViewState::Cockpit => ClearColorConfig::None,
            ViewState::Dashboard => ClearColorConfig::Custom(Color::srgb(0.043, 0.043, 0.047)),
        };
    }

    tracing::info!("View changed to {:?}", view.get());
}
