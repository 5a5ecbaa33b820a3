//! Overlay controls drawn with bevy_egui on top of the cockpit scene

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};

use crate::config::ViewerConfig;
use crate::controls::{CockpitCamera, OrbitControls, PointerCapture};
use crate::hints::HintOverlay;
use crate::lifecycle::{LifecyclePhase, RemountRequested, SceneContext, ScenePhase};

const BUTTON_FILL: egui::Color32 = egui::Color32::from_rgba_premultiplied(17, 17, 17, 230);
const BUTTON_FILL_ACTIVE: egui::Color32 = egui::Color32::from_rgba_premultiplied(30, 100, 200, 230);

pub struct ControlsUiPlugin;

impl Plugin for ControlsUiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            EguiPrimaryContextPass,
            cockpit_ui_system.run_if(resource_exists::<SceneContext>),
        );
    }
}

/// Put the camera back at the configured overview spot
pub fn reset_view(controls: &mut OrbitControls, camera: &mut Transform, config: &ViewerConfig) {
    controls.set_view(
        camera,
        Vec3::from(config.controls.reset_position),
        Vec3::from(config.controls.reset_target),
    );
}

/// The hint panel stays out of the way of the loading spinner
pub fn hints_shown(hints: &HintOverlay, phase: LifecyclePhase) -> bool {
    hints.visible && phase != LifecyclePhase::Loading
}

pub fn button_fill(active: bool) -> egui::Color32 {
    if active {
        BUTTON_FILL_ACTIVE
    } else {
        BUTTON_FILL
    }
}

#[derive(SystemParam)]
pub struct CockpitUiParams<'w, 's> {
    pub contexts: EguiContexts<'w, 's>,
    pub cameras: Query<'w, 's, (&'static mut OrbitControls, &'static mut Transform), With<CockpitCamera>>,
    pub config: Res<'w, ViewerConfig>,
    pub phase: Res<'w, ScenePhase>,
    pub hints: Option<ResMut<'w, HintOverlay>>,
    pub capture: ResMut<'w, PointerCapture>,
    pub remount: MessageWriter<'w, RemountRequested>,
}

fn cockpit_ui_system(mut params: CockpitUiParams) {
    let Ok(ctx) = params.contexts.ctx_mut() else { return };

    // Bottom-right camera controls
    egui::Area::new(egui::Id::new("cockpit_controls"))
        .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -16.0))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                let Ok((mut controls, mut transform)) = params.cameras.single_mut() else {
                    return;
                };

                let auto = egui::Button::new(egui::RichText::new("⟲ Auto").color(egui::Color32::WHITE))
                    .fill(button_fill(controls.auto_rotate))
                    .min_size(egui::vec2(72.0, 32.0));
                if ui.add(auto).on_hover_text("Toggle auto-rotate").clicked() {
                    let on = controls.toggle_auto_rotate();
                    tracing::debug!("Auto-rotate {}", if on { "on" } else { "off" });
                }

                let reset = egui::Button::new(egui::RichText::new("↺ Reset View").color(egui::Color32::WHITE))
                    .fill(button_fill(false))
                    .min_size(egui::vec2(96.0, 32.0));
                if ui.add(reset).clicked() {
                    reset_view(&mut controls, &mut transform, &params.config);
                }
            });
        });

    match params.phase.get() {
        LifecyclePhase::Loading => {
            egui::Area::new(egui::Id::new("cockpit_loading"))
                .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
                .interactable(false)
                .show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.spinner();
                        ui.label(
                            egui::RichText::new(format!("Loading {}...", params.config.model.label))
                                .color(egui::Color32::WHITE)
                                .size(16.0),
                        );
                    });
                });
        }
        LifecyclePhase::Error => {
            egui::Area::new(egui::Id::new("cockpit_error"))
                .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
                .show(ctx, |ui| {
                    egui::Frame::NONE
                        .fill(BUTTON_FILL)
                        .corner_radius(8)
                        .inner_margin(16)
                        .show(ui, |ui| {
                            ui.vertical_centered(|ui| {
                                ui.label(
                                    egui::RichText::new("Failed to load model")
                                        .color(egui::Color32::from_rgb(255, 100, 100))
                                        .strong(),
                                );
                                if let Some(error) = &params.phase.error {
                                    ui.label(egui::RichText::new(error).color(egui::Color32::GRAY).small());
                                }
                                ui.add_space(8.0);
                                if ui.button("Retry").clicked() {
                                    params.remount.write(RemountRequested);
                                }
                            });
                        });
                });
        }
        LifecyclePhase::Idle | LifecyclePhase::Ready => {}
    }

    let phase = params.phase.get();
    if let Some(hints) = params.hints.as_mut() {
        if hints_shown(hints, phase) {
            let mut open = true;
            egui::Window::new("🏎️ Explore the Cockpit")
                .id(egui::Id::new("cockpit_hints"))
                .anchor(egui::Align2::LEFT_TOP, egui::vec2(16.0, 56.0))
                .collapsible(false)
                .resizable(false)
                .open(&mut open)
                .show(ctx, |ui| {
                    ui.label("🖱️ Drag to rotate");
                    ui.label("🔍 Scroll to zoom");
                    ui.label("⌨️ WASD to move around");
                    ui.add_space(4.0);
                    ui.label(
                        egui::RichText::new("Tip: Click auto-rotate for a 360° view")
                            .color(egui::Color32::GRAY)
                            .small(),
                    );
                });
            if !open {
                hints.dismiss();
            }
        }
    }

    params.capture.0 = ctx.wants_pointer_input() || ctx.is_pointer_over_area();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_view_uses_configured_pose() {
        let config = ViewerConfig::default();
        let mut controls = OrbitControls::from_config(&config.controls, Vec3::new(0.0, 1.0, 0.0));
        let mut camera = Transform::from_xyz(3.0, 2.0, 5.0);
        controls.rotate_left(2.0);
        controls.auto_rotate = true;

        reset_view(&mut controls, &mut camera, &config);

        assert_eq!(controls.target, Vec3::new(0.0, 0.3, -0.5));
        assert!((camera.translation - Vec3::new(-0.2, 0.5, 1.2)).length() < 1e-4);
        assert!(!controls.is_settling());
        // Reset leaves the auto-rotate choice alone
        assert!(controls.auto_rotate);
    }

    #[test]
    fn test_hints_hidden_while_loading() {
        let mut hints = HintOverlay::default();
        assert!(hints.visible);
        assert!(!hints_shown(&hints, LifecyclePhase::Loading));
        assert!(hints_shown(&hints, LifecyclePhase::Ready));
        assert!(hints_shown(&hints, LifecyclePhase::Error));

        hints.dismiss();
        assert!(!hints_shown(&hints, LifecyclePhase::Ready));
    }

    #[test]
    fn test_button_fill_tracks_state() {
        assert_ne!(button_fill(true), button_fill(false));
        assert_eq!(button_fill(true), BUTTON_FILL_ACTIVE);
    }
}
