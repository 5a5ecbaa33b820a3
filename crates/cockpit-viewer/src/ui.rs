//! Host navigation bar

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};

use crate::app::ViewState;

pub struct NavigationPlugin;

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(EguiPrimaryContextPass, navigation_ui_system);
    }
}

fn navigation_ui_system(
    mut contexts: EguiContexts,
    view: Res<State<ViewState>>,
    mut next_view: ResMut<NextState<ViewState>>,
) {
    let Ok(ctx) = contexts.ctx_mut() else { return };
    let current = *view.get();

    egui::TopBottomPanel::top("navigation").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.heading("F1 Dashboard");
            ui.separator();
            for (target, label) in [(ViewState::Dashboard, "Dashboard"), (ViewState::Cockpit, "🏎️ Cockpit")] {
                if ui.add(egui::Button::new(label).selected(current == target)).clicked() && current != target {
                    next_view.set(target);
                }
            }
        });
    });

    if current == ViewState::Dashboard {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.4);
                ui.label(egui::RichText::new("Step into the RB16B").size(20.0));
                if ui.button("Open cockpit view").clicked() {
                    next_view.set(ViewState::Cockpit);
                }
            });
        });
    }
}
