//! First-visit hint panel state

use bevy::prelude::*;

/// Whether the "how to explore" panel is shown
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct HintOverlay {
    pub visible: bool,
    /// Elapsed-time deadline after which the panel hides itself
    dismiss_at: Option<f64>,
}

impl Default for HintOverlay {
    fn default() -> Self {
        Self {
            visible: true,
            dismiss_at: None,
        }
    }
}

impl HintOverlay {
    /// Hide after `delay_secs` from `now`; an earlier deadline is kept
    pub fn schedule_dismiss(&mut self, now: f64, delay_secs: f32) {
        let deadline = now + f64::from(delay_secs.max(0.0));
        self.dismiss_at = Some(self.dismiss_at.map_or(deadline, |d| d.min(deadline)));
    }

    pub fn dismiss(&mut self) {
        self.visible = false;
        self.dismiss_at = None;
    }

    pub fn is_scheduled(&self) -> bool {
        self.dismiss_at.is_some()
    }

    /// Returns true when this call hid the panel
    pub fn tick(&mut self, now: f64) -> bool {
        match self.dismiss_at {
            Some(deadline) if self.visible && now >= deadline => {
                self.dismiss();
                true
            }
            _ => false,
        }
    }
}

pub fn tick_hint_overlay(time: Res<Time>, hints: Option<ResMut<HintOverlay>>) {
    if let Some(mut hints) = hints {
        if hints.tick(time.elapsed_secs_f64()) {
            tracing::debug!("Hint overlay dismissed after delay");
        }
    }
}
