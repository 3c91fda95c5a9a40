use crossbeam::channel::{unbounded, Receiver, Sender};
use eframe::egui;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::camera::VideoSource;
use crate::capture::CaptureTier;
use crate::config::{CaptureMode, Config, LabelConfig};
use crate::orchestrator::{Rejection, SaveOrchestrator, SaveReport, ShotError};
use crate::session::SessionState;
use crate::storage::Destination;

// ============================================================================
// CONSTANTS FOR UI STYLING - Easy to modify
// ============================================================================
const PREVIEW_INTERVAL: Duration = Duration::from_millis(100);
const LABEL_TEXT_SIZE: f32 = 22.0;
const SUB_TEXT_SIZE: f32 = 18.0;

type ShotOutcome = Result<SaveReport, ShotError>;

// ============================================================================
// MAIN APP STRUCT
// ============================================================================

pub struct LabelCamApp {
    // Capture
    orchestrator: Arc<Mutex<SaveOrchestrator>>,
    runtime: Handle,
    source: Option<Arc<dyn VideoSource>>,
    labels: LabelConfig,
    mode: CaptureMode,
    burst_count: u32,

    // Preview
    pub preview_texture: Option<egui::TextureHandle>,
    pub last_preview_update: Option<Instant>,

    // Mirror of the orchestrator state, refreshed whenever it is not busy
    snapshot: SessionState,
    destination: Destination,
    mode_badge: Option<CaptureTier>,

    // Shots in flight
    in_flight: bool,
    notice: Option<String>,
    results_tx: Sender<ShotOutcome>,
    results_rx: Receiver<ShotOutcome>,
}

// ============================================================================
// INITIALIZATION
// ============================================================================

impl LabelCamApp {
    pub fn new(orchestrator: SaveOrchestrator, config: &Config, runtime: Handle) -> Self {
        let source = orchestrator.pipeline().source().cloned();
        let destination = orchestrator.destination().clone();
        let (results_tx, results_rx) = unbounded();

        let notice = source
            .is_none()
            .then(|| "Camera start failed: no camera available.".to_string());

        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            runtime,
            source,
            labels: config.labels.clone(),
            mode: config.capture.mode,
            burst_count: config.capture.burst_count,
            preview_texture: None,
            last_preview_update: None,
            snapshot: SessionState::default(),
            destination,
            mode_badge: None,
            in_flight: false,
            notice,
            results_tx,
            results_rx,
        }
    }

    /// Run `f` against the orchestrator unless a shot is holding it
    fn with_orchestrator(&mut self, f: impl FnOnce(&mut SaveOrchestrator)) {
        match self.orchestrator.try_lock() {
            Ok(mut guard) => {
                f(&mut guard);
                self.snapshot = guard.session().clone();
                self.notice = None;
            }
            Err(_) => self.notice = Some(Rejection::Busy.to_string()),
        }
    }

    fn refresh_snapshot(&mut self) {
        if let Ok(guard) = self.orchestrator.try_lock() {
            self.snapshot = guard.session().clone();
            self.destination = guard.destination().clone();
            self.mode_badge = guard.last_tier();
        }
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

impl LabelCamApp {
    fn select_primary(&mut self, label: &str) {
        let label = label.to_string();
        self.with_orchestrator(|o| {
            o.select_primary(&label);
        });
    }

    fn select_sub(&mut self, sub: &str) {
        let sub = sub.to_string();
        self.with_orchestrator(|o| {
            o.select_sub(&sub);
        });
    }

    fn reset_counter(&mut self) {
        self.with_orchestrator(|o| o.reset_counter());
    }

    fn choose_folder(&mut self) {
        if let Some(path) = rfd::FileDialog::new().set_title("Choose save folder").pick_folder() {
            self.with_orchestrator(|o| o.set_destination(Some(path)));
        }
    }

    fn use_downloads(&mut self) {
        self.with_orchestrator(|o| o.set_destination(None));
    }

    /// Concurrent triggers are rejected rather than queued
    fn trigger_capture(&mut self, ctx: &egui::Context) {
        let guard = match Arc::clone(&self.orchestrator).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.notice = Some(Rejection::Busy.to_string());
                return;
            }
        };

        self.in_flight = true;
        self.notice = None;
        let tx = self.results_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let mut orchestrator = guard;
            let outcome = orchestrator.shoot().await;
            drop(orchestrator);
            let _ = tx.send(outcome);
            ctx.request_repaint();
        });
    }

    fn drain_results(&mut self) {
        while let Ok(outcome) = self.results_rx.try_recv() {
            self.in_flight = false;
            // The finished shot's own status replaces any busy notice
            self.notice = None;
            match outcome {
                Ok(report) => log::debug!("{} file(s) saved via {}", report.shots.len(), report.tier),
                Err(ShotError::Rejected(rejection)) => log::debug!("Rejected: {}", rejection),
                Err(e) => log::warn!("{}", e),
            }
        }
    }

    fn handle_hotkeys(&mut self, ctx: &egui::Context) {
        let events = ctx.input(|i| i.events.clone());
        let mut capture = false;

        for event in events {
            match event {
                egui::Event::Key { key: egui::Key::Space, pressed: true, repeat: false, .. } => {
                    capture = true;
                }
                egui::Event::Text(text) => {
                    let mut chars = text.chars();
                    if let (Some(c), None) = (chars.next(), chars.next()) {
                        self.handle_char(c);
                    }
                }
                _ => {}
            }
        }

        if capture {
            self.trigger_capture(ctx);
        }
    }

    /// Digits pick a primary label by position, letters pick a sub-label
    fn handle_char(&mut self, c: char) {
        if let Some(digit) = c.to_digit(10) {
            if let Some(label) = (digit as usize)
                .checked_sub(1)
                .and_then(|i| self.labels.primary.get(i))
                .cloned()
            {
                self.select_primary(&label);
            }
            return;
        }

        if self.snapshot.selection.requires_sub(&self.labels) {
            let typed = c.to_ascii_uppercase().to_string();
            if let Some(sub) = self.labels.sub_labels.iter().find(|s| s.to_ascii_uppercase() == typed).cloned() {
                self.select_sub(&sub);
            }
        }
    }
}

// ============================================================================
// MAIN UPDATE LOOP
// ============================================================================

impl eframe::App for LabelCamApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        self.drain_results();
        self.handle_hotkeys(ctx);
        self.refresh_snapshot();
        self.update_camera_preview(ctx);

        egui::TopBottomPanel::bottom("controls")
            .resizable(false)
            .show(ctx, |ui| self.render_controls(ui, ctx));

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::from_rgb(40, 40, 40)))
            .show(ctx, |ui| self.render_preview(ui));

        // Keep the preview moving
        ctx.request_repaint_after(PREVIEW_INTERVAL);
    }
}

// ============================================================================
// RENDERING
// ============================================================================

impl LabelCamApp {
    fn update_camera_preview(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        let due = match self.last_preview_update {
            None => true,
            Some(last) => now.duration_since(last) >= PREVIEW_INTERVAL,
        };
        if !due {
            return;
        }

        if let Some(source) = self.source.clone() {
            if let Ok(frame) = source.preview_frame() {
                self.update_preview_texture(ctx, &frame);
                self.last_preview_update = Some(now);
            }
        }
    }

    fn render_preview(&mut self, ui: &mut egui::Ui) {
        let rect = ui.max_rect();

        if let Some(texture) = &self.preview_texture {
            let display_size = fit_image_in_rect(texture.size_vec2(), rect.size());
            let centered_rect = egui::Rect::from_center_size(rect.center(), display_size);
            ui.allocate_ui_at_rect(centered_rect, |ui| {
                ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
            });
        } else {
            ui.allocate_ui_at_rect(rect, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.label("No camera available");
                });
            });
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.add_space(8.0);

        // Primary labels
        let labels = self.labels.primary.clone();
        ui.horizontal(|ui| {
            for (i, label) in labels.iter().enumerate() {
                let selected = self.snapshot.selection.primary() == Some(label.as_str());
                let text = egui::RichText::new(format!("{} {}", i + 1, label)).size(LABEL_TEXT_SIZE);
                if ui.selectable_label(selected, text).clicked() {
                    self.select_primary(label);
                }
            }
        });

        // Sub-labels, only under the distinguished label
        if self.snapshot.selection.requires_sub(&self.labels) {
            let subs = self.labels.sub_labels.clone();
            ui.horizontal(|ui| {
                ui.label(format!("{}:", self.labels.distinguished));
                for sub in &subs {
                    let selected = self.snapshot.selection.sub() == Some(sub.as_str());
                    let text = egui::RichText::new(sub.as_str()).size(SUB_TEXT_SIZE);
                    if ui.selectable_label(selected, text).clicked() {
                        self.select_sub(sub);
                    }
                }
            });
        }

        ui.separator();

        ui.horizontal(|ui| {
            let capture_text = match self.mode {
                CaptureMode::Single => "Capture (Space)".to_string(),
                CaptureMode::Burst => format!("Burst x{} (Space)", self.burst_count),
            };
            let button = egui::Button::new(egui::RichText::new(capture_text).size(LABEL_TEXT_SIZE).strong());
            if ui.add_enabled(!self.in_flight, button).clicked() {
                self.trigger_capture(ctx);
            }

            if ui.button("Restart counter").clicked() {
                self.reset_counter();
            }
            if ui.button("Choose folder").clicked() {
                self.choose_folder();
            }
            if self.destination.is_folder() && ui.button("Use downloads").clicked() {
                self.use_downloads();
            }

            ui.separator();
            ui.label(egui::RichText::new(format!("Shots: {}", self.snapshot.shot_count)).size(LABEL_TEXT_SIZE));
        });

        ui.horizontal(|ui| {
            let folder = match &self.destination {
                Destination::Folder(path) => format!("Folder: {}", path.display()),
                Destination::Download(path) => format!("Download: {}", path.display()),
            };
            ui.label(folder);
            if let Some(tier) = self.mode_badge {
                ui.separator();
                ui.label(tier.to_string());
            }
        });

        let status = self.status_line();
        let color = if status.starts_with("Save error") || status.starts_with("Capture failed") {
            egui::Color32::from_rgb(220, 80, 80)
        } else {
            egui::Color32::LIGHT_GRAY
        };
        ui.label(egui::RichText::new(status).color(color));
        ui.add_space(8.0);
    }
}

impl LabelCamApp {
    fn status_line(&self) -> &str {
        self.notice.as_deref().unwrap_or(&self.snapshot.status)
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn fit_image_in_rect(image_size: egui::Vec2, rect_size: egui::Vec2) -> egui::Vec2 {
    let scale = (rect_size.x / image_size.x).min(rect_size.y / image_size.y);
    image_size * scale
}
