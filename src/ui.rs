// src/ui.rs
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use egui::{
    Align, Color32, ColorImage, CornerRadius, ImageData, Layout, RichText, Sense, TextureHandle,
    TextureOptions, Vec2,
};
use image::{RgbImage, RgbaImage};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    capture::{CaptureMode, CaptureState},
    detect::{self, Detection},
    trigger,
};

const FPS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);
const SWATCH_SIZE: f32 = 56.0;

/// User preferences restored across runs.
#[derive(Serialize, Deserialize)]
struct Prefs {
    trigger_key: String,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            trigger_key: trigger::DEFAULT_TRIGGER_KEY.to_owned(),
        }
    }
}

pub struct RainbowAppUI {
    capture: CaptureState,
    trigger_key: String,

    // --- Result and status fields ---
    detection: Option<Detection>,
    detect_error: Option<String>,
    camera_error: Option<String>,

    // --- Surfaces ---
    still_texture: Option<TextureHandle>,
    live_texture: Option<TextureHandle>,

    // --- FPS fields ---
    last_fps_update_time: Instant,
    frames_since_last_update: u32,
    last_calculated_fps: f32,
}

impl RainbowAppUI {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        info!("Initializing RainbowAppUI");
        let prefs: Prefs = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, eframe::APP_KEY))
            .unwrap_or_default();

        Self {
            capture: CaptureState::new(),
            trigger_key: prefs.trigger_key,
            detection: None,
            detect_error: None,
            camera_error: None,
            still_texture: None,
            live_texture: None,
            last_fps_update_time: Instant::now(),
            frames_since_last_update: 0,
            last_calculated_fps: 0.0,
        }
    }

    fn update_fps_counter(&mut self) {
        self.frames_since_last_update += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update_time);

        if elapsed >= FPS_UPDATE_INTERVAL {
            let elapsed_secs = elapsed.as_secs_f32();
            self.last_calculated_fps = if elapsed_secs > 0.0 {
                self.frames_since_last_update as f32 / elapsed_secs
            } else {
                f32::INFINITY
            };
            self.frames_since_last_update = 0;
            self.last_fps_update_time = now;
        }
    }

    fn set_mode(&mut self, mode: CaptureMode, ctx: &egui::Context) {
        if mode == self.capture.mode() {
            return;
        }
        info!("Switching capture mode to {:?}", mode);
        self.capture.set_mode(mode, ctx);
        self.camera_error = None;
        self.detect_error = None;
        if mode == CaptureMode::Upload {
            self.live_texture = None;
        }
    }

    fn pick_image(&mut self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "bmp", "gif", "webp"])
            .pick_file()
        else {
            return;
        };
        match self.capture.load_image(&path) {
            Ok(_) => {
                self.detect_error = None;
                if let Some(image) = self.capture.still_image() {
                    self.still_texture = Some(ctx.load_texture(
                        "uploaded_image",
                        ImageData::Color(Arc::new(color_image_from_rgba(image))),
                        TextureOptions::LINEAR,
                    ));
                }
            }
            Err(err) => {
                error!("Image load failed: {:#}", err);
                self.detect_error = Some(format!("{:#}", err));
            }
        }
    }

    /// Pull frames and errors off the camera channel, keeping the newest
    /// frame as the live surface.
    fn drain_camera(&mut self, ctx: &egui::Context) {
        let update = self.capture.drain_camera();
        if let Some(frame) = update.frame {
            let color_image = color_image_from_rgb(&frame);
            match self.live_texture {
                Some(ref mut texture) => {
                    texture.set(ImageData::Color(Arc::new(color_image)), TextureOptions::LINEAR);
                }
                None => {
                    info!(
                        "Creating webcam texture ({}x{})",
                        frame.width(),
                        frame.height()
                    );
                    self.live_texture = Some(ctx.load_texture(
                        "webcam_stream",
                        ImageData::Color(Arc::new(color_image)),
                        TextureOptions::LINEAR,
                    ));
                }
            }
        }
        if let Some(err) = update.error {
            self.camera_error = Some(err);
        }
    }

    /// Run the pipeline once for every key press matching the configured
    /// trigger. Auto-repeat presses count; there is no debounce.
    fn handle_trigger_keys(&mut self, ctx: &egui::Context) {
        let pressed: Vec<&'static str> = ctx.input(|input| {
            input
                .events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key, pressed: true, ..
                    } => Some(key.name()),
                    _ => None,
                })
                .collect()
        });
        for name in pressed {
            if trigger::matches(&self.trigger_key, name) {
                self.run_detection();
            }
        }
    }

    fn run_detection(&mut self) {
        match self.capture.samples() {
            Ok(samples) => {
                let detection = detect::classify(&samples);
                info!(
                    "Detected {} at average RGB {:?}",
                    detection.name(),
                    detection.average
                );
                self.detection = Some(detection);
                self.detect_error = None;
            }
            Err(err) => {
                warn!("Classification aborted: {}", err);
                self.detect_error = Some(err.to_string());
            }
        }
    }

    fn show_controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            let mut mode = self.capture.mode();
            egui::ComboBox::from_label("Source")
                .selected_text(mode_label(mode))
                .show_ui(ui, |ui| {
                    ui.selectable_value(
                        &mut mode,
                        CaptureMode::Upload,
                        mode_label(CaptureMode::Upload),
                    );
                    ui.selectable_value(
                        &mut mode,
                        CaptureMode::Webcam,
                        mode_label(CaptureMode::Webcam),
                    );
                });
            self.set_mode(mode, ctx);

            if self.capture.mode() == CaptureMode::Upload && ui.button("Open image…").clicked() {
                self.pick_image(ctx);
            }
        });

        ui.horizontal(|ui| {
            ui.label("Activation key:");
            ui.add(egui::TextEdit::singleline(&mut self.trigger_key).desired_width(120.0))
                .on_hover_text("Key that runs detection. Type \"Space\" for the space bar.");
        });
    }

    fn show_result(&self, ui: &mut egui::Ui) {
        match &self.detection {
            Some(detection) => {
                let [r, g, b] = detection.average;
                let mut name = RichText::new(detection.name()).heading();
                if let Some(band) = detection.band {
                    name = name.color(Color32::from_rgb(
                        band.reference[0],
                        band.reference[1],
                        band.reference[2],
                    ));
                }
                ui.horizontal(|ui| {
                    let (rect, _) = ui.allocate_exact_size(Vec2::splat(SWATCH_SIZE), Sense::hover());
                    ui.painter()
                        .rect_filled(rect, CornerRadius::same(4), Color32::from_rgb(r, g, b));
                    ui.vertical(|ui| {
                        ui.label(name);
                        ui.label(format!("RGB: ({}, {}, {})", r, g, b));
                    });
                });
            }
            None => {
                ui.label(format!(
                    "Press \"{}\" to detect the dominant rainbow color.",
                    self.trigger_key
                ));
            }
        }
    }

    fn show_surface(&self, ui: &mut egui::Ui) {
        let texture = match self.capture.mode() {
            CaptureMode::Upload => self.still_texture.as_ref(),
            CaptureMode::Webcam => self.live_texture.as_ref(),
        };
        match texture {
            Some(texture) => {
                let tex_size = texture.size_vec2();
                let aspect_ratio = if tex_size.y > 0.0 {
                    tex_size.x / tex_size.y
                } else {
                    1.0
                };
                let available_width = ui.available_width();
                let available_height = ui.available_height();
                let mut image_width = available_width;
                let mut image_height = available_width / aspect_ratio;
                if image_height > available_height {
                    image_height = available_height;
                    image_width = available_height * aspect_ratio;
                }

                ui.with_layout(Layout::top_down(Align::Center), |ui| {
                    ui.add(
                        egui::Image::new(texture)
                            .max_width(image_width)
                            .max_height(image_height)
                            .maintain_aspect_ratio(true)
                            .corner_radius(CornerRadius::same(5)),
                    );
                });
            }
            None => match self.capture.mode() {
                CaptureMode::Upload => {
                    ui.label("No image loaded yet.");
                }
                CaptureMode::Webcam if self.camera_error.is_none() => {
                    ui.with_layout(Layout::top_down(Align::Center), |ui| {
                        ui.add_space(ui.available_height() / 3.0);
                        ui.spinner();
                        ui.label("Initializing camera stream...");
                    });
                }
                CaptureMode::Webcam => {}
            },
        }
    }
}

impl eframe::App for RainbowAppUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_fps_counter();

        if self.capture.mode() == CaptureMode::Webcam {
            self.drain_camera(ctx);
        }
        self.handle_trigger_keys(ctx);

        // --- Top Panel (Menu Bar) ---
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.add_space(16.0);
                egui::widgets::global_theme_preference_buttons(ui);
            });
        });

        // --- Bottom Panel (FPS / active source info) ---
        egui::TopBottomPanel::bottom("bottom_panel")
            .resizable(false)
            .show(ctx, |ui| {
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    ui.label(format!("UI FPS: {:.1}", self.last_calculated_fps));
                    ui.add_space(10.0);
                    match self.capture.mode() {
                        CaptureMode::Webcam => {
                            if let Some(frame) = self.capture.live_frame() {
                                ui.label(format!(
                                    "Cam Res: {}x{}",
                                    frame.width(),
                                    frame.height()
                                ));
                            } else if self.camera_error.is_none() {
                                ui.label("Cam Res: ...");
                            }
                        }
                        CaptureMode::Upload => {
                            if let Some(image) = self.capture.still_image() {
                                ui.label(format!(
                                    "Image: {}x{}",
                                    image.width(),
                                    image.height()
                                ));
                            }
                        }
                    }
                });
            });

        // --- Central Panel (controls, result, active surface) ---
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Rainbow Color Detector");
            ui.separator();

            if let Some(err) = &self.camera_error {
                ui.colored_label(Color32::YELLOW, format!("Camera Status: {}", err));
            }
            if let Some(err) = &self.detect_error {
                ui.colored_label(Color32::RED, format!("Detection Status: {}", err));
            }

            self.show_controls(ui, ctx);
            self.show_result(ui);
            ui.separator();
            self.show_surface(ui);
        });
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(
            storage,
            eframe::APP_KEY,
            &Prefs {
                trigger_key: self.trigger_key.clone(),
            },
        );
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Exit requested. Releasing camera...");
        self.capture.release_camera();
    }
}

fn mode_label(mode: CaptureMode) -> &'static str {
    match mode {
        CaptureMode::Upload => "Upload image",
        CaptureMode::Webcam => "Webcam",
    }
}

fn color_image_from_rgb(frame: &RgbImage) -> ColorImage {
    let size = [frame.width() as usize, frame.height() as usize];
    ColorImage::from_rgb(size, frame.as_raw())
}

fn color_image_from_rgba(image: &RgbaImage) -> ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    ColorImage::from_rgba_unmultiplied(size, image.as_raw())
}
