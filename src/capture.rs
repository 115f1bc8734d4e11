// src/capture.rs
use std::{borrow::Cow, fmt, path::Path, sync::Arc};

use anyhow::{Context as _, Result};
use crossbeam_channel::TryRecvError;
use image::{RgbImage, RgbaImage};
use log::{info, warn};
use nokhwa::utils::CameraIndex;

use crate::camera::{CameraHandle, CameraThreadMsg};

/// Which surface classification reads from. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Upload,
    Webcam,
}

/// Sampling failures the user is told about. Everything downstream of a
/// successful sample is failure-free by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    /// Upload mode before any file has been decoded.
    NoImageLoaded,
    /// Webcam mode before the first frame arrived.
    NoFrameYet,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoImageLoaded => write!(f, "Please upload an image first."),
            CaptureError::NoFrameYet => write!(f, "No webcam frame captured yet."),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Everything one camera drain produced.
#[derive(Default)]
pub struct CameraUpdate {
    pub frame: Option<Arc<RgbImage>>,
    pub error: Option<String>,
}

/// Single owner of the capture sources. The UI mutates it through the
/// handlers below; nothing else touches the camera or the cached images.
pub struct CaptureState {
    mode: CaptureMode,
    still: Option<RgbaImage>,
    live: Option<Arc<RgbImage>>,
    camera: Option<CameraHandle>,
}

impl CaptureState {
    pub fn new() -> Self {
        Self {
            mode: CaptureMode::Upload,
            still: None,
            live: None,
            camera: None,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn still_image(&self) -> Option<&RgbaImage> {
        self.still.as_ref()
    }

    pub fn live_frame(&self) -> Option<&Arc<RgbImage>> {
        self.live.as_ref()
    }

    /// Switch source. Entering Webcam arms the capture thread; leaving it
    /// releases the stream before the switch completes.
    pub fn set_mode(&mut self, mode: CaptureMode, ctx: &egui::Context) {
        if mode == self.mode {
            return;
        }
        match mode {
            CaptureMode::Webcam => {
                self.camera = Some(CameraHandle::start(CameraIndex::Index(0), ctx.clone()));
            }
            CaptureMode::Upload => self.release_camera(),
        }
        self.mode = mode;
    }

    /// Stop the capture thread and drop the latest frame. After this
    /// returns no platform stream is live.
    pub fn release_camera(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
        self.live = None;
    }

    /// Decode an image file into the still surface at its natural size.
    pub fn load_image(&mut self, path: &Path) -> Result<(u32, u32)> {
        let decoded = image::open(path)
            .with_context(|| format!("Failed to decode image {}", path.display()))?
            .to_rgba8();
        let dimensions = decoded.dimensions();
        info!(
            "Loaded image {} ({}x{})",
            path.display(),
            dimensions.0,
            dimensions.1
        );
        self.still = Some(decoded);
        Ok(dimensions)
    }

    /// Drain pending camera messages, keeping only the newest frame.
    pub fn drain_camera(&mut self) -> CameraUpdate {
        let mut update = CameraUpdate::default();
        let Some(camera) = self.camera.as_ref() else {
            return update;
        };
        loop {
            match camera.receiver().try_recv() {
                Ok(CameraThreadMsg::Frame(frame)) => update.frame = Some(frame),
                Ok(CameraThreadMsg::Error(err)) => {
                    warn!("Camera reported: {}", err);
                    update.error = Some(err);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if let Some(frame) = &update.frame {
            self.live = Some(frame.clone());
        }
        update
    }

    /// Flat RGBA samples covering the whole currently visible frame, read
    /// fresh from the active source.
    pub fn samples(&self) -> Result<Cow<'_, [u8]>, CaptureError> {
        match self.mode {
            CaptureMode::Upload => self
                .still
                .as_ref()
                .map(|image| Cow::Borrowed(image.as_raw().as_slice()))
                .ok_or(CaptureError::NoImageLoaded),
            CaptureMode::Webcam => self
                .live
                .as_ref()
                .map(|frame| Cow::Owned(rgb_to_rgba(frame)))
                .ok_or(CaptureError::NoFrameYet),
        }
    }
}

// Expand packed RGB bytes to RGBA with opaque alpha.
fn rgb_to_rgba(frame: &RgbImage) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(frame.as_raw().len() / 3 * 4);
    for pixel in frame.as_raw().chunks_exact(3) {
        rgba.extend_from_slice(pixel);
        rgba.push(255);
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    #[test]
    fn upload_without_image_reports_no_image() {
        let state = CaptureState::new();
        assert_eq!(state.samples().unwrap_err(), CaptureError::NoImageLoaded);
    }

    #[test]
    fn webcam_without_frame_reports_no_frame() {
        let mut state = CaptureState::new();
        state.mode = CaptureMode::Webcam;
        assert_eq!(state.samples().unwrap_err(), CaptureError::NoFrameYet);
    }

    #[test]
    fn still_samples_cover_every_pixel() {
        let mut state = CaptureState::new();
        state.still = Some(RgbaImage::from_pixel(4, 3, image::Rgba([255, 0, 0, 255])));
        let samples = state.samples().unwrap();
        assert_eq!(samples.len(), 4 * 3 * 4);
        assert_eq!(&samples[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn live_samples_expand_rgb_to_rgba() {
        let mut state = CaptureState::new();
        state.mode = CaptureMode::Webcam;
        state.live = Some(Arc::new(RgbImage::from_pixel(2, 2, image::Rgb([0, 128, 0]))));
        let samples = state.samples().unwrap();
        assert_eq!(samples.len(), 2 * 2 * 4);
        assert_eq!(&samples[..8], &[0, 128, 0, 255, 0, 128, 0, 255]);
    }

    #[test]
    fn switching_to_upload_releases_the_stream() {
        let (tx, rx) = crossbeam_channel::bounded::<CameraThreadMsg>(1);
        drop(tx);
        let stop_signal = Arc::new(AtomicBool::new(false));
        let live_tracks = Arc::new(AtomicUsize::new(1));

        let thread_stop = stop_signal.clone();
        let thread_tracks = live_tracks.clone();
        let fake_capture = thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(1));
            }
            thread_tracks.store(0, Ordering::Relaxed);
        });

        let mut state = CaptureState::new();
        state.mode = CaptureMode::Webcam;
        state.live = Some(Arc::new(RgbImage::from_pixel(1, 1, image::Rgb([0, 0, 0]))));
        state.camera = Some(crate::camera::fake_handle(
            rx,
            stop_signal.clone(),
            fake_capture,
        ));

        state.set_mode(CaptureMode::Upload, &egui::Context::default());

        assert_eq!(state.mode(), CaptureMode::Upload);
        assert!(state.camera.is_none());
        assert!(state.live.is_none());
        assert!(stop_signal.load(Ordering::Relaxed));
        assert_eq!(live_tracks.load(Ordering::Relaxed), 0);
    }
}
