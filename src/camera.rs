// src/camera.rs
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use image::RgbImage;
use log::{error, info, warn};
use nokhwa::{
    pixel_format::{RgbFormat, YuyvFormat},
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
    Camera, NokhwaError,
};

// --- Constants ---
// Fallback sizing; the closest format the device actually supports wins.
const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const REQUESTED_FPS: u32 = 30;
// Frames queued for the UI thread. New frames are dropped while it is full.
const FRAME_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug)]
pub enum CameraThreadMsg {
    Frame(Arc<RgbImage>),
    Error(String),
}

/// Owns the capture thread. `release` (also run on drop) sets the stop flag
/// and joins the thread, which stops the platform stream on its way out, so
/// no stream outlives the handle.
pub struct CameraHandle {
    rx: Receiver<CameraThreadMsg>,
    stop_signal: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CameraHandle {
    pub fn start(index: CameraIndex, ctx: egui::Context) -> Self {
        info!("Spawning camera capture thread for camera {:?}.", index);
        let (msg_sender, rx) = bounded(FRAME_CHANNEL_CAPACITY);
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = stop_signal.clone();
        let thread = thread::spawn(move || {
            camera_capture_loop(index, msg_sender, thread_stop, ctx);
        });
        Self {
            rx,
            stop_signal,
            thread: Some(thread),
        }
    }

    pub fn receiver(&self) -> &Receiver<CameraThreadMsg> {
        &self.rx
    }

    /// Stop the capture thread and wait for the stream to be released.
    pub fn release(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if let Err(e) = handle.join() {
                error!("Camera thread panicked: {:?}", e);
            } else {
                info!("Camera thread joined successfully.");
            }
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) fn fake_handle(
    rx: Receiver<CameraThreadMsg>,
    stop_signal: Arc<AtomicBool>,
    thread: JoinHandle<()>,
) -> CameraHandle {
    CameraHandle {
        rx,
        stop_signal,
        thread: Some(thread),
    }
}

fn camera_capture_loop(
    index: CameraIndex,
    msg_sender: Sender<CameraThreadMsg>,
    stop_signal: Arc<AtomicBool>,
    ctx: egui::Context,
) {
    info!("Camera capture loop started. Requesting YUYV format.");
    let requested_resolution = Resolution::new(REQUESTED_WIDTH, REQUESTED_HEIGHT);
    let requested_cam_format =
        CameraFormat::new(requested_resolution, FrameFormat::YUYV, REQUESTED_FPS);
    let requested_format =
        RequestedFormat::new::<YuyvFormat>(RequestedFormatType::Closest(requested_cam_format));

    // --- Initialize Camera ---
    let mut camera = match Camera::new(index, requested_format) {
        Ok(cam) => {
            info!("Camera initialized successfully.");
            cam
        }
        Err(err) => {
            let error_msg = format!("Failed to open camera: {}", err);
            error!("{}", error_msg);
            let _ = msg_sender.send(CameraThreadMsg::Error(error_msg));
            ctx.request_repaint();
            return;
        }
    };

    info!("Actual camera format received: {:?}", camera.camera_format());
    if let Err(err) = camera.open_stream() {
        let error_msg = format!("Failed to open stream: {}", err);
        error!("{}", error_msg);
        let _ = msg_sender.send(CameraThreadMsg::Error(error_msg));
        ctx.request_repaint();
        return;
    }
    info!("Camera stream opened successfully.");

    // --- Frame Capture Loop ---
    while !stop_signal.load(Ordering::Relaxed) {
        match camera.frame() {
            Ok(frame) => match frame.decode_image::<RgbFormat>() {
                Ok(decoded_rgb_image) => {
                    let frame_arc = Arc::new(decoded_rgb_image);
                    match msg_sender.try_send(CameraThreadMsg::Frame(frame_arc)) {
                        Ok(()) => ctx.request_repaint(),
                        Err(TrySendError::Full(_)) => {
                            warn!("UI frame channel full. Dropping frame.");
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            info!("UI receiver disconnected. Stopping camera loop.");
                            break;
                        }
                    }
                }
                Err(err) => {
                    warn!("Failed to decode frame to RGB: {}", err);
                    thread::sleep(Duration::from_millis(50));
                }
            },
            Err(err) => match err {
                NokhwaError::ReadFrameError(msg) if msg.contains("Timeout") => {
                    warn!("Camera frame read timeout.");
                    thread::sleep(Duration::from_millis(100));
                }
                _ => {
                    let error_msg = format!("Failed to capture frame: {}", err);
                    error!("{}", error_msg);
                    if msg_sender.send(CameraThreadMsg::Error(error_msg)).is_err() {
                        info!("UI receiver disconnected after capture error.");
                        break;
                    }
                    ctx.request_repaint();
                    thread::sleep(Duration::from_secs(1));
                }
            },
        }
    }

    // --- Cleanup ---
    info!("Camera capture loop stopping signal received.");
    if let Err(e) = camera.stop_stream() {
        error!("Failed to stop camera stream cleanly: {}", e);
    }
    info!("Camera capture loop finished.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn release_stops_the_capture_thread() {
        let (tx, rx) = bounded::<CameraThreadMsg>(1);
        drop(tx);
        let stop_signal = Arc::new(AtomicBool::new(false));
        // Stands in for the platform stream's open track count.
        let live_tracks = Arc::new(AtomicUsize::new(1));

        let thread_stop = stop_signal.clone();
        let thread_tracks = live_tracks.clone();
        let thread = thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(1));
            }
            thread_tracks.store(0, Ordering::Relaxed);
        });

        let mut handle = fake_handle(rx, stop_signal.clone(), thread);
        handle.release();

        assert!(stop_signal.load(Ordering::Relaxed));
        assert_eq!(live_tracks.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn release_is_idempotent() {
        let (tx, rx) = bounded::<CameraThreadMsg>(1);
        drop(tx);
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = stop_signal.clone();
        let thread = thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(1));
            }
        });

        let mut handle = fake_handle(rx, stop_signal, thread);
        handle.release();
        handle.release();
    }
}
