//! Label-driven photo capture: grab a frame from the camera, crop it to a
//! square if asked, and file it under `<label>/<sub-label>/` with a
//! timestamped name.

pub mod camera;
#[cfg(feature = "camera")]
pub mod camera_controller;
pub mod capture;
pub mod cli;
pub mod config;
pub mod crop;
pub mod naming;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod texture;
pub mod ui;

pub use capture::{Capture, CaptureError, CapturePipeline, CaptureTier, EncodedImage};
pub use config::{CaptureMode, Config};
pub use orchestrator::{Rejection, SaveOrchestrator, SaveReport, SavedShot, ShotError};
pub use storage::Destination;
