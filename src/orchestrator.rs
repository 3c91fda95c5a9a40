use std::path::PathBuf;
use thiserror::Error;
use tokio::time::{sleep, Duration};

use crate::capture::{Capture, CaptureError, CapturePipeline, CaptureTier};
use crate::config::{CaptureMode, Config, LabelConfig};
use crate::naming::{self, Clock, ShotName, SystemClock};
use crate::session::SessionState;
use crate::storage::Destination;

/// Why a shot was refused before the camera was touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Camera is not started.")]
    CameraNotReady,

    #[error("Select a label first.")]
    NoLabel,

    #[error("Select a sub-label for {label} ({options}).")]
    SubLabelRequired { label: String, options: String },

    #[error("Capture in progress.")]
    Busy,
}

#[derive(Debug, Error)]
pub enum ShotError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// Files written before the failure are listed in `saved`
    #[error("Save error: {message}")]
    Persist { message: String, saved: Vec<SavedShot> },

    /// A burst frame could not be captured after earlier frames were written
    #[error("Capture failed after {} frame(s): {source}", .saved.len())]
    BurstCapture { source: CaptureError, saved: Vec<SavedShot> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedShot {
    pub path: PathBuf,
    pub logical_path: String,
    pub downloaded: bool,
}

#[derive(Debug, Clone)]
pub struct SaveReport {
    pub shots: Vec<SavedShot>,
    pub tier: CaptureTier,
    pub shot_count: u32,
}

/// Owns the session state and turns triggers into labelled files
pub struct SaveOrchestrator {
    pipeline: CapturePipeline,
    labels: LabelConfig,
    destination: Destination,
    download_dir: PathBuf,
    burst_count: u32,
    burst_interval: Duration,
    clock: Box<dyn Clock>,
    session: SessionState,
    last_tier: Option<CaptureTier>,
}

impl SaveOrchestrator {
    pub fn new(pipeline: CapturePipeline, config: &Config) -> Self {
        let download_dir = config.paths.download_dir.clone();
        let destination = match &config.paths.base_dir {
            Some(base) => Destination::Folder(base.clone()),
            None => Destination::Download(download_dir.clone()),
        };

        Self {
            pipeline,
            labels: config.labels.clone(),
            destination,
            download_dir,
            burst_count: config.capture.burst_count,
            burst_interval: Duration::from_millis(config.capture.burst_interval_ms),
            clock: Box::new(SystemClock),
            session: SessionState::default(),
            last_tier: None,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn labels(&self) -> &LabelConfig {
        &self.labels
    }

    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn last_tier(&self) -> Option<CaptureTier> {
        self.last_tier
    }

    pub fn select_primary(&mut self, label: &str) -> bool {
        self.session.selection.select_primary(&self.labels, label)
    }

    pub fn select_sub(&mut self, sub: &str) -> bool {
        self.session.selection.select_sub(&self.labels, sub)
    }

    /// `None` switches to the download fallback
    pub fn set_destination(&mut self, base: Option<PathBuf>) {
        self.destination = match base {
            Some(base) => {
                self.session.status = "Save folder set.".to_string();
                Destination::Folder(base)
            }
            None => {
                self.session.status = "No folder chosen, saving as downloads.".to_string();
                Destination::Download(self.download_dir.clone())
            }
        };
        log::info!("Destination: {:?}", self.destination);
    }

    pub fn reset_counter(&mut self) {
        self.session.reset_counter();
        log::info!("Shot counter reset");
    }

    /// Single shot or burst, depending on the configured mode
    pub async fn shoot(&mut self) -> Result<SaveReport, ShotError> {
        match self.pipeline.config().mode {
            CaptureMode::Single => self.save_shot().await,
            CaptureMode::Burst => self.save_burst().await,
        }
    }

    pub async fn save_shot(&mut self) -> Result<SaveReport, ShotError> {
        self.session.status.clear();
        let (primary, sub) = self.check_preconditions()?;

        let result = self.pipeline.capture().await;
        let capture = self.run_capture(result)?;
        let ts = naming::timestamp(self.clock.now());
        let name = ShotName::single(&ts, &primary, sub.as_deref(), self.pipeline.square_size());

        let shot = self.persist(&name, capture.image.bytes(), Vec::new()).await?;
        self.session.status = format!("{}: {}", verb(&shot), shot.logical_path);

        Ok(SaveReport {
            shots: vec![shot],
            tier: capture.tier,
            shot_count: self.session.shot_count,
        })
    }

    /// `burst_count` frames sharing one timestamp, each persisted before the next
    pub async fn save_burst(&mut self) -> Result<SaveReport, ShotError> {
        self.session.status.clear();
        let (primary, sub) = self.check_preconditions()?;

        let ts = naming::timestamp(self.clock.now());
        self.pipeline.settle().await;

        let mut saved: Vec<SavedShot> = Vec::new();
        let mut tier = CaptureTier::Preview;
        for seq in 1..=self.burst_count {
            if seq > 1 {
                sleep(self.burst_interval).await;
            }

            let result = self.pipeline.capture_now().await;
            let capture = match self.run_capture(result) {
                Ok(capture) => capture,
                Err(ShotError::Capture(source)) if !saved.is_empty() => {
                    return Err(ShotError::BurstCapture { source, saved });
                }
                Err(e) => return Err(e),
            };
            tier = capture.tier;
            let name = ShotName::burst_frame(&ts, &primary, sub.as_deref(), seq);
            let shot = self.persist(&name, capture.image.bytes(), saved.clone()).await?;
            saved.push(shot);
        }

        if let Some(last) = saved.last() {
            self.session.status = format!("{} {} frames: {}", verb(last), saved.len(), last.logical_path);
        }
        log::info!("Burst of {} frames complete", saved.len());

        Ok(SaveReport {
            shots: saved,
            tier,
            shot_count: self.session.shot_count,
        })
    }

    /// Ordered checks; any failure stops before the camera is used
    fn check_preconditions(&mut self) -> Result<(String, Option<String>), ShotError> {
        let result = if !self.pipeline.has_active_source() {
            Err(Rejection::CameraNotReady)
        } else {
            let selection = &self.session.selection;
            match selection.primary() {
                None => Err(Rejection::NoLabel),
                Some(primary) if selection.requires_sub(&self.labels) && selection.sub().is_none() => {
                    Err(Rejection::SubLabelRequired {
                        label: primary.to_string(),
                        options: self.labels.sub_labels.join("/"),
                    })
                }
                Some(primary) => Ok((primary.to_string(), selection.sub().map(str::to_string))),
            }
        };

        result.map_err(|rejection| {
            self.session.status = rejection.to_string();
            log::debug!("Shot rejected: {}", rejection);
            ShotError::Rejected(rejection)
        })
    }

    fn run_capture(
        &mut self,
        result: Result<Capture, CaptureError>,
    ) -> Result<Capture, ShotError> {
        match result {
            Ok(capture) => {
                self.last_tier = Some(capture.tier);
                Ok(capture)
            }
            Err(e) => {
                log::error!("Capture failed: {}", e);
                self.session.status = format!("Capture failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn persist(
        &mut self,
        name: &ShotName,
        bytes: &[u8],
        saved_so_far: Vec<SavedShot>,
    ) -> Result<SavedShot, ShotError> {
        match self.destination.persist(name, bytes).await {
            Ok(path) => {
                self.session.shot_count += 1;
                log::info!("Saved shot #{} to {}", self.session.shot_count, path.display());
                Ok(SavedShot {
                    path,
                    logical_path: name.logical_path(),
                    downloaded: !self.destination.is_folder(),
                })
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("Save failed: {}", message);
                self.session.status = format!("Save error: {}", message);
                Err(ShotError::Persist { message, saved: saved_so_far })
            }
        }
    }
}

fn verb(shot: &SavedShot) -> &'static str {
    if shot.downloaded {
        "Downloaded"
    } else {
        "Saved"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{SourceCapabilities, VideoSource};
    use crate::config::ConfigBuilder;
    use crate::naming::FixedClock;
    use chrono::{NaiveDate, NaiveDateTime};
    use image::{ImageBuffer, Rgb, RgbImage};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct CountingSource {
        frames: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VideoSource for CountingSource {
        fn is_active(&self) -> bool {
            true
        }

        fn capabilities(&self) -> SourceCapabilities {
            SourceCapabilities::default()
        }

        fn preview_frame(&self) -> anyhow::Result<RgbImage> {
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(ImageBuffer::from_pixel(32, 24, Rgb([200, 100, 50])))
        }
    }

    /// Misbehaves on a given frame number of a burst
    enum Fault {
        NoFrame(usize),
        BlockFolder(usize, PathBuf),
    }

    struct FaultySource {
        frames: AtomicUsize,
        fault: Fault,
    }

    #[async_trait::async_trait]
    impl VideoSource for FaultySource {
        fn is_active(&self) -> bool {
            true
        }

        fn capabilities(&self) -> SourceCapabilities {
            SourceCapabilities::default()
        }

        fn preview_frame(&self) -> anyhow::Result<RgbImage> {
            let n = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
            match &self.fault {
                Fault::NoFrame(at) if n == *at => return Err(anyhow::anyhow!("sensor timeout")),
                Fault::BlockFolder(at, dir) if n == *at => block_folder(dir),
                _ => {}
            }
            Ok(ImageBuffer::from_pixel(32, 24, Rgb([0, 0, 0])))
        }
    }

    // Replace a folder with a plain file so writes below it fail
    fn block_folder(dir: &Path) {
        std::fs::remove_dir_all(dir).unwrap();
        std::fs::write(dir, b"in the way").unwrap();
    }

    fn faulty_burst(dir: &TempDir, fault: Fault) -> SaveOrchestrator {
        let config = ConfigBuilder::new()
            .native()
            .burst(5, 150)
            .settle_ms(0)
            .base_dir(Some(dir.path().to_path_buf()))
            .build()
            .unwrap();
        let source = Arc::new(FaultySource { frames: AtomicUsize::new(0), fault });
        let pipeline = CapturePipeline::new(Some(source), config.capture.clone());
        let mut orchestrator = SaveOrchestrator::new(pipeline, &config).with_clock(Box::new(FixedClock(noon())));
        orchestrator.select_primary("Big Lot");
        orchestrator
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn orchestrator(config: &Config) -> (SaveOrchestrator, Arc<CountingSource>) {
        let source = Arc::new(CountingSource { frames: AtomicUsize::new(0) });
        let pipeline = CapturePipeline::new(Some(source.clone()), config.capture.clone());
        let orchestrator = SaveOrchestrator::new(pipeline, config).with_clock(Box::new(FixedClock(noon())));
        (orchestrator, source)
    }

    fn folder_config(dir: &TempDir) -> Config {
        ConfigBuilder::new()
            .square(Some(224))
            .settle_ms(0)
            .base_dir(Some(dir.path().to_path_buf()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_camera_rejected_first() {
        let config = Config::default();
        let pipeline = CapturePipeline::new(None, config.capture.clone());
        let mut orchestrator = SaveOrchestrator::new(pipeline, &config);

        let err = orchestrator.save_shot().await.unwrap_err();
        assert!(matches!(err, ShotError::Rejected(Rejection::CameraNotReady)));
        assert_eq!(orchestrator.session().status, "Camera is not started.");
    }

    #[tokio::test]
    async fn test_no_label_rejected_without_capture() {
        let temp_dir = TempDir::new().unwrap();
        let (mut orchestrator, source) = orchestrator(&folder_config(&temp_dir));

        let err = orchestrator.save_shot().await.unwrap_err();
        assert!(matches!(err, ShotError::Rejected(Rejection::NoLabel)));
        assert_eq!(source.frames.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.session().shot_count, 0);
    }

    #[tokio::test]
    async fn test_missing_sub_label_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let (mut orchestrator, source) = orchestrator(&folder_config(&temp_dir));
        orchestrator.select_primary("Snyders");

        let err = orchestrator.save_shot().await.unwrap_err();
        match err {
            ShotError::Rejected(Rejection::SubLabelRequired { label, options }) => {
                assert_eq!(label, "Snyders");
                assert_eq!(options, "C/D/E");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(orchestrator.session().status, "Select a sub-label for Snyders (C/D/E).");
        assert_eq!(source.frames.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.session().shot_count, 0);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_saves_into_label_folders() {
        let temp_dir = TempDir::new().unwrap();
        let (mut orchestrator, _source) = orchestrator(&folder_config(&temp_dir));
        orchestrator.select_primary("Snyders");
        orchestrator.select_sub("D");

        let report = orchestrator.save_shot().await.unwrap();
        let expected = temp_dir.path().join("Snyders/D/20240307_120000_Snyders_D_224sq.png");
        assert_eq!(report.shots[0].path, expected);
        assert_eq!(report.tier, CaptureTier::Preview);
        assert_eq!(report.shot_count, 1);
        assert_eq!(
            orchestrator.session().status,
            "Saved: Snyders/D/20240307_120000_Snyders_D_224sq.png"
        );

        let saved = image::open(&expected).unwrap();
        assert_eq!((saved.width(), saved.height()), (224, 224));
    }

    #[tokio::test]
    async fn test_counter_counts_successes_and_overwrites_same_second() {
        let temp_dir = TempDir::new().unwrap();
        let (mut orchestrator, _source) = orchestrator(&folder_config(&temp_dir));
        orchestrator.select_primary("C Press");

        for _ in 0..3 {
            orchestrator.save_shot().await.unwrap();
        }
        assert_eq!(orchestrator.session().shot_count, 3);

        // identical label and second: one file, overwritten
        let files = std::fs::read_dir(temp_dir.path().join("C Press")).unwrap().count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_counter() {
        let temp_dir = TempDir::new().unwrap();
        let (mut orchestrator, _source) = orchestrator(&folder_config(&temp_dir));
        orchestrator.select_primary("Big Lot");
        orchestrator.save_shot().await.unwrap();

        // Replace the label folder with a file so the next write fails
        std::fs::remove_dir_all(temp_dir.path().join("Big Lot")).unwrap();
        std::fs::write(temp_dir.path().join("Big Lot"), b"in the way").unwrap();

        let err = orchestrator.save_shot().await.unwrap_err();
        assert!(matches!(err, ShotError::Persist { .. }));
        assert_eq!(orchestrator.session().shot_count, 1);
        assert!(orchestrator.session().status.starts_with("Save error: "));
    }

    #[tokio::test]
    async fn test_download_fallback_flattens_name() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .native()
            .download_dir(temp_dir.path().to_path_buf())
            .build()
            .unwrap();
        let (mut orchestrator, _source) = orchestrator(&config);
        orchestrator.select_primary("Big Lot");

        let report = orchestrator.save_shot().await.unwrap();
        assert!(report.shots[0].downloaded);
        assert_eq!(report.shots[0].path, temp_dir.path().join("Big Lot_20240307_120000_Big Lot.png"));
        assert_eq!(orchestrator.session().shot_count, 1);
        assert_eq!(orchestrator.session().status, "Downloaded: Big Lot/20240307_120000_Big Lot.png");
    }

    #[tokio::test]
    async fn test_set_destination_switches_modes() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .download_dir(temp_dir.path().join("dl"))
            .build()
            .unwrap();
        let (mut orchestrator, _source) = orchestrator(&config);
        assert!(!orchestrator.destination().is_folder());

        orchestrator.set_destination(Some(temp_dir.path().join("base")));
        assert_eq!(orchestrator.destination(), &Destination::Folder(temp_dir.path().join("base")));

        orchestrator.set_destination(None);
        assert_eq!(orchestrator.destination(), &Destination::Download(temp_dir.path().join("dl")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_writes_sequenced_frames() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .native()
            .burst(5, 150)
            .settle_ms(0)
            .base_dir(Some(temp_dir.path().to_path_buf()))
            .build()
            .unwrap();
        let (mut orchestrator, source) = orchestrator(&config);
        orchestrator.select_primary("Big Lot");

        let start = tokio::time::Instant::now();
        let report = orchestrator.shoot().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(4 * 150));

        let names: Vec<String> = report
            .shots
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        let expected: Vec<String> = (1..=5)
            .map(|i| format!("20240307_120000_Big Lot_{:03}.png", i))
            .collect();
        assert_eq!(names, expected);
        assert_eq!(source.frames.load(Ordering::SeqCst), 5);
        assert_eq!(orchestrator.session().shot_count, 5);
    }

    #[tokio::test]
    async fn test_reset_counter_keeps_files() {
        let temp_dir = TempDir::new().unwrap();
        let (mut orchestrator, _source) = orchestrator(&folder_config(&temp_dir));
        orchestrator.select_primary("Big Lot");
        let report = orchestrator.save_shot().await.unwrap();

        orchestrator.reset_counter();
        assert_eq!(orchestrator.session().shot_count, 0);
        assert_eq!(orchestrator.session().status, "Counter reset.");
        assert!(report.shots[0].path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_persist_failure_keeps_earlier_frames() {
        let temp_dir = TempDir::new().unwrap();
        let label_dir = temp_dir.path().join("Big Lot");
        let mut orchestrator = faulty_burst(&temp_dir, Fault::BlockFolder(3, label_dir));

        match orchestrator.shoot().await.unwrap_err() {
            ShotError::Persist { saved, .. } => {
                assert_eq!(saved.len(), 2);
                assert!(saved[1].logical_path.ends_with("_002.png"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(orchestrator.session().shot_count, 2);
        assert!(orchestrator.session().status.starts_with("Save error: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_capture_failure_reports_saved_frames() {
        let temp_dir = TempDir::new().unwrap();
        let mut orchestrator = faulty_burst(&temp_dir, Fault::NoFrame(4));

        match orchestrator.shoot().await.unwrap_err() {
            ShotError::BurstCapture { source, saved } => {
                assert!(matches!(source, CaptureError::NoFrame(_)));
                assert_eq!(saved.len(), 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(orchestrator.session().shot_count, 3);
        assert_eq!(std::fs::read_dir(temp_dir.path().join("Big Lot")).unwrap().count(), 3);
    }
}
