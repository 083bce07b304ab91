// ============================================================================
// recorder.rs — Morphtree
// Session recording: run tracking, metrics samples, event log, screenshots
// and data export.
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use serde::Serialize;

use crate::config::SceneConfig;
use crate::metrics::FrameMetrics;

/// Default root for session output.
pub const DEFAULT_RUNS_DIR: &str = "runs";

// ======================== Session Event ========================

#[derive(Clone, Debug, Serialize)]
pub struct SessionEvent {
    pub frame: u64,
    pub time_ms: f64,
    pub event_type: String,
    pub details: String,
}

impl SessionEvent {
    pub fn to_log_line(&self) -> String {
        format!(
            "[{:.1}ms] frame={} {}: {}",
            self.time_ms, self.frame, self.event_type, self.details,
        )
    }
}

// ======================== Session Recorder ========================

pub struct SessionRecorder {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub run_start_time: String,
    run_start: Instant,

    pub metrics_history: Vec<FrameMetrics>,
    pub events: Vec<SessionEvent>,
}

impl SessionRecorder {
    /// New session under `<base>/<date>/<run_id>`. Nothing touches the disk
    /// until something is exported.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let now = Local::now();
        let run_id = format!("run_{}", now.format("%Y%m%d_%H%M%S"));
        let run_dir = base
            .as_ref()
            .join(now.format("%Y-%m-%d").to_string())
            .join(&run_id);

        Self {
            run_id,
            run_dir,
            run_start_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            run_start: Instant::now(),
            metrics_history: Vec::with_capacity(1_000),
            events: Vec::with_capacity(256),
        }
    }

    fn time_ms(&self) -> f64 {
        self.run_start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn record_metrics(&mut self, metrics: FrameMetrics) {
        self.metrics_history.push(metrics);
    }

    pub fn log_event(&mut self, frame: u64, event_type: &str, details: &str) {
        let time_ms = self.time_ms();
        self.events.push(SessionEvent {
            frame,
            time_ms,
            event_type: event_type.to_string(),
            details: details.to_string(),
        });
    }

    fn ensure_run_dir(&self) -> Result<(), String> {
        fs::create_dir_all(&self.run_dir)
            .map_err(|e| format!("Failed to create run directory {:?}: {}", self.run_dir, e))
    }

    /// Export metrics to CSV.
    pub fn export_metrics_csv(&self) -> Result<PathBuf, String> {
        self.ensure_run_dir()?;
        let path = self.run_dir.join("metrics.csv");
        let mut file = fs::File::create(&path)
            .map_err(|e| format!("Failed to create metrics.csv: {}", e))?;

        writeln!(file, "{}", FrameMetrics::csv_header())
            .map_err(|e| format!("Write error: {}", e))?;
        for record in &self.metrics_history {
            writeln!(file, "{}", record.to_csv_line())
                .map_err(|e| format!("Write error: {}", e))?;
        }

        log::info!("Exported {} metrics records to {:?}", self.metrics_history.len(), path);
        Ok(path)
    }

    /// Export events log.
    pub fn export_events_log(&self) -> Result<PathBuf, String> {
        self.ensure_run_dir()?;
        let path = self.run_dir.join("events.log");
        let mut file = fs::File::create(&path)
            .map_err(|e| format!("Failed to create events.log: {}", e))?;

        for event in &self.events {
            writeln!(file, "{}", event.to_log_line())
                .map_err(|e| format!("Write error: {}", e))?;
        }

        log::info!("Exported {} events to {:?}", self.events.len(), path);
        Ok(path)
    }

    /// Export summary.json: run info, the scene config and the last sample.
    pub fn export_summary(&self, config: &SceneConfig) -> Result<PathBuf, String> {
        self.ensure_run_dir()?;
        let summary = serde_json::json!({
            "run_id": self.run_id,
            "timestamp": self.run_start_time,
            "app_version": env!("CARGO_PKG_VERSION"),
            "duration_ms": self.time_ms(),
            "metrics_count": self.metrics_history.len(),
            "event_count": self.events.len(),
            "final_metrics": self.metrics_history.last(),
            "config": config,
        });

        let path = self.run_dir.join("summary.json");
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Failed to serialize summary: {}", e))?;
        fs::write(&path, json).map_err(|e| format!("Failed to write summary.json: {}", e))?;

        log::info!("Saved summary to {:?}", path);
        Ok(path)
    }

    /// Export everything. Failures are logged and the remaining files are
    /// still attempted.
    pub fn finalize(&mut self, frame: u64, config: &SceneConfig) {
        self.log_event(frame, "SESSION_END", &format!("Session {} finalized", self.run_id));

        if let Err(e) = self.export_metrics_csv() {
            log::error!("Failed to export metrics: {}", e);
        }
        if let Err(e) = self.export_events_log() {
            log::error!("Failed to export events: {}", e);
        }
        if let Err(e) = self.export_summary(config) {
            log::error!("Failed to export summary: {}", e);
        }
    }

    /// Save a screenshot to the run's screenshots directory.
    pub fn save_screenshot(
        &mut self,
        frame: u64,
        width: u32,
        height: u32,
        rgba_data: &[u8],
    ) -> Result<PathBuf, String> {
        let screenshots_dir = self.run_dir.join("screenshots");
        fs::create_dir_all(&screenshots_dir)
            .map_err(|e| format!("Failed to create screenshots dir: {}", e))?;

        let path = screenshots_dir.join(format!("frame{:06}_{}.png", frame, &self.run_id));
        image::save_buffer(&path, rgba_data, width, height, image::ColorType::Rgba8)
            .map_err(|e| format!("Failed to save screenshot: {}", e))?;

        log::info!("Screenshot saved: {:?}", path);
        self.log_event(frame, "SCREENSHOT", &path.display().to_string());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneState;
    use crate::state::MorphStore;
    use std::rc::Rc;

    fn temp_base(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("morphtree_recorder_{}", name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn sample(config: &SceneConfig) -> FrameMetrics {
        let mut scene = SceneState::new(config, Rc::new(MorphStore::new()));
        scene.step(1.0 / 60.0);
        FrameMetrics::from_scene(&scene)
    }

    fn small_config() -> SceneConfig {
        SceneConfig {
            seed: Some(1),
            ..SceneConfig::low_power()
        }
    }

    #[test]
    fn run_dir_is_dated_under_base() {
        let base = temp_base("layout");
        let rec = SessionRecorder::new(&base);
        assert!(rec.run_id.starts_with("run_"));
        assert!(rec.run_dir.starts_with(&base));
        assert!(rec.run_dir.ends_with(&rec.run_id));
        assert!(!rec.run_dir.exists());
    }

    #[test]
    fn finalize_writes_all_exports() {
        let base = temp_base("finalize");
        let config = small_config();
        let mut rec = SessionRecorder::new(&base);
        rec.record_metrics(sample(&config));
        rec.record_metrics(sample(&config));
        rec.log_event(1, "FORMATION", "Tree -> Scattered");
        rec.finalize(2, &config);

        let csv = fs::read_to_string(rec.run_dir.join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.starts_with("frame,"));

        let events = fs::read_to_string(rec.run_dir.join("events.log")).unwrap();
        assert!(events.contains("FORMATION: Tree -> Scattered"));
        assert!(events.contains("SESSION_END"));

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(rec.run_dir.join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["metrics_count"], 2);
        assert_eq!(summary["final_metrics"]["frame"], 1);
        assert_eq!(summary["config"]["seed"], 1);

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn screenshot_is_a_png() {
        let base = temp_base("screenshot");
        let mut rec = SessionRecorder::new(&base);
        let pixels = vec![200u8; 4 * 4 * 4];
        let path = rec.save_screenshot(7, 4, 4, &pixels).unwrap();

        assert_eq!(path.extension().unwrap(), "png");
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
        assert_eq!(rec.events.last().unwrap().event_type, "SCREENSHOT");

        let _ = fs::remove_dir_all(&base);
    }
}
