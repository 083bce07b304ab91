// ============================================================================
// headless.rs — Morphtree
// Headless runner: steps the whole engine against a scripted hand at a
// fixed timestep, without a window or GPU.
// ============================================================================

use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::SceneConfig;
use crate::gesture::{GesturePipeline, ScriptedBackend};
use crate::metrics::FrameMetrics;
use crate::recorder::SessionRecorder;
use crate::scene::SceneState;
use crate::state::{Formation, MorphStore};

#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub frames: u32,
    /// Fixed simulated timestep, in seconds.
    pub dt: f32,
    pub progress_interval: u32,
    /// Write a session (metrics, events, summary) under this directory.
    pub export_dir: Option<PathBuf>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frames: 900,
            dt: 1.0 / 60.0,
            progress_interval: 300,
            export_dir: None,
        }
    }
}

/// What a headless run observed.
#[derive(Clone, Debug)]
pub struct HeadlessReport {
    pub frames: u32,
    pub detector_cycles: u64,
    pub formation_changes: Vec<(u64, Formation)>,
    pub max_focused_panels: usize,
    pub final_metrics: FrameMetrics,
    pub session_dir: Option<PathBuf>,
}

pub fn run_headless(scene_config: &SceneConfig, config: &HeadlessConfig) -> Result<HeadlessReport, String> {
    if config.dt.is_nan() || config.dt <= 0.0 {
        return Err(format!("Headless timestep must be positive, got {}", config.dt));
    }

    let store = Rc::new(MorphStore::new());
    let mut scene = SceneState::new(scene_config, store.clone());
    let script = ScriptedBackend::demo();
    let mut gestures = GesturePipeline::start(&script, None, scene_config.gesture.clone(), store);

    let mut recorder = config.export_dir.as_ref().map(SessionRecorder::new);
    if let Some(rec) = recorder.as_mut() {
        rec.log_event(0, "DETECTOR", gestures.status().label());
    }

    log::info!(
        "Headless run started: {} frames at dt={:.4}s ({} particles)",
        config.frames,
        config.dt,
        scene_config.total_particles()
    );

    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut last_report_frame = 0u32;
    let mut formation_changes = Vec::new();
    let mut max_focused_panels = 0;
    let mut prev_metrics: Option<FrameMetrics> = None;

    for step in 0..config.frames {
        let now = Duration::from_secs_f64(step as f64 * config.dt as f64);
        if let Some((_, Some(formation))) = gestures.poll(now) {
            formation_changes.push((scene.frame, formation));
            if let Some(rec) = recorder.as_mut() {
                rec.log_event(scene.frame, "FORMATION", formation.name());
            }
        }

        scene.step(config.dt);
        max_focused_panels = max_focused_panels.max(scene.gallery.focused_count());

        let diag_due = scene_config.diag_interval > 0
            && scene.frame % scene_config.diag_interval as u64 == 0;
        if diag_due {
            let metrics = FrameMetrics::from_scene(&scene);
            metrics.log(prev_metrics.as_ref());
            if let Some(rec) = recorder.as_mut() {
                rec.record_metrics(metrics.clone());
            }
            prev_metrics = Some(metrics);
        }

        if config.progress_interval > 0 && (step + 1) % config.progress_interval == 0 {
            let done = step + 1;
            let total_elapsed = started.elapsed().as_secs_f64().max(1e-6);
            let total_fps = done as f64 / total_elapsed;

            let window_elapsed = last_report.elapsed().as_secs_f64().max(1e-6);
            let window_fps = (done - last_report_frame) as f64 / window_elapsed;

            let remaining = config.frames.saturating_sub(done);
            let eta_secs = remaining as f64 / total_fps.max(1e-6);

            log::info!(
                "Headless progress: {}/{} | sim t={:.1}s | fps={:.0} (window {:.0}) | ETA={:.1}s",
                done,
                config.frames,
                scene.clock.elapsed,
                total_fps,
                window_fps,
                eta_secs,
            );

            last_report = Instant::now();
            last_report_frame = done;
        }
    }

    let detector_cycles = gestures.cycles();
    gestures.stop();

    let final_metrics = FrameMetrics::from_scene(&scene);
    let session_dir = match recorder.as_mut() {
        Some(rec) => {
            rec.record_metrics(final_metrics.clone());
            rec.finalize(scene.frame, scene_config);
            Some(rec.run_dir.clone())
        }
        None => None,
    };

    log::info!(
        "Headless run finished: {} frames, {} detector cycles, {} formation changes",
        config.frames,
        detector_cycles,
        formation_changes.len()
    );

    Ok(HeadlessReport {
        frames: config.frames,
        detector_cycles,
        formation_changes,
        max_focused_panels,
        final_metrics,
        session_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_config() -> SceneConfig {
        SceneConfig {
            seed: Some(11),
            diag_interval: 0,
            ..SceneConfig::low_power()
        }
    }

    #[test]
    fn demo_script_blooms_then_gathers() {
        let report = run_headless(&scene_config(), &HeadlessConfig::default()).unwrap();

        let formations: Vec<Formation> = report.formation_changes.iter().map(|(_, f)| *f).collect();
        assert_eq!(formations, vec![Formation::Scattered, Formation::Tree]);

        // Open at 3 s, closed at 9 s.
        let (bloom_frame, _) = report.formation_changes[0];
        let (gather_frame, _) = report.formation_changes[1];
        assert!((180..=183).contains(&bloom_frame));
        assert!((540..=543).contains(&gather_frame));

        assert!(report.max_focused_panels > 0);
        assert_eq!(report.final_metrics.formation, Formation::Tree);
        assert!(!report.final_metrics.hand_detected);
        assert!(report.session_dir.is_none());
    }

    #[test]
    fn detector_runs_on_its_interval() {
        let report = run_headless(&scene_config(), &HeadlessConfig::default()).unwrap();
        // 15 simulated seconds at one cycle per 33 ms.
        let expected = 15_000 / 33;
        assert!((report.detector_cycles as i64 - expected as i64).abs() <= 30);
        assert!(report.detector_cycles < report.frames as u64);
    }

    #[test]
    fn rejects_non_positive_timestep() {
        let config = HeadlessConfig {
            dt: 0.0,
            ..HeadlessConfig::default()
        };
        assert!(run_headless(&scene_config(), &config).is_err());
    }

    #[test]
    fn export_writes_a_session() {
        let base = std::env::temp_dir().join("morphtree_headless_export");
        let _ = std::fs::remove_dir_all(&base);
        let config = HeadlessConfig {
            frames: 240,
            export_dir: Some(base.clone()),
            ..HeadlessConfig::default()
        };
        let mut scene = scene_config();
        scene.diag_interval = 60;

        let report = run_headless(&scene, &config).unwrap();
        let dir = report.session_dir.unwrap();
        let csv = std::fs::read_to_string(dir.join("metrics.csv")).unwrap();
        // Header, four periodic samples, final sample.
        assert_eq!(csv.lines().count(), 6);
        let events = std::fs::read_to_string(dir.join("events.log")).unwrap();
        assert!(events.contains("DETECTOR: running"));
        assert!(events.contains("FORMATION: Scattered"));
        assert!(dir.join("summary.json").exists());

        let _ = std::fs::remove_dir_all(&base);
    }
}
