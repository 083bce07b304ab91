// ============================================================================
// gesture.rs — Morphtree
// Hand-landmark reduction into control signals, the detector collaborator
// interface, and the detection loop with its one-shot backend fallback.
// ============================================================================
//
// Consumers never learn whether landmarks came from a real tracker, the
// keyboard/mouse simulator or a scripted timeline: everything arrives as a
// `Detection` and leaves as a `ControlSignal` applied to the `MorphStore`.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use glam::{Vec2, Vec3};

use crate::config::GestureConfig;
use crate::state::{Formation, MorphStore};

// ======================== Landmarks ========================

pub const LANDMARK_COUNT: usize = 21;
pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;
pub const FINGERTIPS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// One detected hand: 21 points in normalized image coordinates
/// (`x`, `y` in `[0, 1]`, `z` relative depth).
#[derive(Clone, Debug, PartialEq)]
pub struct HandLandmarks {
    pub points: [Vec3; LANDMARK_COUNT],
}

impl HandLandmarks {
    fn planar(&self, idx: usize) -> Vec2 {
        self.points[idx].truncate()
    }

    /// Mean 2D distance from the fingertips to the wrist.
    pub fn openness(&self) -> f32 {
        let wrist = self.planar(WRIST);
        FINGERTIPS
            .iter()
            .map(|&tip| self.planar(tip).distance(wrist))
            .sum::<f32>()
            / FINGERTIPS.len() as f32
    }

    /// 2D distance between thumb tip and index tip.
    pub fn pinch_distance(&self) -> f32 {
        self.planar(THUMB_TIP).distance(self.planar(INDEX_TIP))
    }
}

/// Output of one detector cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum Detection {
    Hand(HandLandmarks),
    NoHand,
}

// ======================== Control Signal ========================

/// Reduced per-cycle gesture output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlSignal {
    pub pointer_x: f32,
    pub pointer_y: f32,
    pub detected: bool,
    pub open: bool,
    pub pinching: bool,
}

impl ControlSignal {
    pub const NO_HAND: ControlSignal = ControlSignal {
        pointer_x: 0.0,
        pointer_y: 0.0,
        detected: false,
        open: false,
        pinching: false,
    };
}

/// Reduce a detector result to a control signal.
pub fn reduce(detection: &Detection, config: &GestureConfig) -> ControlSignal {
    let hand = match detection {
        Detection::Hand(hand) => hand,
        Detection::NoHand => return ControlSignal::NO_HAND,
    };

    let wrist = hand.points[WRIST];
    ControlSignal {
        // The feed is mirrored for a selfie view.
        pointer_x: (1.0 - wrist.x) * 2.0 - 1.0,
        pointer_y: -(wrist.y * 2.0 - 1.0),
        detected: true,
        open: hand.openness() > config.open_threshold,
        pinching: hand.pinch_distance() < config.pinch_threshold,
    }
}

// ======================== Detector Collaborator ========================

/// A live hand detector bound to a camera stream.
pub trait HandDetector {
    /// Run one detection on the most recent frame.
    fn detect(&mut self, timestamp: Duration) -> Detection;

    /// Release the camera and any model resources.
    fn close(&mut self) {}
}

/// Why a backend could not produce a detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenError {
    /// The inference backend itself is unavailable; another backend may work.
    Backend(String),
    /// Camera access was refused. No backend can help.
    CameraDenied(String),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::Backend(msg) => write!(f, "detector backend unavailable: {msg}"),
            OpenError::CameraDenied(msg) => write!(f, "camera access denied: {msg}"),
        }
    }
}

impl std::error::Error for OpenError {}

/// Factory for detectors on one inference backend.
pub trait DetectorBackend {
    fn name(&self) -> &str;
    fn open(&self) -> Result<Box<dyn HandDetector>, OpenError>;
}

// ======================== Gesture Pipeline ========================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    Running { backend: String },
    /// Both backends failed; the scene runs on its default formation.
    Unavailable,
    CameraDenied,
    Stopped,
}

impl PipelineStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStatus::Running { .. } => "running",
            PipelineStatus::Unavailable => "unavailable",
            PipelineStatus::CameraDenied => "camera denied",
            PipelineStatus::Stopped => "stopped",
        }
    }
}

/// The detection loop: runs one detector cycle whenever its interval has
/// elapsed and writes the reduced signal into the shared store.
pub struct GesturePipeline {
    detector: Option<Box<dyn HandDetector>>,
    status: PipelineStatus,
    config: GestureConfig,
    store: Rc<MorphStore>,
    next_due: Duration,
    cycles: u64,
}

impl GesturePipeline {
    /// Open the primary backend, falling back once to `fallback`.
    pub fn start(
        primary: &dyn DetectorBackend,
        fallback: Option<&dyn DetectorBackend>,
        config: GestureConfig,
        store: Rc<MorphStore>,
    ) -> Self {
        let (detector, status) = match open_with_fallback(primary, fallback) {
            Ok((detector, backend)) => {
                log::info!("Gesture detector running on {} backend", backend);
                (Some(detector), PipelineStatus::Running { backend })
            }
            Err(OpenError::CameraDenied(msg)) => {
                log::warn!("Camera access denied ({}); gestures disabled", msg);
                (None, PipelineStatus::CameraDenied)
            }
            Err(err) => {
                log::warn!("{}; continuing without gestures", err);
                (None, PipelineStatus::Unavailable)
            }
        };

        Self {
            detector,
            status,
            config,
            store,
            next_due: Duration::ZERO,
            cycles: 0,
        }
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, PipelineStatus::Running { .. })
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run a detection cycle if one is due at `now`.
    ///
    /// Returns the applied signal and the formation change it caused, if any.
    pub fn poll(&mut self, now: Duration) -> Option<(ControlSignal, Option<Formation>)> {
        let detector = self.detector.as_mut()?;
        if now < self.next_due {
            return None;
        }
        self.next_due = now + Duration::from_millis(self.config.detector_interval_ms);

        let signal = reduce(&detector.detect(now), &self.config);
        let changed = self.store.apply_signal(&signal);
        if let Some(formation) = changed {
            log::info!("Formation -> {}", formation.name());
        }

        self.cycles += 1;
        Some((signal, changed))
    }

    /// Stop requesting cycles and release the detector.
    pub fn stop(&mut self) {
        if let Some(mut detector) = self.detector.take() {
            detector.close();
            log::info!("Gesture detector closed after {} cycles", self.cycles);
        }
        self.status = PipelineStatus::Stopped;
    }
}

impl Drop for GesturePipeline {
    fn drop(&mut self) {
        if self.detector.is_some() {
            self.stop();
        }
    }
}

fn open_with_fallback(
    primary: &dyn DetectorBackend,
    fallback: Option<&dyn DetectorBackend>,
) -> Result<(Box<dyn HandDetector>, String), OpenError> {
    match primary.open() {
        Ok(detector) => Ok((detector, primary.name().to_string())),
        Err(OpenError::Backend(msg)) => {
            let Some(fallback) = fallback else {
                return Err(OpenError::Backend(msg));
            };
            log::warn!(
                "{} backend failed ({}); falling back to {}",
                primary.name(),
                msg,
                fallback.name()
            );
            fallback
                .open()
                .map(|detector| (detector, fallback.name().to_string()))
        }
        Err(denied) => Err(denied),
    }
}

// ======================== Simulated Hand ========================

/// Pose of a synthetic hand in image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimHandPose {
    pub present: bool,
    pub x: f32,
    pub y: f32,
    pub open: bool,
    pub pinching: bool,
}

impl Default for SimHandPose {
    fn default() -> Self {
        Self {
            present: false,
            x: 0.5,
            y: 0.5,
            open: false,
            pinching: false,
        }
    }
}

impl SimHandPose {
    pub fn hand(x: f32, y: f32, open: bool, pinching: bool) -> Self {
        Self {
            present: true,
            x,
            y,
            open,
            pinching,
        }
    }

    /// Synthesize a 21-point landmark set for this pose.
    ///
    /// Fingers fan out upward from the wrist; an open hand reaches further
    /// than a fist, and a pinch brings thumb and index tips together.
    pub fn landmarks(&self) -> Detection {
        if !self.present {
            return Detection::NoHand;
        }

        // Finger fan angles from vertical: thumb, index, middle, ring, pinky.
        const ANGLES: [f32; 5] = [-1.3, -0.35, 0.0, 0.3, 0.6];
        let reach = if self.open { 0.32 } else { 0.12 };
        let wrist = Vec3::new(self.x, self.y, 0.0);

        let mut points = [wrist; LANDMARK_COUNT];
        for (finger, angle) in ANGLES.iter().enumerate() {
            let dir = Vec3::new(angle.sin(), -angle.cos(), 0.0);
            for joint in 0..4 {
                let t = 0.4 + 0.2 * joint as f32;
                points[1 + finger * 4 + joint] = wrist + dir * reach * t;
            }
        }

        if self.pinching {
            let mid = (points[THUMB_TIP] + points[INDEX_TIP]) * 0.5;
            points[THUMB_TIP] = mid - Vec3::X * 0.01;
            points[INDEX_TIP] = mid + Vec3::X * 0.01;
        }

        Detection::Hand(HandLandmarks { points })
    }
}

/// Backend whose detector reads a pose shared with the window's input
/// handler.
pub struct SimulatedBackend {
    pose: Rc<Cell<SimHandPose>>,
}

impl SimulatedBackend {
    pub fn new(pose: Rc<Cell<SimHandPose>>) -> Self {
        Self { pose }
    }
}

struct SimulatedDetector {
    pose: Rc<Cell<SimHandPose>>,
}

impl HandDetector for SimulatedDetector {
    fn detect(&mut self, _timestamp: Duration) -> Detection {
        self.pose.get().landmarks()
    }
}

impl DetectorBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open(&self) -> Result<Box<dyn HandDetector>, OpenError> {
        Ok(Box::new(SimulatedDetector {
            pose: self.pose.clone(),
        }))
    }
}

/// Backend that replays a fixed pose timeline. Used by the headless runner.
pub struct ScriptedBackend {
    keyframes: Vec<(Duration, SimHandPose)>,
}

impl ScriptedBackend {
    /// `keyframes` are `(start time, pose)` pairs; each pose holds until the
    /// next keyframe starts.
    pub fn new(mut keyframes: Vec<(Duration, SimHandPose)>) -> Self {
        keyframes.sort_by_key(|(at, _)| *at);
        Self { keyframes }
    }

    /// Closed, open, open + pinch, closed, then no hand, three seconds each.
    pub fn demo() -> Self {
        let s = Duration::from_secs;
        Self::new(vec![
            (s(0), SimHandPose::hand(0.5, 0.5, false, false)),
            (s(3), SimHandPose::hand(0.3, 0.4, true, false)),
            (s(6), SimHandPose::hand(0.5, 0.5, true, true)),
            (s(9), SimHandPose::hand(0.7, 0.6, false, false)),
            (s(12), SimHandPose::default()),
        ])
    }
}

struct ScriptedDetector {
    keyframes: Vec<(Duration, SimHandPose)>,
}

impl HandDetector for ScriptedDetector {
    fn detect(&mut self, timestamp: Duration) -> Detection {
        self.keyframes
            .iter()
            .rev()
            .find(|(at, _)| *at <= timestamp)
            .map(|(_, pose)| pose.landmarks())
            .unwrap_or(Detection::NoHand)
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&self) -> Result<Box<dyn HandDetector>, OpenError> {
        Ok(Box::new(ScriptedDetector {
            keyframes: self.keyframes.clone(),
        }))
    }
}

/// Backend that is never available; selected when gestures are disabled.
pub struct DisabledBackend;

impl DetectorBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    fn open(&self) -> Result<Box<dyn HandDetector>, OpenError> {
        Err(OpenError::Backend(String::from("gesture input disabled")))
    }
}

// ======================== Tests ========================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn config() -> GestureConfig {
        GestureConfig::default()
    }

    fn signal_for(pose: SimHandPose) -> ControlSignal {
        reduce(&pose.landmarks(), &config())
    }

    #[test]
    fn no_hand_reduces_to_zero_signal() {
        assert_eq!(reduce(&Detection::NoHand, &config()), ControlSignal::NO_HAND);
        assert_eq!(signal_for(SimHandPose::default()), ControlSignal::NO_HAND);
    }

    #[test]
    fn open_closed_and_pinch_are_classified() {
        let open = signal_for(SimHandPose::hand(0.5, 0.5, true, false));
        assert!(open.detected && open.open && !open.pinching);

        let fist = signal_for(SimHandPose::hand(0.5, 0.5, false, false));
        assert!(fist.detected && !fist.open && !fist.pinching);

        let pinch = signal_for(SimHandPose::hand(0.5, 0.5, true, true));
        assert!(pinch.pinching);
    }

    #[test]
    fn pointer_is_mirrored_and_flipped() {
        let s = signal_for(SimHandPose::hand(0.0, 0.0, false, false));
        assert!((s.pointer_x - 1.0).abs() < 1e-6);
        assert!((s.pointer_y - 1.0).abs() < 1e-6);

        let s = signal_for(SimHandPose::hand(1.0, 1.0, false, false));
        assert!((s.pointer_x + 1.0).abs() < 1e-6);
        assert!((s.pointer_y + 1.0).abs() < 1e-6);

        let s = signal_for(SimHandPose::hand(0.5, 0.5, false, false));
        assert!(s.pointer_x.abs() < 1e-6 && s.pointer_y.abs() < 1e-6);
    }

    #[test]
    fn thresholds_come_from_config() {
        let pose = SimHandPose::hand(0.5, 0.5, false, false);
        let strict = GestureConfig {
            open_threshold: 0.05,
            ..GestureConfig::default()
        };
        assert!(reduce(&pose.landmarks(), &strict).open);
    }

    #[test]
    fn landmark_distances() {
        let Detection::Hand(hand) = SimHandPose::hand(0.5, 0.5, true, false).landmarks() else {
            panic!("expected a hand");
        };
        assert!((hand.openness() - 0.32).abs() < 1e-4);
        assert!(hand.pinch_distance() > 0.08);
    }

    // ---- pipeline ----

    struct CountingDetector {
        closed: Rc<Cell<bool>>,
        pose: SimHandPose,
    }

    impl HandDetector for CountingDetector {
        fn detect(&mut self, _timestamp: Duration) -> Detection {
            self.pose.landmarks()
        }
        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    struct FakeBackend {
        name: &'static str,
        result: Result<SimHandPose, OpenError>,
        closed: Rc<Cell<bool>>,
        opened: RefCell<u32>,
    }

    impl FakeBackend {
        fn ok(name: &'static str, pose: SimHandPose) -> Self {
            Self {
                name,
                result: Ok(pose),
                closed: Rc::new(Cell::new(false)),
                opened: RefCell::new(0),
            }
        }
        fn failing(name: &'static str, err: OpenError) -> Self {
            Self {
                name,
                result: Err(err),
                closed: Rc::new(Cell::new(false)),
                opened: RefCell::new(0),
            }
        }
    }

    impl DetectorBackend for FakeBackend {
        fn name(&self) -> &str {
            self.name
        }
        fn open(&self) -> Result<Box<dyn HandDetector>, OpenError> {
            *self.opened.borrow_mut() += 1;
            match &self.result {
                Ok(pose) => Ok(Box::new(CountingDetector {
                    closed: self.closed.clone(),
                    pose: *pose,
                })),
                Err(e) => Err(e.clone()),
            }
        }
    }

    fn open_hand() -> SimHandPose {
        SimHandPose::hand(0.5, 0.5, true, false)
    }

    #[test]
    fn falls_back_once_to_alternate_backend() {
        let gpu = FakeBackend::failing("gpu", OpenError::Backend("no adapter".into()));
        let cpu = FakeBackend::ok("cpu", open_hand());
        let store = Rc::new(MorphStore::new());

        let mut pipeline = GesturePipeline::start(&gpu, Some(&cpu), config(), store.clone());
        assert_eq!(
            pipeline.status(),
            &PipelineStatus::Running {
                backend: "cpu".into()
            }
        );
        assert_eq!(*gpu.opened.borrow(), 1);
        assert_eq!(*cpu.opened.borrow(), 1);

        let (_, changed) = pipeline.poll(Duration::ZERO).expect("cycle due");
        assert_eq!(changed, Some(Formation::Scattered));
        assert_eq!(store.snapshot().target_formation, Formation::Scattered);
    }

    #[test]
    fn unavailable_when_both_backends_fail() {
        let gpu = FakeBackend::failing("gpu", OpenError::Backend("no adapter".into()));
        let cpu = FakeBackend::failing("cpu", OpenError::Backend("no wasm".into()));
        let store = Rc::new(MorphStore::new());

        let mut pipeline = GesturePipeline::start(&gpu, Some(&cpu), config(), store.clone());
        assert_eq!(pipeline.status(), &PipelineStatus::Unavailable);
        for ms in [0, 100, 5000] {
            assert!(pipeline.poll(Duration::from_millis(ms)).is_none());
        }
        assert_eq!(store.snapshot().target_formation, Formation::Tree);
    }

    #[test]
    fn camera_denial_skips_fallback() {
        let gpu = FakeBackend::failing("gpu", OpenError::CameraDenied("user refused".into()));
        let cpu = FakeBackend::ok("cpu", open_hand());
        let store = Rc::new(MorphStore::new());

        let pipeline = GesturePipeline::start(&gpu, Some(&cpu), config(), store);
        assert_eq!(pipeline.status(), &PipelineStatus::CameraDenied);
        assert_eq!(*cpu.opened.borrow(), 0);
    }

    #[test]
    fn cycles_are_gated_by_interval() {
        let cam = FakeBackend::ok("cam", open_hand());
        let store = Rc::new(MorphStore::new());
        let cfg = GestureConfig {
            detector_interval_ms: 100,
            ..GestureConfig::default()
        };
        let mut pipeline = GesturePipeline::start(&cam, None, cfg, store);

        let ran = (0..=30)
            .filter(|i| pipeline.poll(Duration::from_millis(i * 10)).is_some())
            .count();
        assert_eq!(ran, 4); // 0, 100, 200, 300 ms
        assert_eq!(pipeline.cycles(), 4);
    }

    #[test]
    fn stop_releases_detector() {
        let cam = FakeBackend::ok("cam", open_hand());
        let store = Rc::new(MorphStore::new());
        let mut pipeline = GesturePipeline::start(&cam, None, config(), store);

        pipeline.stop();
        assert!(cam.closed.get());
        assert_eq!(pipeline.status(), &PipelineStatus::Stopped);
        assert!(pipeline.poll(Duration::from_secs(10)).is_none());
    }

    #[test]
    fn drop_releases_detector() {
        let cam = FakeBackend::ok("cam", open_hand());
        {
            let _pipeline =
                GesturePipeline::start(&cam, None, config(), Rc::new(MorphStore::new()));
        }
        assert!(cam.closed.get());
    }

    #[test]
    fn disabled_backend_is_unavailable() {
        let pipeline = GesturePipeline::start(
            &DisabledBackend,
            None,
            config(),
            Rc::new(MorphStore::new()),
        );
        assert_eq!(pipeline.status(), &PipelineStatus::Unavailable);
    }

    #[test]
    fn simulated_backend_follows_shared_pose() {
        let pose = Rc::new(Cell::new(SimHandPose::default()));
        let store = Rc::new(MorphStore::new());
        let backend = SimulatedBackend::new(pose.clone());
        let mut pipeline = GesturePipeline::start(&backend, None, config(), store.clone());

        pipeline.poll(Duration::ZERO);
        assert!(!store.hand().detected);

        pose.set(open_hand());
        pipeline.poll(Duration::from_secs(1));
        assert!(store.hand().detected);
        assert_eq!(store.snapshot().target_formation, Formation::Scattered);
    }

    #[test]
    fn scripted_backend_replays_timeline() {
        let store = Rc::new(MorphStore::new());
        let mut pipeline =
            GesturePipeline::start(&ScriptedBackend::demo(), None, config(), store.clone());

        let at = |secs: f32| Duration::from_secs_f32(secs);
        pipeline.poll(at(1.0));
        assert_eq!(store.snapshot().target_formation, Formation::Tree);
        pipeline.poll(at(4.0));
        assert_eq!(store.snapshot().target_formation, Formation::Scattered);
        pipeline.poll(at(7.0));
        assert!(store.snapshot().pinching);
        assert_eq!(store.snapshot().target_formation, Formation::Scattered);
        pipeline.poll(at(10.0));
        assert_eq!(store.snapshot().target_formation, Formation::Tree);
        pipeline.poll(at(13.0));
        assert!(!store.hand().detected);
        assert_eq!(store.snapshot().target_formation, Formation::Tree);
    }
}
