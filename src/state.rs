// ============================================================================
// state.rs — Morphtree
// Shared morph state: target formation, pinch flag and hand presence.
// Single writer (the gesture pipeline), many readers (every animated entity).
// ============================================================================

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::gesture::ControlSignal;

/// The two target configurations of the particle cloud.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formation {
    #[default]
    Tree,
    Scattered,
}

impl Formation {
    /// Progress value the damped morph converges to.
    pub fn target(self) -> f32 {
        match self {
            Formation::Tree => 0.0,
            Formation::Scattered => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Formation::Tree => "Tree",
            Formation::Scattered => "Scattered",
        }
    }
}

/// Read-only view handed to animated entities each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MorphSnapshot {
    pub target_formation: Formation,
    pub pinching: bool,
}

/// Last reported hand position in signed pointer space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HandPresence {
    pub x: f32,
    pub y: f32,
    pub detected: bool,
}

/// Application-wide morph context.
///
/// Constructed once by the application root and shared by `Rc` with the
/// gesture pipeline and every particle group / gallery. All access happens
/// on one thread, so `Cell` is enough.
#[derive(Debug, Default)]
pub struct MorphStore {
    snapshot: Cell<MorphSnapshot>,
    hand: Cell<HandPresence>,
}

impl MorphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MorphSnapshot {
        self.snapshot.get()
    }

    pub fn hand(&self) -> HandPresence {
        self.hand.get()
    }

    /// Explicit override of the target formation.
    pub fn set_formation(&self, formation: Formation) {
        let mut snap = self.snapshot.get();
        snap.target_formation = formation;
        self.snapshot.set(snap);
    }

    /// Apply one control signal. Returns the formation change, if any.
    ///
    /// A pinch freezes the formation; otherwise an open hand scatters and a
    /// closed hand gathers. A cycle without a hand releases the pinch but
    /// leaves the formation where it was.
    pub fn apply_signal(&self, signal: &ControlSignal) -> Option<Formation> {
        let prev = self.snapshot.get();

        let target_formation = if !signal.detected || signal.pinching {
            prev.target_formation
        } else if signal.open {
            Formation::Scattered
        } else {
            Formation::Tree
        };

        self.snapshot.set(MorphSnapshot {
            target_formation,
            pinching: signal.detected && signal.pinching,
        });
        self.hand.set(HandPresence {
            x: signal.pointer_x,
            y: signal.pointer_y,
            detected: signal.detected,
        });

        (target_formation != prev.target_formation).then_some(target_formation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(open: bool, pinching: bool) -> ControlSignal {
        ControlSignal {
            pointer_x: 0.2,
            pointer_y: -0.4,
            detected: true,
            open,
            pinching,
        }
    }

    #[test]
    fn starts_as_tree() {
        let store = MorphStore::new();
        assert_eq!(store.snapshot(), MorphSnapshot::default());
        assert_eq!(store.snapshot().target_formation, Formation::Tree);
        assert!(!store.hand().detected);
    }

    #[test]
    fn open_and_closed_track_latest_signal() {
        let store = MorphStore::new();
        let states: Vec<Formation> = [true, false, true]
            .iter()
            .map(|&open| {
                store.apply_signal(&hand(open, false));
                store.snapshot().target_formation
            })
            .collect();
        assert_eq!(
            states,
            vec![Formation::Scattered, Formation::Tree, Formation::Scattered]
        );
    }

    #[test]
    fn pinch_freezes_formation() {
        let store = MorphStore::new();
        store.apply_signal(&hand(true, false));
        assert_eq!(store.snapshot().target_formation, Formation::Scattered);

        for open in [false, true, false, false, true] {
            assert_eq!(store.apply_signal(&hand(open, true)), None);
            let snap = store.snapshot();
            assert!(snap.pinching);
            assert_eq!(snap.target_formation, Formation::Scattered);
        }

        store.apply_signal(&hand(false, false));
        assert_eq!(store.snapshot().target_formation, Formation::Tree);
        assert!(!store.snapshot().pinching);
    }

    #[test]
    fn lost_hand_keeps_formation_and_releases_pinch() {
        let store = MorphStore::new();
        store.apply_signal(&hand(true, true));
        store.apply_signal(&hand(true, false));
        store.apply_signal(&ControlSignal::NO_HAND);

        let snap = store.snapshot();
        assert_eq!(snap.target_formation, Formation::Scattered);
        assert!(!snap.pinching);
        assert!(!store.hand().detected);
    }

    #[test]
    fn reports_changes_only() {
        let store = MorphStore::new();
        assert_eq!(store.apply_signal(&hand(false, false)), None);
        assert_eq!(
            store.apply_signal(&hand(true, false)),
            Some(Formation::Scattered)
        );
        assert_eq!(store.apply_signal(&hand(true, false)), None);
    }

    #[test]
    fn explicit_override_wins_until_next_signal() {
        let store = MorphStore::new();
        store.set_formation(Formation::Scattered);
        assert_eq!(store.snapshot().target_formation, Formation::Scattered);
        store.apply_signal(&hand(false, false));
        assert_eq!(store.snapshot().target_formation, Formation::Tree);
    }

    #[test]
    fn hand_position_is_recorded() {
        let store = MorphStore::new();
        store.apply_signal(&hand(false, false));
        let h = store.hand();
        assert!(h.detected);
        assert_eq!((h.x, h.y), (0.2, -0.4));
    }
}
