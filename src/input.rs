// ============================================================================
// input.rs — Morphtree
// Keyboard/mouse stand-in for the hand tracker: held and toggled keys edit
// the pose that the simulated detector reports on its next cycle.
// ============================================================================

use std::cell::Cell;
use std::rc::Rc;

use crate::gesture::SimHandPose;

/// Tracks the simulated hand: `H` presence, `O` open/closed, held `P` pinch,
/// and the mouse cursor as wrist position.
pub struct SimHandInput {
    pose: Rc<Cell<SimHandPose>>,
    pub pinch_held: bool,
}

impl SimHandInput {
    pub fn new(pose: Rc<Cell<SimHandPose>>) -> Self {
        Self {
            pose,
            pinch_held: false,
        }
    }

    pub fn pose(&self) -> SimHandPose {
        self.pose.get()
    }

    fn edit(&self, f: impl FnOnce(&mut SimHandPose)) {
        let mut pose = self.pose.get();
        f(&mut pose);
        self.pose.set(pose);
    }

    pub fn toggle_hand(&self) -> bool {
        self.edit(|p| p.present = !p.present);
        self.pose.get().present
    }

    pub fn toggle_open(&self) -> bool {
        self.edit(|p| p.open = !p.open);
        self.pose.get().open
    }

    pub fn set_pinch(&mut self, held: bool) {
        self.pinch_held = held;
        self.edit(|p| p.pinching = held);
    }

    /// Move the wrist to the cursor. The detector feed is mirrored, so the
    /// image x is flipped to keep the pointer under the mouse.
    pub fn move_cursor(&self, cursor_x: f64, cursor_y: f64, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let nx = (cursor_x / width as f64).clamp(0.0, 1.0) as f32;
        let ny = (cursor_y / height as f64).clamp(0.0, 1.0) as f32;
        self.edit(|p| {
            p.x = 1.0 - nx;
            p.y = ny;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GestureConfig;
    use crate::gesture::reduce;

    fn input() -> SimHandInput {
        SimHandInput::new(Rc::new(Cell::new(SimHandPose::default())))
    }

    fn signal(input: &SimHandInput) -> crate::gesture::ControlSignal {
        reduce(&input.pose().landmarks(), &GestureConfig::default())
    }

    #[test]
    fn toggles_drive_the_reduced_signal() {
        let mut input = input();
        assert!(!signal(&input).detected);

        assert!(input.toggle_hand());
        let s = signal(&input);
        assert!(s.detected && !s.open && !s.pinching);

        assert!(input.toggle_open());
        assert!(signal(&input).open);

        input.set_pinch(true);
        assert!(signal(&input).pinching);
        input.set_pinch(false);
        assert!(!signal(&input).pinching);

        assert!(!input.toggle_hand());
        assert!(!signal(&input).detected);
    }

    #[test]
    fn cursor_maps_to_pointer_direction() {
        let input = input();
        input.toggle_hand();

        input.move_cursor(800.0, 0.0, 800, 600);
        let s = signal(&input);
        assert!((s.pointer_x - 1.0).abs() < 1e-5);
        assert!((s.pointer_y - 1.0).abs() < 1e-5);

        input.move_cursor(0.0, 600.0, 800, 600);
        let s = signal(&input);
        assert!((s.pointer_x + 1.0).abs() < 1e-5);
        assert!((s.pointer_y + 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_sized_window_is_ignored() {
        let input = input();
        let before = input.pose();
        input.move_cursor(10.0, 10.0, 0, 0);
        assert_eq!(input.pose(), before);
    }
}
