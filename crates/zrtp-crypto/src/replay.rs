/// Number of most recent indices the window remembers.
pub const REPLAY_WINDOW_SIZE: u64 = 64;

/// Sliding-window replay detector over packet indices.
///
/// `check` is side-effect free so that an index is only recorded with
/// `accept` once the packet has authenticated.
#[derive(Debug, Clone, Default)]
pub struct ReplayWindow {
    highest: Option<u64>,
    /// Bit `n` set means index `highest - n` has been seen.
    seen: u64,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highest(&self) -> Option<u64> {
        self.highest
    }

    /// True if `index` is new and not older than the window.
    pub fn check(&self, index: u64) -> bool {
        let Some(highest) = self.highest else {
            return true;
        };
        if index > highest {
            return true;
        }
        let delta = highest - index;
        delta < REPLAY_WINDOW_SIZE && self.seen & (1u64 << delta) == 0
    }

    pub fn accept(&mut self, index: u64) {
        match self.highest {
            None => {
                self.highest = Some(index);
                self.seen = 1;
            }
            Some(highest) if index > highest => {
                let shift = index - highest;
                self.seen = if shift >= REPLAY_WINDOW_SIZE {
                    0
                } else {
                    self.seen << shift
                };
                self.seen |= 1;
                self.highest = Some(index);
            }
            Some(highest) => {
                let delta = highest - index;
                if delta < REPLAY_WINDOW_SIZE {
                    self.seen |= 1u64 << delta;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_rejected() {
        let mut w = ReplayWindow::new();
        assert!(w.check(10));
        w.accept(10);
        assert!(!w.check(10));
        assert!(w.check(11));
    }

    #[test]
    fn out_of_order_within_window_accepted_once() {
        let mut w = ReplayWindow::new();
        w.accept(100);
        assert!(w.check(95));
        w.accept(95);
        assert!(!w.check(95));
        assert_eq!(w.highest(), Some(100));
    }

    #[test]
    fn too_old_rejected() {
        let mut w = ReplayWindow::new();
        w.accept(1000);
        assert!(!w.check(1000 - REPLAY_WINDOW_SIZE));
        assert!(w.check(1000 - REPLAY_WINDOW_SIZE + 1));
    }

    #[test]
    fn large_jump_clears_history() {
        let mut w = ReplayWindow::new();
        w.accept(1);
        w.accept(2);
        w.accept(500);
        assert!(!w.check(500));
        assert!(w.check(499));
        assert!(!w.check(2));
    }

    #[test]
    fn check_does_not_record() {
        let w = ReplayWindow::new();
        assert!(w.check(5));
        assert!(w.check(5));
        assert_eq!(w.highest(), None);
    }
}
