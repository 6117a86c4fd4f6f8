use super::SwitchFlags;
use crate::state::SafetyLatch;

/// Level-based debounce for the E-STOP line.
///
/// The switch is normally closed: a high level means the stop is pressed or
/// the wire is cut. Each call compares the current level with the last
/// accepted one, never counts edges, so a transition dropped during the
/// debounce window is corrected by the next call. The owning task calls
/// `on_level` on every pin edge and again on a short timer.
pub struct EStopDebouncer {
    accepted_high: bool,
    accepted_at_ms: Option<u32>,
    window_ms: u32,
}

impl EStopDebouncer {
    pub const fn new(window_ms: u32) -> Self {
        Self {
            accepted_high: false,
            accepted_at_ms: None,
            window_ms,
        }
    }

    /// Take the boot-time level as accepted without waiting for an edge.
    pub fn init(&mut self, level_high: bool, now_ms: u32, flags: &SwitchFlags, latch: &SafetyLatch) {
        self.accepted_high = level_high;
        self.accepted_at_ms = Some(now_ms);
        flags.set_estop(level_high, false);
        latch.set_emergency_stop(level_high);
    }

    /// Returns true if `level_high` was accepted as a new state.
    pub fn on_level(&mut self, level_high: bool, now_ms: u32, flags: &SwitchFlags, latch: &SafetyLatch) -> bool {
        if level_high == self.accepted_high {
            return false;
        }

        let settled = self
            .accepted_at_ms
            .map_or(true, |at| now_ms.wrapping_sub(at) >= self.window_ms);
        if !settled {
            return false;
        }

        self.accepted_high = level_high;
        self.accepted_at_ms = Some(now_ms);

        latch.set_emergency_stop(level_high);
        if level_high {
            latch.stop_drive();
        }
        flags.set_estop(level_high, level_high);
        true
    }

    pub fn is_asserted(&self) -> bool {
        self.accepted_high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (EStopDebouncer, SwitchFlags, SafetyLatch) {
        let mut d = EStopDebouncer::new(20);
        let flags = SwitchFlags::new();
        let latch = SafetyLatch::new();
        d.init(false, 0, &flags, &latch);
        (d, flags, latch)
    }

    #[test]
    fn press_is_applied_to_latch_at_once() {
        let (mut d, flags, latch) = setup();
        assert!(d.on_level(true, 50, &flags, &latch));
        assert!(latch.emergency_stop());
        assert!(flags.estop());
    }

    #[test]
    fn bounce_inside_window_is_ignored() {
        let (mut d, flags, latch) = setup();
        assert!(d.on_level(true, 50, &flags, &latch));
        assert!(!d.on_level(false, 55, &flags, &latch));
        assert!(!d.on_level(true, 58, &flags, &latch));
        assert!(latch.emergency_stop());
    }

    #[test]
    fn missed_edge_converges_on_next_call() {
        let (mut d, flags, latch) = setup();
        d.on_level(true, 100, &flags, &latch);

        // Release bounces inside the window and its final edge is lost.
        assert!(!d.on_level(false, 110, &flags, &latch));
        assert!(latch.emergency_stop());

        // Any later evaluation with the real level fixes the flag.
        assert!(d.on_level(false, 130, &flags, &latch));
        assert!(!latch.emergency_stop());
        assert!(!d.is_asserted());
    }

    #[test]
    fn arbitrary_sequence_tracks_last_level() {
        let (mut d, flags, latch) = setup();
        let levels = [true, false, false, true, true, false, true];
        let mut now = 0;
        for &level in &levels {
            now += 25;
            d.on_level(level, now, &flags, &latch);
            assert_eq!(latch.emergency_stop(), level);
        }
    }
}
