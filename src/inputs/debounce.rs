/// Polled debounce for a non-critical switch.
///
/// A reading is accepted once it has held for at least `window_ms` and
/// differs from the accepted state.
#[derive(Clone, Copy, Debug)]
pub struct Debouncer {
    raw: bool,
    raw_since_ms: u32,
    stable: bool,
    window_ms: u32,
}

impl Debouncer {
    pub const fn new(initial: bool, window_ms: u32) -> Self {
        Self {
            raw: initial,
            raw_since_ms: 0,
            stable: initial,
            window_ms,
        }
    }

    /// Feed one reading. Returns the new accepted state when it changes.
    pub fn update(&mut self, reading: bool, now_ms: u32) -> Option<bool> {
        if reading != self.raw {
            self.raw = reading;
            self.raw_since_ms = now_ms;
        }

        let held = now_ms.wrapping_sub(self.raw_since_ms);
        if held >= self.window_ms && reading != self.stable {
            self.stable = reading;
            return Some(reading);
        }
        None
    }

    pub fn state(&self) -> bool {
        self.stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounce_is_filtered() {
        let mut d = Debouncer::new(false, 30);
        assert_eq!(d.update(true, 100), None);
        assert_eq!(d.update(false, 105), None);
        assert_eq!(d.update(true, 110), None);
        assert_eq!(d.update(true, 139), None);
        assert_eq!(d.update(true, 140), Some(true));
        assert_eq!(d.update(true, 200), None);
        assert!(d.state());
    }

    #[test]
    fn glitch_shorter_than_window_is_ignored() {
        let mut d = Debouncer::new(true, 30);
        assert_eq!(d.update(false, 1000), None);
        assert_eq!(d.update(true, 1010), None);
        assert_eq!(d.update(true, 1100), None);
        assert!(d.state());
    }
}
