use embassy_time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    /// No telecommand accepted since boot. Not a loss: `armed` is still false.
    NeverSeen,
    Alive,
    Lost,
}

/// Link-loss watchdog on accepted telecommand.
pub struct LinkWatchdog {
    timeout: Duration,
    last_rx: Option<Instant>,
    lost: bool,
}

impl LinkWatchdog {
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_rx: None,
            lost: false,
        }
    }

    /// A telecommand accepted at `at`. Only a strictly newer one counts.
    pub fn feed(&mut self, at: Instant) {
        if self.last_rx.is_some_and(|prev| at <= prev) {
            return;
        }
        self.last_rx = Some(at);
        if self.lost {
            self.lost = false;
            info!("link restored");
        }
    }

    pub fn check(&mut self, now: Instant) -> LinkStatus {
        let Some(last) = self.last_rx else {
            return LinkStatus::NeverSeen;
        };

        let expired = now
            .checked_duration_since(last)
            .is_some_and(|age| age > self.timeout);
        if expired && !self.lost {
            warn!("link lost: no telecommand for {} ms", now.as_millis() - last.as_millis());
        }
        self.lost = expired;

        if expired {
            LinkStatus::Lost
        } else {
            LinkStatus::Alive
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn reset(&mut self) {
        self.last_rx = None;
        self.lost = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_fed_is_not_lost() {
        let mut wd = LinkWatchdog::new(Duration::from_millis(2000));
        assert_eq!(wd.check(Instant::from_millis(60_000)), LinkStatus::NeverSeen);
        assert!(!wd.is_lost());
    }

    #[test]
    fn expires_after_timeout_and_recovers_on_feed() {
        let mut wd = LinkWatchdog::new(Duration::from_millis(2000));
        wd.feed(Instant::from_millis(1000));
        assert_eq!(wd.check(Instant::from_millis(3000)), LinkStatus::Alive);
        assert_eq!(wd.check(Instant::from_millis(3001)), LinkStatus::Lost);
        assert!(wd.is_lost());

        wd.feed(Instant::from_millis(3500));
        assert!(!wd.is_lost());
        assert_eq!(wd.check(Instant::from_millis(3501)), LinkStatus::Alive);
    }

    #[test]
    fn stale_feed_does_not_rewind() {
        let mut wd = LinkWatchdog::new(Duration::from_millis(2000));
        wd.feed(Instant::from_millis(5000));
        wd.feed(Instant::from_millis(100));
        assert_eq!(wd.check(Instant::from_millis(6000)), LinkStatus::Alive);
    }

    #[test]
    fn stale_feed_does_not_restore_lost_link() {
        let mut wd = LinkWatchdog::new(Duration::from_millis(2000));
        wd.feed(Instant::from_millis(1000));
        assert_eq!(wd.check(Instant::from_millis(4000)), LinkStatus::Lost);

        wd.feed(Instant::from_millis(900));
        wd.feed(Instant::from_millis(1000));
        assert!(wd.is_lost());
        assert_eq!(wd.check(Instant::from_millis(4010)), LinkStatus::Lost);

        wd.feed(Instant::from_millis(4020));
        assert!(!wd.is_lost());
    }
}
