//! Rate-limited outgoing traffic.
//!
//! Both producers are polled from the main loop and hand back at most one
//! message per call; the caller passes it to `LinkAdapter::send`.

use embassy_time::{Duration, Instant};

use crate::config::TelemetryRates;
use crate::protocol::{MessageKind, WireMessage};
use crate::state::SharedContext;

#[derive(Clone, Copy)]
struct Slot {
    kind: MessageKind,
    interval: Duration,
    /// `None` until the first send, so every kind is due at boot.
    last_sent: Option<Instant>,
}

impl Slot {
    fn due(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(at) => now.checked_duration_since(at).is_some_and(|d| d >= self.interval),
        }
    }
}

/// Round-robin over GPS, IMU and housekeeping telemetry.
///
/// Each poll looks at exactly one kind and moves on, whether or not that kind
/// was due.
pub struct TelemetryScheduler {
    slots: [Slot; 3],
    cursor: usize,
}

impl TelemetryScheduler {
    pub const fn new(rates: &TelemetryRates) -> Self {
        Self {
            slots: [
                Slot {
                    kind: MessageKind::TelemetryGps,
                    interval: rates.gps,
                    last_sent: None,
                },
                Slot {
                    kind: MessageKind::TelemetryImu,
                    interval: rates.imu,
                    last_sent: None,
                },
                Slot {
                    kind: MessageKind::TelemetryHousekeeping,
                    interval: rates.housekeeping,
                    last_sent: None,
                },
            ],
            cursor: 0,
        }
    }

    pub fn poll(&mut self, now: Instant, ctx: &SharedContext) -> Option<WireMessage> {
        let slot = &mut self.slots[self.cursor];
        self.cursor = (self.cursor + 1) % 3;

        if !slot.due(now) {
            return None;
        }
        slot.last_sent = Some(now);
        Some(ctx.message(slot.kind))
    }
}

/// Fixed-cadence telecommand producer. Polling faster than the interval is a
/// no-op.
pub struct TelecommandLimiter {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl TelecommandLimiter {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    pub fn poll(&mut self, now: Instant, ctx: &SharedContext) -> Option<WireMessage> {
        if let Some(at) = self.last_sent {
            if now.checked_duration_since(at).map_or(true, |d| d < self.interval) {
                return None;
            }
        }
        self.last_sent = Some(now);
        Some(ctx.message(MessageKind::TelecommandControl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    fn ctx() -> SharedContext {
        SharedContext::new(&Default::default())
    }

    fn ms(v: u64) -> Instant {
        Instant::from_millis(v)
    }

    fn kinds(sched: &mut TelemetryScheduler, now: Instant, polls: usize) -> heapless::Vec<MessageKind, 8> {
        let ctx = ctx();
        (0..polls)
            .filter_map(|_| sched.poll(now, &ctx).map(|m| m.kind()))
            .collect()
    }

    #[test]
    fn every_kind_is_due_at_boot() {
        let mut sched = TelemetryScheduler::new(&NodeConfig::obc().telemetry);
        assert_eq!(
            kinds(&mut sched, ms(0), 3).as_slice(),
            &[
                MessageKind::TelemetryGps,
                MessageKind::TelemetryImu,
                MessageKind::TelemetryHousekeeping
            ]
        );
    }

    #[test]
    fn one_kind_per_poll_and_cursor_always_advances() {
        let mut sched = TelemetryScheduler::new(&NodeConfig::obc().telemetry);
        kinds(&mut sched, ms(0), 3);

        // 150 ms later only IMU (100 ms) is due. GPS is looked at first and
        // skipped, then IMU goes out, then housekeeping is skipped.
        let ctx = ctx();
        assert!(sched.poll(ms(150), &ctx).is_none());
        assert_eq!(sched.poll(ms(150), &ctx).map(|m| m.kind()), Some(MessageKind::TelemetryImu));
        assert!(sched.poll(ms(150), &ctx).is_none());

        assert_eq!(
            kinds(&mut sched, ms(1000), 3).as_slice(),
            &[
                MessageKind::TelemetryGps,
                MessageKind::TelemetryImu,
                MessageKind::TelemetryHousekeeping
            ]
        );
    }

    #[test]
    fn telecommand_cadence() {
        let mut limiter = TelecommandLimiter::new(Duration::from_millis(20));
        let ctx = ctx();
        assert!(limiter.poll(ms(0), &ctx).is_some());
        assert!(limiter.poll(ms(5), &ctx).is_none());
        assert!(limiter.poll(ms(19), &ctx).is_none());
        assert!(limiter.poll(ms(20), &ctx).is_some());
        assert!(limiter.poll(ms(25), &ctx).is_none());
    }
}
