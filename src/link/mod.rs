//! Datagram link to the peer node.
//!
//! `LinkAdapter` is the main loop's send side; `Dispatcher` is the receive
//! side, called from the radio receive task. Both share a `LinkStats` so the
//! asynchronous completion and receive paths never need the adapter itself.

use core::fmt::Debug;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_time::{Duration, Instant};

use crate::protocol::{encode, WireMessage};

pub mod dispatch;
pub mod modem;
pub mod sender;
pub mod slip;
pub mod watchdog;

pub use dispatch::{Applied, Dispatcher};
pub use modem::{ModemRadio, RxMeta};
pub use sender::{TelecommandLimiter, TelemetryScheduler};
pub use watchdog::{LinkStatus, LinkWatchdog};

/// 6-byte hardware address of a radio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress(pub [u8; 6]);

/// Best-effort datagram transport to one known peer.
pub trait Radio {
    type Error: Copy + Debug;

    fn start(&mut self) -> Result<(), Self::Error>;
    fn stop(&mut self);
    fn has_peer(&self, peer: &PeerAddress) -> bool;
    fn add_peer(&mut self, peer: &PeerAddress) -> Result<(), Self::Error>;
    fn remove_peer(&mut self, peer: &PeerAddress) -> Result<(), Self::Error>;
    /// Queue one datagram. Completion is reported later through
    /// `LinkStats::on_send_complete`.
    fn transmit(&mut self, peer: &PeerAddress, payload: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    Start,
    RemovePeer,
    AddPeer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendResult {
    Queued,
    /// `init` has not succeeded yet.
    NotReady,
    /// The radio refused the datagram; counted as a send failure.
    Rejected,
}

/// Diagnostic counters, updated from any context.
pub struct LinkStats {
    sent: AtomicU32,
    send_ok: AtomicU32,
    send_failed: AtomicU32,
    received: AtomicU32,
    dropped: AtomicU32,
    /// Millisecond timestamp of the last datagram, plus one; 0 means never.
    last_rx_ms: AtomicU32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkCounters {
    pub sent: u32,
    pub send_ok: u32,
    pub send_failed: u32,
    pub received: u32,
    pub dropped: u32,
}

impl LinkStats {
    pub const fn new() -> Self {
        Self {
            sent: AtomicU32::new(0),
            send_ok: AtomicU32::new(0),
            send_failed: AtomicU32::new(0),
            received: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            last_rx_ms: AtomicU32::new(0),
        }
    }

    pub fn on_send_complete(&self, ok: bool) {
        if ok {
            self.send_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.send_failed.fetch_add(1, Ordering::Relaxed);
            debug!("send completion reported failure");
        }
    }

    pub fn on_receive(&self, now: Instant) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let stamp = (now.as_millis() as u32).wrapping_add(1).max(1);
        self.last_rx_ms.store(stamp, Ordering::Release);
    }

    pub fn on_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn on_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn on_send_rejected(&self) {
        self.send_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> LinkCounters {
        LinkCounters {
            sent: self.sent.load(Ordering::Relaxed),
            send_ok: self.send_ok.load(Ordering::Relaxed),
            send_failed: self.send_failed.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Milliseconds since the last datagram, or `None` if nothing arrived.
    pub fn since_last_rx(&self, now: Instant) -> Option<u32> {
        match self.last_rx_ms.load(Ordering::Acquire) {
            0 => None,
            stamp => Some((now.as_millis() as u32).wrapping_sub(stamp.wrapping_sub(1))),
        }
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Send-side facade over a `Radio`.
pub struct LinkAdapter<'a, R: Radio> {
    radio: R,
    peer: PeerAddress,
    reachable_window: Duration,
    stats: &'a LinkStats,
    ready: bool,
}

impl<'a, R: Radio> LinkAdapter<'a, R> {
    pub fn new(radio: R, peer: PeerAddress, reachable_window: Duration, stats: &'a LinkStats) -> Self {
        Self {
            radio,
            peer,
            reachable_window,
            stats,
            ready: false,
        }
    }

    /// Bring the radio up and register the peer, replacing any stale entry.
    /// A failed step tears the radio down again; the caller retries.
    pub fn init(&mut self) -> Result<(), InitError> {
        self.ready = false;

        if let Err(e) = self.radio.start() {
            warn!("radio start failed: {}", defmt_debug(&e));
            return Err(self.deinit_on_error(InitError::Start));
        }

        if self.radio.has_peer(&self.peer) {
            debug!("peer already registered, replacing");
            if self.radio.remove_peer(&self.peer).is_err() {
                return Err(self.deinit_on_error(InitError::RemovePeer));
            }
        }

        if self.radio.add_peer(&self.peer).is_err() {
            return Err(self.deinit_on_error(InitError::AddPeer));
        }

        self.ready = true;
        info!("link up, peer {=[u8]:02x}", &self.peer.0[..]);
        Ok(())
    }

    fn deinit_on_error(&mut self, err: InitError) -> InitError {
        warn!("link init failed at {}", err);
        self.radio.stop();
        err
    }

    pub fn send(&mut self, message: &WireMessage) -> SendResult {
        if !self.ready {
            return SendResult::NotReady;
        }

        let frame = encode(message);
        match self.radio.transmit(&self.peer, &frame) {
            Ok(()) => {
                self.stats.on_sent();
                SendResult::Queued
            }
            Err(_) => {
                self.stats.on_send_rejected();
                trace!("send rejected: {}", message.kind());
                SendResult::Rejected
            }
        }
    }

    pub fn on_send_complete(&self, ok: bool) {
        self.stats.on_send_complete(ok);
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// A datagram arrived within the reachability window.
    pub fn is_peer_reachable(&self, now: Instant) -> bool {
        self.stats
            .since_last_rx(now)
            .is_some_and(|age| (age as u64) <= self.reachable_window.as_millis())
    }

    pub fn stats(&self) -> &'a LinkStats {
        self.stats
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}

#[cfg(feature = "defmt")]
fn defmt_debug<E: Debug>(e: &E) -> defmt::Debug2Format<'_, E> {
    defmt::Debug2Format(e)
}

#[cfg(not(feature = "defmt"))]
fn defmt_debug<E: Debug>(e: &E) -> &E {
    e
}


#[cfg(test)]
mod tests {
    use super::mock::MockRadio;
    use super::*;
    use crate::config::CTU_ADDRESS;
    use crate::protocol::{decode, MessageKind};
    use crate::state::SharedContext;

    fn msg() -> WireMessage {
        SharedContext::new(&Default::default()).message(MessageKind::TelemetryGps)
    }

    #[test]
    fn init_replaces_existing_peer() {
        let stats = LinkStats::new();
        let mut radio = MockRadio::default();
        radio.peers.push(CTU_ADDRESS).unwrap();
        let mut link = LinkAdapter::new(radio, CTU_ADDRESS, Duration::from_millis(1000), &stats);

        assert_eq!(link.init(), Ok(()));
        assert!(link.is_ready());
        assert_eq!(link.radio().peers.len(), 1);
    }

    #[test]
    fn failed_init_tears_down() {
        let stats = LinkStats::new();
        let radio = MockRadio {
            fail_add: true,
            ..Default::default()
        };
        let mut link = LinkAdapter::new(radio, CTU_ADDRESS, Duration::from_millis(1000), &stats);

        assert_eq!(link.init(), Err(InitError::AddPeer));
        assert!(!link.is_ready());
        assert!(!link.radio().started);
        assert_eq!(link.radio().stops, 1);
        assert_eq!(link.send(&msg()), SendResult::NotReady);
    }

    #[test]
    fn send_is_counted_and_never_blocks() {
        let stats = LinkStats::new();
        let mut link = LinkAdapter::new(MockRadio::default(), CTU_ADDRESS, Duration::from_millis(1000), &stats);
        link.init().unwrap();

        assert_eq!(link.send(&msg()), SendResult::Queued);
        assert_eq!(decode(&link.radio().sent[0]), Ok(msg()));

        link.radio.fail_transmit = true;
        assert_eq!(link.send(&msg()), SendResult::Rejected);
        link.on_send_complete(true);

        let c = stats.counters();
        assert_eq!((c.sent, c.send_ok, c.send_failed), (1, 1, 1));
    }

    #[test]
    fn reachability_follows_receive_window() {
        let stats = LinkStats::new();
        let link = LinkAdapter::new(MockRadio::default(), CTU_ADDRESS, Duration::from_millis(1000), &stats);
        assert!(!link.is_peer_reachable(Instant::from_millis(0)));

        stats.on_receive(Instant::from_millis(5_000));
        assert!(link.is_peer_reachable(Instant::from_millis(5_000)));
        assert!(link.is_peer_reachable(Instant::from_millis(6_000)));
        assert!(!link.is_peer_reachable(Instant::from_millis(6_001)));
    }
}
