//! UART radio modem transport.
//!
//! The modem exchanges SLIP frames with the MCU. Outgoing frames are
//! `[dst address][payload]`; incoming frames are `[src address][rssi i8][payload]`
//! with an RSSI of -128 meaning the modem had no reading. `ModemRadio` only
//! queues frames; a UART task drains the queue and reports completion through
//! `LinkStats::on_send_complete`.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

use super::{PeerAddress, Radio};
use crate::protocol::MAX_DATAGRAM;

pub const ADDRESS_LEN: usize = 6;
/// Largest modem frame in either direction.
pub const MAX_MODEM_FRAME: usize = ADDRESS_LEN + 1 + MAX_DATAGRAM;
const RSSI_UNAVAILABLE: i8 = i8::MIN;
const MAX_PEERS: usize = 4;

pub type ModemFrame = Vec<u8, MAX_MODEM_FRAME>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemError {
    NotStarted,
    UnknownPeer,
    PeerTableFull,
    QueueFull,
    PayloadTooLarge,
}

/// Receive metadata for one datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxMeta {
    pub src: PeerAddress,
    pub rssi: Option<i8>,
}

/// Split an incoming modem frame into its metadata and datagram.
pub fn parse_incoming(frame: &[u8]) -> Option<(RxMeta, &[u8])> {
    if frame.len() <= ADDRESS_LEN + 1 {
        return None;
    }
    let (header, payload) = frame.split_at(ADDRESS_LEN + 1);

    let mut src = [0u8; ADDRESS_LEN];
    src.copy_from_slice(&header[..ADDRESS_LEN]);
    let rssi = header[ADDRESS_LEN] as i8;

    Some((
        RxMeta {
            src: PeerAddress(src),
            rssi: (rssi != RSSI_UNAVAILABLE).then_some(rssi),
        },
        payload,
    ))
}

/// Build an incoming frame. Used by loopback tests and the modem simulator.
pub fn incoming_frame(src: &PeerAddress, rssi: Option<i8>, payload: &[u8]) -> Option<ModemFrame> {
    let mut frame = ModemFrame::new();
    frame.extend_from_slice(&src.0).ok()?;
    frame.push(rssi.unwrap_or(RSSI_UNAVAILABLE) as u8).ok()?;
    frame.extend_from_slice(payload).ok()?;
    Some(frame)
}

pub struct ModemRadio<'a, M: RawMutex, const Q: usize> {
    tx: &'a Channel<M, ModemFrame, Q>,
    peers: Vec<PeerAddress, MAX_PEERS>,
    started: bool,
}

impl<'a, M: RawMutex, const Q: usize> ModemRadio<'a, M, Q> {
    pub fn new(tx: &'a Channel<M, ModemFrame, Q>) -> Self {
        Self {
            tx,
            peers: Vec::new(),
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl<M: RawMutex, const Q: usize> Radio for ModemRadio<'_, M, Q> {
    type Error = ModemError;

    fn start(&mut self) -> Result<(), ModemError> {
        // Anything queued before a restart belongs to the old session.
        while self.tx.try_receive().is_ok() {}
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
        self.peers.clear();
    }

    fn has_peer(&self, peer: &PeerAddress) -> bool {
        self.peers.contains(peer)
    }

    fn add_peer(&mut self, peer: &PeerAddress) -> Result<(), ModemError> {
        if !self.started {
            return Err(ModemError::NotStarted);
        }
        self.peers.push(*peer).map_err(|_| ModemError::PeerTableFull)
    }

    fn remove_peer(&mut self, peer: &PeerAddress) -> Result<(), ModemError> {
        if !self.peers.contains(peer) {
            return Err(ModemError::UnknownPeer);
        }
        self.peers.retain(|p| p != peer);
        Ok(())
    }

    fn transmit(&mut self, peer: &PeerAddress, payload: &[u8]) -> Result<(), ModemError> {
        if !self.started {
            return Err(ModemError::NotStarted);
        }
        if !self.peers.contains(peer) {
            return Err(ModemError::UnknownPeer);
        }
        if payload.len() > MAX_DATAGRAM {
            return Err(ModemError::PayloadTooLarge);
        }

        let mut frame = ModemFrame::new();
        frame
            .extend_from_slice(&peer.0)
            .and_then(|_| frame.extend_from_slice(payload))
            .map_err(|_| ModemError::PayloadTooLarge)?;

        self.tx.try_send(frame).map_err(|_| ModemError::QueueFull)
    }
}
