//! Receive path.
//!
//! `Dispatcher::on_datagram` runs in the radio receive context. It validates
//! and decodes the datagram, parks it in a per-kind mailbox slot, and for
//! telecommand on the OBC writes the safety bits straight into the
//! `SafetyLatch`. Everything else reaches the `SharedContext` when the main
//! loop calls `apply_pending`.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Instant;

use super::{LinkStats, PeerAddress, RxMeta};
use crate::protocol::{decode, DecodeError, MessageKind, WireMessage};
use crate::state::{Role, SafetyLatch, SharedContext, SystemState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DropReason {
    UnknownSource,
    Decode(DecodeError),
    /// A kind this node is itself the source of.
    Unexpected(MessageKind),
}

/// What one `apply_pending` call copied into the context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Applied {
    pub messages: u8,
    pub last_kind: Option<MessageKind>,
    /// Arrival time of the telecommand applied, if any.
    pub telecommand_at: Option<Instant>,
}

#[derive(Default)]
struct Mailbox {
    /// Indexed by `slot_index`; `Some` is the ready flag.
    slots: [Option<WireMessage>; 4],
    telecommand_at: Option<Instant>,
    last_kind: Option<MessageKind>,
}

const fn slot_index(kind: MessageKind) -> usize {
    match kind {
        MessageKind::TelemetryGps => 0,
        MessageKind::TelemetryImu => 1,
        MessageKind::TelemetryHousekeeping => 2,
        MessageKind::TelecommandControl => 3,
    }
}

pub struct Dispatcher<'a> {
    role: Role,
    peer: PeerAddress,
    latch: &'a SafetyLatch,
    stats: &'a LinkStats,
    mailbox: Mutex<CriticalSectionRawMutex, RefCell<Mailbox>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(role: Role, peer: PeerAddress, latch: &'a SafetyLatch, stats: &'a LinkStats) -> Self {
        Self {
            role,
            peer,
            latch,
            stats,
            mailbox: Mutex::new(RefCell::new(Mailbox::default())),
        }
    }

    /// Handle one received datagram. Never blocks beyond a short critical
    /// section; a rejected datagram leaves every buffer untouched.
    pub fn on_datagram(&self, meta: RxMeta, data: &[u8], now: Instant) -> Result<MessageKind, DropReason> {
        if meta.src != self.peer {
            return Err(self.drop_datagram(DropReason::UnknownSource));
        }

        if let Some(rssi) = meta.rssi {
            self.latch.record_rssi(self.role, rssi as i16);
        }

        let message = decode(data).map_err(|e| self.drop_datagram(DropReason::Decode(e)))?;
        let kind = message.kind();
        if !self.role.accepts(kind) {
            return Err(self.drop_datagram(DropReason::Unexpected(kind)));
        }

        self.stats.on_receive(now);
        self.mailbox.lock(|mb| {
            let mut mb = mb.borrow_mut();
            mb.slots[slot_index(kind)] = Some(message);
            mb.last_kind = Some(kind);
            if kind == MessageKind::TelecommandControl {
                mb.telecommand_at = Some(now);
            }
        });

        if let WireMessage::TelecommandControl(tc) = message {
            self.trip_safety(tc.flags.emergency_stop, tc.flags.armed);
        }

        Ok(kind)
    }

    /// The one place outside the main loop allowed to change the system
    /// state. E-STOP wins over everything but Error and link bring-up; a
    /// disarm drops Armed back to WaitingForArm. Either way the wheels stop
    /// now.
    fn trip_safety(&self, emergency_stop: bool, armed: bool) {
        let latch = self.latch;
        latch.set_emergency_stop(emergency_stop);
        latch.set_armed(armed);

        let state = latch.state();
        if emergency_stop {
            latch.stop_drive();
            if !state.bringing_up() && !matches!(state, SystemState::EmergencyStop | SystemState::Error) {
                latch.force_state(SystemState::EmergencyStop);
                warn!("E-STOP received from CTU");
            }
        } else if !armed {
            latch.stop_drive();
            if state == SystemState::Armed {
                latch.force_state(SystemState::WaitingForArm);
                info!("disarm received from CTU");
            }
        }
    }

    fn drop_datagram(&self, reason: DropReason) -> DropReason {
        self.stats.on_drop();
        debug!("datagram dropped: {}", reason);
        reason
    }

    /// Copy every ready slot into `ctx` and clear the ready flags.
    pub fn apply_pending(&self, ctx: &mut SharedContext) -> Applied {
        let (slots, telecommand_at, last_kind) = self.mailbox.lock(|mb| {
            let mut mb = mb.borrow_mut();
            let slots = core::mem::take(&mut mb.slots);
            (slots, mb.telecommand_at.take(), mb.last_kind.take())
        });

        let mut applied = Applied {
            last_kind,
            ..Applied::default()
        };
        for message in slots.iter().flatten() {
            ctx.apply(message);
            applied.messages += 1;
        }
        if slots[slot_index(MessageKind::TelecommandControl)].is_some() {
            applied.telecommand_at = telecommand_at;
        }

        applied
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CTU_ADDRESS, OBC_ADDRESS};
    use crate::control::{ControlOutput, JoystickCalibration};
    use crate::protocol::{encode, Telecommand};
    use crate::state::ControlFlags;

    fn meta(src: PeerAddress) -> RxMeta {
        RxMeta { src, rssi: Some(-55) }
    }

    fn telecommand(estop: bool, armed: bool) -> WireMessage {
        WireMessage::TelecommandControl(Telecommand {
            joystick_x: 3000,
            flags: ControlFlags {
                emergency_stop: estop,
                armed,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn obc_accepts_only_telecommand() {
        let latch = SafetyLatch::new();
        let stats = LinkStats::new();
        let d = Dispatcher::new(Role::Obc, CTU_ADDRESS, &latch, &stats);
        let ctx = SharedContext::new(&JoystickCalibration::DEFAULT);

        let gps = encode(&ctx.message(MessageKind::TelemetryGps));
        assert_eq!(
            d.on_datagram(meta(CTU_ADDRESS), &gps, Instant::from_millis(1)),
            Err(DropReason::Unexpected(MessageKind::TelemetryGps))
        );

        let tc = encode(&telecommand(false, true));
        assert_eq!(
            d.on_datagram(meta(CTU_ADDRESS), &tc, Instant::from_millis(2)),
            Ok(MessageKind::TelecommandControl)
        );
        assert_eq!(stats.counters().dropped, 1);
        assert_eq!(stats.counters().received, 1);
    }

    #[test]
    fn bad_datagrams_leave_mailbox_untouched() {
        let latch = SafetyLatch::new();
        let stats = LinkStats::new();
        let d = Dispatcher::new(Role::Obc, CTU_ADDRESS, &latch, &stats);

        let tc = encode(&telecommand(true, false));
        assert!(d.on_datagram(meta(CTU_ADDRESS), &tc[..5], Instant::from_millis(1)).is_err());
        assert!(d.on_datagram(meta(CTU_ADDRESS), &[0x42, 0, 0], Instant::from_millis(1)).is_err());
        assert!(d.on_datagram(meta(OBC_ADDRESS), &tc, Instant::from_millis(1)).is_err());

        let mut ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        assert_eq!(d.apply_pending(&mut ctx), Applied::default());
        assert!(!latch.emergency_stop());
        assert_eq!(stats.counters().dropped, 3);
    }

    #[test]
    fn estop_telecommand_trips_latch_immediately() {
        let latch = SafetyLatch::new();
        latch.force_state(SystemState::Armed);
        latch.set_drive(ControlOutput { left: 80, right: 80 });
        let stats = LinkStats::new();
        let d = Dispatcher::new(Role::Obc, CTU_ADDRESS, &latch, &stats);

        let tc = encode(&telecommand(true, true));
        d.on_datagram(meta(CTU_ADDRESS), &tc, Instant::from_millis(10)).unwrap();

        assert_eq!(latch.state(), SystemState::EmergencyStop);
        assert_eq!(latch.drive(), ControlOutput::STOP);
        assert!(latch.emergency_stop());
    }

    #[test]
    fn disarm_telecommand_drops_to_waiting() {
        let latch = SafetyLatch::new();
        latch.force_state(SystemState::Armed);
        latch.set_armed(true);
        let stats = LinkStats::new();
        let d = Dispatcher::new(Role::Obc, CTU_ADDRESS, &latch, &stats);

        let tc = encode(&telecommand(false, false));
        d.on_datagram(meta(CTU_ADDRESS), &tc, Instant::from_millis(10)).unwrap();
        assert_eq!(latch.state(), SystemState::WaitingForArm);
        assert!(!latch.armed());
    }

    #[test]
    fn error_state_is_not_overwritten() {
        let latch = SafetyLatch::new();
        latch.force_state(SystemState::Error);
        let stats = LinkStats::new();
        let d = Dispatcher::new(Role::Obc, CTU_ADDRESS, &latch, &stats);

        let tc = encode(&telecommand(true, false));
        d.on_datagram(meta(CTU_ADDRESS), &tc, Instant::from_millis(10)).unwrap();
        assert_eq!(latch.state(), SystemState::Error);
    }

    #[test]
    fn estop_during_bring_up_stops_but_keeps_state() {
        let latch = SafetyLatch::new();
        latch.force_state(SystemState::CommsConfig);
        let stats = LinkStats::new();
        let d = Dispatcher::new(Role::Obc, CTU_ADDRESS, &latch, &stats);

        let tc = encode(&telecommand(true, false));
        d.on_datagram(meta(CTU_ADDRESS), &tc, Instant::from_millis(10)).unwrap();
        assert_eq!(latch.state(), SystemState::CommsConfig);
        assert!(latch.emergency_stop());
        assert_eq!(latch.drive(), ControlOutput::STOP);
    }

    #[test]
    fn apply_copies_latest_and_clears_ready() {
        let latch = SafetyLatch::new();
        let stats = LinkStats::new();
        let d = Dispatcher::new(Role::Ctu, OBC_ADDRESS, &latch, &stats);
        let mut obc_ctx = SharedContext::new(&JoystickCalibration::DEFAULT);

        obc_ctx.power.bus_voltage = 11.0;
        let first = encode(&obc_ctx.message(MessageKind::TelemetryHousekeeping));
        obc_ctx.power.bus_voltage = 12.4;
        let second = encode(&obc_ctx.message(MessageKind::TelemetryHousekeeping));
        let gps = encode(&obc_ctx.message(MessageKind::TelemetryGps));

        d.on_datagram(meta(OBC_ADDRESS), &first, Instant::from_millis(1)).unwrap();
        d.on_datagram(meta(OBC_ADDRESS), &second, Instant::from_millis(2)).unwrap();
        d.on_datagram(meta(OBC_ADDRESS), &gps, Instant::from_millis(3)).unwrap();

        let mut ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        let applied = d.apply_pending(&mut ctx);
        assert_eq!(applied.messages, 2);
        assert_eq!(applied.last_kind, Some(MessageKind::TelemetryGps));
        assert_eq!(applied.telecommand_at, None);
        assert_eq!(ctx.power.bus_voltage, 12.4);
        assert_eq!(latch.ctu_rssi(), Some(-55));

        assert_eq!(d.apply_pending(&mut ctx).messages, 0);
    }
}
