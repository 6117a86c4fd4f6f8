/// Shared state for the main loop and the interrupt/callback contexts.
///
/// `SharedContext` is owned by the main loop and passed by reference to each
/// component. The few fields that interrupt or radio-callback code must write
/// live in `SafetyLatch` as single atomics; the main loop mirrors them into the
/// context once per iteration with `SharedContext::sync_safety`.
use core::sync::atomic::{AtomicBool, AtomicI16, AtomicU32, AtomicU8, Ordering};

use crate::config::ESTOP_ASSERTED_AT_BOOT;
use crate::control::{ControlOutput, JoystickCalibration};
use crate::protocol::{MessageKind, Telecommand, WireMessage};

// ── Roles ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// On-board computer: telemetry source, telecommand sink.
    Obc,
    /// Control & telemetry unit: telecommand source, telemetry sink.
    Ctu,
}

impl Role {
    /// Whether this node takes `kind` from its peer. A node never accepts the
    /// messages it is itself the source of truth for.
    pub const fn accepts(self, kind: MessageKind) -> bool {
        match self {
            Role::Obc => matches!(kind, MessageKind::TelecommandControl),
            Role::Ctu => !matches!(kind, MessageKind::TelecommandControl),
        }
    }
}

// ── System state ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SystemState {
    #[default]
    PoweredOn = 0,
    Initialized = 1,
    CommsConfig = 2,
    WaitingForArm = 3,
    Armed = 4,
    EmergencyStop = 5,
    Error = 6,
    OtaUpdate = 7,
    Reboot = 8,
}

impl SystemState {
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Initialized,
            2 => Self::CommsConfig,
            3 => Self::WaitingForArm,
            4 => Self::Armed,
            5 => Self::EmergencyStop,
            6 => Self::Error,
            7 => Self::OtaUpdate,
            8 => Self::Reboot,
            _ => Self::PoweredOn,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::PoweredOn => "POWER ON",
            Self::Initialized => "INIT",
            Self::CommsConfig => "COMMS CFG",
            Self::WaitingForArm => "WAIT ARM",
            Self::Armed => "ARMED",
            Self::EmergencyStop => "E-STOP",
            Self::Error => "ERROR",
            Self::OtaUpdate => "OTA",
            Self::Reboot => "REBOOT",
        }
    }

    /// Still working toward a configured link.
    pub const fn bringing_up(self) -> bool {
        matches!(self, Self::PoweredOn | Self::Initialized | Self::CommsConfig)
    }

    /// Status LED pattern for this state.
    pub const fn indicator(self) -> Indicator {
        match self {
            Self::PoweredOn | Self::Initialized => Indicator::Off,
            Self::CommsConfig => Indicator::Blink,
            Self::WaitingForArm => Indicator::Blink,
            Self::Armed => Indicator::Solid,
            Self::OtaUpdate => Indicator::Solid,
            Self::EmergencyStop | Self::Error | Self::Reboot => Indicator::FastBlink,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indicator {
    Off,
    Solid,
    /// 1 Hz, 50 % duty.
    Blink,
    /// 5 Hz, 50 % duty.
    FastBlink,
}

impl Indicator {
    /// LED level at `now_ms` for this pattern.
    pub const fn level(self, now_ms: u64) -> bool {
        match self {
            Self::Off => false,
            Self::Solid => true,
            Self::Blink => now_ms % 1000 < 500,
            Self::FastBlink => now_ms % 200 < 100,
        }
    }
}

// ── Telecommand content ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandCode {
    #[default]
    Drive,
    SoftwareUpgrade,
    Reboot,
}

impl CommandCode {
    pub const DRIVE: u16 = 0x00;
    pub const SOFTWARE_UPGRADE: u16 = 0xD1;
    pub const REBOOT: u16 = 0xDF;

    /// Unknown codes fall back to plain driving.
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            Self::SOFTWARE_UPGRADE => Self::SoftwareUpgrade,
            Self::REBOOT => Self::Reboot,
            _ => Self::Drive,
        }
    }

    pub const fn raw(self) -> u16 {
        match self {
            Self::Drive => Self::DRIVE,
            Self::SoftwareUpgrade => Self::SOFTWARE_UPGRADE,
            Self::Reboot => Self::REBOOT,
        }
    }
}

/// Operator switches carried in the telecommand `flags` byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlFlags {
    pub emergency_stop: bool,
    pub armed: bool,
    pub buttons: [bool; 4],
    pub headlights: bool,
    pub buzzer: bool,
}

impl ControlFlags {
    pub const EMERGENCY_STOP_BIT: u8 = 7;
    pub const ARMED_BIT: u8 = 6;
    pub const BUTTON_A_BIT: u8 = 5;
    pub const HEADLIGHTS_BIT: u8 = 1;
    pub const BUZZER_BIT: u8 = 0;

    pub fn to_bits(self) -> u8 {
        let mut bits = 0u8;
        let mut set = |bit: u8, on: bool| {
            if on {
                bits |= 1 << bit;
            }
        };
        set(Self::EMERGENCY_STOP_BIT, self.emergency_stop);
        set(Self::ARMED_BIT, self.armed);
        for (i, pressed) in self.buttons.iter().enumerate() {
            set(Self::BUTTON_A_BIT - i as u8, *pressed);
        }
        set(Self::HEADLIGHTS_BIT, self.headlights);
        set(Self::BUZZER_BIT, self.buzzer);
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        let get = |bit: u8| bits & (1 << bit) != 0;
        Self {
            emergency_stop: get(Self::EMERGENCY_STOP_BIT),
            armed: get(Self::ARMED_BIT),
            buttons: [
                get(Self::BUTTON_A_BIT),
                get(Self::BUTTON_A_BIT - 1),
                get(Self::BUTTON_A_BIT - 2),
                get(Self::BUTTON_A_BIT - 3),
            ],
            headlights: get(Self::HEADLIGHTS_BIT),
            buzzer: get(Self::BUZZER_BIT),
        }
    }
}

// ── Telemetry content ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpsData {
    pub lat: f32,
    pub lon: f32,
    /// UTC time of fix as hhmmss.ss.
    pub time: f32,
    pub fix: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuData {
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
    pub mag: [f32; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Orientation {
    pub heading_deg: f32,
    pub pitch_deg: f32,
    pub roll_deg: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerData {
    pub bus_voltage: f32,
    pub bus_current: f32,
    pub temperature_c: f32,
}

// ── Shared context ────────────────────────────────────────────────────────────

/// Latest known value of every field, on either node.
///
/// Telemetry fields are written by the OBC's sensor collaborators and copied
/// on the CTU from received telemetry; telecommand fields are the reverse.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SharedContext {
    pub system_state: SystemState,

    // OBC-authoritative
    pub gps: GpsData,
    pub imu: ImuData,
    pub orientation: Orientation,
    pub power: PowerData,
    pub obc_rssi: i16,

    // CTU-authoritative
    pub command: u16,
    pub joystick_x: u16,
    pub joystick_y: u16,
    pub encoder_pos: i16,
    pub flags: ControlFlags,
    pub ctu_rssi: i16,
}

impl SharedContext {
    /// RSSI value meaning "no reading yet".
    pub const RSSI_UNKNOWN: i16 = i16::MIN;

    pub const fn new(joystick: &JoystickCalibration) -> Self {
        Self {
            system_state: SystemState::PoweredOn,
            gps: GpsData { lat: 0.0, lon: 0.0, time: 0.0, fix: false },
            imu: ImuData { gyro: [0.0; 3], accel: [0.0; 3], mag: [0.0; 3] },
            orientation: Orientation { heading_deg: 0.0, pitch_deg: 0.0, roll_deg: 0.0 },
            power: PowerData { bus_voltage: 0.0, bus_current: 0.0, temperature_c: 0.0 },
            obc_rssi: Self::RSSI_UNKNOWN,
            command: CommandCode::DRIVE,
            joystick_x: joystick.x_neutral,
            joystick_y: joystick.y_neutral,
            encoder_pos: 0,
            flags: ControlFlags {
                emergency_stop: ESTOP_ASSERTED_AT_BOOT,
                armed: false,
                buttons: [false; 4],
                headlights: false,
                buzzer: false,
            },
            ctu_rssi: Self::RSSI_UNKNOWN,
        }
    }

    /// Back to boot values: telemetry zeroed, joystick centred, disarmed.
    pub fn reset_to_safe_defaults(&mut self, joystick: &JoystickCalibration) {
        *self = Self::new(joystick);
    }

    pub const fn command_code(&self) -> CommandCode {
        CommandCode::from_raw(self.command)
    }

    /// Copy a received message into the fields it carries. Nothing else is
    /// touched, so fields from different messages may be of different ages.
    pub fn apply(&mut self, message: &WireMessage) {
        match *message {
            WireMessage::TelemetryGps(gps) => self.gps = gps,
            WireMessage::TelemetryImu { imu, orientation } => {
                self.imu = imu;
                self.orientation = orientation;
            }
            WireMessage::TelemetryHousekeeping { power, rssi } => {
                self.power = power;
                self.obc_rssi = rssi;
            }
            WireMessage::TelecommandControl(tc) => {
                self.command = tc.command;
                self.joystick_x = tc.joystick_x;
                self.joystick_y = tc.joystick_y;
                self.encoder_pos = tc.encoder_pos;
                self.flags = tc.flags;
                self.ctu_rssi = tc.rssi;
            }
        }
    }

    /// Build the outgoing message of `kind` from the current field values.
    pub fn message(&self, kind: MessageKind) -> WireMessage {
        match kind {
            MessageKind::TelemetryGps => WireMessage::TelemetryGps(self.gps),
            MessageKind::TelemetryImu => WireMessage::TelemetryImu {
                imu: self.imu,
                orientation: self.orientation,
            },
            MessageKind::TelemetryHousekeeping => WireMessage::TelemetryHousekeeping {
                power: self.power,
                rssi: self.obc_rssi,
            },
            MessageKind::TelecommandControl => WireMessage::TelecommandControl(Telecommand {
                command: self.command,
                joystick_x: self.joystick_x,
                joystick_y: self.joystick_y,
                encoder_pos: self.encoder_pos,
                flags: self.flags,
                rssi: self.ctu_rssi,
            }),
        }
    }

    /// Pull in the values the interrupt side owns.
    pub fn sync_safety(&mut self, latch: &SafetyLatch) {
        self.flags.emergency_stop = latch.emergency_stop();
        self.flags.armed = latch.armed();
        self.system_state = latch.state();
        if let Some(rssi) = latch.obc_rssi() {
            self.obc_rssi = rssi;
        }
        if let Some(rssi) = latch.ctu_rssi() {
            self.ctu_rssi = rssi;
        }
    }
}

// ── Interrupt-shared primitives ───────────────────────────────────────────────

/// Fields writable from interrupt or radio-callback context.
///
/// Each one is a single primitive atomic written with a plain store; nothing
/// here is read-modify-written from the main loop except `state`, which the
/// main loop only changes through `try_transition` so a callback-side trip
/// always wins.
pub struct SafetyLatch {
    emergency_stop: AtomicBool,
    armed: AtomicBool,
    state: AtomicU8,
    drive: AtomicU32,
    obc_rssi: AtomicI16,
    ctu_rssi: AtomicI16,
}

impl SafetyLatch {
    pub const fn new() -> Self {
        Self {
            emergency_stop: AtomicBool::new(ESTOP_ASSERTED_AT_BOOT),
            armed: AtomicBool::new(false),
            state: AtomicU8::new(SystemState::PoweredOn as u8),
            drive: AtomicU32::new(0),
            obc_rssi: AtomicI16::new(SharedContext::RSSI_UNKNOWN),
            ctu_rssi: AtomicI16::new(SharedContext::RSSI_UNKNOWN),
        }
    }

    pub fn emergency_stop(&self) -> bool {
        self.emergency_stop.load(Ordering::Acquire)
    }

    pub fn set_emergency_stop(&self, asserted: bool) {
        self.emergency_stop.store(asserted, Ordering::Release);
    }

    pub fn armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Release);
    }

    pub fn state(&self) -> SystemState {
        SystemState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Unconditional state write. Reserved for the telecommand receive path
    /// and for boot.
    pub fn force_state(&self, state: SystemState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Main-loop transition: only lands if nobody changed the state since
    /// `from` was read. Returns the state now in effect.
    pub fn try_transition(&self, from: SystemState, to: SystemState) -> SystemState {
        match self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => to,
            Err(current) => SystemState::from_u8(current),
        }
    }

    /// Drive command currently applied to the wheels.
    pub fn drive(&self) -> ControlOutput {
        let packed = self.drive.load(Ordering::Acquire);
        ControlOutput {
            left: (packed >> 16) as u16 as i16,
            right: packed as u16 as i16,
        }
    }

    pub fn set_drive(&self, output: ControlOutput) {
        let packed = ((output.left as u16 as u32) << 16) | output.right as u16 as u32;
        self.drive.store(packed, Ordering::Release);
    }

    pub fn stop_drive(&self) {
        self.drive.store(0, Ordering::Release);
    }

    pub fn obc_rssi(&self) -> Option<i16> {
        Self::known(self.obc_rssi.load(Ordering::Relaxed))
    }

    pub fn ctu_rssi(&self) -> Option<i16> {
        Self::known(self.ctu_rssi.load(Ordering::Relaxed))
    }

    /// RSSI is only measurable at the receiver, so the receiving node records
    /// its own reading in its own role's slot.
    pub fn record_rssi(&self, role: Role, rssi: i16) {
        match role {
            Role::Obc => self.obc_rssi.store(rssi, Ordering::Relaxed),
            Role::Ctu => self.ctu_rssi.store(rssi, Ordering::Relaxed),
        }
    }

    fn known(rssi: i16) -> Option<i16> {
        (rssi != SharedContext::RSSI_UNKNOWN).then_some(rssi)
    }
}

impl Default for SafetyLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_bit_layout() {
        let flags = ControlFlags {
            emergency_stop: true,
            armed: false,
            buttons: [true, false, false, true],
            headlights: true,
            buzzer: false,
        };
        assert_eq!(flags.to_bits(), 0b1010_0110);
        assert_eq!(ControlFlags::from_bits(0b1010_0110), flags);
    }

    #[test]
    fn boot_defaults_are_safe() {
        let cal = JoystickCalibration::DEFAULT;
        let ctx = SharedContext::new(&cal);
        assert_eq!(ctx.system_state, SystemState::PoweredOn);
        assert!(!ctx.flags.armed);
        assert_eq!(ctx.flags.emergency_stop, ESTOP_ASSERTED_AT_BOOT);
        assert_eq!((ctx.joystick_x, ctx.joystick_y), (cal.x_neutral, cal.y_neutral));
    }

    #[test]
    fn reset_clears_telemetry() {
        let cal = JoystickCalibration::DEFAULT;
        let mut ctx = SharedContext::new(&cal);
        ctx.power.bus_voltage = 12.1;
        ctx.flags.armed = true;
        ctx.joystick_x = 4095;
        ctx.reset_to_safe_defaults(&cal);
        assert_eq!(ctx, SharedContext::new(&cal));
    }

    #[test]
    fn apply_only_touches_carried_fields() {
        let cal = JoystickCalibration::DEFAULT;
        let mut ctx = SharedContext::new(&cal);
        ctx.gps.lat = 51.5;
        ctx.apply(&WireMessage::TelemetryHousekeeping {
            power: PowerData { bus_voltage: 12.2, bus_current: 1.5, temperature_c: 25.0 },
            rssi: -70,
        });
        assert_eq!(ctx.power.bus_voltage, 12.2);
        assert_eq!(ctx.obc_rssi, -70);
        assert_eq!(ctx.gps.lat, 51.5);
        assert_eq!(ctx.joystick_x, cal.x_neutral);
    }

    #[test]
    fn outgoing_telecommand_mirrors_context() {
        let mut ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        ctx.joystick_x = 4000;
        ctx.flags.armed = true;
        ctx.command = CommandCode::REBOOT;
        let WireMessage::TelecommandControl(tc) = ctx.message(MessageKind::TelecommandControl) else {
            panic!("wrong kind");
        };
        assert_eq!(tc.joystick_x, 4000);
        assert!(tc.flags.armed);
        assert_eq!(CommandCode::from_raw(tc.command), CommandCode::Reboot);
    }

    #[test]
    fn drive_command_packs_both_wheels() {
        let latch = SafetyLatch::new();
        latch.set_drive(ControlOutput { left: -100, right: 37 });
        assert_eq!(latch.drive(), ControlOutput { left: -100, right: 37 });
        latch.stop_drive();
        assert_eq!(latch.drive(), ControlOutput::STOP);
    }

    #[test]
    fn transition_loses_to_concurrent_trip() {
        let latch = SafetyLatch::new();
        latch.force_state(SystemState::WaitingForArm);
        let observed = latch.state();
        // Callback trips between the main loop's read and its write.
        latch.force_state(SystemState::EmergencyStop);
        let now = latch.try_transition(observed, SystemState::Armed);
        assert_eq!(now, SystemState::EmergencyStop);
        assert_eq!(latch.state(), SystemState::EmergencyStop);
    }

    #[test]
    fn rssi_lands_in_receiver_slot() {
        let latch = SafetyLatch::new();
        assert_eq!(latch.obc_rssi(), None);
        latch.record_rssi(Role::Obc, -61);
        assert_eq!(latch.obc_rssi(), Some(-61));
        assert_eq!(latch.ctu_rssi(), None);
    }
}
