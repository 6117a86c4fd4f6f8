//! Compile-time node configuration.
//!
//! Board role is chosen by which binary is built, so every value here is a
//! `const` and the two role presets are `const fn`s.

use embassy_time::Duration;

use crate::control::JoystickCalibration;
use crate::link::PeerAddress;
use crate::state::Role;

/// Address of the CTU radio, as seen from the OBC.
pub const CTU_ADDRESS: PeerAddress = PeerAddress([0x24, 0x0a, 0xc4, 0xc0, 0xe5, 0x78]);
/// Address of the OBC radio, as seen from the CTU.
pub const OBC_ADDRESS: PeerAddress = PeerAddress([0x24, 0x0a, 0xc4, 0xbf, 0x9a, 0xe0]);

/// Whether the E-STOP flag starts asserted at boot. The rover boots with it
/// released and relies on `armed = false` to keep the drive at zero.
pub const ESTOP_ASSERTED_AT_BOOT: bool = false;

#[derive(Clone, Copy, Debug)]
pub struct LinkConfig {
    pub peer: PeerAddress,
    /// A peer counts as reachable while a datagram arrived within this window.
    pub reachable_window: Duration,
    /// CommsConfig attempts before the state machine gives up and enters Error.
    pub init_attempts: u8,
    /// Pause between a failed bring-up and the next attempt.
    pub settle_time: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct TelemetryRates {
    pub gps: Duration,
    pub imu: Duration,
    pub housekeeping: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct DebounceConfig {
    /// ARM, headlights and rotary button.
    pub switch_ms: u32,
    pub estop_ms: u32,
    /// Minimum spacing between accepted encoder transitions.
    pub encoder_spacing_us: u32,
    /// Spacing required when the decoded direction reverses.
    pub encoder_reversal_us: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct WatchdogConfig {
    pub timeout: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct NodeConfig {
    pub role: Role,
    pub link: LinkConfig,
    pub telemetry: TelemetryRates,
    pub telecommand_interval: Duration,
    pub debounce: DebounceConfig,
    pub watchdog: WatchdogConfig,
    pub joystick: JoystickCalibration,
}

impl NodeConfig {
    const fn common(role: Role, peer: PeerAddress) -> Self {
        Self {
            role,
            link: LinkConfig {
                peer,
                reachable_window: Duration::from_millis(1000),
                init_attempts: 3,
                settle_time: Duration::from_millis(100),
            },
            telemetry: TelemetryRates {
                gps: Duration::from_millis(1000),
                imu: Duration::from_millis(100),
                housekeeping: Duration::from_millis(500),
            },
            telecommand_interval: Duration::from_millis(20),
            debounce: DebounceConfig {
                switch_ms: 30,
                estop_ms: 20,
                encoder_spacing_us: 2000,
                encoder_reversal_us: 3000,
            },
            watchdog: WatchdogConfig {
                timeout: Duration::from_millis(2000),
            },
            joystick: JoystickCalibration::DEFAULT,
        }
    }

    pub const fn obc() -> Self {
        Self::common(Role::Obc, CTU_ADDRESS)
    }

    pub const fn ctu() -> Self {
        Self::common(Role::Ctu, OBC_ADDRESS)
    }
}
