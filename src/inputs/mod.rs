//! CTU operator inputs.
//!
//! Two producers feed one consumer:
//! - the E-STOP and encoder tasks (interrupt side) write `SwitchFlags`,
//!   a set of primitive atomics;
//! - `Switches`, owned by the main loop, polls ARM, headlights and the rotary
//!   button and is the only reader of the one-shot flags. `take_states` needs
//!   `&mut Switches`, so a second consumer cannot exist.

use core::sync::atomic::{AtomicBool, AtomicI16, AtomicI8, Ordering};

mod debounce;
mod encoder;
mod estop;

pub use debounce::Debouncer;
pub use encoder::QuadratureDecoder;
pub use estop::EStopDebouncer;

use crate::config::DebounceConfig;
use crate::state::{SafetyLatch, SharedContext};

/// Interrupt-side switch state.
pub struct SwitchFlags {
    estop: AtomicBool,
    estop_triggered: AtomicBool,
    encoder_position: AtomicI16,
    encoder_delta: AtomicI8,
}

impl SwitchFlags {
    pub const fn new() -> Self {
        Self {
            estop: AtomicBool::new(false),
            estop_triggered: AtomicBool::new(false),
            encoder_position: AtomicI16::new(0),
            encoder_delta: AtomicI8::new(0),
        }
    }

    pub(crate) fn set_estop(&self, asserted: bool, triggered: bool) {
        self.estop.store(asserted, Ordering::Release);
        if triggered {
            self.estop_triggered.store(true, Ordering::Release);
        }
    }

    pub fn estop(&self) -> bool {
        self.estop.load(Ordering::Acquire)
    }

    /// Record one accepted encoder step.
    pub fn record_step(&self, direction: i8) {
        self.encoder_position.fetch_add(direction as i16, Ordering::AcqRel);
        self.encoder_delta.store(direction, Ordering::Release);
    }

    pub fn encoder_position(&self) -> i16 {
        self.encoder_position.load(Ordering::Acquire)
    }
}

impl Default for SwitchFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw pin levels sampled by the main loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSwitches {
    pub arm: bool,
    pub headlights: bool,
    /// Rotary push button level; active low.
    pub rotary_level: bool,
}

/// Debounced snapshot handed to the main loop once per cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SwitchStates {
    pub arm: bool,
    pub headlights: bool,
    pub estop: bool,
    pub rotary_button: bool,
    pub encoder_position: i16,
    pub encoder_delta: i8,

    // One-shot, cleared by `take_states`.
    pub estop_triggered: bool,
    pub arm_changed: bool,
    pub headlights_changed: bool,
    pub rotary_pressed: bool,
}

pub struct Switches<'a> {
    flags: &'a SwitchFlags,
    arm: Debouncer,
    headlights: Debouncer,
    rotary: Debouncer,
    arm_changed: bool,
    headlights_changed: bool,
    rotary_pressed: bool,
}

impl<'a> Switches<'a> {
    pub fn new(flags: &'a SwitchFlags, initial: RawSwitches, cfg: &DebounceConfig) -> Self {
        Self {
            flags,
            arm: Debouncer::new(initial.arm, cfg.switch_ms),
            headlights: Debouncer::new(initial.headlights, cfg.switch_ms),
            rotary: Debouncer::new(initial.rotary_level, cfg.switch_ms),
            arm_changed: false,
            headlights_changed: false,
            rotary_pressed: false,
        }
    }

    /// Poll step. Accepted ARM changes go to the latch, headlight changes to
    /// the context.
    pub fn update(&mut self, raw: RawSwitches, now_ms: u32, ctx: &mut SharedContext, latch: &SafetyLatch) {
        if let Some(armed) = self.arm.update(raw.arm, now_ms) {
            self.arm_changed = true;
            latch.set_armed(armed);
            ctx.flags.armed = armed;
            info!("ARM switch {}", if armed { "armed" } else { "disarmed" });
        }

        if let Some(on) = self.headlights.update(raw.headlights, now_ms) {
            self.headlights_changed = true;
            ctx.flags.headlights = on;
            info!("headlights {}", if on { "on" } else { "off" });
        }

        if let Some(level) = self.rotary.update(raw.rotary_level, now_ms) {
            if !level {
                self.rotary_pressed = true;
                debug!("rotary button pressed");
            }
        }
    }

    /// Snapshot and clear every one-shot flag.
    pub fn take_states(&mut self) -> SwitchStates {
        let estop_triggered = self.flags.estop_triggered.swap(false, Ordering::AcqRel);
        if estop_triggered {
            warn!("E-STOP triggered");
        }

        SwitchStates {
            arm: self.arm.state(),
            headlights: self.headlights.state(),
            estop: self.flags.estop(),
            rotary_button: !self.rotary.state(),
            encoder_position: self.flags.encoder_position(),
            encoder_delta: self.flags.encoder_delta.swap(0, Ordering::AcqRel),
            estop_triggered,
            arm_changed: core::mem::take(&mut self.arm_changed),
            headlights_changed: core::mem::take(&mut self.headlights_changed),
            rotary_pressed: core::mem::take(&mut self.rotary_pressed),
        }
    }

    pub fn reset_encoder(&mut self) {
        self.flags.encoder_position.store(0, Ordering::Release);
        self.flags.encoder_delta.store(0, Ordering::Release);
        debug!("encoder position reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::control::JoystickCalibration;

    const RELEASED: RawSwitches = RawSwitches {
        arm: false,
        headlights: false,
        rotary_level: true,
    };

    #[test]
    fn arm_reaches_latch_and_flag_is_one_shot() {
        let flags = SwitchFlags::new();
        let latch = SafetyLatch::new();
        let mut ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        let mut sw = Switches::new(&flags, RELEASED, &NodeConfig::ctu().debounce);

        let armed = RawSwitches { arm: true, ..RELEASED };
        sw.update(armed, 100, &mut ctx, &latch);
        sw.update(armed, 130, &mut ctx, &latch);
        assert!(latch.armed());
        assert!(ctx.flags.armed);

        let s = sw.take_states();
        assert!(s.arm && s.arm_changed);
        let s = sw.take_states();
        assert!(s.arm && !s.arm_changed);
    }

    #[test]
    fn rotary_press_is_active_low() {
        let flags = SwitchFlags::new();
        let latch = SafetyLatch::new();
        let mut ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        let mut sw = Switches::new(&flags, RELEASED, &NodeConfig::ctu().debounce);

        let pressed = RawSwitches { rotary_level: false, ..RELEASED };
        sw.update(pressed, 10, &mut ctx, &latch);
        sw.update(pressed, 40, &mut ctx, &latch);
        let s = sw.take_states();
        assert!(s.rotary_button && s.rotary_pressed);

        sw.update(RELEASED, 50, &mut ctx, &latch);
        sw.update(RELEASED, 80, &mut ctx, &latch);
        let s = sw.take_states();
        assert!(!s.rotary_button && !s.rotary_pressed);
    }

    #[test]
    fn encoder_delta_is_consumed_once() {
        let flags = SwitchFlags::new();
        let mut sw = Switches::new(&flags, RELEASED, &NodeConfig::ctu().debounce);

        flags.record_step(1);
        flags.record_step(1);
        flags.record_step(-1);
        let s = sw.take_states();
        assert_eq!((s.encoder_position, s.encoder_delta), (1, -1));
        assert_eq!(sw.take_states().encoder_delta, 0);

        sw.reset_encoder();
        assert_eq!(sw.take_states().encoder_position, 0);
    }

    #[test]
    fn estop_trigger_is_one_shot() {
        let flags = SwitchFlags::new();
        let latch = SafetyLatch::new();
        let mut sw = Switches::new(&flags, RELEASED, &NodeConfig::ctu().debounce);
        let mut estop = EStopDebouncer::new(20);
        estop.init(false, 0, &flags, &latch);
        estop.on_level(true, 100, &flags, &latch);

        let s = sw.take_states();
        assert!(s.estop && s.estop_triggered);
        let s = sw.take_states();
        assert!(s.estop && !s.estop_triggered);
    }
}
