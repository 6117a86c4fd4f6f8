//! Top-level mode controller, evaluated once per main-loop iteration.
//!
//! The state itself lives in `SafetyLatch` because the telecommand receive
//! path may force it. Every main-loop transition goes through
//! `SafetyLatch::try_transition`, so if the receive path changed the state
//! since this iteration read it, the receive path wins and this iteration's
//! transition is dropped.

use embassy_time::{Duration, Instant};

use crate::config::LinkConfig;
use crate::link::{LinkAdapter, Radio};
use crate::state::{CommandCode, SafetyLatch, SystemState};

pub struct StateMachine {
    max_attempts: u8,
    settle_time: Duration,
    failed_attempts: u8,
    retry_at: Option<Instant>,
}

impl StateMachine {
    pub const fn new(cfg: &LinkConfig) -> Self {
        Self {
            max_attempts: cfg.init_attempts,
            settle_time: cfg.settle_time,
            failed_attempts: 0,
            retry_at: None,
        }
    }

    /// Hardware bring-up finished: leave PoweredOn.
    pub fn mark_initialized(&mut self, latch: &SafetyLatch) -> SystemState {
        Self::transition(latch, SystemState::PoweredOn, SystemState::Initialized)
    }

    pub fn step<R: Radio>(
        &mut self,
        latch: &SafetyLatch,
        command: CommandCode,
        link: &mut LinkAdapter<'_, R>,
        now: Instant,
    ) -> SystemState {
        let state = latch.state();
        let estop = latch.emergency_stop();
        let armed = latch.armed();

        let next = self.evaluate(state, estop, armed, command, link, now);
        let now_state = match next {
            Some(to) if to != state => Self::transition(latch, state, to),
            _ => state,
        };

        if now_state != SystemState::Armed {
            latch.stop_drive();
        }
        now_state
    }

    fn evaluate<R: Radio>(
        &mut self,
        state: SystemState,
        estop: bool,
        armed: bool,
        command: CommandCode,
        link: &mut LinkAdapter<'_, R>,
        now: Instant,
    ) -> Option<SystemState> {
        use SystemState::*;

        // Bring-up runs to a configured link whatever the switches say; the
        // wheels are held by `step` until Armed. The safety rules take over
        // from WaitingForArm.
        if state.bringing_up() {
            return match state {
                Initialized => Some(CommsConfig),
                CommsConfig => self.configure_link(link, now),
                _ => None,
            };
        }

        // E-STOP preempts everything else.
        if estop && !matches!(state, EmergencyStop | Error) {
            return Some(EmergencyStop);
        }
        if !estop && state == EmergencyStop {
            return Some(if armed { Armed } else { WaitingForArm });
        }
        if !armed && state == Armed {
            return Some(WaitingForArm);
        }
        if armed && state == WaitingForArm {
            return Some(Armed);
        }

        match (state, command) {
            (WaitingForArm, CommandCode::SoftwareUpgrade) => Some(OtaUpdate),
            (WaitingForArm | EmergencyStop | Error, CommandCode::Reboot) => Some(Reboot),
            (OtaUpdate, c) if c != CommandCode::SoftwareUpgrade => Some(WaitingForArm),
            _ => None,
        }
    }

    fn configure_link<R: Radio>(&mut self, link: &mut LinkAdapter<'_, R>, now: Instant) -> Option<SystemState> {
        if self.retry_at.is_some_and(|at| now < at) {
            return None;
        }

        match link.init() {
            Ok(()) => {
                self.failed_attempts = 0;
                self.retry_at = None;
                Some(SystemState::WaitingForArm)
            }
            Err(e) => {
                self.failed_attempts = self.failed_attempts.saturating_add(1);
                warn!("link init attempt {} failed: {}", self.failed_attempts, e);
                if self.failed_attempts >= self.max_attempts {
                    error!("link init gave up after {} attempts", self.failed_attempts);
                    Some(SystemState::Error)
                } else {
                    self.retry_at = Some(now + self.settle_time);
                    None
                }
            }
        }
    }

    fn transition(latch: &SafetyLatch, from: SystemState, to: SystemState) -> SystemState {
        let now = latch.try_transition(from, to);
        if now == to {
            info!("state {} -> {}", from.name(), to.name());
        } else {
            debug!("transition {} -> {} lost to {}", from.name(), to.name(), now.name());
        }
        now
    }
}
