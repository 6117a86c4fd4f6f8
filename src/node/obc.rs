use embassy_time::Instant;

use super::CycleReport;
use crate::config::NodeConfig;
use crate::control::{self, ControlOutput};
use crate::fsm::StateMachine;
use crate::link::{Dispatcher, LinkAdapter, LinkStatus, LinkWatchdog, Radio, TelemetryScheduler};
use crate::state::{SafetyLatch, SharedContext, SystemState};

/// Rover side: telecommand in, drive out, telemetry back.
pub struct ObcNode<'a, R: Radio> {
    cfg: NodeConfig,
    ctx: SharedContext,
    latch: &'a SafetyLatch,
    dispatcher: &'a Dispatcher<'a>,
    link: LinkAdapter<'a, R>,
    fsm: StateMachine,
    telemetry: TelemetryScheduler,
    watchdog: LinkWatchdog,
}

impl<'a, R: Radio> ObcNode<'a, R> {
    pub fn new(cfg: NodeConfig, latch: &'a SafetyLatch, dispatcher: &'a Dispatcher<'a>, link: LinkAdapter<'a, R>) -> Self {
        Self {
            ctx: SharedContext::new(&cfg.joystick),
            latch,
            dispatcher,
            link,
            fsm: StateMachine::new(&cfg.link),
            telemetry: TelemetryScheduler::new(&cfg.telemetry),
            watchdog: LinkWatchdog::new(cfg.watchdog.timeout),
            cfg,
        }
    }

    pub fn boot(&mut self) {
        self.ctx.reset_to_safe_defaults(&self.cfg.joystick);
        self.latch.stop_drive();
        self.fsm.mark_initialized(self.latch);
        self.ctx.sync_safety(self.latch);
    }

    pub fn cycle(&mut self, now: Instant) -> CycleReport {
        let applied = self.dispatcher.apply_pending(&mut self.ctx);
        if let Some(at) = applied.telecommand_at {
            self.watchdog.feed(at);
        }
        self.ctx.sync_safety(self.latch);

        let state = self.fsm.step(self.latch, self.ctx.command_code(), &mut self.link, now);
        let link = self.watchdog.check(now);
        let output = self.drive(state, link);

        self.ctx.sync_safety(self.latch);

        let sent = if self.link.is_ready() {
            self.telemetry
                .poll(now, &self.ctx)
                .map(|msg| (msg.kind(), self.link.send(&msg)))
        } else {
            None
        };

        CycleReport {
            state: self.ctx.system_state,
            output,
            sent,
            link,
        }
    }

    /// Only the Armed handler may produce motion, and it re-checks the safety
    /// flags itself. A trip landing between the computation and the store is
    /// caught by the re-check after the store.
    fn drive(&mut self, state: SystemState, link: LinkStatus) -> ControlOutput {
        let latch = self.latch;
        if state != SystemState::Armed || link == LinkStatus::Lost {
            latch.stop_drive();
            return ControlOutput::STOP;
        }

        let output = control::compute(
            self.ctx.joystick_x,
            self.ctx.joystick_y,
            latch.emergency_stop(),
            latch.armed(),
            &self.cfg.joystick,
        );
        latch.set_drive(output);

        if latch.emergency_stop() || !latch.armed() || latch.state() != SystemState::Armed {
            latch.stop_drive();
            return ControlOutput::STOP;
        }
        output
    }

    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    /// For the sensor sampler, which owns only the telemetry fields.
    pub fn context_mut(&mut self) -> &mut SharedContext {
        &mut self.ctx
    }

    pub fn link(&self) -> &LinkAdapter<'a, R> {
        &self.link
    }

    pub fn set_joystick_calibration(&mut self, cal: control::JoystickCalibration) {
        self.cfg.joystick = cal;
    }
}
