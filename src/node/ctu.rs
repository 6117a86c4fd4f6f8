use embassy_time::{Duration, Instant};

use super::CycleReport;
use crate::config::NodeConfig;
use crate::control::ControlOutput;
use crate::display::{Display, Pager};
use crate::fsm::StateMachine;
use crate::inputs::{RawSwitches, SwitchFlags, SwitchStates, Switches};
use crate::link::{Dispatcher, LinkAdapter, LinkStatus, Radio, TelecommandLimiter};
use crate::protocol::MessageKind;
use crate::state::{CommandCode, SafetyLatch, SharedContext};

/// Display refresh while nothing changes.
const DISPLAY_REFRESH: Duration = Duration::from_millis(100);
/// Telemetry older than this marks the OBC as unreachable on the console.
const TELEMETRY_STALE: Duration = Duration::from_millis(3000);
/// Telecommands a Reboot rides in before the field drops back to Drive.
/// There is no acknowledgement, so it is repeated to survive losses.
pub const COMMAND_REPEATS: u8 = 10;
/// How long a command chord must be held, disarmed, to take effect.
pub const CHORD_HOLD: Duration = Duration::from_millis(2000);

/// Buttons B and C: reboot the OBC.
const REBOOT_CHORD: [bool; 4] = [false, true, true, false];
/// Buttons A and B: toggle software upgrade.
const UPGRADE_CHORD: [bool; 4] = [true, true, false, false];

/// Fires once when an exact button pattern has been held for `CHORD_HOLD`.
#[derive(Default)]
struct Chord {
    since: Option<Instant>,
    fired: bool,
}

impl Chord {
    fn update(&mut self, held: bool, now: Instant) -> bool {
        if !held {
            *self = Self::default();
            return false;
        }
        let since = *self.since.get_or_insert(now);
        if self.fired || now.checked_duration_since(since).map_or(true, |d| d < CHORD_HOLD) {
            return false;
        }
        self.fired = true;
        true
    }
}

/// Operator inputs sampled by the main loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CtuInputs {
    pub switches: RawSwitches,
    pub joystick_x: u16,
    pub joystick_y: u16,
    pub buttons: [bool; 4],
}

/// Operator side: switches and joystick in, telecommand out, telemetry shown.
pub struct CtuNode<'a, R: Radio> {
    cfg: NodeConfig,
    ctx: SharedContext,
    latch: &'a SafetyLatch,
    dispatcher: &'a Dispatcher<'a>,
    link: LinkAdapter<'a, R>,
    fsm: StateMachine,
    limiter: TelecommandLimiter,
    switches: Switches<'a>,
    pager: Pager,
    last_telemetry: Option<Instant>,
    last_states: SwitchStates,
    /// Frames left for a one-shot command; `None` while nothing is counted.
    command_frames: Option<u8>,
    reboot_chord: Chord,
    upgrade_chord: Chord,
}

impl<'a, R: Radio> CtuNode<'a, R> {
    pub fn new(
        cfg: NodeConfig,
        latch: &'a SafetyLatch,
        dispatcher: &'a Dispatcher<'a>,
        link: LinkAdapter<'a, R>,
        flags: &'a SwitchFlags,
        initial: RawSwitches,
    ) -> Self {
        Self {
            ctx: SharedContext::new(&cfg.joystick),
            latch,
            dispatcher,
            link,
            fsm: StateMachine::new(&cfg.link),
            limiter: TelecommandLimiter::new(cfg.telecommand_interval),
            switches: Switches::new(flags, initial, &cfg.debounce),
            pager: Pager::new(DISPLAY_REFRESH),
            last_telemetry: None,
            last_states: SwitchStates::default(),
            command_frames: None,
            reboot_chord: Chord::default(),
            upgrade_chord: Chord::default(),
            cfg,
        }
    }

    pub fn boot(&mut self) {
        self.ctx.reset_to_safe_defaults(&self.cfg.joystick);
        self.fsm.mark_initialized(self.latch);
        self.ctx.sync_safety(self.latch);
    }

    /// Operator command for the OBC.
    ///
    /// `Reboot` is carried by the next `COMMAND_REPEATS` telecommands and
    /// then cleared. `SoftwareUpgrade` holds the OBC in OtaUpdate, so it
    /// stays until `Drive` is requested.
    pub fn request_command(&mut self, code: CommandCode) {
        info!("operator command {}", code.raw());
        self.ctx.command = code.raw();
        self.command_frames = match code {
            CommandCode::Reboot => Some(COMMAND_REPEATS),
            CommandCode::Drive | CommandCode::SoftwareUpgrade => None,
        };
    }

    fn command_sent(&mut self) {
        let Some(left) = self.command_frames else {
            return;
        };
        if left <= 1 {
            self.command_frames = None;
            self.ctx.command = CommandCode::DRIVE;
        } else {
            self.command_frames = Some(left - 1);
        }
    }

    fn poll_chords(&mut self, buttons: [bool; 4], now: Instant) {
        let disarmed = !self.latch.armed();
        if self.reboot_chord.update(disarmed && buttons == REBOOT_CHORD, now) {
            self.request_command(CommandCode::Reboot);
        }
        if self.upgrade_chord.update(disarmed && buttons == UPGRADE_CHORD, now) {
            let next = match self.ctx.command_code() {
                CommandCode::SoftwareUpgrade => CommandCode::Drive,
                _ => CommandCode::SoftwareUpgrade,
            };
            self.request_command(next);
        }
    }

    pub fn cycle<D: Display>(&mut self, now: Instant, inputs: CtuInputs, display: &mut D) -> CycleReport {
        let now_ms = now.as_millis() as u32;
        self.switches.update(inputs.switches, now_ms, &mut self.ctx, self.latch);
        let states = self.switches.take_states();
        self.last_states = states;

        self.ctx.joystick_x = inputs.joystick_x;
        self.ctx.joystick_y = inputs.joystick_y;
        self.ctx.flags.buttons = inputs.buttons;
        self.ctx.encoder_pos = states.encoder_position;
        self.poll_chords(inputs.buttons, now);

        let applied = self.dispatcher.apply_pending(&mut self.ctx);
        if applied.messages > 0 {
            self.last_telemetry = Some(now);
        }
        self.ctx.sync_safety(self.latch);

        // The CTU reacts to its own switches; commands are for the OBC.
        self.fsm.step(self.latch, CommandCode::Drive, &mut self.link, now);
        self.ctx.sync_safety(self.latch);

        let outgoing = if self.link.is_ready() {
            self.limiter.poll(now, &self.ctx)
        } else {
            None
        };
        let sent = outgoing.map(|msg| {
            self.command_sent();
            (MessageKind::TelecommandControl, self.link.send(&msg))
        });

        self.pager.handle_input(&states);
        self.pager.update(&self.ctx, now, display);

        CycleReport {
            state: self.ctx.system_state,
            output: ControlOutput::STOP,
            sent,
            link: self.telemetry_status(now),
        }
    }

    fn telemetry_status(&self, now: Instant) -> LinkStatus {
        match self.last_telemetry {
            None => LinkStatus::NeverSeen,
            Some(at) if now.checked_duration_since(at).is_some_and(|d| d > TELEMETRY_STALE) => LinkStatus::Lost,
            Some(_) => LinkStatus::Alive,
        }
    }

    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    pub fn last_switch_states(&self) -> &SwitchStates {
        &self.last_states
    }

    pub fn reset_encoder(&mut self) {
        self.switches.reset_encoder();
    }

    pub fn link(&self) -> &LinkAdapter<'a, R> {
        &self.link
    }
}
