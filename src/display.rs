//! CTU operator display pages.
//!
//! The main loop hands the pager a read-only `SharedContext` and the switch
//! snapshot each iteration; the pager decides whether a page is due and
//! returns its text. Writing the text out is the `Display` implementor's job.

use core::fmt::Write;

use embassy_time::{Duration, Instant};
use heapless::String;

use crate::inputs::SwitchStates;
use crate::state::{CommandCode, SharedContext};

/// Rendered page: up to four 20-column lines separated by `\r\n`.
pub type PageText = String<128>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Page {
    #[default]
    Status,
    Telemetry,
    Gps,
    Sensors,
    Control,
}

impl Page {
    const ALL: [Page; 5] = [Page::Status, Page::Telemetry, Page::Gps, Page::Sensors, Page::Control];

    const fn index(self) -> usize {
        match self {
            Page::Status => 0,
            Page::Telemetry => 1,
            Page::Gps => 2,
            Page::Sensors => 3,
            Page::Control => 4,
        }
    }

    /// Move `steps` pages, wrapping at both ends.
    pub fn advance(self, steps: i16) -> Self {
        let n = Self::ALL.len() as i16;
        let i = (self.index() as i16 + steps).rem_euclid(n);
        Self::ALL[i as usize]
    }
}

pub trait Display {
    /// Must not block the main loop; drop the frame if the sink is busy.
    fn show(&mut self, page: Page, text: &str);
}

pub struct Pager {
    page: Page,
    refresh: Duration,
    last_draw: Option<Instant>,
    dirty: bool,
}

impl Pager {
    pub const fn new(refresh: Duration) -> Self {
        Self {
            page: Page::Status,
            refresh,
            last_draw: None,
            dirty: true,
        }
    }

    pub fn page(&self) -> Page {
        self.page
    }

    /// Encoder turns switch pages; the rotary button forces a redraw.
    pub fn handle_input(&mut self, states: &SwitchStates) {
        if states.encoder_delta != 0 {
            self.page = self.page.advance(states.encoder_delta as i16);
            self.dirty = true;
        }
        if states.rotary_pressed {
            self.dirty = true;
        }
    }

    /// Render the current page if it is due and push it to `display`.
    pub fn update<D: Display>(&mut self, ctx: &SharedContext, now: Instant, display: &mut D) -> bool {
        let due = self
            .last_draw
            .map_or(true, |at| now.checked_duration_since(at).map_or(true, |d| d >= self.refresh));
        if !(due || self.dirty) {
            return false;
        }

        let text = render(self.page, ctx);
        display.show(self.page, &text);
        self.last_draw = Some(now);
        self.dirty = false;
        true
    }
}

/// Text of `page` for the given context. Lines that overflow are truncated.
pub fn render(page: Page, ctx: &SharedContext) -> PageText {
    let mut out = PageText::new();
    // Overflow only truncates the page, so write errors are ignored.
    let _ = match page {
        Page::Status => write!(
            out,
            "XR4 {}\r\nESTOP:{} ARM:{}\r\nLIGHTS:{} CMD:{:02X}\r\nRSSI {} / {}",
            ctx.system_state.name(),
            on_off(ctx.flags.emergency_stop),
            on_off(ctx.flags.armed),
            on_off(ctx.flags.headlights),
            ctx.command,
            rssi(ctx.obc_rssi),
            rssi(ctx.ctu_rssi),
        ),
        Page::Telemetry => write!(
            out,
            "BUS {:.2}V {:.2}A\r\nBATT {:.1}C\r\nHDG {:.0} P{:.0} R{:.0}",
            ctx.power.bus_voltage,
            ctx.power.bus_current,
            ctx.power.temperature_c,
            ctx.orientation.heading_deg,
            ctx.orientation.pitch_deg,
            ctx.orientation.roll_deg,
        ),
        Page::Gps => {
            if ctx.gps.fix {
                write!(
                    out,
                    "GPS FIX\r\nLAT {:.5}\r\nLON {:.5}\r\nUTC {:.0}",
                    ctx.gps.lat, ctx.gps.lon, ctx.gps.time
                )
            } else {
                write!(out, "GPS NO FIX")
            }
        }
        Page::Sensors => write!(
            out,
            "G {:.1} {:.1} {:.1}\r\nA {:.1} {:.1} {:.1}\r\nM {:.0} {:.0} {:.0}",
            ctx.imu.gyro[0],
            ctx.imu.gyro[1],
            ctx.imu.gyro[2],
            ctx.imu.accel[0],
            ctx.imu.accel[1],
            ctx.imu.accel[2],
            ctx.imu.mag[0],
            ctx.imu.mag[1],
            ctx.imu.mag[2],
        ),
        Page::Control => write!(
            out,
            "JOY X{} Y{}\r\nENC {}\r\nMODE {}",
            ctx.joystick_x,
            ctx.joystick_y,
            ctx.encoder_pos,
            match ctx.command_code() {
                CommandCode::Drive => "DRIVE",
                CommandCode::SoftwareUpgrade => "OTA",
                CommandCode::Reboot => "REBOOT",
            },
        ),
    };
    out
}

fn on_off(v: bool) -> &'static str {
    if v {
        "ON"
    } else {
        "OFF"
    }
}

struct Rssi(i16);

impl core::fmt::Display for Rssi {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0 == SharedContext::RSSI_UNKNOWN {
            f.write_str("--")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn rssi(v: i16) -> Rssi {
    Rssi(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::JoystickCalibration;

    #[derive(Default)]
    struct Capture {
        shown: u32,
        last: std::string::String,
    }

    impl Display for Capture {
        fn show(&mut self, _page: Page, text: &str) {
            self.shown += 1;
            self.last = text.into();
        }
    }

    #[test]
    fn pages_wrap_both_ways() {
        assert_eq!(Page::Status.advance(-1), Page::Control);
        assert_eq!(Page::Control.advance(1), Page::Status);
        assert_eq!(Page::Telemetry.advance(7), Page::Sensors);
    }

    #[test]
    fn status_page_shows_state_and_rssi() {
        let mut ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        ctx.flags.armed = true;
        ctx.ctu_rssi = -64;
        let text = render(Page::Status, &ctx);
        assert!(text.starts_with("XR4 POWER ON"));
        assert!(text.contains("ARM:ON"));
        assert!(text.contains("RSSI -- / -64"));
    }

    #[test]
    fn gps_page_without_fix() {
        let ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        assert_eq!(render(Page::Gps, &ctx).as_str(), "GPS NO FIX");
    }

    #[test]
    fn redraws_on_refresh_or_input() {
        let ctx = SharedContext::new(&JoystickCalibration::DEFAULT);
        let mut pager = Pager::new(Duration::from_millis(100));
        let mut lcd = Capture::default();

        assert!(pager.update(&ctx, Instant::from_millis(0), &mut lcd));
        assert!(!pager.update(&ctx, Instant::from_millis(50), &mut lcd));

        pager.handle_input(&SwitchStates { encoder_delta: 1, ..Default::default() });
        assert_eq!(pager.page(), Page::Telemetry);
        assert!(pager.update(&ctx, Instant::from_millis(60), &mut lcd));
        assert!(lcd.last.starts_with("BUS"));

        pager.handle_input(&SwitchStates { rotary_pressed: true, ..Default::default() });
        assert!(pager.update(&ctx, Instant::from_millis(70), &mut lcd));
        assert!(pager.update(&ctx, Instant::from_millis(170), &mut lcd));
        assert_eq!(lcd.shown, 4);
    }
}
