use embassy_executor::task;
use embassy_stm32::gpio::{AnyPin, Input, Output};
use embassy_time::{Duration, Instant, Ticker};

use crate::drivers::analog::Joystick;
use crate::inputs::RawSwitches;
use crate::node::{CtuInputs, CtuNode};
use crate::tasks::radio_task::BoardRadio;
use crate::usb::{Console, UsbSerial};

const LOOP_PERIOD: Duration = Duration::from_millis(10);

/// Polled operator switches, all active low with pull-ups.
pub struct Panel {
    pub arm: Input<'static, AnyPin>,
    pub headlights: Input<'static, AnyPin>,
    pub rotary_button: Input<'static, AnyPin>,
    pub buttons: [Input<'static, AnyPin>; 4],
}

impl Panel {
    pub fn switches(&self) -> RawSwitches {
        RawSwitches {
            arm: self.arm.is_low(),
            headlights: self.headlights.is_low(),
            rotary_level: self.rotary_button.is_high(),
        }
    }

    fn sample(&self, joystick: (u16, u16)) -> CtuInputs {
        CtuInputs {
            switches: self.switches(),
            joystick_x: joystick.0,
            joystick_y: joystick.1,
            buttons: [
                self.buttons[0].is_low(),
                self.buttons[1].is_low(),
                self.buttons[2].is_low(),
                self.buttons[3].is_low(),
            ],
        }
    }
}

/// CTU main loop: sample the panel, run one node cycle, push the page.
/// Held button chords on the panel raise OBC commands inside the cycle.
#[task]
pub async fn ctu_loop_task(
    mut node: CtuNode<'static, BoardRadio>,
    panel: Panel,
    mut joystick: Joystick,
    mut led: Output<'static, AnyPin>,
    mut usb: UsbSerial<'static>,
) {
    node.boot();
    let mut console = Console::new();
    let mut ticker = Ticker::every(LOOP_PERIOD);

    loop {
        ticker.next().await;

        let inputs = panel.sample(joystick.read());
        let now = Instant::now();
        let report = node.cycle(now, inputs, &mut console);

        led.set_level(report.state.indicator().level(now.as_millis()).into());
        console.flush(&mut usb).await;
    }
}
