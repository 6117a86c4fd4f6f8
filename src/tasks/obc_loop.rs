use embassy_executor::task;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::peripherals::SPI3;
use embassy_time::{Duration, Instant, Ticker};

use crate::board;
use crate::calibration::CalibrationStore;
use crate::control::{JoystickCalibration, NeutralCapture};
use crate::display::{self, Display, Page};
use crate::drivers::analog::{BatteryProbe, NotFitted, PowerChannels};
use crate::drivers::flash::W25qxx;
use crate::node::ObcNode;
use crate::sensors::SensorHub;
use crate::state::SystemState;
use crate::tasks::radio_task::BoardRadio;
use crate::usb::{Console, UsbSerial};

const LOOP_PERIOD: Duration = Duration::from_millis(10);
/// Housekeeping sampling and console status: every 500 ms.
const SLOW_TICKS: u32 = 50;
/// Neutral capture burst: 32 loops, ~320 ms of a released stick.
const CAPTURE_SAMPLES: usize = 32;

pub type PowerHub = SensorHub<PowerChannels<'static>, BatteryProbe<'static>, NotFitted, NotFitted>;
pub type CalibrationFlash = W25qxx<'static, SPI3, NoDma, NoDma>;

/// OBC main loop: one node cycle every 10 ms.
#[task]
pub async fn obc_loop_task(
    mut node: ObcNode<'static, BoardRadio>,
    mut power: PowerHub,
    mut flash: CalibrationFlash,
    mut calibration: JoystickCalibration,
    mut led: Output<'static, AnyPin>,
    mut usb: UsbSerial<'static>,
) {
    node.boot();
    let mut capture = NeutralCapture::<CAPTURE_SAMPLES>::new();
    let mut console = Console::new();
    let mut ticker = Ticker::every(LOOP_PERIOD);
    let mut tick: u32 = 0;

    loop {
        ticker.next().await;
        tick = tick.wrapping_add(1);

        if tick % SLOW_TICKS == 0 {
            power.sample_power(node.context_mut());
            // IMU and GPS are not fitted on this board: the read only bumps
            // the IMU error count, and the GPS/IMU telemetry stays zero with
            // `fix == false`.
            power.sample_motion(node.context_mut());
        }

        let now = Instant::now();
        let report = node.cycle(now);

        // Neutral capture: buttons A and D held while waiting for arm.
        let ctx = node.context();
        let chord = report.state == SystemState::WaitingForArm && ctx.flags.buttons[0] && ctx.flags.buttons[3];
        if let Some(burst) = capture.feed(chord, (ctx.joystick_x, ctx.joystick_y)) {
            if let Some(cal) = calibration.capture(burst.iter().copied()) {
                // Blocks for the sector erase; only reachable while disarmed.
                if flash.save(&cal).is_err() {
                    warn!("calibration not persisted: flash write failed");
                }
                calibration = cal;
                node.set_joystick_calibration(cal);
            }
        }

        led.set_level(report.state.indicator().level(now.as_millis()).into());

        if tick % SLOW_TICKS == 0 {
            let errors = power.errors();
            if errors.adc + errors.temperature > 0 {
                debug!("sensor errors: adc={} temp={}", errors.adc, errors.temperature);
            }
            console.show(Page::Status, &display::render(Page::Status, node.context()));
            console.flush(&mut usb).await;
        }

        if report.state == SystemState::Reboot {
            board::reboot();
        }
    }
}
