use embassy_executor::task;
use embassy_futures::select::select;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::peripherals::PB5;
use embassy_time::{Duration, Timer};

use crate::board;
use crate::inputs::{EStopDebouncer, SwitchFlags};
use crate::state::SafetyLatch;

/// Resample period. An edge lost inside the debounce window is picked up by
/// the next resample at the latest.
const RESAMPLE: Duration = Duration::from_millis(5);

/// CTU E-STOP line (normally closed to ground, pulled up: high = stop).
#[task]
pub async fn estop_task(
    mut pin: ExtiInput<'static, PB5>,
    flags: &'static SwitchFlags,
    latch: &'static SafetyLatch,
    window_ms: u32,
) {
    let mut debouncer = EStopDebouncer::new(window_ms);
    debouncer.init(pin.is_high(), board::uptime_ms(), flags, latch);
    if debouncer.is_asserted() {
        warn!("E-STOP asserted at boot");
    }

    loop {
        select(pin.wait_for_any_edge(), Timer::after(RESAMPLE)).await;
        if debouncer.on_level(pin.is_high(), board::uptime_ms(), flags, latch) {
            if debouncer.is_asserted() {
                warn!("E-STOP pressed");
            } else {
                info!("E-STOP released");
            }
        }
    }
}
