use embassy_executor::task;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{AnyPin, Input};
use embassy_stm32::peripherals::PB6;

use crate::board;
use crate::config::DebounceConfig;
use crate::inputs::{QuadratureDecoder, SwitchFlags};

/// CTU rotary encoder: CLK on an EXTI line, DT sampled on each CLK edge.
#[task]
pub async fn encoder_task(
    mut clk: ExtiInput<'static, PB6>,
    dt: Input<'static, AnyPin>,
    flags: &'static SwitchFlags,
    cfg: DebounceConfig,
) {
    let mut decoder = QuadratureDecoder::new(
        clk.is_high(),
        dt.is_high(),
        cfg.encoder_spacing_us,
        cfg.encoder_reversal_us,
    );

    loop {
        clk.wait_for_any_edge().await;
        if let Some(direction) = decoder.on_edge(clk.is_high(), dt.is_high(), board::uptime_us()) {
            flags.record_step(direction);
            trace!("encoder step {}", direction);
        }
    }
}
