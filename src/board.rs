//! STM32F405 bring-up shared by both nodes.

use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::{Config, Peripherals};
use embassy_time::Instant;

/// 8 MHz crystal, 168 MHz core, 48 MHz for the USB OTG block.
fn clock_config() -> Config {
    let mut config = Config::default();
    config.rcc.hse = Some(Hse {
        freq: TimeHertz(8_000_000),
        mode: HseMode::Oscillator,
    });
    config.rcc.pll_src = PllSource::HSE;
    config.rcc.pll = Some(Pll {
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL168,
        divp: Some(PllPDiv::DIV2),
        divq: Some(PllQDiv::DIV7),
        divr: None,
    });
    config.rcc.sys = Sysclk::PLL1_P;
    config.rcc.ahb_pre = AHBPrescaler::DIV1;
    config.rcc.apb1_pre = APBPrescaler::DIV4;
    config.rcc.apb2_pre = APBPrescaler::DIV2;
    config
}

pub fn init() -> Peripherals {
    let p = embassy_stm32::init(clock_config());
    info!("clocks up: 168 MHz core");
    p
}

/// Millisecond counter for the debouncers. Wraps after ~49 days; every
/// consumer compares with `wrapping_sub`.
pub fn uptime_ms() -> u32 {
    Instant::now().as_millis() as u32
}

pub fn uptime_us() -> u32 {
    Instant::now().as_micros() as u32
}

/// Manual reboot path out of `Reboot`.
pub fn reboot() -> ! {
    warn!("rebooting");
    cortex_m::peripheral::SCB::sys_reset()
}
