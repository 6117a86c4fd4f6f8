#![no_std]
#![no_main]

use core::cell::RefCell;

use embassy_executor::Spawner;
use embassy_stm32::adc::Adc;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Level, Output, Pin, Speed};
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::channel::Channel;
use embassy_time::Delay;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use xr4_rover::calibration;
use xr4_rover::drivers::analog::{BatteryProbe, NotFitted, PowerChannels, PowerFrontEnd};
use xr4_rover::drivers::dshot::EscPair;
use xr4_rover::drivers::flash::W25qxx;
use xr4_rover::link::{Dispatcher, LinkAdapter, LinkStats, ModemRadio};
use xr4_rover::node::ObcNode;
use xr4_rover::sensors::SensorHub;
use xr4_rover::tasks::radio_task::{radio_rx_task, radio_tx_task, ModemQueue};
use xr4_rover::tasks::{esc_task::esc_task, obc_loop::obc_loop_task};
use xr4_rover::{board, usb, NodeConfig, Role, SafetyLatch};

// ── Shared with the interrupt-side tasks ──────────────────────────────────────
static LATCH: SafetyLatch = SafetyLatch::new();
static STATS: LinkStats = LinkStats::new();
static MODEM_TX: ModemQueue = Channel::new();
static DISPATCHER: StaticCell<Dispatcher<'static>> = StaticCell::new();
static POWER: StaticCell<RefCell<PowerFrontEnd>> = StaticCell::new();

bind_interrupts!(struct Irqs {
    USART3 => embassy_stm32::usart::InterruptHandler<peripherals::USART3>;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut cfg = NodeConfig::obc();

    // 1. Clocks (168 MHz PLL)
    let p = board::init();

    // 2. ESCs first: both lines hold the disarmed command from here on.
    //    Left wheels PB0, right wheels PB1.
    let escs = EscPair::new(p.PB0.degrade(), p.PB1.degrade());
    spawner.spawn(esc_task(escs, &LATCH)).unwrap();

    // 3. USB console
    let (usb_dev, usb_serial) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11, "XR4 OBC");
    spawner.spawn(usb::usb_task(usb_dev)).unwrap();

    // 4. Radio modem USART3 @ 115200 (TX=PB10, RX=PB11)
    let mut radio_config = UsartConfig::default();
    radio_config.baudrate = 115_200;
    let radio_uart = Uart::new(p.USART3, p.PB11, p.PB10, Irqs, p.DMA1_CH3, p.DMA1_CH1, radio_config).unwrap();
    let (radio_tx, radio_rx) = radio_uart.split();

    let dispatcher: &'static Dispatcher<'static> =
        DISPATCHER.init(Dispatcher::new(Role::Obc, cfg.link.peer, &LATCH, &STATS));
    spawner.spawn(radio_rx_task(radio_rx, dispatcher, &STATS)).unwrap();
    spawner.spawn(radio_tx_task(radio_tx, &MODEM_TX, &STATS)).unwrap();

    // 5. SPI3 @ 10 MHz: calibration flash (SCK=PC10, MOSI=PC12, MISO=PC11, CS=PA15)
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = TimeHertz(10_000_000);
    let spi = Spi::new(p.SPI3, p.PC10, p.PC12, p.PC11, NoDma, NoDma, spi_config);
    let cs_flash = Output::new(p.PA15.degrade(), Level::High, Speed::VeryHigh);
    let mut flash = W25qxx::new(spi, cs_flash);
    match flash.read_id() {
        Ok(id) => defmt::info!("flash JEDEC id {:x}", id),
        Err(_) => defmt::warn!("flash not responding"),
    }
    cfg.joystick = calibration::load_or(&mut flash, &cfg.joystick);

    // 6. Power sensing on ADC1 (PC0..PC3)
    let adc = Adc::new(p.ADC1, &mut Delay);
    let front: &'static RefCell<PowerFrontEnd> =
        POWER.init(RefCell::new(PowerFrontEnd::new(adc, p.PC0, p.PC1, p.PC2, p.PC3)));
    let power = SensorHub::new(PowerChannels(front), BatteryProbe(front), NotFitted, NotFitted);

    // 7. Node and main loop
    let link = LinkAdapter::new(ModemRadio::new(&MODEM_TX), cfg.link.peer, cfg.link.reachable_window, &STATS);
    let node = ObcNode::new(cfg, &LATCH, dispatcher, link);
    let led = Output::new(p.PC13.degrade(), Level::High, Speed::Low);

    spawner
        .spawn(obc_loop_task(node, power, flash, cfg.joystick, led, usb_serial))
        .unwrap();
}
