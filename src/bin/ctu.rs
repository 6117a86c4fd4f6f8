#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_stm32::adc::Adc;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, Pin, Pull, Speed};
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::channel::Channel;
use embassy_time::Delay;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use xr4_rover::drivers::analog::Joystick;
use xr4_rover::inputs::SwitchFlags;
use xr4_rover::link::{Dispatcher, LinkAdapter, LinkStats, ModemRadio};
use xr4_rover::node::CtuNode;
use xr4_rover::tasks::ctu_loop::{ctu_loop_task, Panel};
use xr4_rover::tasks::encoder_task::encoder_task;
use xr4_rover::tasks::estop_task::estop_task;
use xr4_rover::tasks::radio_task::{radio_rx_task, radio_tx_task, ModemQueue};
use xr4_rover::{board, usb, NodeConfig, Role, SafetyLatch};

// ── Shared with the interrupt-side tasks ──────────────────────────────────────
static LATCH: SafetyLatch = SafetyLatch::new();
static STATS: LinkStats = LinkStats::new();
static FLAGS: SwitchFlags = SwitchFlags::new();
static MODEM_TX: ModemQueue = Channel::new();
static DISPATCHER: StaticCell<Dispatcher<'static>> = StaticCell::new();

bind_interrupts!(struct Irqs {
    USART3 => embassy_stm32::usart::InterruptHandler<peripherals::USART3>;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let cfg = NodeConfig::ctu();

    // 1. Clocks (168 MHz PLL)
    let p = board::init();

    // 2. E-STOP first (PB5, pulled up, high = stop)
    let estop = ExtiInput::new(Input::new(p.PB5, Pull::Up), p.EXTI5);
    spawner.spawn(estop_task(estop, &FLAGS, &LATCH, cfg.debounce.estop_ms)).unwrap();

    // 3. Rotary encoder (CLK=PB6, DT=PB7)
    let clk = ExtiInput::new(Input::new(p.PB6, Pull::Up), p.EXTI6);
    let dt = Input::new(p.PB7.degrade(), Pull::Up);
    spawner.spawn(encoder_task(clk, dt, &FLAGS, cfg.debounce)).unwrap();

    // 4. USB console
    let (usb_dev, usb_serial) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11, "XR4 CTU");
    spawner.spawn(usb::usb_task(usb_dev)).unwrap();

    // 5. Radio modem USART3 @ 115200 (TX=PB10, RX=PB11)
    let mut radio_config = UsartConfig::default();
    radio_config.baudrate = 115_200;
    let radio_uart = Uart::new(p.USART3, p.PB11, p.PB10, Irqs, p.DMA1_CH3, p.DMA1_CH1, radio_config).unwrap();
    let (radio_tx, radio_rx) = radio_uart.split();

    let dispatcher: &'static Dispatcher<'static> =
        DISPATCHER.init(Dispatcher::new(Role::Ctu, cfg.link.peer, &LATCH, &STATS));
    spawner.spawn(radio_rx_task(radio_rx, dispatcher, &STATS)).unwrap();
    spawner.spawn(radio_tx_task(radio_tx, &MODEM_TX, &STATS)).unwrap();

    // 6. Operator panel: ARM=PC4, headlights=PC5, rotary button=PB8, A..D=PB12..PB15
    let panel = Panel {
        arm: Input::new(p.PC4.degrade(), Pull::Up),
        headlights: Input::new(p.PC5.degrade(), Pull::Up),
        rotary_button: Input::new(p.PB8.degrade(), Pull::Up),
        buttons: [
            Input::new(p.PB12.degrade(), Pull::Up),
            Input::new(p.PB13.degrade(), Pull::Up),
            Input::new(p.PB14.degrade(), Pull::Up),
            Input::new(p.PB15.degrade(), Pull::Up),
        ],
    };

    // 7. Joystick on ADC1 (X=PA4, Y=PA5)
    let joystick = Joystick::new(Adc::new(p.ADC1, &mut Delay), p.PA4, p.PA5);

    // 8. Node and main loop
    let link = LinkAdapter::new(ModemRadio::new(&MODEM_TX), cfg.link.peer, cfg.link.reachable_window, &STATS);
    let node = CtuNode::new(cfg, &LATCH, dispatcher, link, &FLAGS, panel.switches());
    let led = Output::new(p.PC13.degrade(), Level::High, Speed::Low);

    spawner
        .spawn(ctu_loop_task(node, panel, joystick, led, usb_serial))
        .unwrap();
}
