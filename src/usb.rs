//! USB CDC-ACM console: operator pages on the CTU, status lines on the OBC.

use core::fmt::Write;

use embassy_stm32::usb_otg::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::{Builder, Config, UsbDevice};
use heapless::String;
use static_cell::StaticCell;

use crate::display::{Display, Page};

bind_interrupts!(pub struct Irqs {
    OTG_FS => usb_otg::InterruptHandler<peripherals::USB_OTG_FS>;
});

pub type UsbDriver = Driver<'static, peripherals::USB_OTG_FS>;
pub type UsbSerial<'a> = CdcAcmClass<'a, UsbDriver>;

const MAX_PACKET: usize = 64;

static EP_OUT_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

/// Build the device and its serial class. Call once.
pub fn init(
    usb_periph: peripherals::USB_OTG_FS,
    pa12: peripherals::PA12,
    pa11: peripherals::PA11,
    product: &'static str,
) -> (UsbDevice<'static, UsbDriver>, UsbSerial<'static>) {
    let mut usb_config = usb_otg::Config::default();
    usb_config.vbus_detection = false;
    let driver = Driver::new_fs(usb_periph, Irqs, pa12, pa11, EP_OUT_BUF.init([0; 256]), usb_config);

    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("XR4 Rover");
    config.product = Some(product);
    config.serial_number = Some("XR4-0001");

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESC.init([0; 256]),
        BOS_DESC.init([0; 256]),
        &mut [],
        CONTROL_BUF.init([0; 64]),
    );
    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), MAX_PACKET as u16);
    (builder.build(), class)
}

/// Collects the page the pager pushes during a cycle; the owning task
/// flushes it to the host once the cycle is done.
pub struct Console {
    text: String<192>,
    pending: bool,
}

impl Console {
    pub const fn new() -> Self {
        Self {
            text: String::new(),
            pending: false,
        }
    }

    /// Write the pending page, if any. Dropped when no terminal is attached.
    pub async fn flush(&mut self, serial: &mut UsbSerial<'static>) {
        if !self.pending {
            return;
        }
        self.pending = false;
        if !serial.dtr() {
            return;
        }
        for chunk in self.text.as_bytes().chunks(MAX_PACKET) {
            if serial.write_packet(chunk).await.is_err() {
                debug!("console write failed");
                return;
            }
        }
    }
}

impl Display for Console {
    fn show(&mut self, page: Page, text: &str) {
        self.text.clear();
        // Clear screen, home cursor, then the page.
        let _ = write!(self.text, "\x1b[2J\x1b[H[{:?}]\r\n{}\r\n", page, text);
        self.pending = true;
    }
}
