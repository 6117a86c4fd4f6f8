use embassy_executor::task;
use embassy_stm32::peripherals::{DMA1_CH1, DMA1_CH3, USART3};
use embassy_stm32::usart::{UartRx, UartTx};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Instant;

use crate::link::modem::{parse_incoming, ModemFrame, MAX_MODEM_FRAME};
use crate::link::slip::{self, SlipDecoder};
use crate::link::{Dispatcher, LinkStats, ModemRadio};

/// Outgoing frames waiting for the UART. Sized for a burst of one
/// telecommand interval's worth of traffic.
pub const MODEM_QUEUE: usize = 4;

pub type ModemQueue = Channel<CriticalSectionRawMutex, ModemFrame, MODEM_QUEUE>;
pub type BoardRadio = ModemRadio<'static, CriticalSectionRawMutex, MODEM_QUEUE>;

pub type RadioRx = UartRx<'static, USART3, DMA1_CH1>;
pub type RadioTx = UartTx<'static, USART3, DMA1_CH3>;

/// Modem UART receive side: SLIP frames in, datagrams to the dispatcher.
#[task]
pub async fn radio_rx_task(mut rx: RadioRx, dispatcher: &'static Dispatcher<'static>, stats: &'static LinkStats) {
    let mut decoder = SlipDecoder::<MAX_MODEM_FRAME>::new();
    let mut buf = [0u8; 128];

    loop {
        let n = match rx.read_until_idle(&mut buf).await {
            Ok(n) => n,
            Err(_) => {
                warn!("radio uart rx error, resyncing");
                decoder.reset();
                continue;
            }
        };

        for &byte in &buf[..n] {
            match decoder.push(byte) {
                Ok(Some(frame)) => match parse_incoming(&frame) {
                    // Drops are counted and logged by the dispatcher.
                    Some((meta, datagram)) => {
                        let _ = dispatcher.on_datagram(meta, datagram, Instant::now());
                    }
                    None => {
                        stats.on_drop();
                        debug!("modem frame too short: {} bytes", frame.len());
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    stats.on_drop();
                    debug!("slip error: {:?}", e);
                }
            }
        }
    }
}

/// Modem UART transmit side. Every frame taken from the queue reports its
/// completion to `stats`.
#[task]
pub async fn radio_tx_task(mut tx: RadioTx, queue: &'static ModemQueue, stats: &'static LinkStats) {
    let mut wire = [0u8; slip::encoded_len(MAX_MODEM_FRAME)];

    loop {
        let frame = queue.receive().await;
        let ok = match slip::encode(&frame, &mut wire) {
            Ok(len) => tx.write(&wire[..len]).await.is_ok(),
            Err(_) => false,
        };
        stats.on_send_complete(ok);
    }
}
