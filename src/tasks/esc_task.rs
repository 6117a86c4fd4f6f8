use embassy_executor::task;
use embassy_time::{Duration, Ticker};

use crate::drivers::dshot::EscPair;
use crate::state::{SafetyLatch, SystemState};

/// ESC refresh: 1 kHz. The drive command is read from the latch every
/// frame, so a receive-side trip reaches the wheels within one period.
#[task]
pub async fn esc_task(mut escs: EscPair, latch: &'static SafetyLatch) {
    let mut ticker = Ticker::every(Duration::from_hz(1000));
    loop {
        let armed = !latch.emergency_stop() && latch.armed() && latch.state() == SystemState::Armed;
        escs.apply(latch.drive(), armed);
        ticker.next().await;
    }
}
