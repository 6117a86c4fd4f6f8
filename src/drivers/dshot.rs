use cortex_m::asm;
use embassy_stm32::gpio::{AnyPin, Level, Output, Speed};

use crate::control::{dshot_frame, speed_to_dshot_3d, ControlOutput};

/// Bit-banged DShot300 line to one bidirectional ESC.
pub struct Dshot300 {
    pin: Output<'static, AnyPin>,
}

impl Dshot300 {
    // Cycle counts at 168 MHz: 3.33 us per bit, 75 % / 37.5 % duty.
    const BIT_TOTAL_CYCLES: u32 = 560;
    const BIT1_HIGH_CYCLES: u32 = 420;
    const BIT1_LOW_CYCLES: u32 = Self::BIT_TOTAL_CYCLES - Self::BIT1_HIGH_CYCLES;
    const BIT0_HIGH_CYCLES: u32 = 210;
    const BIT0_LOW_CYCLES: u32 = Self::BIT_TOTAL_CYCLES - Self::BIT0_HIGH_CYCLES;
    const FRAME_GAP_CYCLES: u32 = 5200;

    pub fn new(pin: AnyPin) -> Self {
        Self {
            pin: Output::new(pin, Level::Low, Speed::VeryHigh),
        }
    }

    pub fn send_frame(&mut self, frame: u16) {
        // A preempted bit corrupts the whole frame, so the ~60 us burst runs
        // with interrupts masked.
        critical_section::with(|_cs| {
            for bit in (0..16).rev() {
                let one = (frame >> bit) & 0x1 != 0;
                let (high, low) = if one {
                    (Self::BIT1_HIGH_CYCLES, Self::BIT1_LOW_CYCLES)
                } else {
                    (Self::BIT0_HIGH_CYCLES, Self::BIT0_LOW_CYCLES)
                };
                self.pin.set_high();
                asm::delay(high);
                self.pin.set_low();
                asm::delay(low);
            }
            asm::delay(Self::FRAME_GAP_CYCLES);
        });
    }
}

/// Left and right wheel groups.
pub struct EscPair {
    left: Dshot300,
    right: Dshot300,
}

impl EscPair {
    pub fn new(left: AnyPin, right: AnyPin) -> Self {
        Self {
            left: Dshot300::new(left),
            right: Dshot300::new(right),
        }
    }

    /// `armed == false` sends the disarmed command on both lines whatever
    /// `output` holds.
    pub fn apply(&mut self, output: ControlOutput, armed: bool) {
        self.left.send_frame(dshot_frame(speed_to_dshot_3d(output.left, armed), false));
        self.right.send_frame(dshot_frame(speed_to_dshot_3d(output.right, armed), false));
    }
}
