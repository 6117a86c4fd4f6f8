//! Joystick to differential-drive control law and ESC output mapping.
//!
//! Sign convention: positive steering (joystick X above neutral) turns right,
//! positive throttle (Y above neutral) drives forward.
//! `left = throttle + steering`, `right = throttle - steering`.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JoystickCalibration {
    pub x_neutral: u16,
    pub y_neutral: u16,
    /// Counts either side of neutral treated as exactly neutral.
    pub deadband: u16,
    pub adc_max: u16,
}

impl JoystickCalibration {
    pub const DEFAULT: Self = Self {
        x_neutral: 1856,
        y_neutral: 1880,
        deadband: 50,
        adc_max: 4095,
    };

    /// Average a burst of `(x, y)` readings taken with the stick released.
    ///
    /// Returns `None` for an empty burst. Deadband and range are kept from
    /// `self`.
    pub fn capture<I>(&self, samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        let mut sum_x = 0u64;
        let mut sum_y = 0u64;
        let mut count = 0u64;
        for (x, y) in samples {
            sum_x += x as u64;
            sum_y += y as u64;
            count += 1;
        }
        if count == 0 {
            return None;
        }

        let cal = Self {
            x_neutral: (sum_x / count) as u16,
            y_neutral: (sum_y / count) as u16,
            ..*self
        };
        info!("joystick neutral captured: x={} y={} ({} samples)", cal.x_neutral, cal.y_neutral, count);
        Some(cal)
    }

    /// Map one raw axis reading to `[-100, 100]`.
    pub fn axis(&self, raw: u16, neutral: u16) -> i16 {
        let offset = raw as i32 - neutral as i32;
        if offset.unsigned_abs() <= self.deadband as u32 {
            return 0;
        }

        let span = if offset > 0 {
            self.adc_max as i32 - neutral as i32
        } else {
            neutral as i32
        };
        if span <= 0 {
            return 0;
        }

        (offset * 100 / span).clamp(-100, 100) as i16
    }
}

impl Default for JoystickCalibration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Collects a burst of stick readings while the operator holds the capture
/// chord. Releasing the chord before the burst is complete discards it; one
/// hold yields at most one burst.
pub struct NeutralCapture<const N: usize> {
    samples: heapless::Vec<(u16, u16), N>,
    done: bool,
}

impl<const N: usize> NeutralCapture<N> {
    pub const fn new() -> Self {
        Self {
            samples: heapless::Vec::new(),
            done: false,
        }
    }

    /// Feed one reading. Returns the completed burst exactly once per hold.
    pub fn feed(&mut self, held: bool, sample: (u16, u16)) -> Option<&[(u16, u16)]> {
        if !held {
            self.samples.clear();
            self.done = false;
            return None;
        }
        if self.done {
            return None;
        }
        let _ = self.samples.push(sample);
        if self.samples.is_full() {
            self.done = true;
            return Some(&self.samples);
        }
        None
    }
}

impl<const N: usize> Default for NeutralCapture<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-wheel-group speed in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlOutput {
    pub left: i16,
    pub right: i16,
}

impl ControlOutput {
    pub const STOP: Self = Self { left: 0, right: 0 };

    pub const fn is_stop(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// Pure control law. Any safety condition short-circuits to a stop before the
/// joystick is looked at.
pub fn compute(
    joystick_x: u16,
    joystick_y: u16,
    emergency_stop: bool,
    armed: bool,
    cal: &JoystickCalibration,
) -> ControlOutput {
    if emergency_stop || !armed {
        return ControlOutput::STOP;
    }

    let steering = cal.axis(joystick_x, cal.x_neutral);
    let throttle = cal.axis(joystick_y, cal.y_neutral);

    ControlOutput {
        left: (throttle + steering).clamp(-100, 100),
        right: (throttle - steering).clamp(-100, 100),
    }
}

// ── ESC output ────────────────────────────────────────────────────────────────

/// Map a wheel speed in percent to a DShot 3D throttle value.
///
/// 0 is the disarmed/stop command. Forward uses 1048..=2047, reverse uses
/// 1047 down to 48.
pub fn speed_to_dshot_3d(speed: i16, armed: bool) -> u16 {
    if !armed || speed == 0 {
        return 0;
    }

    let cmd = speed.clamp(-100, 100) as i32;
    if cmd > 0 {
        let start = 1048;
        let max = 2047;
        (start + cmd * (max - start) / 100) as u16
    } else {
        let start = 1047;
        let min = 48;
        (start - (-cmd) * (start - min) / 100) as u16
    }
}

/// 16-bit DShot frame: 11-bit value, telemetry bit, 4-bit XOR checksum.
pub fn dshot_frame(command: u16, telemetry: bool) -> u16 {
    let mut packet = (command & 0x07ff) << 1;
    if telemetry {
        packet |= 1;
    }

    let mut csum = 0u16;
    let mut csum_data = packet;
    for _ in 0..3 {
        csum ^= csum_data;
        csum_data >>= 4;
    }
    csum &= 0x000f;

    (packet << 4) | csum
}
