//! On-chip ADC front ends: OBC power sensing and the CTU joystick.

use core::cell::RefCell;
use core::convert::Infallible;

use embassy_stm32::adc::Adc;
use embassy_stm32::peripherals::{ADC1, PA4, PA5, PC0, PC1, PC2, PC3};

use crate::sensors::{AnalogChannel, AnalogSource, GpsSource, OrientationSensor, TemperatureSensor, ADC_FULL_SCALE_COUNTS};
use crate::state::{GpsData, ImuData};

const ADC_MAX: u32 = 4095;

/// Rescale a 12-bit reading (3.3 V reference) onto the ADS1115 count scale
/// the housekeeping conversion expects.
fn to_ads_counts(raw: u16) -> i16 {
    (raw as u32 * ADC_FULL_SCALE_COUNTS as u32 / ADC_MAX) as i16
}

/// Main-bus current on PC0, voltage on PC1, battery thermistor (LM35,
/// 10 mV/°C) on PC2, spare on PC3.
pub struct PowerFrontEnd {
    adc: Adc<'static, ADC1>,
    current: PC0,
    voltage: PC1,
    temperature: PC2,
    auxiliary: PC3,
}

impl PowerFrontEnd {
    pub fn new(adc: Adc<'static, ADC1>, current: PC0, voltage: PC1, temperature: PC2, auxiliary: PC3) -> Self {
        Self {
            adc,
            current,
            voltage,
            temperature,
            auxiliary,
        }
    }

    fn read(&mut self, channel: AnalogChannel) -> u16 {
        match channel {
            AnalogChannel::MainBusCurrent => self.adc.read(&mut self.current),
            AnalogChannel::MainBusVoltage => self.adc.read(&mut self.voltage),
            AnalogChannel::BatteryTemperature => self.adc.read(&mut self.temperature),
            AnalogChannel::Auxiliary => self.adc.read(&mut self.auxiliary),
        }
    }
}

/// Both collaborators share the one converter.
pub struct PowerChannels<'a>(pub &'a RefCell<PowerFrontEnd>);

impl AnalogSource for PowerChannels<'_> {
    type Error = Infallible;

    fn read_channel(&mut self, channel: AnalogChannel) -> Result<i16, Infallible> {
        Ok(to_ads_counts(self.0.borrow_mut().read(channel)))
    }
}

pub struct BatteryProbe<'a>(pub &'a RefCell<PowerFrontEnd>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProbeDisconnected;

impl TemperatureSensor for BatteryProbe<'_> {
    type Error = ProbeDisconnected;

    fn read_celsius(&mut self) -> Result<f32, ProbeDisconnected> {
        let raw = self.0.borrow_mut().read(AnalogChannel::BatteryTemperature);
        // A floating input sits at the rail.
        if raw as u32 >= ADC_MAX - 8 {
            return Err(ProbeDisconnected);
        }
        Ok(raw as f32 * 3.3 / ADC_MAX as f32 * 100.0)
    }
}

/// IMU and GPS are not fitted on this board revision.
pub struct NotFitted;

impl OrientationSensor for NotFitted {
    type Error = NotFittedError;

    fn read_imu(&mut self) -> Result<ImuData, NotFittedError> {
        Err(NotFittedError)
    }
}

impl GpsSource for NotFitted {
    fn poll_fix(&mut self) -> Option<GpsData> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NotFittedError;

/// Two-axis joystick on PA4 (X) and PA5 (Y).
pub struct Joystick {
    adc: Adc<'static, ADC1>,
    x: PA4,
    y: PA5,
}

impl Joystick {
    pub fn new(adc: Adc<'static, ADC1>, x: PA4, y: PA5) -> Self {
        Self { adc, x, y }
    }

    /// Raw 12-bit `(x, y)`.
    pub fn read(&mut self) -> (u16, u16) {
        (self.adc.read(&mut self.x), self.adc.read(&mut self.y))
    }
}
