//! Analog sense input and conversion helpers.
//! Defaults follow a 10-bit 5 V ADC reading a BTS7002 IS pin through 1.2 kΩ.

use crate::data_types::SenseScale;

/// 10-bit ADC.
pub const ADC_FULL_SCALE: u16 = 1023;
pub const ADC_VREF_MV: u32 = 5_000;
/// Typical k_ILIS of the BTS7002-1EPP.
pub const DEFAULT_KILIS: u32 = 22_700;
pub const DEFAULT_IS_RESISTOR_OHM: u32 = 1_200;
/// 4:1 battery divider.
pub const BATTERY_DIVIDER_PERMILLE: u32 = 4_000;

/// A one-shot ADC able to sample any of the board's sense lines.
///
/// embedded-hal 1 has no ADC abstraction; implement this over the HAL's ADC driver.
pub trait SenseAdc {
    type Error: core::fmt::Debug;

    /// Sample `sense_pin` and return the raw conversion result.
    fn read(&mut self, sense_pin: u8) -> Result<u16, Self::Error>;
}

impl<T: SenseAdc + ?Sized> SenseAdc for &mut T {
    type Error = T::Error;

    fn read(&mut self, sense_pin: u8) -> Result<u16, Self::Error> {
        (**self).read(sense_pin)
    }
}

/// Convert raw counts to millivolts at the ADC input. Clamps to full scale.
pub fn counts_to_mv(raw: u16, scale: &SenseScale) -> u32 {
    if scale.full_scale == 0 {
        return 0;
    }
    let raw = raw.min(scale.full_scale) as u32;
    raw.saturating_mul(scale.vref_mv) / scale.full_scale as u32
}

/// Convert an IS reading to load current: I_load = V_IS / R_IS * k_ILIS.
pub fn counts_to_load_ma(raw: u16, scale: &SenseScale) -> u32 {
    if scale.is_resistor_ohm == 0 {
        return 0;
    }
    let is_ua = counts_to_mv(raw, scale).saturating_mul(1_000) / scale.is_resistor_ohm;
    is_ua.saturating_mul(scale.kilis) / 1_000
}

/// Convert a load current to the IS reading it produces. Clamps to full scale.
pub fn load_ma_to_counts(ma: u32, scale: &SenseScale) -> u16 {
    if scale.kilis == 0 || scale.vref_mv == 0 {
        return scale.full_scale;
    }
    let is_ua = ma.saturating_mul(1_000) / scale.kilis;
    let mv = is_ua.saturating_mul(scale.is_resistor_ohm) / 1_000;
    let counts = mv.saturating_mul(scale.full_scale as u32) / scale.vref_mv;
    counts.min(scale.full_scale as u32) as u16
}

/// Convert a battery sense reading to supply millivolts through the divider.
pub fn battery_mv(raw: u16, scale: &SenseScale) -> u32 {
    counts_to_mv(raw, scale).saturating_mul(scale.battery_divider_permille) / 1_000
}
