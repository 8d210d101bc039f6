//! Data types for the power management array: wiring, settings and status snapshots.

use crate::sense::{
    ADC_FULL_SCALE, ADC_VREF_MV, BATTERY_DIVIDER_PERMILLE, DEFAULT_IS_RESISTOR_OHM, DEFAULT_KILIS, load_ma_to_counts,
};

/// Default overcurrent threshold in raw counts (~4.4 V on the IS pin at 5 V reference).
pub const DEFAULT_FAULT_THRESHOLD: u16 = 900;
/// Default wait after switching DEN before the IS reading is valid.
pub const DEFAULT_DIAG_SETTLE_US: u32 = 300;
/// Default off-time of a power cycle. Covers load discharge and the PROFET restart delay.
pub const DEFAULT_CYCLE_OFF_MS: u32 = 1_000;

/// Observable state of a channel, derived from its commanded and latched flags.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelState {
    Off,
    On,
    /// Commanded on but latched off by an overcurrent reading.
    Faulted,
}

impl ChannelState {
    /// Label used in the verbose status report.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Off => "OFF",
            ChannelState::On => "ON",
            ChannelState::Faulted => "FAULT",
        }
    }
}

/// Static wiring of one channel.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelTopology {
    /// PROFET module number on the board (1-based, as silkscreened).
    pub module: u8,
    /// Channel number within the module (1-based).
    pub channel: u8,
    /// MCU pin driving IN. Informational, the pin itself is handed to the array.
    pub trigger_pin: u8,
    /// Analog input carrying the IS signal, passed to [`crate::SenseAdc::read`].
    pub sense_pin: u8,
    /// Index into the array's diagnostic-enable pin table.
    pub diag_enable: usize,
    /// Diagnostic group: channels multiplexed onto the same IS line.
    pub group: u8,
}

/// Battery supply sense input on the IMCS board.
pub const IMCS_BATTERY_SENSE_PIN: u8 = 1;

/// Wiring of the single-module, four-channel IMCS board.
///
/// CH1/CH2 share IS on A2 and CH3/CH4 share IS on A3. DEN on D6 serves CH1 and CH3,
/// DEN on D8 serves CH2 and CH4, so the DEN table is `[D6, D8]`.
pub const IMCS_TOPOLOGY: [ChannelTopology; 4] = [
    ChannelTopology { module: 1, channel: 1, trigger_pin: 9, sense_pin: 2, diag_enable: 0, group: 0 },
    ChannelTopology { module: 1, channel: 2, trigger_pin: 10, sense_pin: 2, diag_enable: 1, group: 0 },
    ChannelTopology { module: 1, channel: 3, trigger_pin: 11, sense_pin: 3, diag_enable: 0, group: 1 },
    ChannelTopology { module: 1, channel: 4, trigger_pin: 3, sense_pin: 3, diag_enable: 1, group: 1 },
];

/// Conversion parameters between raw ADC counts and physical units.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SenseScale {
    /// Highest raw reading of the ADC.
    pub full_scale: u16,
    /// ADC reference voltage.
    pub vref_mv: u32,
    /// Load current to IS current ratio of the PROFET.
    pub kilis: u32,
    /// Resistor from IS to ground.
    pub is_resistor_ohm: u32,
    /// Battery divider ratio (input over output) in thousandths.
    pub battery_divider_permille: u32,
}

impl Default for SenseScale {
    fn default() -> Self {
        Self {
            full_scale: ADC_FULL_SCALE,
            vref_mv: ADC_VREF_MV,
            kilis: DEFAULT_KILIS,
            is_resistor_ohm: DEFAULT_IS_RESISTOR_OHM,
            battery_divider_permille: BATTERY_DIVIDER_PERMILLE,
        }
    }
}

/// Runtime policy of the array.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Settings {
    /// Readings strictly above this raw value latch the channel off.
    pub fault_threshold: u16,
    /// Wait after selecting a channel before its IS reading is used.
    pub diag_settle_us: u32,
    /// Off-time of [`crate::PowerArray::cycle_power_ch`].
    pub cycle_off_ms: u32,
    pub scale: SenseScale,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fault_threshold: DEFAULT_FAULT_THRESHOLD,
            diag_settle_us: DEFAULT_DIAG_SETTLE_US,
            cycle_off_ms: DEFAULT_CYCLE_OFF_MS,
            scale: SenseScale::default(),
        }
    }
}

impl Settings {
    /// Derive the raw fault threshold from a load current limit.
    pub fn with_current_limit_ma(mut self, ma: u32) -> Self {
        self.fault_threshold = load_ma_to_counts(ma, &self.scale);
        self
    }
}

/// Point-in-time view of one channel, as reported by the array.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelStatus {
    /// Position in the array (`0..N`).
    pub index: usize,
    pub module: u8,
    pub channel: u8,
    pub state: ChannelState,
    /// Last IS reading in raw counts.
    pub sense_raw: u16,
    /// Last IS reading converted to load current.
    pub load_ma: u32,
    /// Polling pass of the last reading, `None` before the first poll.
    pub last_poll: Option<u32>,
}
