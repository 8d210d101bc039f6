//! Array-level supervisor: owns every channel, runs the polling pass and serves commands.
//!
//! Single execution context: call [`PowerArray::init`] once, then [`PowerArray::run`] on a
//! fixed cadence. Commands are issued from the same context between passes.

use core::fmt::Write;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use heapless::{String, Vec};

use crate::channel::ChannelDriver;
use crate::data_types::{ChannelState, ChannelStatus, ChannelTopology, Settings};
use crate::diagnostic::DiagnosticGroup;
use crate::error::Error;
use crate::sense::{SenseAdc, battery_mv, counts_to_load_ma};

/// Capacity of the text returned by [`PowerArray::core_status`]. Longer reports are truncated.
pub const STATUS_CAPACITY: usize = 256;

/// `N` PROFET channels sharing `M` diagnostic-enable lines.
pub struct PowerArray<P, S, D, const N: usize, const M: usize> {
    channels: [ChannelDriver<P>; N],
    diag_enables: [P; M],
    groups: Vec<DiagnosticGroup<N>, N>,
    sense: S,
    delay: D,
    settings: Settings,
    battery_sense: Option<u8>,
    battery_raw: Option<u16>,
    pass: u32,
}

impl<P, S, D, const N: usize, const M: usize> PowerArray<P, S, D, N, M> {
    /// Bind trigger pins to their wiring. `triggers[i]` drives the channel described by
    /// `topology[i]`; `diag_enables` is indexed by [`ChannelTopology::diag_enable`].
    pub fn new(
        triggers: [P; N],
        topology: [ChannelTopology; N],
        diag_enables: [P; M],
        sense: S,
        delay: D,
        settings: Settings,
    ) -> Self {
        let mut index = 0;
        let channels = triggers.map(|trigger| {
            let channel = ChannelDriver::new(index, topology[index], trigger);
            index += 1;
            channel
        });
        Self {
            channels,
            diag_enables,
            groups: Vec::new(),
            sense,
            delay,
            settings,
            battery_sense: None,
            battery_raw: None,
            pass: 0,
        }
    }

    /// Also sample the battery supply on `sense_pin` at the end of every pass.
    pub fn with_battery_sense(mut self, sense_pin: u8) -> Self {
        self.battery_sense = Some(sense_pin);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn channel(&self, channel: usize) -> Option<&ChannelDriver<P>> {
        self.channels.get(channel)
    }

    pub fn channels(&self) -> &[ChannelDriver<P>] {
        &self.channels
    }

    /// Diagnostic groups, populated by [`init`](Self::init).
    pub fn groups(&self) -> &[DiagnosticGroup<N>] {
        &self.groups
    }

    /// Number of completed polling passes.
    pub fn passes(&self) -> u32 {
        self.pass
    }

    /// Battery supply from the last pass, if a battery sense line is configured.
    pub fn battery_mv(&self) -> Option<u32> {
        self.battery_raw.map(|raw| battery_mv(raw, &self.settings.scale))
    }

    pub fn status(&self, channel: usize) -> Option<ChannelStatus> {
        let ch = self.channels.get(channel)?;
        let topology = ch.topology();
        Some(ChannelStatus {
            index: channel,
            module: topology.module,
            channel: topology.channel,
            state: ch.state(),
            sense_raw: ch.last_sense(),
            load_ma: counts_to_load_ma(ch.last_sense(), &self.settings.scale),
            last_poll: ch.last_poll(),
        })
    }

    /// Count of channels `(on, faulted)`.
    pub fn summary(&self) -> (usize, usize) {
        self.channels.iter().fold((0, 0), |(on, faulted), ch| match ch.state() {
            ChannelState::On => (on + 1, faulted),
            ChannelState::Faulted => (on, faulted + 1),
            ChannelState::Off => (on, faulted),
        })
    }

    /// Human-readable report.
    ///
    /// Compact: `"1 channel on, 0 faulted"`. Verbose: one `idx,STATE,raw,mA;` record per
    /// channel, then `BATT,mV` when a battery sense line is configured.
    pub fn core_status(&self, verbose: bool) -> String<STATUS_CAPACITY> {
        let mut out = String::new();
        // Overflow only truncates the report.
        if verbose {
            for index in 0..N {
                if let Some(status) = self.status(index) {
                    let _ = write!(
                        out,
                        "{},{},{},{};",
                        status.index,
                        status.state.as_str(),
                        status.sense_raw,
                        status.load_ma
                    );
                }
            }
            if let Some(mv) = self.battery_mv() {
                let _ = write!(out, "BATT,{}", mv);
            }
        } else {
            let (on, faulted) = self.summary();
            let plural = if on == 1 { "" } else { "s" };
            let _ = write!(out, "{} channel{} on, {} faulted", on, plural, faulted);
        }
        out
    }

    fn rebuild_groups(&mut self) {
        self.groups.clear();
        for ch in self.channels.iter() {
            let topology = ch.topology();
            let position = match self.groups.iter().position(|g| g.id() == topology.group) {
                Some(position) => position,
                None => {
                    // At most one group per channel, so capacity N always fits.
                    let _ = self.groups.push(DiagnosticGroup::new(topology.group));
                    self.groups.len() - 1
                }
            };
            if let Some(group) = self.groups.get_mut(position) {
                if group.shares_diag_enable(topology.diag_enable) {
                    warn!(
                        "channel {} shares DEN {} with another member of group {}",
                        ch.index(),
                        topology.diag_enable,
                        topology.group
                    );
                }
                let _ = group.add(ch.index(), topology.diag_enable);
            }
        }
    }
}

impl<P, S, D, const N: usize, const M: usize> PowerArray<P, S, D, N, M>
where
    P: OutputPin,
    S: SenseAdc,
{
    /// Drive every trigger and DEN line low, clear channel state and group the channels
    /// by shared sense line.
    pub fn init(&mut self) -> Result<(), Error<P::Error, S::Error>> {
        for ch in self.channels.iter_mut() {
            ch.configure().map_err(Error::Pin)?;
        }
        for pin in self.diag_enables.iter_mut() {
            pin.set_low().map_err(Error::Pin)?;
        }
        self.rebuild_groups();
        self.battery_raw = None;
        self.pass = 0;
        info!("power array ready: {} channels, {} diagnostic groups", N, self.groups.len());
        Ok(())
    }

    /// Command `channel` on or off. An out-of-range index is reported and ignored.
    pub fn set_power_ch(&mut self, channel: usize, on: bool) -> Result<(), Error<P::Error, S::Error>> {
        let ch = self.validate(channel)?;
        ch.set_state(on).map_err(Error::Pin)?;
        info!("channel {} set {}", channel, on);
        Ok(())
    }

    /// Invert the commanded state of `channel`. A faulted channel is switched off.
    pub fn toggle_power_ch(&mut self, channel: usize) -> Result<(), Error<P::Error, S::Error>> {
        let ch = self.validate(channel)?;
        let on = !ch.commanded_on();
        ch.set_state(on).map_err(Error::Pin)?;
        info!("channel {} toggled {}", channel, on);
        Ok(())
    }

    fn validate(&mut self, channel: usize) -> Result<&mut ChannelDriver<P>, Error<P::Error, S::Error>> {
        match self.channels.get_mut(channel) {
            Some(ch) => Ok(ch),
            None => {
                warn!("invalid channel {} (have {})", channel, N);
                Err(Error::InvalidChannel(channel))
            }
        }
    }

    fn begin_pass(&mut self) -> u32 {
        self.pass = self.pass.wrapping_add(1);
        self.pass
    }

    /// Read the selected channel's IS line and forward it to the channel.
    fn sample(&mut self, channel: usize, pass: u32) -> Result<(), Error<P::Error, S::Error>> {
        let Some(sense_pin) = self.channels.get(channel).map(|ch| ch.topology().sense_pin) else {
            return Ok(());
        };
        let raw = match self.sense.read(sense_pin) {
            Ok(raw) => raw.min(self.settings.scale.full_scale),
            Err(e) => {
                warn!("channel {} sense read on pin {} failed, poll skipped", channel, sense_pin);
                return Err(Error::Sense(e));
            }
        };
        let threshold = self.settings.fault_threshold;
        if let Some(ch) = self.channels.get_mut(channel) {
            if ch.poll(raw, threshold, pass).map_err(Error::Pin)? {
                warn!("channel {} overcurrent: {} > {}, latched off", channel, raw, threshold);
            }
        }
        Ok(())
    }

    /// Select `channel` within group `gi`. On failure the error is kept and `false` returned.
    fn select(&mut self, gi: usize, channel: usize, first_error: &mut Option<Error<P::Error, S::Error>>) -> bool {
        let Some(group) = self.groups.get_mut(gi) else {
            return false;
        };
        match group.select(channel, &mut self.diag_enables) {
            Ok(selected) => selected,
            Err(e) => {
                warn!("channel {} diagnostic select failed, poll skipped", channel);
                keep_first(first_error, Err(Error::Pin(e)));
                false
            }
        }
    }

    fn sample_battery(&mut self) -> Result<(), Error<P::Error, S::Error>> {
        if let Some(pin) = self.battery_sense {
            let raw = self.sense.read(pin).map_err(Error::Sense)?;
            self.battery_raw = Some(raw.min(self.settings.scale.full_scale));
        }
        Ok(())
    }
}

impl<P, S, D, const N: usize, const M: usize> PowerArray<P, S, D, N, M>
where
    P: OutputPin,
    S: SenseAdc,
    D: DelayNs,
{
    /// One polling pass: for each group, select each member in order, wait the settle
    /// time, sample and poll. DEN lines are released after each group.
    ///
    /// A failing channel is skipped and the pass carries on, so the others stay protected.
    /// The first error of the pass is returned once it completes.
    pub fn run(&mut self) -> Result<(), Error<P::Error, S::Error>> {
        let pass = self.begin_pass();
        let mut first_error = None;
        for gi in 0..self.groups.len() {
            for mi in 0..self.groups[gi].members().len() {
                let member = self.groups[gi].members()[mi];
                if !self.select(gi, member.channel, &mut first_error) {
                    continue;
                }
                self.delay.delay_us(self.settings.diag_settle_us);
                keep_first(&mut first_error, self.sample(member.channel, pass));
            }
            let released = self.groups[gi].release(&mut self.diag_enables).map_err(Error::Pin);
            keep_first(&mut first_error, released);
        }
        keep_first(&mut first_error, self.sample_battery());
        first_error.map_or(Ok(()), Err)
    }

    /// Power-cycle `channel`, blocking for [`Settings::cycle_off_ms`].
    pub fn cycle_power_ch(&mut self, channel: usize) -> Result<(), Error<P::Error, S::Error>> {
        let off_ms = self.settings.cycle_off_ms;
        let ch = match self.channels.get_mut(channel) {
            Some(ch) => ch,
            None => {
                warn!("invalid channel {} (have {})", channel, N);
                return Err(Error::InvalidChannel(channel));
            }
        };
        info!("channel {} cycling, off for {} ms", channel, off_ms);
        ch.cycle(&mut self.delay, off_ms).map_err(Error::Pin)
    }
}

#[cfg(feature = "async")]
impl<P, S, D, const N: usize, const M: usize> PowerArray<P, S, D, N, M>
where
    P: OutputPin,
    S: SenseAdc,
    D: embedded_hal_async::delay::DelayNs,
{
    /// Async version of [`run`](Self::run).
    pub async fn run_async(&mut self) -> Result<(), Error<P::Error, S::Error>> {
        let pass = self.begin_pass();
        let mut first_error = None;
        for gi in 0..self.groups.len() {
            for mi in 0..self.groups[gi].members().len() {
                let member = self.groups[gi].members()[mi];
                if !self.select(gi, member.channel, &mut first_error) {
                    continue;
                }
                self.delay.delay_us(self.settings.diag_settle_us).await;
                keep_first(&mut first_error, self.sample(member.channel, pass));
            }
            let released = self.groups[gi].release(&mut self.diag_enables).map_err(Error::Pin);
            keep_first(&mut first_error, released);
        }
        keep_first(&mut first_error, self.sample_battery());
        first_error.map_or(Ok(()), Err)
    }

    /// Async version of [`cycle_power_ch`](Self::cycle_power_ch).
    pub async fn cycle_power_ch_async(&mut self, channel: usize) -> Result<(), Error<P::Error, S::Error>> {
        let off_ms = self.settings.cycle_off_ms;
        let ch = match self.channels.get_mut(channel) {
            Some(ch) => ch,
            None => {
                warn!("invalid channel {} (have {})", channel, N);
                return Err(Error::InvalidChannel(channel));
            }
        };
        info!("channel {} cycling, off for {} ms", channel, off_ms);
        ch.cycle_async(&mut self.delay, off_ms).await.map_err(Error::Pin)
    }
}

fn keep_first<E>(slot: &mut Option<E>, result: Result<(), E>) {
    if let Err(e) = result {
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}
