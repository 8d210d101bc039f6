//! Driver for a single PROFET channel: owns the trigger line and the latched fault state.
//!
//! The trigger output always equals `commanded_on && !fault_latched`.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::data_types::{ChannelState, ChannelTopology};

bitflags::bitflags! {
    /// Runtime flags of a channel.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ChannelFlags: u8 {
        /// The operator asked for the channel to be on.
        const COMMANDED_ON  = 1 << 0;
        /// An overcurrent reading forced the trigger off.
        const FAULT_LATCHED = 1 << 1;
    }
}

/// One PROFET channel.
pub struct ChannelDriver<P> {
    index: usize,
    topology: ChannelTopology,
    trigger: P,
    flags: ChannelFlags,
    last_sense: u16,
    last_poll: Option<u32>,
}

impl<P> ChannelDriver<P> {
    /// Create a channel at array position `index`. Nothing is driven until [`configure`](Self::configure).
    pub fn new(index: usize, topology: ChannelTopology, trigger: P) -> Self {
        Self {
            index,
            topology,
            trigger,
            flags: ChannelFlags::empty(),
            last_sense: 0,
            last_poll: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn topology(&self) -> &ChannelTopology {
        &self.topology
    }

    pub fn flags(&self) -> ChannelFlags {
        self.flags
    }

    pub fn commanded_on(&self) -> bool {
        self.flags.contains(ChannelFlags::COMMANDED_ON)
    }

    pub fn fault_latched(&self) -> bool {
        self.flags.contains(ChannelFlags::FAULT_LATCHED)
    }

    /// Level the trigger line is driven to.
    pub fn trigger_on(&self) -> bool {
        self.commanded_on() && !self.fault_latched()
    }

    pub fn state(&self) -> ChannelState {
        match (self.commanded_on(), self.fault_latched()) {
            (true, true) => ChannelState::Faulted,
            (true, false) => ChannelState::On,
            (false, _) => ChannelState::Off,
        }
    }

    /// Last raw IS reading handed to [`poll`](Self::poll).
    pub fn last_sense(&self) -> u16 {
        self.last_sense
    }

    /// Polling pass of the last reading.
    pub fn last_poll(&self) -> Option<u32> {
        self.last_poll
    }

    /// Release the trigger pin.
    pub fn free(self) -> P {
        self.trigger
    }
}

impl<P> ChannelDriver<P>
where
    P: OutputPin,
{
    /// Drive the trigger low and clear all runtime flags.
    pub fn configure(&mut self) -> Result<(), P::Error> {
        self.flags = ChannelFlags::empty();
        self.trigger.set_low()
    }

    /// Command the channel on or off.
    ///
    /// Switching on clears a latched fault: this is the operator's recovery attempt, and
    /// the next overcurrent poll latches again. Switching off also clears the latch.
    pub fn set_state(&mut self, on: bool) -> Result<(), P::Error> {
        self.flags.remove(ChannelFlags::FAULT_LATCHED);
        self.flags.set(ChannelFlags::COMMANDED_ON, on);
        self.apply()
    }

    /// Feed the latest IS reading for this channel.
    ///
    /// Returns `true` when this reading latched a new fault. A latched channel keeps its
    /// latch regardless of further readings.
    pub fn poll(&mut self, sense: u16, fault_threshold: u16, pass: u32) -> Result<bool, P::Error> {
        self.last_sense = sense;
        self.last_poll = Some(pass);
        if self.fault_latched() || !self.commanded_on() || sense <= fault_threshold {
            return Ok(false);
        }
        self.flags.insert(ChannelFlags::FAULT_LATCHED);
        self.apply()?;
        Ok(true)
    }

    /// Power-cycle: off for `off_ms`, then [`set_state(true)`](Self::set_state).
    /// Blocks the caller for the whole off-time.
    pub fn cycle<D: DelayNs>(&mut self, delay: &mut D, off_ms: u32) -> Result<(), P::Error> {
        self.set_state(false)?;
        delay.delay_ms(off_ms);
        self.set_state(true)
    }

    fn apply(&mut self) -> Result<(), P::Error> {
        if self.trigger_on() {
            self.trigger.set_high()
        } else {
            self.trigger.set_low()
        }
    }
}

#[cfg(feature = "async")]
impl<P> ChannelDriver<P>
where
    P: OutputPin,
{
    /// Async version of [`cycle`](Self::cycle).
    pub async fn cycle_async<D: embedded_hal_async::delay::DelayNs>(
        &mut self,
        delay: &mut D,
        off_ms: u32,
    ) -> Result<(), P::Error> {
        self.set_state(false)?;
        delay.delay_ms(off_ms).await;
        self.set_state(true)
    }
}
