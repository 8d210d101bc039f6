//! Arbitration of a shared IS line between the channels multiplexed onto it.
//!
//! Each member is selected through its own DEN line; a PROFET only drives IS while DEN
//! is high, so at most one member of a group may have DEN asserted.

use embedded_hal::digital::OutputPin;
use heapless::Vec;

/// A channel's slot in a group.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Member {
    pub channel: usize,
    /// Index into the diagnostic-enable pin table.
    pub diag_enable: usize,
}

/// Channels sharing one IS line. `N` bounds the number of members.
#[derive(Clone, Debug)]
pub struct DiagnosticGroup<const N: usize> {
    id: u8,
    members: Vec<Member, N>,
    selected: Option<usize>,
}

impl<const N: usize> DiagnosticGroup<N> {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            members: Vec::new(),
            selected: None,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Members in polling order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Channel whose telemetry is currently on the shared line.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Add a channel. Returns the member back if the group is full.
    pub fn add(&mut self, channel: usize, diag_enable: usize) -> Result<(), Member> {
        self.members.push(Member { channel, diag_enable })
    }

    /// Whether a member is already selected through `diag_enable`. Such members cannot
    /// be told apart on the shared line.
    pub fn shares_diag_enable(&self, diag_enable: usize) -> bool {
        self.members.iter().any(|m| m.diag_enable == diag_enable)
    }

    pub fn contains(&self, channel: usize) -> bool {
        self.members.iter().any(|m| m.channel == channel)
    }

    /// Route `channel`'s telemetry onto the shared line.
    ///
    /// Break-before-make: every other member's DEN is driven low before the target's is
    /// driven high. The caller waits the settle time before sampling. Returns `false` if
    /// `channel` is not a member; nothing is driven in that case.
    pub fn select<P: OutputPin>(&mut self, channel: usize, diag_enables: &mut [P]) -> Result<bool, P::Error> {
        let Some(target) = self.members.iter().copied().find(|m| m.channel == channel) else {
            return Ok(false);
        };
        self.selected = None;
        for m in self.members.iter().filter(|m| m.diag_enable != target.diag_enable) {
            if let Some(pin) = diag_enables.get_mut(m.diag_enable) {
                pin.set_low()?;
            }
        }
        if let Some(pin) = diag_enables.get_mut(target.diag_enable) {
            pin.set_high()?;
        }
        self.selected = Some(channel);
        Ok(true)
    }

    /// Drive every member's DEN low.
    pub fn release<P: OutputPin>(&mut self, diag_enables: &mut [P]) -> Result<(), P::Error> {
        self.selected = None;
        for m in self.members.iter() {
            if let Some(pin) = diag_enables.get_mut(m.diag_enable) {
                pin.set_low()?;
            }
        }
        Ok(())
    }
}
