//! PROFET power management array.
//!
//! Drives a fixed set of Infineon PROFET high-side switch channels: each channel has a
//! trigger (IN) line, a current-sense (IS) analog line and a diagnostic-enable (DEN) line.
//! Channels that share an IS line are multiplexed through their DEN lines, so only one of
//! them may be selected at a time. Overcurrent readings latch the channel off until the
//! next explicit on-command.
//!
//! The crate is no-std; pins, delays and the ADC are supplied through `embedded-hal`
//! traits and [`sense::SenseAdc`]. An `async` feature mirrors the waiting operations,
//! and `defmt` enables logging plus `defmt::Format` on public types.

#![no_std]

#[macro_use]
mod fmt;

pub mod array;
pub mod channel;
pub mod data_types;
pub mod diagnostic;
pub mod error;
pub mod sense;

pub use array::PowerArray;
pub use channel::ChannelDriver;
pub use data_types::{ChannelState, ChannelStatus, ChannelTopology, Settings, IMCS_TOPOLOGY};
pub use diagnostic::DiagnosticGroup;
pub use error::Error;
pub use sense::SenseAdc;
