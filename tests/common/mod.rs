//! Simulated IMCS board: trigger/DEN lines, a multiplexed IS ADC and a virtual clock.

#![allow(dead_code)]

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use profet_pma::data_types::IMCS_BATTERY_SENSE_PIN;
use profet_pma::{IMCS_TOPOLOGY, PowerArray, SenseAdc, Settings};

pub const CHANNELS: usize = 4;
pub const DEN_LINES: usize = 2;

#[derive(Default)]
pub struct Board {
    pub triggers: [bool; CHANNELS],
    pub dens: [bool; DEN_LINES],
    /// Raw IS counts each channel produces while switched on and selected.
    pub currents: [u16; CHANNELS],
    pub battery_raw: u16,
    /// Virtual time in nanoseconds, advanced only by delays.
    pub now_ns: u64,
    /// `(channel, level, now_ns)` for every trigger write.
    pub trigger_log: Vec<(usize, bool, u64)>,
    /// Set when two channels sharing an IS line had DEN high at once.
    pub den_conflict: bool,
    pub reads: usize,
    /// Sense pin whose conversions fail.
    pub failing_sense: Option<u8>,
}

impl Board {
    fn drive(&mut self, line: Line, level: bool) {
        match line {
            Line::Trigger(ch) => {
                self.triggers[ch] = level;
                self.trigger_log.push((ch, level, self.now_ns));
            }
            Line::Den(den) => {
                self.dens[den] = level;
                if self.shared_line_conflict() {
                    self.den_conflict = true;
                }
            }
        }
    }

    fn shared_line_conflict(&self) -> bool {
        IMCS_TOPOLOGY.iter().enumerate().any(|(i, a)| {
            IMCS_TOPOLOGY.iter().enumerate().any(|(j, b)| {
                i != j
                    && a.sense_pin == b.sense_pin
                    && a.diag_enable != b.diag_enable
                    && self.dens[a.diag_enable]
                    && self.dens[b.diag_enable]
            })
        })
    }

    fn sample(&mut self, sense_pin: u8) -> Result<u16, SenseFault> {
        self.reads += 1;
        if self.failing_sense == Some(sense_pin) {
            return Err(SenseFault(sense_pin));
        }
        if sense_pin == IMCS_BATTERY_SENSE_PIN {
            return Ok(self.battery_raw);
        }
        let raw: u16 = IMCS_TOPOLOGY
            .iter()
            .enumerate()
            .filter(|(ch, t)| t.sense_pin == sense_pin && self.dens[t.diag_enable] && self.triggers[*ch])
            .map(|(ch, _)| self.currents[ch])
            .sum();
        Ok(raw)
    }

    /// Off-time preceding the last rising edge of `channel`'s trigger.
    pub fn last_off_time_ns(&self, channel: usize) -> Option<u64> {
        let writes: Vec<_> = self.trigger_log.iter().filter(|(ch, _, _)| *ch == channel).collect();
        let rise = writes.iter().rposition(|(_, level, _)| *level)?;
        let fall = writes[..rise].iter().rposition(|(_, level, _)| !*level)?;
        Some(writes[rise].2 - writes[fall].2)
    }
}

pub type SharedBoard = Rc<RefCell<Board>>;

#[derive(Clone, Copy)]
enum Line {
    Trigger(usize),
    Den(usize),
}

pub struct FakePin {
    board: SharedBoard,
    line: Line,
}

impl ErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.board.borrow_mut().drive(self.line, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.board.borrow_mut().drive(self.line, true);
        Ok(())
    }
}

/// Conversion failure on the given sense pin.
#[derive(Debug, PartialEq, Eq)]
pub struct SenseFault(pub u8);

pub struct FakeAdc(SharedBoard);

impl SenseAdc for FakeAdc {
    type Error = SenseFault;

    fn read(&mut self, sense_pin: u8) -> Result<u16, Self::Error> {
        self.0.borrow_mut().sample(sense_pin)
    }
}

pub struct VirtualDelay(SharedBoard);

impl DelayNs for VirtualDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now_ns += ns as u64;
    }
}

pub type Rig = PowerArray<FakePin, FakeAdc, VirtualDelay, CHANNELS, DEN_LINES>;

/// Build an initialised four-channel array on a fresh simulated board.
pub fn rig(settings: Settings) -> (Rig, SharedBoard) {
    let board = SharedBoard::default();
    let pin = |line| FakePin {
        board: board.clone(),
        line,
    };
    let mut array = PowerArray::new(
        [
            pin(Line::Trigger(0)),
            pin(Line::Trigger(1)),
            pin(Line::Trigger(2)),
            pin(Line::Trigger(3)),
        ],
        IMCS_TOPOLOGY,
        [pin(Line::Den(0)), pin(Line::Den(1))],
        FakeAdc(board.clone()),
        VirtualDelay(board.clone()),
        settings,
    )
    .with_battery_sense(IMCS_BATTERY_SENSE_PIN);
    array.init().unwrap();
    (array, board)
}
