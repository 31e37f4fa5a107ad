//! Types that travel over the UART between the PPG firmware and the host CLI
#![no_std]

use serde::{Deserialize, Serialize};

/// Baud rate of the control UART
pub const BAUD: u32 = 115_200;

/// Settings that can be changed directly
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Action {
    /// Switch the LED on or off
    LedPower(bool),
    /// LED current potentiometer code (0 to 63, larger is dimmer)
    SetLedCurrent(u8),
    /// TIA gain potentiometer code
    SetTiaGain(u8),
    /// Bandpass gain potentiometer code
    SetPpgGain(u8),
}

/// Which setting a balance run starts on
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Knob {
    LedCurrent,
    TiaGain,
}

/// Monitor data sent in response to a [`Command::Monitor`] call
#[derive(Serialize, Deserialize, Debug, PartialEq, Default, Clone)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct MonitorPayload {
    pub led_on: bool,
    pub led_current: u8,
    pub tia_gain: u8,
    pub ppg_gain: u8,
    /// TIA output
    pub tia: Sample,
    /// Bandpass filter output
    pub ppg: Sample,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default, Clone, Copy)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct Sample {
    /// Raw 12 bit ADC counts
    pub counts: u16,
    /// Voltage in volts
    pub voltage: f32,
}

/// Result of a [`Command::Balance`] call
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct BalanceOutcome {
    /// Whether the TIA output ended up in band
    pub converged: bool,
    pub led_current: u8,
    pub tia_gain: u8,
    /// Last TIA sample in ADC counts
    pub tia: u16,
    /// TIA samples taken
    pub steps: u16,
}

/// Payloads from the host to the firmware
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Command {
    Monitor,
    Control(Action),
    Balance(Knob),
}

/// Payloads from the firmware to the host
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Response {
    /// The action was applied
    Ack,
    /// The action failed on the hardware
    Nack,
    Monitor(MonitorPayload),
    Balance(BalanceOutcome),
}
