//! Driver for the KickJr photoplethysmography (PPG) analog front end
//!
//! An LED shines into tissue, a photodiode feeds a transimpedance amplifier (TIA) and a
//! bandpass stage produces the PPG signal. LED current is set by an AD5171 digital
//! potentiometer, TIA and bandpass gain by the two channels of an AD5242. [`PpgFrontEnd`]
//! owns all of it and can balance LED current against TIA gain so the TIA output sits
//! in the middle of the ADC range.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod balance;
pub mod config;
pub mod frontend;
pub mod pot;

pub use balance::{BalanceReport, Direction, Failure, Knob};
pub use config::{Config, LedPolarity};
pub use frontend::PpgFrontEnd;
pub use pot::{Ad5171, Ad5242};

/// Largest LED current code (AD5171 is a 64 position potentiometer)
pub const LED_CURRENT_MAX: u8 = 63;
/// Largest gain code (AD5242 is a 256 position potentiometer)
pub const GAIN_MAX: u8 = 255;
/// Full scale of the 12 bit ADC
pub const ADC_MAX: u16 = 4095;

/// A single analog input sampled as raw ADC counts
pub trait AnalogChannel {
    type Error;
    fn read(&mut self) -> Result<u16, Self::Error>;
}

/// The potentiometer that sets LED current
pub trait CurrentDevice {
    type Error;
    fn write(&mut self, value: u8) -> Result<(), Self::Error>;
}

/// The two channel potentiometer that sets amplifier gains
pub trait GainDevice {
    type Error;
    fn write(&mut self, channel: GainChannel, value: u8) -> Result<(), Self::Error>;
}

/// Channels of the gain potentiometer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum GainChannel {
    /// Feedback resistance of the transimpedance amplifier
    Tia = 0,
    /// Gain of the bandpass filter stage
    Ppg = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Error {
    /// Writing the LED current potentiometer failed
    CurrentBus,
    /// Writing the gain potentiometer failed
    GainBus,
    /// Driving the LED switch failed
    LedPin,
    /// Sampling an analog channel failed
    Adc,
    /// A balance run ended without the TIA output reaching the target band
    Unbalanced {
        reason: Failure,
        report: BalanceReport,
    },
}
