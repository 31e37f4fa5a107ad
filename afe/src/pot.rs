//! Logic for the AD5171 and AD5242 digital potentiometers

use embedded_hal::blocking::i2c::Write;

use crate::{CurrentDevice, GainChannel, GainDevice, LED_CURRENT_MAX};

/// Default address of the AD5171 (AD0 high)
pub const AD5171_ADDRESS: u8 = 0x2D;
/// Default address of the AD5242 (AD0 and AD1 low)
pub const AD5242_ADDRESS: u8 = 0x2C;

/// Instruction bit selecting the second RDAC of the AD5242
const AD5242_RDAC2: u8 = 0x80;

/// 64 position potentiometer setting the LED base current
#[derive(Debug)]
pub struct Ad5171<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> Ad5171<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, AD5171_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> CurrentDevice for Ad5171<I2C>
where
    I2C: Write<Error = E>,
{
    type Error = E;

    fn write(&mut self, value: u8) -> Result<(), E> {
        // Instruction byte for the only register, then the 6 bit wiper
        self.i2c.write(self.address, &[0x00, value & LED_CURRENT_MAX])
    }
}

/// Dual 256 position potentiometer setting the TIA and bandpass gains
#[derive(Debug)]
pub struct Ad5242<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> Ad5242<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, AD5242_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> GainDevice for Ad5242<I2C>
where
    I2C: Write<Error = E>,
{
    type Error = E;

    fn write(&mut self, channel: GainChannel, value: u8) -> Result<(), E> {
        let instruction = match channel {
            GainChannel::Tia => 0x00,
            GainChannel::Ppg => AD5242_RDAC2,
        };
        self.i2c.write(self.address, &[instruction, value])
    }
}
