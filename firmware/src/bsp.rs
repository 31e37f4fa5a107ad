use core::cell::RefCell;

use embedded_hal::adc::{Channel, OneShot};
use hal::{
    i2c::I2C,
    pac::{I2C0, UART1},
    Adc,
};
use rp2040_hal as hal;

// Crystal freq
pub const XOSC_CRYSTAL_FREQ: u32 = 12_000_000;

/// Reference voltage for ADC conversions
pub const ADC_REF_VOLT: f32 = 3.3;

// Don't forget the second stage bootloader
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

// And add all of our pins!
hal::bsp_pins! {
    Gpio4 {
        name: sda,
        aliases: { FunctionI2C: Sda }
    },
    Gpio5 {
        name: scl,
        aliases: { FunctionI2C: Scl }
    },
    Gpio8 {
        name: txd,
        aliases: { FunctionUart: Txd }
    },
    Gpio9 {
        name: rxd,
        aliases: { FunctionUart: Rxd }
    },
    Gpio15 {
        name: led,
        aliases: { PushPullOutput: Led }
    },
    Gpio26 {
        name: tia,
        aliases: { FloatingInput: TiaOut }
    },
    Gpio27 {
        name: ppg,
        aliases: { FloatingInput: PpgOut }
    }
}

// Some more type aliases
pub type UartPins = (Txd, Rxd);
pub type Uart = hal::uart::UartPeripheral<hal::uart::Enabled, UART1, UartPins>;
pub type I2c = I2C<I2C0, (Sda, Scl)>;

/// One ADC input. The TIA and PPG taps share the converter, hence the `RefCell`.
pub struct AdcChannel<'a, PIN> {
    adc: &'a RefCell<Adc>,
    pin: PIN,
}

impl<'a, PIN> AdcChannel<'a, PIN> {
    pub fn new(adc: &'a RefCell<Adc>, pin: PIN) -> Self {
        Self { adc, pin }
    }
}

impl<PIN> afe::AnalogChannel for AdcChannel<'_, PIN>
where
    PIN: Channel<Adc, ID = u8>,
{
    type Error = ();

    fn read(&mut self) -> Result<u16, ()> {
        // The RP2040 converter is 12 bits wide, so counts are already 0..=4095
        self.adc.borrow_mut().read(&mut self.pin).map_err(|_| ())
    }
}

/// Voltage at an ADC pin from its raw counts
pub fn counts_to_volts(counts: u16) -> f32 {
    // Scale raw 12-bit format to 0 .. 1
    let scaled = f32::from(counts) / f32::from(1u16 << 12);
    scaled.clamp(0.0, 1.0) * ADC_REF_VOLT
}
