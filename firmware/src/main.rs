#![no_std]
#![no_main]

mod bsp;
mod mnc;

use core::cell::RefCell;

use bsp::*;
use defmt::*;
use defmt_rtt as _;
use fugit::RateExtU32;
use panic_probe as _;
use postcard::{
    accumulator::{CobsAccumulator, FeedResult},
    to_slice_cobs,
};
use shared_bus::BusManagerSimple;

use hal::{
    adc::Adc,
    clocks::{init_clocks_and_plls, Clock},
    entry, pac,
    sio::Sio,
    uart::{DataBits, StopBits, UartConfig, UartPeripheral},
    watchdog::Watchdog,
    I2C,
};
use rp2040_hal as hal;

#[entry]
fn main() -> ! {
    info!("PPG Booting!");
    // Setup peripherals, core clocks, etc.
    let mut pac = pac::Peripherals::take().unwrap();
    let core = pac::CorePeripherals::take().unwrap();
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let sio = Sio::new(pac.SIO);

    let clocks = init_clocks_and_plls(
        bsp::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    // Blocking delay for the analog settling time
    let mut delay = cortex_m::delay::Delay::new(core.SYST, clocks.system_clock.freq().to_Hz());

    // Setup the pins
    let pins = bsp::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    info!("Setting up ADC");
    // Both taps share the one converter
    let adc = RefCell::new(Adc::new(pac.ADC, &mut pac.RESETS));
    let tia = AdcChannel::new(&adc, pins.tia.into_floating_input());
    let ppg = AdcChannel::new(&adc, pins.ppg.into_floating_input());

    // Grab the UART pins and setup the peripheral (115200 baud)
    info!("Setting up UART");
    let uart_pins: UartPins = (pins.txd.into_mode(), pins.rxd.into_mode());
    let uart: Uart = UartPeripheral::new(pac.UART1, uart_pins, &mut pac.RESETS)
        .enable(
            UartConfig::new(transport::BAUD.Hz(), DataBits::Eight, None, StopBits::One),
            clocks.peripheral_clock.freq(),
        )
        .unwrap();

    info!("Setting up I2C");
    // The AD5171 and AD5242 share I2C0
    let i2c: I2c = I2C::i2c0(
        pac.I2C0,
        pins.sda.into_mode(),
        pins.scl.into_mode(),
        400.kHz(),
        &mut pac.RESETS,
        clocks.system_clock.freq(),
    );
    let bus = BusManagerSimple::new(i2c);
    let current = afe::Ad5171::new(bus.acquire_i2c());
    let gain = afe::Ad5242::new(bus.acquire_i2c());

    info!("Setting up the front end");
    let led = pins.led.into_push_pull_output();
    let mut front_end =
        afe::PpgFrontEnd::new(led, current, gain, tia, ppg, afe::Config::default()).unwrap();
    match front_end.turn_led_on() {
        Ok(_) => (),
        Err(_) => error!("Failed to turn on the LED"),
    };
    let resp = mnc::balance(&mut front_end, transport::Knob::LedCurrent, &mut delay);
    info!("Startup balance - {}", resp);

    // Setup state for the monitor
    let mut state = mnc::State::default();

    // Setup the state for the COBS input message accumulator
    let mut in_buf = [0u8; 256];
    let mut out_buf = [0u8; 256];
    let mut cobs_buf: CobsAccumulator<256> = CobsAccumulator::new();

    info!("PPG Booted, starting main thread!");

    loop {
        // Update monitor payload in state
        mnc::update_monitor_payload(&mut state.last_monitor, &mut front_end);
        // If there are bytes for us, push them to the accumulator
        if uart.uart_is_readable() {
            while let Ok(n) = uart.read_raw(&mut in_buf) {
                let buf = &in_buf[..n];
                let mut window = buf;
                'cobs: while !window.is_empty() {
                    window = match cobs_buf.feed::<transport::Command>(window) {
                        FeedResult::Consumed => break 'cobs,
                        FeedResult::OverFull(new_wind) => new_wind,
                        FeedResult::DeserError(new_wind) => new_wind,
                        FeedResult::Success {
                            data: cmd,
                            remaining,
                        } => {
                            info!("New incoming payload - {}", cmd);
                            let resp =
                                mnc::handle_command(cmd, &state, &mut front_end, &mut delay);
                            info!("Responding - {}", resp);
                            let s = to_slice_cobs(&resp, &mut out_buf).unwrap();
                            uart.write_full_blocking(s);
                            remaining
                        }
                    };
                }
            }
        }
    }
}
