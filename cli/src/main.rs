use std::{
    io::{Read, Write},
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use postcard::{
    accumulator::{CobsAccumulator, FeedResult},
    to_slice_cobs,
};
use serialport::SerialPort;
use tracing::{error, info};
use transport::{Action, Command as Cmd, Knob, Response};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port for the PPG board
    port: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Gets monitor data from the board
    Mon,
    /// Switches the LED on or off
    Led { setting: Setting },
    /// Sets the LED current code (0 to 63, larger is dimmer)
    Current { code: u8 },
    /// Sets the TIA gain code (0 to 255)
    TiaGain { code: u8 },
    /// Sets the bandpass gain code (0 to 255)
    PpgGain { code: u8 },
    /// Balances the TIA output, starting on LED current or TIA gain
    Balance { start: Start },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Setting {
    On,
    Off,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Start {
    Led,
    Tia,
}

impl Setting {
    fn en(&self) -> bool {
        match self {
            Setting::On => true,
            Setting::Off => false,
        }
    }
}

impl From<Start> for Knob {
    fn from(start: Start) -> Self {
        match start {
            Start::Led => Knob::LedCurrent,
            Start::Tia => Knob::TiaGain,
        }
    }
}

/// Write a command out on the serial port (COBS) and wait for the response
fn write_read(cmd: &Cmd, mut port: Box<dyn SerialPort>) -> Option<Response> {
    let mut buf = [0u8; 256];
    let s = to_slice_cobs(cmd, &mut buf).ok()?;
    if let Err(e) = port.write_all(s) {
        error!("Serial write failed: {e}");
        return None;
    }

    // Bytes per read
    let mut raw_buf = [0u8; 256];
    // Bytes in the accumulator (COBS)
    let mut cobs_buf: CobsAccumulator<256> = CobsAccumulator::new();
    // Keep truckin until we've got a response
    while let Ok(n) = port.read(&mut raw_buf) {
        if n == 0 {
            // We're done reading
            break;
        }
        let buf = &raw_buf[..n];
        let mut window = buf;
        'cobs: while !window.is_empty() {
            window = match cobs_buf.feed::<Response>(window) {
                FeedResult::Consumed => break 'cobs,
                FeedResult::OverFull(new_wind) => new_wind,
                FeedResult::DeserError(new_wind) => new_wind,
                FeedResult::Success { data, remaining: _ } => return Some(data),
            };
        }
    }
    None
}

fn report(resp: Option<Response>) {
    match resp {
        Some(Response::Ack) => info!("Done"),
        Some(Response::Nack) => error!("The board could not apply that"),
        Some(Response::Monitor(mon)) => println!("{mon:#?}"),
        Some(Response::Balance(outcome)) => {
            if !outcome.converged {
                error!("TIA output did not balance");
            }
            println!("{outcome:#?}");
        }
        None => error!("No response from the board"),
    }
}

fn control(port: Box<dyn SerialPort>, action: Action) {
    report(write_read(&Cmd::Control(action), port));
}

fn main() {
    tracing_subscriber::fmt::init();
    // Parse the CLI
    let cli = Cli::parse();
    // Try to open the serial port
    let mut port = serialport::new(cli.port, transport::BAUD)
        .timeout(Duration::from_millis(1000))
        .open()
        .expect("Failed to open serial port");
    // Dispatch on action
    match cli.command {
        Command::Mon => report(write_read(&Cmd::Monitor, port)),
        Command::Led { setting } => control(port, Action::LedPower(setting.en())),
        Command::Current { code } => {
            if code > 63 {
                info!("LED current code {code} will be clamped to 63");
            }
            control(port, Action::SetLedCurrent(code))
        }
        Command::TiaGain { code } => control(port, Action::SetTiaGain(code)),
        Command::PpgGain { code } => control(port, Action::SetPpgGain(code)),
        Command::Balance { start } => {
            // Balancing can take hundreds of settle periods
            port.set_timeout(Duration::from_secs(5))
                .expect("Failed to set the serial timeout");
            report(write_read(&Cmd::Balance(start.into()), port))
        }
    }
}
