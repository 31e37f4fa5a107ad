//! Monitor and control: turns front end state into payloads and commands into actions

use crate::bsp::counts_to_volts;
use afe::{AnalogChannel, CurrentDevice, GainDevice, PpgFrontEnd};
use defmt::{error, warn};
use embedded_hal::{blocking::delay::DelayUs, digital::v2::OutputPin};
use transport::{Action, BalanceOutcome, Command, Knob, MonitorPayload, Response, Sample};

#[derive(Debug, Default)]
pub struct State {
    pub last_monitor: MonitorPayload,
}

fn sample_log(counts: Result<u16, afe::Error>, channel: &str) -> Sample {
    match counts {
        Ok(counts) => Sample {
            counts,
            voltage: counts_to_volts(counts),
        },
        Err(_) => {
            error!("Error reading the {} channel", channel);
            Default::default()
        }
    }
}

pub fn update_monitor_payload<LED, CUR, GAIN, TIA, PPG>(
    payload: &mut MonitorPayload,
    afe: &mut PpgFrontEnd<LED, CUR, GAIN, TIA, PPG>,
) where
    LED: OutputPin,
    CUR: CurrentDevice,
    GAIN: GainDevice,
    TIA: AnalogChannel,
    PPG: AnalogChannel,
{
    // Cached settings
    payload.led_on = afe.is_led_on();
    payload.led_current = afe.led_current();
    payload.tia_gain = afe.tia_gain();
    payload.ppg_gain = afe.ppg_gain();
    // Fresh samples
    payload.tia = sample_log(afe.read_tia(), "TIA");
    payload.ppg = sample_log(afe.read_ppg(), "PPG");
}

/// Run a balance starting on `knob` and report how it went
pub fn balance<LED, CUR, GAIN, TIA, PPG, D>(
    afe: &mut PpgFrontEnd<LED, CUR, GAIN, TIA, PPG>,
    knob: Knob,
    delay: &mut D,
) -> Response
where
    LED: OutputPin,
    CUR: CurrentDevice,
    GAIN: GainDevice,
    TIA: AnalogChannel,
    PPG: AnalogChannel,
    D: DelayUs<u32>,
{
    let result = match knob {
        Knob::LedCurrent => afe.balance_led_current(delay),
        Knob::TiaGain => afe.balance_tia_gain(delay),
    };
    let (converged, report) = match result {
        Ok(report) => (true, report),
        Err(afe::Error::Unbalanced { reason, report }) => {
            warn!("TIA output did not balance - {}", reason);
            (false, report)
        }
        Err(e) => {
            error!("Balance aborted - {}", e);
            return Response::Nack;
        }
    };
    Response::Balance(BalanceOutcome {
        converged,
        led_current: report.led_current,
        tia_gain: report.tia_gain,
        tia: report.tia_sample,
        steps: report.steps,
    })
}

pub fn handle_command<LED, CUR, GAIN, TIA, PPG, D>(
    cmd: Command,
    state: &State,
    afe: &mut PpgFrontEnd<LED, CUR, GAIN, TIA, PPG>,
    delay: &mut D,
) -> Response
where
    LED: OutputPin,
    CUR: CurrentDevice,
    GAIN: GainDevice,
    TIA: AnalogChannel,
    PPG: AnalogChannel,
    D: DelayUs<u32>,
{
    match cmd {
        Command::Monitor => Response::Monitor(state.last_monitor.clone()),
        Command::Control(action) => {
            let res = match action {
                Action::LedPower(true) => afe.turn_led_on(),
                Action::LedPower(false) => afe.turn_led_off(),
                Action::SetLedCurrent(code) => afe.set_led_current(code.into()),
                Action::SetTiaGain(gain) => afe.set_tia_gain(gain.into()),
                Action::SetPpgGain(gain) => afe.set_ppg_gain(gain.into()),
            };
            match res {
                Ok(_) => Response::Ack,
                Err(e) => {
                    error!("Failed to apply {} - {}", action, e);
                    Response::Nack
                }
            }
        }
        Command::Balance(knob) => balance(afe, knob, delay),
    }
}
