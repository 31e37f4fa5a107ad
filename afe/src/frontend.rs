//! The PPG front end: LED, potentiometers and the two analog taps

use embedded_hal::{blocking::delay::DelayUs, digital::v2::OutputPin};

use crate::{
    balance::{BalanceReport, Balancer, Knob, Step},
    AnalogChannel, Config, CurrentDevice, Error, GainChannel, GainDevice, ADC_MAX, GAIN_MAX,
    LED_CURRENT_MAX,
};

/// Clamp a requested code into a potentiometer's range
fn clamp_code(value: u16, max: u8) -> u8 {
    value.min(u16::from(max)) as u8
}

/// Owns the LED switch, both potentiometers and the TIA/PPG analog channels.
///
/// Settings are cached as they are written and never read back from hardware. The cache
/// only changes after a write succeeds.
pub struct PpgFrontEnd<LED, CUR, GAIN, TIA, PPG> {
    led: LED,
    current: CUR,
    gain: GAIN,
    tia: TIA,
    ppg: PPG,
    config: Config,
    led_on: bool,
    led_current: u8,
    tia_gain: u8,
    ppg_gain: u8,
}

impl<LED, CUR, GAIN, TIA, PPG> PpgFrontEnd<LED, CUR, GAIN, TIA, PPG>
where
    LED: OutputPin,
    CUR: CurrentDevice,
    GAIN: GainDevice,
    TIA: AnalogChannel,
    PPG: AnalogChannel,
{
    /// Take ownership of the hardware and run [`PpgFrontEnd::init`]
    pub fn new(
        led: LED,
        current: CUR,
        gain: GAIN,
        tia: TIA,
        ppg: PPG,
        config: Config,
    ) -> Result<Self, Error> {
        let mut afe = Self {
            led,
            current,
            gain,
            tia,
            ppg,
            config,
            led_on: false,
            led_current: LED_CURRENT_MAX,
            tia_gain: 0,
            ppg_gain: 0,
        };
        afe.init()?;
        Ok(afe)
    }

    /// Put the front end in its safe state: LED off and at the smallest current.
    /// Gains keep whatever was last written (0 before the first write).
    pub fn init(&mut self) -> Result<(), Error> {
        self.turn_led_off()?;
        self.set_led_current(LED_CURRENT_MAX.into())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn turn_led_on(&mut self) -> Result<(), Error> {
        self.led.set_high().map_err(|_| Error::LedPin)?;
        self.led_on = true;
        Ok(())
    }

    pub fn turn_led_off(&mut self) -> Result<(), Error> {
        self.led.set_low().map_err(|_| Error::LedPin)?;
        self.led_on = false;
        Ok(())
    }

    pub fn is_led_on(&self) -> bool {
        self.led_on
    }

    /// Set the LED current code, clamped to 0..=63.
    ///
    /// The code is a resistance in the LED transistor's base circuit: a larger code means
    /// less LED current.
    pub fn set_led_current(&mut self, code: u16) -> Result<(), Error> {
        let code = clamp_code(code, LED_CURRENT_MAX);
        self.current.write(code).map_err(|_| Error::CurrentBus)?;
        self.led_current = code;
        Ok(())
    }

    pub fn led_current(&self) -> u8 {
        self.led_current
    }

    /// Set the TIA gain code, clamped to 0..=255. Larger codes mean more gain.
    pub fn set_tia_gain(&mut self, gain: u16) -> Result<(), Error> {
        let gain = clamp_code(gain, GAIN_MAX);
        self.gain
            .write(GainChannel::Tia, gain)
            .map_err(|_| Error::GainBus)?;
        self.tia_gain = gain;
        Ok(())
    }

    pub fn tia_gain(&self) -> u8 {
        self.tia_gain
    }

    /// Set the bandpass gain code, clamped to 0..=255. Larger codes mean more gain.
    pub fn set_ppg_gain(&mut self, gain: u16) -> Result<(), Error> {
        let gain = clamp_code(gain, GAIN_MAX);
        self.gain
            .write(GainChannel::Ppg, gain)
            .map_err(|_| Error::GainBus)?;
        self.ppg_gain = gain;
        Ok(())
    }

    pub fn ppg_gain(&self) -> u8 {
        self.ppg_gain
    }

    /// Raw counts at the TIA output, 0..=4095
    pub fn read_tia(&mut self) -> Result<u16, Error> {
        self.tia
            .read()
            .map(|counts| counts.min(ADC_MAX))
            .map_err(|_| Error::Adc)
    }

    /// Raw counts at the bandpass filter output, 0..=4095
    pub fn read_ppg(&mut self) -> Result<u16, Error> {
        self.ppg
            .read()
            .map(|counts| counts.min(ADC_MAX))
            .map_err(|_| Error::Adc)
    }

    /// Fix the TIA gain at its nominal value and walk the LED current until the TIA output
    /// is in band, falling back to the TIA gain when the LED current runs out of range.
    pub fn balance_led_current<D>(&mut self, delay: &mut D) -> Result<BalanceReport, Error>
    where
        D: DelayUs<u32>,
    {
        self.balance(Knob::LedCurrent, delay)
    }

    /// Walk the TIA gain from its current setting until the TIA output is in band, falling
    /// back to the LED current when the gain runs out of range.
    pub fn balance_tia_gain<D>(&mut self, delay: &mut D) -> Result<BalanceReport, Error>
    where
        D: DelayUs<u32>,
    {
        self.balance(Knob::TiaGain, delay)
    }

    fn balance<D>(&mut self, start: Knob, delay: &mut D) -> Result<BalanceReport, Error>
    where
        D: DelayUs<u32>,
    {
        debug!("Balancing TIA output on {}", start);
        let mut balancer = Balancer::new(start, self.config);
        if start == Knob::LedCurrent {
            self.set_tia_gain(self.config.nominal_tia_gain.into())?;
        }
        loop {
            delay.delay_us(self.config.settle_us);
            let sample = self.read_tia()?;
            let step = balancer.step(sample, self.led_current, self.tia_gain);
            let report = BalanceReport {
                led_current: self.led_current,
                tia_gain: self.tia_gain,
                tia_sample: sample,
                steps: balancer.steps(),
            };
            match step {
                Step::Adjust(Knob::LedCurrent, code) => self.set_led_current(code.into())?,
                Step::Adjust(Knob::TiaGain, code) => self.set_tia_gain(code.into())?,
                Step::Handoff(knob) => {
                    debug!("TIA output {} out of reach, handing off to {}", sample, knob);
                    if knob == Knob::LedCurrent {
                        self.set_tia_gain(self.config.nominal_tia_gain.into())?;
                    }
                }
                Step::Converged => {
                    debug!(
                        "Balanced at LED current {}, TIA gain {} ({} counts, {} steps)",
                        report.led_current,
                        report.tia_gain,
                        report.tia_sample,
                        report.steps
                    );
                    return Ok(report);
                }
                Step::Failed(reason) => {
                    warn!(
                        "Balance failed ({}) at LED current {}, TIA gain {} ({} counts)",
                        reason,
                        report.led_current,
                        report.tia_gain,
                        report.tia_sample
                    );
                    return Err(Error::Unbalanced { reason, report });
                }
            }
            trace!(
                "LED current {}, TIA gain {}",
                self.led_current,
                self.tia_gain
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Failure, LedPolarity};
    use rstest::rstest;
    use std::{cell::RefCell, rc::Rc};

    /// Simulated board state shared by all of the fake peripherals
    struct Bench {
        led_high: bool,
        led_current: u8,
        tia_gain: u8,
        ppg_gain: u8,
        current_writes: usize,
        fail_writes: bool,
        /// TIA counts as a function of (LED current code, TIA gain code)
        tia: Box<dyn Fn(u8, u8) -> u16>,
    }

    type Shared = Rc<RefCell<Bench>>;

    struct Led(Shared);
    struct Current(Shared);
    struct Gain(Shared);
    struct Tia(Shared);
    struct Ppg;

    impl OutputPin for Led {
        type Error = ();

        fn set_low(&mut self) -> Result<(), ()> {
            self.0.borrow_mut().led_high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), ()> {
            self.0.borrow_mut().led_high = true;
            Ok(())
        }
    }

    impl CurrentDevice for Current {
        type Error = ();

        fn write(&mut self, value: u8) -> Result<(), ()> {
            let mut bench = self.0.borrow_mut();
            if bench.fail_writes {
                return Err(());
            }
            bench.led_current = value;
            bench.current_writes += 1;
            Ok(())
        }
    }

    impl GainDevice for Gain {
        type Error = ();

        fn write(&mut self, channel: GainChannel, value: u8) -> Result<(), ()> {
            let mut bench = self.0.borrow_mut();
            if bench.fail_writes {
                return Err(());
            }
            match channel {
                GainChannel::Tia => bench.tia_gain = value,
                GainChannel::Ppg => bench.ppg_gain = value,
            }
            Ok(())
        }
    }

    impl AnalogChannel for Tia {
        type Error = ();

        fn read(&mut self) -> Result<u16, ()> {
            let bench = self.0.borrow();
            Ok((bench.tia)(bench.led_current, bench.tia_gain))
        }
    }

    impl AnalogChannel for Ppg {
        type Error = ();

        fn read(&mut self) -> Result<u16, ()> {
            Ok(2048)
        }
    }

    /// Adds up requested settling time
    #[derive(Default)]
    struct Delay(u64);

    impl DelayUs<u32> for Delay {
        fn delay_us(&mut self, us: u32) {
            self.0 += u64::from(us);
        }
    }

    type Afe = PpgFrontEnd<Led, Current, Gain, Tia, Ppg>;

    fn setup(tia: impl Fn(u8, u8) -> u16 + 'static) -> (Afe, Shared) {
        setup_with(Config::default(), tia)
    }

    fn setup_with(config: Config, tia: impl Fn(u8, u8) -> u16 + 'static) -> (Afe, Shared) {
        let bench = Rc::new(RefCell::new(Bench {
            // Something other than the init state, so init visibly does its job
            led_high: true,
            led_current: 0,
            tia_gain: 0,
            ppg_gain: 0,
            current_writes: 0,
            fail_writes: false,
            tia: Box::new(tia),
        }));
        let afe = PpgFrontEnd::new(
            Led(bench.clone()),
            Current(bench.clone()),
            Gain(bench.clone()),
            Tia(bench.clone()),
            Ppg,
            config,
        )
        .unwrap();
        (afe, bench)
    }

    #[test]
    fn init_turns_led_off_at_dimmest_current() {
        let (afe, bench) = setup(|_, _| 2048);
        assert!(!afe.is_led_on());
        assert_eq!(afe.led_current(), 63);
        let bench = bench.borrow();
        assert!(!bench.led_high);
        assert_eq!(bench.led_current, 63);
    }

    #[test]
    fn led_switch_tracks_state() {
        let (mut afe, bench) = setup(|_, _| 2048);
        afe.turn_led_on().unwrap();
        assert!(afe.is_led_on());
        assert!(bench.borrow().led_high);
        afe.turn_led_off().unwrap();
        assert!(!afe.is_led_on());
        assert!(!bench.borrow().led_high);
    }

    #[test]
    fn led_current_clamps_every_byte() {
        let (mut afe, bench) = setup(|_, _| 2048);
        for val in 0..=255u16 {
            afe.set_led_current(val).unwrap();
            assert_eq!(u16::from(afe.led_current()), val.min(63));
            assert_eq!(bench.borrow().led_current, afe.led_current());
        }
    }

    #[rstest]
    #[case(0, 0)]
    #[case(17, 17)]
    #[case(255, 255)]
    #[case(300, 255)]
    #[case(u16::MAX, 255)]
    fn gains_clamp(#[case] requested: u16, #[case] stored: u8) {
        let (mut afe, bench) = setup(|_, _| 2048);
        afe.set_tia_gain(requested).unwrap();
        afe.set_ppg_gain(requested).unwrap();
        assert_eq!(afe.tia_gain(), stored);
        assert_eq!(afe.ppg_gain(), stored);
        assert_eq!(bench.borrow().tia_gain, stored);
        assert_eq!(bench.borrow().ppg_gain, stored);
    }

    #[test]
    fn getters_return_last_write() {
        let (mut afe, _) = setup(|_, _| 2048);
        afe.set_led_current(12).unwrap();
        afe.set_tia_gain(99).unwrap();
        afe.set_ppg_gain(3).unwrap();
        afe.set_tia_gain(100).unwrap();
        assert_eq!(
            (afe.led_current(), afe.tia_gain(), afe.ppg_gain()),
            (12, 100, 3)
        );
    }

    #[test]
    fn failed_write_keeps_cache() {
        let (mut afe, bench) = setup(|_, _| 2048);
        afe.set_tia_gain(40).unwrap();
        bench.borrow_mut().fail_writes = true;
        assert_eq!(afe.set_led_current(10), Err(Error::CurrentBus));
        assert_eq!(afe.set_tia_gain(41), Err(Error::GainBus));
        assert_eq!(afe.led_current(), 63);
        assert_eq!(afe.tia_gain(), 40);
    }

    #[test]
    fn raw_reads() {
        let (mut afe, _) = setup(|led, gain| u16::from(led) * 10 + u16::from(gain));
        afe.set_tia_gain(7).unwrap();
        assert_eq!(afe.read_tia(), Ok(637));
        assert_eq!(afe.read_ppg(), Ok(2048));
    }

    #[test]
    fn reads_saturate_at_full_scale() {
        let (mut afe, _) = setup(|_, _| 5000);
        assert_eq!(afe.read_tia(), Ok(ADC_MAX));
    }

    #[test]
    fn led_balance_walks_down_to_first_code_in_band() {
        // 3000 counts at code 63, 50 counts less per code down, never below 500
        let (mut afe, bench) =
            setup(|led, _| (3000 - 50 * (63 - i32::from(led))).max(500) as u16);
        let mut delay = Delay::default();
        let report = afe.balance_led_current(&mut delay).unwrap();
        assert_eq!(
            report,
            BalanceReport {
                led_current: 48,
                tia_gain: 17,
                tia_sample: 2250,
                steps: 16,
            }
        );
        assert_eq!(afe.led_current(), 48);
        assert_eq!(afe.tia_gain(), 17);
        // One settle per sample
        assert_eq!(delay.0, 16 * 1_000);
        // Init plus one write per code
        assert_eq!(bench.borrow().current_writes, 1 + 15);
    }

    #[test]
    fn tia_balance_converges_on_gain_alone() {
        let (mut afe, _) = setup(|led, gain| 8 * u16::from(gain) + 20 * u16::from(led));
        let report = afe.balance_tia_gain(&mut Delay::default()).unwrap();
        assert_eq!((report.led_current, report.tia_gain), (63, 74));
        assert_eq!(report.tia_sample, 1852);
    }

    #[test]
    fn tia_balance_hands_off_to_led_current() {
        // Even at zero gain the output is too high with the LED this bright
        let (mut afe, _) =
            setup(|led, gain| 1000 + 4 * u16::from(gain) + 20 * u16::from(led));
        let report = afe.balance_tia_gain(&mut Delay::default()).unwrap();
        assert_eq!((report.led_current, report.tia_gain), (59, 17));
        assert!(afe.config().in_band(report.tia_sample));
    }

    #[test]
    fn tia_balance_finishes_coarse_led_current_on_gain() {
        // A single LED code moves the output 1300 counts, far wider than the band
        let (mut afe, _) = setup(|led, gain| {
            (1300 * u32::from(led) + 4 * u32::from(gain)).min(4095) as u16
        });
        let report = afe.balance_tia_gain(&mut Delay::default()).unwrap();
        assert_eq!((report.led_current, report.tia_gain), (1, 138));
        assert_eq!(report.tia_sample, 1852);
        assert!(report.steps < afe.config().max_steps);
    }

    #[test]
    fn led_balance_with_code_lowering_output() {
        // Larger codes mean less LED current, so the output falls as the code rises
        let config = Config {
            led_polarity: LedPolarity::CodeLowersOutput,
            ..Default::default()
        };
        let (mut afe, _) = setup_with(config, |led, _| 3000 - 20 * u16::from(led));
        let report = afe.balance_led_current(&mut Delay::default()).unwrap();
        assert_eq!(
            report,
            BalanceReport {
                led_current: 57,
                tia_gain: 17,
                tia_sample: 1860,
                steps: 7,
            }
        );
    }

    #[rstest]
    #[case(Knob::LedCurrent, 4000)]
    #[case(Knob::LedCurrent, 100)]
    #[case(Knob::TiaGain, 4000)]
    #[case(Knob::TiaGain, 100)]
    fn unreachable_band_fails(#[case] start: Knob, #[case] counts: u16) {
        let (mut afe, _) = setup(move |_, _| counts);
        let result = match start {
            Knob::LedCurrent => afe.balance_led_current(&mut Delay::default()),
            Knob::TiaGain => afe.balance_tia_gain(&mut Delay::default()),
        };
        match result {
            Err(Error::Unbalanced { reason, report }) => {
                assert_eq!(reason, Failure::Exhausted);
                assert_eq!(report.tia_sample, counts);
                assert!(report.steps < afe.config().max_steps);
            }
            other => panic!("expected a balance failure, got {other:?}"),
        }
    }

    #[test]
    fn oscillating_response_stops_at_step_limit() {
        // One gain code either side of the band, nothing in it
        let (mut afe, _) = setup(|_, gain| if gain % 2 == 0 { 3000 } else { 1000 });
        afe.set_tia_gain(17).unwrap();
        match afe.balance_tia_gain(&mut Delay::default()) {
            Err(Error::Unbalanced { reason, report }) => {
                assert_eq!(reason, Failure::StepLimit);
                assert_eq!(report.steps, 1024);
            }
            other => panic!("expected the step limit, got {other:?}"),
        }
    }
}
