//! Tunables for the balance loop

/// How the LED current code moves the TIA output.
///
/// The AD5171 sits in the base circuit of the LED transistor, so a larger code means a
/// larger resistance and less LED current. Whether that ends up raising or lowering the
/// TIA output depends on the board, so the step sense is a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum LedPolarity {
    /// A larger code raises the TIA output: step the code down when the output is too high
    #[default]
    CodeRaisesOutput,
    /// A larger code lowers the TIA output: step the code up when the output is too high
    CodeLowersOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct Config {
    /// Lowest TIA sample (ADC counts) considered balanced
    pub band_low: u16,
    /// Highest TIA sample (ADC counts) considered balanced
    pub band_high: u16,
    /// TIA gain written before balancing on LED current. 17 is about 67 kOhm on the
    /// AD5242, which leaves an order of magnitude of gain range on either side.
    pub nominal_tia_gain: u8,
    /// Time for the analog chain to settle after a write, in microseconds
    pub settle_us: u32,
    /// Upper bound on TIA samples taken by a single balance run
    pub max_steps: u16,
    pub led_polarity: LedPolarity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // About 10% either side of half scale
            band_low: 1850,
            band_high: 2250,
            nominal_tia_gain: 17,
            settle_us: 1_000,
            max_steps: 1024,
            led_polarity: LedPolarity::default(),
        }
    }
}

impl Config {
    pub fn in_band(&self, sample: u16) -> bool {
        (self.band_low..=self.band_high).contains(&sample)
    }
}
