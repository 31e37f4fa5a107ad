//! Balancing the TIA output by trading LED current against TIA gain
//!
//! LED current and TIA gain both move the same observable, the TIA output voltage. The
//! loop steps one knob by a single code per sample until the output lands in band. When
//! the active knob is pinned at the end of its range, or has just stepped clean across
//! the band, it hands control to the other one. A range handoff fails once both knobs
//! have run out of range in the same direction, and every run is capped at
//! [`Config::max_steps`] samples.

use crate::{config::LedPolarity, Config, GAIN_MAX, LED_CURRENT_MAX};

/// The two settings the balance loop can move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Knob {
    LedCurrent,
    TiaGain,
}

impl Knob {
    pub fn other(self) -> Self {
        match self {
            Knob::LedCurrent => Knob::TiaGain,
            Knob::TiaGain => Knob::LedCurrent,
        }
    }

    /// Largest code the knob accepts
    pub fn max(self) -> u8 {
        match self {
            Knob::LedCurrent => LED_CURRENT_MAX,
            Knob::TiaGain => GAIN_MAX,
        }
    }
}

/// Which side of the band a TIA sample fell on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    /// `None` when the sample is in band
    pub fn of(sample: u16, config: &Config) -> Option<Self> {
        if sample > config.band_high {
            Some(Direction::High)
        } else if sample < config.band_low {
            Some(Direction::Low)
        } else {
            None
        }
    }
}

/// Why a balance run gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Failure {
    /// Both knobs are pinned in the direction the output needs to move
    Exhausted,
    /// The run used up its sample budget
    StepLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum State {
    BalancingCurrent,
    BalancingGain,
    Converged,
    Failed(Failure),
}

impl State {
    fn balancing(knob: Knob) -> Self {
        match knob {
            Knob::LedCurrent => State::BalancingCurrent,
            Knob::TiaGain => State::BalancingGain,
        }
    }
}

/// What the caller has to do after feeding a sample to [`Balancer::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Step {
    /// Write the code to the knob, then settle and sample again
    Adjust(Knob, u8),
    /// The knob took over. Entering LED current balancing restores the nominal TIA gain.
    Handoff(Knob),
    Converged,
    Failed(Failure),
}

/// Settings and TIA sample at the end of a balance run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct BalanceReport {
    pub led_current: u8,
    pub tia_gain: u8,
    pub tia_sample: u16,
    /// TIA samples taken during the run
    pub steps: u16,
}

#[derive(Debug, Clone)]
pub struct Balancer {
    config: Config,
    state: State,
    steps: u16,
    /// Direction each knob (indexed by `Knob as usize`) last handed off in. Stale once the
    /// other knob moves.
    pinned: [Option<Direction>; 2],
    /// Side of the band each knob last stepped away from. Cleared like `pinned`.
    last: [Option<Direction>; 2],
}

impl Balancer {
    pub fn new(start: Knob, config: Config) -> Self {
        Self {
            config,
            state: State::balancing(start),
            steps: 0,
            pinned: [None; 2],
            last: [None; 2],
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn steps(&self) -> u16 {
        self.steps
    }

    /// Feed a fresh TIA sample along with the settings it was taken at
    pub fn step(&mut self, sample: u16, led_current: u8, tia_gain: u8) -> Step {
        let knob = match self.state {
            State::BalancingCurrent => Knob::LedCurrent,
            State::BalancingGain => Knob::TiaGain,
            State::Converged => return Step::Converged,
            State::Failed(reason) => return Step::Failed(reason),
        };
        self.steps = self.steps.saturating_add(1);

        let Some(direction) = Direction::of(sample, &self.config) else {
            self.state = State::Converged;
            return Step::Converged;
        };
        if self.steps >= self.config.max_steps {
            return self.fail(Failure::StepLimit);
        }

        // One code jumped the whole band, this knob is too coarse here
        if matches!(self.last[knob as usize], Some(last) if last != direction) {
            return self.straddle(knob);
        }

        let setting = match knob {
            Knob::LedCurrent => led_current,
            Knob::TiaGain => tia_gain,
        };
        match self.next_code(knob, setting, direction) {
            Some(code) => {
                self.pinned[knob.other() as usize] = None;
                self.last[knob.other() as usize] = None;
                self.last[knob as usize] = Some(direction);
                Step::Adjust(knob, code)
            }
            None => self.handoff(knob, direction),
        }
    }

    /// One code toward fixing `direction`, or `None` when the knob is pinned
    fn next_code(&self, knob: Knob, setting: u8, direction: Direction) -> Option<u8> {
        let raise = match (knob, self.config.led_polarity) {
            (Knob::TiaGain, _) | (Knob::LedCurrent, LedPolarity::CodeRaisesOutput) => {
                direction == Direction::Low
            }
            (Knob::LedCurrent, LedPolarity::CodeLowersOutput) => direction == Direction::High,
        };
        if raise {
            (setting < knob.max()).then(|| setting + 1)
        } else {
            setting.checked_sub(1)
        }
    }

    fn handoff(&mut self, from: Knob, direction: Direction) -> Step {
        let to = from.other();
        if self.pinned[to as usize] == Some(direction) {
            return self.fail(Failure::Exhausted);
        }
        self.pinned[from as usize] = Some(direction);
        self.last[from as usize] = None;
        self.state = State::balancing(to);
        Step::Handoff(to)
    }

    /// Hand off without pinning `from`, it is still inside its range
    fn straddle(&mut self, from: Knob) -> Step {
        let to = from.other();
        self.pinned[from as usize] = None;
        self.last[from as usize] = None;
        self.state = State::balancing(to);
        Step::Handoff(to)
    }

    fn fail(&mut self, reason: Failure) -> Step {
        self.state = State::Failed(reason);
        Step::Failed(reason)
    }
}
