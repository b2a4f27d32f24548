//! Two-state classifier with hysteresis.
//!
//! Window scores accumulate in a short FIFO; its sum against the threshold
//! gives a per-step tendency. An up-counter per class must climb through a
//! minimum dwell before a transition is confirmed, and while the run is in
//! the opposite class, contrary steps bleed the counter back down. A
//! transition that stays pending too long is cancelled outright, so an
//! ambiguous stretch cannot flip the output.

use crate::defaults::{
    AVERAGE_COUNT, AVERAGE_SECONDS, MAX_PEND_SECS, MIN_MUSIC_SECS, MIN_TALK_SECS, STEP_MSECS,
    WINDOW_SECONDS,
};

/// Confirmed stream classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Before the first confirmed transition.
    #[default]
    None,
    Music,
    Talk,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::None => "NONE",
            Mode::Music => "MUSIC",
            Mode::Talk => "TALK",
        }
    }
}

const MIN_MUSIC_STEPS: u32 = MIN_MUSIC_SECS * 1000 / STEP_MSECS;
const MIN_TALK_STEPS: u32 = MIN_TALK_SECS * 1000 / STEP_MSECS;
const MAX_PEND_STEPS: u32 = MAX_PEND_SECS * 1000 / STEP_MSECS;

/// Score FIFO and transition state machine.
pub struct Classifier {
    scores: Vec<i8>,
    threshold: i32,
    sample_rate: u32,
    step_samples: usize,
    crossfade_len: usize,
    verbose: bool,
    current_mode: Mode,
    music_up: u32,
    talk_up: u32,
    pend_up: u32,
    transition_sample: i64,
    confirmed_sample: i64,
    music_hits: u64,
    talk_hits: u64,
    last_average: Option<(i32, usize)>,
}

impl Classifier {
    pub fn new(
        sample_rate: u32,
        step_samples: usize,
        crossfade_len: usize,
        threshold: i32,
        verbose: bool,
    ) -> Self {
        Self {
            scores: Vec::with_capacity(AVERAGE_COUNT),
            threshold,
            sample_rate,
            step_samples,
            crossfade_len,
            verbose,
            current_mode: Mode::None,
            music_up: 0,
            talk_up: 0,
            pend_up: 0,
            transition_sample: 0,
            confirmed_sample: 0,
            music_hits: 0,
            talk_hits: 0,
            last_average: None,
        }
    }

    /// Feeds one window score. `num_samples` is the input sample count at
    /// the moment the window completed. Returns the newly confirmed mode
    /// when a transition fires.
    pub fn push_score(&mut self, score: i8, num_samples: i64) -> Option<Mode> {
        if score as i32 > self.threshold {
            self.music_hits += 1;
        } else if (score as i32) < self.threshold {
            self.talk_hits += 1;
        }

        self.scores.push(score);
        self.last_average = None;

        if self.scores.len() < AVERAGE_COUNT {
            return None;
        }

        let sum: i32 = self.scores.iter().map(|&s| s as i32).sum();
        self.scores.remove(0);
        let count = self.scores.len();
        self.last_average = Some((sum, count));

        self.step(sum > self.threshold * count as i32, num_samples)
    }

    /// Advances the hysteresis state machine by one evaluated step.
    pub fn step(&mut self, music_leaning: bool, num_samples: i64) -> Option<Mode> {
        let mut detected = None;

        if music_leaning {
            if self.current_mode == Mode::Music {
                self.bleed_talk();
            } else {
                if self.music_up == 0 {
                    self.anchor_transition(num_samples);
                }

                self.music_up += 1;
                if self.music_up == MIN_MUSIC_STEPS {
                    detected = Some(Mode::Music);
                    self.music_up = 0;
                }

                self.pend_up += 1;
            }
        } else if self.current_mode == Mode::Talk {
            self.bleed_music();
        } else {
            if self.talk_up == 0 {
                self.anchor_transition(num_samples);
            }

            self.talk_up += 1;
            if self.talk_up == MIN_TALK_STEPS {
                detected = Some(Mode::Talk);
                self.talk_up = 0;
            }

            self.pend_up += 1;
        }

        if let Some(mode) = detected {
            self.current_mode = mode;
        }

        if self.talk_up == 0 && self.music_up == 0 {
            self.confirmed_sample = num_samples
                - (((WINDOW_SECONDS + AVERAGE_SECONDS) * self.sample_rate) as i64
                    + self.step_samples as i64
                    + self.crossfade_len as i64)
                    / 2;
        }

        detected
    }

    fn anchor_transition(&mut self, num_samples: i64) {
        self.transition_sample =
            num_samples - ((WINDOW_SECONDS + AVERAGE_SECONDS) * self.sample_rate) as i64 / 2;
        self.pend_up = 0;
    }

    fn bleed_talk(&mut self) {
        if self.talk_up > 0 {
            self.talk_up -= 1;
            if self.talk_up > 0 {
                self.pend_up += 1;
                if self.pend_up >= MAX_PEND_STEPS {
                    if self.verbose {
                        eprintln!(
                            "TALK detection pending for {} secs, cancelled...",
                            (self.pend_up * STEP_MSECS + 500) / 1000
                        );
                    }
                    self.talk_up = 0;
                }
            }
        }
    }

    fn bleed_music(&mut self) {
        if self.music_up > 0 {
            self.music_up -= 1;
            if self.music_up > 0 {
                self.pend_up += 1;
                if self.pend_up >= MAX_PEND_STEPS {
                    if self.verbose {
                        eprintln!(
                            "MUSIC detection pending for {} secs, cancelled...",
                            (self.pend_up * STEP_MSECS + 500) / 1000
                        );
                    }
                    self.music_up = 0;
                }
            }
        }
    }

    pub fn current_mode(&self) -> Mode {
        self.current_mode
    }

    /// Anchor sample of the most recent pending or confirmed transition.
    pub fn transition_sample(&self) -> i64 {
        self.transition_sample
    }

    /// Frontier up to which classification decisions are final.
    pub fn confirmed_sample(&self) -> i64 {
        self.confirmed_sample
    }

    /// `(sum, fifo_len)` of the most recent full-FIFO evaluation, for the
    /// tensor debug tap.
    pub fn last_average(&self) -> Option<(i32, usize)> {
        self.last_average
    }

    /// `(music_up, talk_up)` counters, for flush accounting messages.
    pub fn up_counters(&self) -> (u32, u32) {
        (self.music_up, self.talk_up)
    }

    pub fn music_hits(&self) -> u64 {
        self.music_hits
    }

    pub fn talk_hits(&self) -> u64 {
        self.talk_hits
    }
}
