//! Second-order IIR sections for band-limiting the analysis signal.
//!
//! RBJ cookbook high-pass and low-pass designs with Butterworth Q. The
//! pipeline cascades two identical sections per corner for a steeper
//! fourth-order rolloff.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Normalized feed-forward / feed-back coefficients (a0 divided out).
#[derive(Debug, Clone, Copy)]
pub struct BiquadCoefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoefficients {
    /// High-pass design at `frequency` as a fraction of the sample rate.
    pub fn highpass(frequency: f64) -> Self {
        let w0 = 2.0 * PI * frequency;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 * FRAC_1_SQRT_2 / 2.0;

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 + cos_w0) / 2.0 / a0) as f32,
            b1: (-(1.0 + cos_w0) / a0) as f32,
            b2: ((1.0 + cos_w0) / 2.0 / a0) as f32,
            a1: (-2.0 * cos_w0 / a0) as f32,
            a2: ((1.0 - alpha) / a0) as f32,
        }
    }

    /// Low-pass design at `frequency` as a fraction of the sample rate.
    pub fn lowpass(frequency: f64) -> Self {
        let w0 = 2.0 * PI * frequency;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 * FRAC_1_SQRT_2 / 2.0;

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 - cos_w0) / 2.0 / a0) as f32,
            b1: ((1.0 - cos_w0) / a0) as f32,
            b2: ((1.0 - cos_w0) / 2.0 / a0) as f32,
            a1: (-2.0 * cos_w0 / a0) as f32,
            a2: ((1.0 - alpha) / a0) as f32,
        }
    }
}

/// One filter section with its two-sample delay line.
#[derive(Debug, Clone)]
pub struct Biquad {
    coefs: BiquadCoefficients,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    pub fn new(coefs: BiquadCoefficients) -> Self {
        Self {
            coefs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Filters a block in place, carrying state across calls.
    pub fn apply_buffer(&mut self, samples: &mut [f32]) {
        let BiquadCoefficients { b0, b1, b2, a1, a2 } = self.coefs;
        let (mut x1, mut x2, mut y1, mut y2) = (self.x1, self.x2, self.y1, self.y2);

        for s in samples.iter_mut() {
            let x0 = *s;
            let y0 = b0 * x0 + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *s = y0;
        }

        self.x1 = x1;
        self.x2 = x2;
        self.y1 = y1;
        self.y2 = y2;
    }

    /// Zeroes the delay line.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}
