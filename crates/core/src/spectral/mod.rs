//! FFT-based transforms for the overlap engine.

use std::{fmt, sync::Arc};

use realfft::{num_complex::Complex64, ComplexToReal, RealFftPlanner, RealToComplex};
use tracing::warn;

use crate::{Transform, Work};

/// Forward and inverse plans plus their buffers for one window length.
struct FftResources {
    size: usize,
    forward: Arc<dyn RealToComplex<Work>>,
    inverse: Arc<dyn ComplexToReal<Work>>,
    input: Vec<Work>,
    spectrum: Vec<Complex64>,
    forward_scratch: Vec<Complex64>,
    inverse_scratch: Vec<Complex64>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<Work>, size: usize) -> Self {
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            size,
            input: forward.make_input_vec(),
            spectrum: forward.make_output_vec(),
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            forward,
            inverse,
        }
    }

    /// Runs the forward transform of `window` into `self.spectrum`.
    fn analyse(&mut self, window: &[Work]) -> bool {
        self.input.copy_from_slice(window);
        match self.forward.process_with_scratch(
            &mut self.input,
            &mut self.spectrum,
            &mut self.forward_scratch,
        ) {
            Ok(()) => true,
            Err(err) => {
                warn!(size = self.size, %err, "forward fft failed");
                false
            }
        }
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

/// Replans only when the window length changes.
fn prepare_fft<'a>(
    planner: &mut RealFftPlanner<Work>,
    fft: &'a mut Option<FftResources>,
    size: usize,
) -> &'a mut FftResources {
    if fft.as_ref().map_or(true, |fft| fft.size != size) {
        *fft = None;
    }
    fft.get_or_insert_with(|| FftResources::plan(planner, size))
}

#[derive(Debug, Clone, PartialEq)]
enum Gains {
    /// Per-bin gains; bins past the end of the table pass unchanged.
    Table(Vec<Work>),
    /// Unity up to `cutoff` (fraction of Nyquist), zero above.
    LowPass(Work),
}

impl Gains {
    fn at(&self, bin: usize, bins: usize) -> Work {
        match self {
            Gains::Table(gains) => gains.get(bin).copied().unwrap_or(1.0),
            Gains::LowPass(cutoff) => {
                if bins <= 1 || bin as Work / (bins - 1) as Work <= *cutoff {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Zero-phase filter applied by scaling the bins of each window's spectrum.
pub struct SpectralFilter {
    gains: Gains,
    planner: RealFftPlanner<Work>,
    fft: Option<FftResources>,
}

impl SpectralFilter {
    /// Filter with one real gain per FFT bin, DC first.
    pub fn from_gains(gains: Vec<Work>) -> Self {
        Self::with_gains(Gains::Table(gains))
    }

    /// Brick-wall low-pass; `cutoff` is a fraction of Nyquist in `[0, 1]`.
    pub fn low_pass(cutoff: Work) -> Self {
        Self::with_gains(Gains::LowPass(cutoff.clamp(0.0, 1.0)))
    }

    fn with_gains(gains: Gains) -> Self {
        Self {
            gains,
            planner: RealFftPlanner::new(),
            fft: None,
        }
    }
}

impl Transform for SpectralFilter {
    fn transform(&mut self, window: &mut [Work]) {
        let len = window.len();
        if len < 2 {
            return;
        }
        let fft = prepare_fft(&mut self.planner, &mut self.fft, len);
        if !fft.analyse(window) {
            return;
        }

        let bins = fft.spectrum.len();
        for (i, bin) in fft.spectrum.iter_mut().enumerate() {
            *bin *= self.gains.at(i, bins);
        }
        // The inverse plan rejects imaginary parts on the DC and Nyquist bins.
        fft.spectrum[0].im = 0.0;
        if len % 2 == 0 {
            fft.spectrum[bins - 1].im = 0.0;
        }

        if let Err(err) = fft.inverse.process_with_scratch(
            &mut fft.spectrum,
            &mut fft.input,
            &mut fft.inverse_scratch,
        ) {
            warn!(size = len, %err, "inverse fft failed");
            return;
        }

        let scale = 1.0 / len as Work;
        for (dst, value) in window.iter_mut().zip(&fft.input) {
            *dst = value * scale;
        }
    }
}

impl fmt::Debug for SpectralFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralFilter")
            .field("gains", &self.gains)
            .field("fft", &self.fft)
            .finish()
    }
}

/// Record-mode transform writing the bin magnitudes of every window.
///
/// A record of `window_len / 2 + 1` samples holds the full spectrum; shorter
/// records are truncated and longer ones zero-padded.
pub struct MagnitudeSpectrum {
    hann: bool,
    planner: RealFftPlanner<Work>,
    fft: Option<FftResources>,
}

impl MagnitudeSpectrum {
    pub fn new() -> Self {
        Self {
            hann: false,
            planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    /// Tapers each window with a Hann window before analysis.
    pub fn with_hann(mut self) -> Self {
        self.hann = true;
        self
    }
}

impl Default for MagnitudeSpectrum {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for MagnitudeSpectrum {
    fn transform(&mut self, window: &mut [Work]) {
        if self.hann {
            let len = window.len();
            for (index, value) in window.iter_mut().enumerate() {
                *value *= hann_value(index, len);
            }
        }
    }

    fn emit(&mut self, window: &[Work], record: &mut [Work]) {
        record.fill(0.0);
        if window.len() < 2 {
            return;
        }
        let fft = prepare_fft(&mut self.planner, &mut self.fft, window.len());
        if !fft.analyse(window) {
            return;
        }
        for (dst, bin) in record.iter_mut().zip(&fft.spectrum) {
            *dst = bin.norm();
        }
    }
}

impl fmt::Debug for MagnitudeSpectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MagnitudeSpectrum")
            .field("hann", &self.hann)
            .field("fft", &self.fft)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> Work {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * std::f64::consts::PI * index as Work) / (len as Work - 1.0)).cos()
}
