//! Audio waveforms

use ndarray::{Array2, Array3, Axis};

/// Waveform shaped `(1, channels, samples)` with f32 samples in `[-1, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct AudioWaveform {
    pub waveform: Array3<f32>,
    pub sample_rate: u32,
}

impl AudioWaveform {
    /// Wrap planar samples `(channels, samples)`
    pub fn from_planar(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            waveform: samples.insert_axis(Axis(0)),
            sample_rate,
        }
    }

    /// De-interleave `channels`-interleaved samples
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels;
        let planar = Array2::from_shape_fn((channels, frames), |(c, i)| samples[i * channels + c]);
        Self::from_planar(planar, sample_rate)
    }

    pub fn channels(&self) -> usize {
        self.waveform.dim().1
    }

    /// Samples per channel
    pub fn samples(&self) -> usize {
        self.waveform.dim().2
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples() as f64 / self.sample_rate as f64
    }
}
