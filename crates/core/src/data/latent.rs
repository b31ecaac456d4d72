//! Video latents and the host-provided codec that produces them

use super::ImageBatch;
use crate::Result;
use ndarray::Array5;
use std::fmt;

/// Video latent: samples `(B, C, T, H, W)` plus an optional per-frame noise
/// mask `(B, 1, T, 1, 1)` with values in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct Latent {
    pub samples: Array5<f32>,
    pub noise_mask: Option<Array5<f32>>,
}

impl Latent {
    pub fn new(samples: Array5<f32>) -> Self {
        Self {
            samples,
            noise_mask: None,
        }
    }

    pub fn with_noise_mask(mut self, mask: Array5<f32>) -> Self {
        self.noise_mask = Some(mask);
        self
    }

    pub fn batch(&self) -> usize {
        self.samples.dim().0
    }

    pub fn channels(&self) -> usize {
        self.samples.dim().1
    }

    /// Number of latent frames (T)
    pub fn frames(&self) -> usize {
        self.samples.dim().2
    }

    pub fn height(&self) -> usize {
        self.samples.dim().3
    }

    pub fn width(&self) -> usize {
        self.samples.dim().4
    }
}

/// Encoder from pixel space to latent space (the host's VAE)
pub trait LatentCodec: Send + Sync + fmt::Debug {
    /// Encode RGB frames `(T, H, W, 3)` into a latent `(1, C, T', H', W')`
    fn encode(&self, pixels: &ImageBatch) -> Result<Array5<f32>>;

    /// Spatial and temporal compression factors `(time, height, width)`
    fn downscale_ratio(&self) -> (usize, usize, usize) {
        (8, 32, 32)
    }
}
