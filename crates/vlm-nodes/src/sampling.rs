//! Token selection for text generation

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Seeded sampler for token selection during generation
///
/// Applies, in order: repetition penalty, temperature, softmax, top-k and
/// top-p filtering. A temperature of 0 selects the most likely token.
pub struct Sampler {
    temperature: f32,
    top_p: f32,
    top_k: usize,
    repeat_penalty: f32,
    rng: StdRng,
}

impl Sampler {
    pub fn new(temperature: f32, top_p: f32, top_k: u32, repeat_penalty: f32, seed: u64) -> Self {
        Self {
            temperature: temperature.max(0.0),
            top_p: top_p.clamp(0.0, 1.0),
            top_k: top_k as usize,
            repeat_penalty: repeat_penalty.max(1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sample a token from logits
    pub fn sample(&mut self, logits: &mut [f32], previous_tokens: &[u32]) -> u32 {
        apply_repeat_penalty(logits, previous_tokens, self.repeat_penalty);

        if self.temperature == 0.0 {
            return argmax(logits);
        }
        for logit in logits.iter_mut() {
            *logit /= self.temperature;
        }

        let probs = softmax(logits);
        let filtered = self.top_k_filter(probs);
        let nucleus = self.top_p_filter(filtered);
        self.sample_from_probs(&nucleus)
    }

    /// Keep the `top_k` most likely tokens, sorted by descending probability
    fn top_k_filter(&self, probs: Vec<(usize, f32)>) -> Vec<(usize, f32)> {
        let mut sorted = probs;
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        if self.top_k > 0 && self.top_k < sorted.len() {
            sorted.truncate(self.top_k);
        }
        sorted
    }

    /// Smallest prefix whose cumulative probability exceeds `top_p`
    ///
    /// Expects probabilities sorted in descending order.
    fn top_p_filter(&self, sorted: Vec<(usize, f32)>) -> Vec<(usize, f32)> {
        if self.top_p >= 1.0 {
            return sorted;
        }

        let mut cumsum = 0.0;
        let mut cutoff = sorted.len();
        for (i, (_, prob)) in sorted.iter().enumerate() {
            cumsum += prob;
            if cumsum > self.top_p {
                cutoff = i + 1;
                break;
            }
        }

        let mut nucleus = sorted;
        nucleus.truncate(cutoff.max(1));
        nucleus
    }

    fn sample_from_probs(&mut self, probs: &[(usize, f32)]) -> u32 {
        let total: f32 = probs.iter().map(|(_, p)| p).sum();
        if probs.is_empty() || total.is_nan() || total <= 0.0 {
            return probs.first().map(|(i, _)| *i as u32).unwrap_or(0);
        }

        let r: f32 = self.rng.gen::<f32>() * total;
        let mut cumsum = 0.0;
        for &(idx, prob) in probs {
            cumsum += prob;
            if r <= cumsum {
                return idx as u32;
            }
        }

        probs.last().map(|(i, _)| *i as u32).unwrap_or(0)
    }
}

/// Penalize every distinct token already present in the sequence
///
/// Positive logits are divided by `penalty`, negative ones multiplied.
pub fn apply_repeat_penalty(logits: &mut [f32], previous_tokens: &[u32], penalty: f32) {
    if penalty <= 1.0 {
        return;
    }

    let seen: HashSet<u32> = previous_tokens.iter().copied().collect();
    for token in seen {
        if let Some(logit) = logits.get_mut(token as usize) {
            if *logit > 0.0 {
                *logit /= penalty;
            } else {
                *logit *= penalty;
            }
        }
    }
}

/// Index of the largest logit
pub fn argmax(logits: &[f32]) -> u32 {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i as u32)
        .unwrap_or(0)
}

fn softmax(logits: &[f32]) -> Vec<(usize, f32)> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|x| (x - max_logit).exp()).sum();

    logits
        .iter()
        .enumerate()
        .map(|(i, &x)| (i, (x - max_logit).exp() / exp_sum))
        .collect()
}

/// Natural-log probabilities
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let log_sum = logits.iter().map(|x| (x - max_logit).exp()).sum::<f32>().ln();
    logits.iter().map(|x| x - max_logit - log_sum).collect()
}
