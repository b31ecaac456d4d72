//! Decoding loops over a next-token logits model
//!
//! `num_beams == 1` samples with the seeded [`Sampler`]; wider settings run
//! a deterministic beam search scored by summed log-probabilities.

use crate::config::{Decoding, GenerationParams};
use crate::error::{Result, VlmNodeError};
use crate::sampling::{apply_repeat_penalty, log_softmax, Sampler};

/// Causal language model producing next-token logits
pub trait LogitsModel {
    /// Feed `tokens` starting at position `offset`; returns the logits for the next position
    fn forward(&mut self, tokens: &[u32], offset: usize) -> Result<Vec<f32>>;

    /// Drop any cached keys and values
    fn reset(&mut self);
}

/// Generate a continuation of `prompt`, returning prompt and new tokens
pub fn generate<M>(model: &mut M, prompt: &[u32], params: &GenerationParams) -> Result<Vec<u32>>
where
    M: LogitsModel + ?Sized,
{
    if prompt.is_empty() {
        return Err(VlmNodeError::configuration("input_ids", "prompt has no tokens"));
    }
    params.validate()?;

    match params.decoding() {
        Decoding::Sample { .. } => sample_sequence(model, prompt, params),
        Decoding::Beam { num_beams } => beam_search(model, prompt, params, num_beams as usize),
    }
}

fn sample_sequence<M>(model: &mut M, prompt: &[u32], params: &GenerationParams) -> Result<Vec<u32>>
where
    M: LogitsModel + ?Sized,
{
    let mut sampler = Sampler::new(
        params.temperature,
        params.top_p,
        params.top_k,
        params.repetition_penalty,
        params.seed,
    );

    model.reset();
    let mut tokens = prompt.to_vec();
    let mut logits = model.forward(prompt, 0)?;
    for step in 0..params.max_new_tokens {
        if step > 0 {
            let last = tokens.len() - 1;
            logits = model.forward(&tokens[last..], last)?;
        }
        let next = sampler.sample(&mut logits, &tokens);
        tokens.push(next);
        if params.stop_token_ids.contains(&next) {
            break;
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    score: f32,
}

fn beam_search<M>(model: &mut M, prompt: &[u32], params: &GenerationParams, width: usize) -> Result<Vec<u32>>
where
    M: LogitsModel + ?Sized,
{
    let mut live = vec![Beam {
        tokens: prompt.to_vec(),
        score: 0.0,
    }];
    let mut finished: Vec<Beam> = Vec::new();

    for _ in 0..params.max_new_tokens {
        let mut candidates = Vec::with_capacity(live.len() * width);
        for beam in &live {
            // beams diverge, so each one replays its own prefix
            model.reset();
            let mut logits = model.forward(&beam.tokens, 0)?;
            apply_repeat_penalty(&mut logits, &beam.tokens, params.repetition_penalty);

            let mut ranked: Vec<(usize, f32)> = log_softmax(&logits).into_iter().enumerate().collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            for (token, log_prob) in ranked.into_iter().take(width) {
                let mut tokens = beam.tokens.clone();
                tokens.push(token as u32);
                candidates.push(Beam {
                    tokens,
                    score: beam.score + log_prob,
                });
            }
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        live.clear();
        for candidate in candidates {
            if live.len() >= width {
                break;
            }
            let stopped = candidate
                .tokens
                .last()
                .is_some_and(|token| params.stop_token_ids.contains(token));
            if stopped {
                finished.push(candidate);
            } else {
                live.push(candidate);
            }
        }

        // scores only decrease as beams grow
        let best_finished = finished.iter().map(|b| b.score).fold(f32::NEG_INFINITY, f32::max);
        let best_live = live.first().map(|b| b.score).unwrap_or(f32::NEG_INFINITY);
        if live.is_empty() || best_finished >= best_live {
            break;
        }
    }

    let best = finished
        .into_iter()
        .chain(live)
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|beam| beam.tokens)
        .unwrap_or_else(|| prompt.to_vec());
    Ok(best)
}
