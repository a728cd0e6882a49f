//! Least-squares adversarial losses and per-epoch loss bookkeeping.

use std::path::Path;

use serde::Serialize;
use tch::{Kind, Tensor};

use crate::error::Result;

fn batch_size(scores: &Tensor) -> f64 {
    scores.size().first().copied().unwrap_or(1).max(1) as f64
}

/// Discriminator loss on real images: `Σ (D(x) - 1)² / 2B`.
pub fn real_loss(scores: &Tensor) -> Tensor {
    (scores - 1.0).square().sum(Kind::Float) / (2.0 * batch_size(scores))
}

/// Discriminator loss on generated images: `Σ D(G(z))² / 2B`.
pub fn fake_loss(scores: &Tensor) -> Tensor {
    scores.square().sum(Kind::Float) / (2.0 * batch_size(scores))
}

/// Generator loss: `Σ (D(G(z)) - 1)² / B`.
pub fn generator_loss(scores: &Tensor) -> Tensor {
    (scores - 1.0).square().sum(Kind::Float) / batch_size(scores)
}

/// Mean absolute error between images and their round-trip reconstruction.
pub fn cycle_consistency_loss(images: &Tensor, reconstructed: &Tensor) -> Tensor {
    (images - reconstructed).abs().mean(Kind::Float)
}

/// Reads a scalar loss tensor back to the host.
pub fn scalar(loss: &Tensor) -> f64 {
    loss.double_value(&[])
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LossHistory {
    /// Mean generator loss of each finished epoch.
    pub generator: Vec<f64>,
    /// Mean discriminator loss of each finished epoch.
    pub discriminator: Vec<f64>,
    #[serde(skip)]
    pending_generator: Vec<f64>,
    #[serde(skip)]
    pending_discriminator: Vec<f64>,
}

impl LossHistory {
    pub fn new() -> LossHistory {
        LossHistory::default()
    }

    pub fn record(&mut self, generator: f64, discriminator: f64) {
        self.pending_generator.push(generator);
        self.pending_discriminator.push(discriminator);
    }

    /// Closes the current epoch. Returns `(generator, discriminator)` means,
    /// or `None` if nothing was recorded since the last call.
    pub fn end_epoch(&mut self) -> Option<(f64, f64)> {
        if self.pending_generator.is_empty() {
            return None;
        }
        let g = mean(&self.pending_generator);
        let d = mean(&self.pending_discriminator);
        self.generator.push(g);
        self.discriminator.push(d);
        self.pending_generator.clear();
        self.pending_discriminator.clear();
        Some((g, d))
    }

    pub fn epochs(&self) -> usize {
        self.generator.len()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
