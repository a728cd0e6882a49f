//! CycleGAN: unpaired translation between two emoji styles X and Y.
//!
//! `G_XtoY` and `G_YtoX` live in one `VarStore` and are updated by a single
//! Adam optimizer; `D_X` and `D_Y` likewise. Each iteration runs two
//! discriminator updates (real, then fake) and two generator updates
//! (Y->X->Y, then X->Y->X).

use std::fs;
use std::path::Path;

use rand::Rng;
use tch::{nn, nn::ModuleT, nn::OptimizerConfig, Device, Tensor};
use tqdm::tqdm;
use tracing::{debug, info, warn};

use crate::checkpoint;
use crate::config::CycleOptions;
use crate::cycle_generator::CycleGenerator;
use crate::data::{Batches, EmojiDataset, EmojiType};
use crate::discriminator::DCDiscriminator;
use crate::error::{GanError, Result};
use crate::losses::{cycle_consistency_loss, fake_loss, generator_loss, real_loss, scalar, LossHistory};
use crate::samples;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleLosses {
    pub d_real: f64,
    pub d_fake: f64,
    /// Adversarial loss of `G_YtoX` against `D_X`.
    pub g_y_to_x: f64,
    /// Adversarial loss of `G_XtoY` against `D_Y`.
    pub g_x_to_y: f64,
    /// Weighted cycle-consistency terms, zero when the loss is disabled.
    pub cycle_y: f64,
    pub cycle_x: f64,
}

impl CycleLosses {
    pub fn d_total(&self) -> f64 {
        self.d_real + self.d_fake
    }

    pub fn g_total(&self) -> f64 {
        self.g_y_to_x + self.g_x_to_y + self.cycle_y + self.cycle_x
    }
}

pub struct CycleGan {
    pub g_vs: nn::VarStore,
    pub d_vs: nn::VarStore,
    pub g_x_to_y: CycleGenerator,
    pub g_y_to_x: CycleGenerator,
    pub d_x: DCDiscriminator,
    pub d_y: DCDiscriminator,
    optimizer_g: nn::Optimizer,
    optimizer_d: nn::Optimizer,
    lambda_cycle: Option<f64>,
}

impl CycleGan {
    pub fn new(opts: &CycleOptions, device: Device) -> Result<CycleGan> {
        let g_vs = nn::VarStore::new(device);
        let g_x_to_y = CycleGenerator::new(g_vs.root() / "G_XtoY", opts.g_conv_dim, opts.init_zero_weights);
        let g_y_to_x = CycleGenerator::new(g_vs.root() / "G_YtoX", opts.g_conv_dim, opts.init_zero_weights);
        let optimizer_g = nn::adam(opts.beta1, opts.beta2, 0.).build(&g_vs, opts.lr)?;

        let d_vs = nn::VarStore::new(device);
        let d_x = DCDiscriminator::new(d_vs.root() / "D_X", opts.d_conv_dim);
        let d_y = DCDiscriminator::new(d_vs.root() / "D_Y", opts.d_conv_dim);
        let optimizer_d = nn::adam(opts.beta1, opts.beta2, 0.).build(&d_vs, opts.lr)?;

        let lambda_cycle = opts.use_cycle_consistency_loss.then_some(opts.lambda_cycle);
        Ok(CycleGan { g_vs, d_vs, g_x_to_y, g_y_to_x, d_x, d_y, optimizer_g, optimizer_d, lambda_cycle })
    }

    /// Generator loss for `source -> target -> source`: the adversarial term
    /// for `forward(source)` under `critic`, plus the weighted reconstruction
    /// error when cycle consistency is enabled.
    fn generator_pass(&self, source: &Tensor, forward: &CycleGenerator, backward: &CycleGenerator,
                      critic: &DCDiscriminator) -> (Tensor, Tensor) {
        let fake = source.apply_t(forward, true);
        let adversarial = generator_loss(&fake.apply_t(critic, true));
        let cycle = match self.lambda_cycle {
            Some(lambda) => cycle_consistency_loss(source, &fake.apply_t(backward, true)) * lambda,
            None => Tensor::from(0f32).to_device(source.device()),
        };
        (adversarial, cycle)
    }

    pub fn train_step(&mut self, images_x: &Tensor, images_y: &Tensor) -> CycleLosses {
        // Train the discriminators
        self.d_vs.unfreeze();
        self.g_vs.freeze();

        // 1. on real images
        let d_real_loss = real_loss(&images_x.apply_t(&self.d_x, true))
            + real_loss(&images_y.apply_t(&self.d_y, true));
        self.optimizer_d.backward_step(&d_real_loss);

        // 2. on fake images
        let fake_x = images_y.apply_t(&self.g_y_to_x, true).detach();
        let fake_y = images_x.apply_t(&self.g_x_to_y, true).detach();
        let d_fake_loss = fake_loss(&fake_x.apply_t(&self.d_x, true))
            + fake_loss(&fake_y.apply_t(&self.d_y, true));
        self.optimizer_d.backward_step(&d_fake_loss);

        // Train the generators
        self.d_vs.freeze();
        self.g_vs.unfreeze();

        // 3. Y--X-->Y
        let (g_y_to_x, cycle_y) = self.generator_pass(images_y, &self.g_y_to_x, &self.g_x_to_y, &self.d_x);
        self.optimizer_g.backward_step(&(&g_y_to_x + &cycle_y));

        // 4. X--Y-->X
        let (g_x_to_y, cycle_x) = self.generator_pass(images_x, &self.g_x_to_y, &self.g_y_to_x, &self.d_y);
        self.optimizer_g.backward_step(&(&g_x_to_y + &cycle_x));

        CycleLosses {
            d_real: scalar(&d_real_loss),
            d_fake: scalar(&d_fake_loss),
            g_y_to_x: scalar(&g_y_to_x),
            g_x_to_y: scalar(&g_x_to_y),
            cycle_y: scalar(&cycle_y),
            cycle_x: scalar(&cycle_x),
        }
    }

    /// Saves `X | G_XtoY(X)` and `Y | G_YtoX(Y)` pair grids for `iteration`.
    pub fn save_samples(&self, fixed_x: &Tensor, fixed_y: &Tensor, dir: &Path, iteration: usize) -> Result<()> {
        let (fake_y, fake_x) = tch::no_grad(|| {
            (fixed_x.apply_t(&self.g_x_to_y, false), fixed_y.apply_t(&self.g_y_to_x, false))
        });
        samples::save_grid(&dir.join(format!("sample-{iteration:06}-X-Y.png")),
                           &samples::merge_pairs(fixed_x, &fake_y))?;
        samples::save_grid(&dir.join(format!("sample-{iteration:06}-Y-X.png")),
                           &samples::merge_pairs(fixed_y, &fake_x))?;
        Ok(())
    }

    pub fn save_checkpoint(&self, dir: &Path) -> Result<()> {
        checkpoint::save(dir, &[("G", &self.g_vs), ("D", &self.d_vs)])
    }

    pub fn load_checkpoint(&mut self, dir: &Path) -> Result<()> {
        checkpoint::load(dir, &mut [("G", &mut self.g_vs), ("D", &mut self.d_vs)])
    }
}

/// Endless shuffled minibatches: starts a new epoch when one is exhausted.
struct Loader<'a> {
    dataset: &'a EmojiDataset,
    batches: Batches<'a>,
    batch_size: usize,
    device: Device,
}

impl<'a> Loader<'a> {
    fn new<R: Rng>(dataset: &'a EmojiDataset, batch_size: usize, device: Device, rng: &mut R) -> Loader<'a> {
        Loader { dataset, batches: dataset.batches(batch_size, device, rng), batch_size, device }
    }

    fn next_batch<R: Rng>(&mut self, rng: &mut R) -> Tensor {
        match self.batches.next() {
            Some(batch) => batch,
            None => {
                self.batches = self.dataset.batches(self.batch_size, self.device, rng);
                // datasets are never empty, see EmojiDataset::load
                self.batches.next().unwrap_or_else(|| self.dataset.head(self.batch_size, self.device))
            }
        }
    }
}

fn load_test_images(emoji: EmojiType, opts: &CycleOptions, fallback: &EmojiDataset,
                    device: Device) -> Result<Tensor> {
    let test_dir = emoji.test_dir(&opts.data_dir);
    match EmojiDataset::load(&test_dir, opts.image_size) {
        Ok(test) => Ok(test.head(opts.batch_size, device)),
        Err(GanError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} not found, sampling from the training images", test_dir.display());
            Ok(fallback.head(opts.batch_size, device))
        }
        Err(err) => Err(err),
    }
}

/// Trains for `train_iters` iterations and returns the generator and
/// discriminator losses, one entry per iteration.
pub fn train<R: Rng>(opts: &CycleOptions, device: Device, rng: &mut R) -> Result<LossHistory> {
    opts.validate()?;

    let data_x = EmojiDataset::load(&opts.x.train_dir(&opts.data_dir), opts.image_size)?;
    let data_y = EmojiDataset::load(&opts.y.train_dir(&opts.data_dir), opts.image_size)?;
    info!("Loaded {} {} and {} {} images", data_x.len(), opts.x, data_y.len(), opts.y);
    let fixed_x = load_test_images(opts.x, opts, &data_x, device)?;
    let fixed_y = load_test_images(opts.y, opts, &data_y, device)?;

    fs::create_dir_all(&opts.sample_dir)?;

    let mut gan = CycleGan::new(opts, device)?;
    if let Some(dir) = &opts.load {
        gan.load_checkpoint(dir)?;
    }
    checkpoint::write_options(&opts.checkpoint_dir, opts)?;

    let mut loader_x = Loader::new(&data_x, opts.batch_size, device, rng);
    let mut loader_y = Loader::new(&data_y, opts.batch_size, device, rng);
    let mut history = LossHistory::new();

    for iteration in tqdm(1..=opts.train_iters) {
        let images_x = loader_x.next_batch(rng);
        let images_y = loader_y.next_batch(rng);
        let losses = gan.train_step(&images_x, &images_y);
        history.record(losses.g_total(), losses.d_total());
        history.end_epoch();

        if iteration % opts.log_step == 0 {
            info!("Iteration [{:5}/{:5}] | d_real_loss: {:6.4} | d_fake_loss: {:6.4} | g_loss: {:6.4}",
                  iteration, opts.train_iters, losses.d_real, losses.d_fake, losses.g_total());
            debug!(?losses);
        }

        if iteration % opts.sample_every == 0 {
            gan.save_samples(&fixed_x, &fixed_y, &opts.sample_dir, iteration)?;
        }

        if iteration % opts.checkpoint_every == 0 {
            gan.save_checkpoint(&opts.checkpoint_dir)?;
        }
    }

    history.save(&opts.sample_dir.join("losses.json"))?;
    Ok(history)
}
