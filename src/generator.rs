use tch::{nn, Tensor};

use crate::layers::{deconv, BlockConfig};

/// DCGAN generator: maps noise `[B, noise_size, 1, 1]` to images `[B, 3, 32, 32]` in [-1, 1].
#[derive(Debug)]
pub struct DCGenerator {
    net: nn::SequentialT,
    noise_size: i64,
}

impl DCGenerator {
    pub fn new(path: nn::Path, noise_size: i64, conv_dim: i64) -> DCGenerator {
            let net = nn::seq_t()
                // 1x1 -> 4x4
                .add(deconv(&path / "deconv1", noise_size, conv_dim * 4, BlockConfig::new(4, 1, 0)))
                .add_fn(|x| x.relu())
                // 4x4 -> 8x8
                .add(deconv(&path / "deconv2", conv_dim * 4, conv_dim * 2, BlockConfig::new(4, 2, 1)))
                .add_fn(|x| x.relu())
                // 8x8 -> 16x16
                .add(deconv(&path / "deconv3", conv_dim * 2, conv_dim, BlockConfig::new(4, 2, 1)))
                .add_fn(|x| x.relu())
                // 16x16 -> 32x32
                .add(deconv(&path / "deconv4", conv_dim, 3,
                            BlockConfig::new(4, 2, 1).without_batch_norm()))
                .add_fn(|x| x.tanh());
            DCGenerator { net, noise_size }
        }

    pub fn noise_size(&self) -> i64 {
        self.noise_size
    }
}

impl nn::ModuleT for DCGenerator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
            self.net.forward_t(xs, train)
        }
}
