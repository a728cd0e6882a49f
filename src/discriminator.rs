use tch::{nn, Tensor};

use crate::layers::{conv, BlockConfig};

/// Classifies `[B, 3, 32, 32]` images as real (1) or generated (0).
///
/// Used for the vanilla GAN and for both CycleGAN domains. The output keeps
/// its batch dimension, `[B]`, even when `B == 1`.
#[derive(Debug)]
pub struct DCDiscriminator {
    net: nn::SequentialT
}

impl DCDiscriminator {
    pub fn new(path: nn::Path, conv_dim: i64) -> DCDiscriminator {
            let net = nn::seq_t()
                // 32x32 -> 16x16
                .add(conv(&path / "conv1", 3, conv_dim, BlockConfig::new(3, 2, 1), false))
                .add_fn(|x| x.relu())
                // 16x16 -> 8x8
                .add(conv(&path / "conv2", conv_dim, conv_dim * 2, BlockConfig::new(3, 2, 1), false))
                .add_fn(|x| x.relu())
                // 8x8 -> 4x4
                .add(conv(&path / "conv3", conv_dim * 2, conv_dim * 4, BlockConfig::new(3, 2, 1), false))
                .add_fn(|x| x.relu())
                // 4x4 -> 1x1
                .add(conv(&path / "conv4", conv_dim * 4, 1,
                          BlockConfig::new(4, 1, 0).without_batch_norm(), false))
                .add_fn(|x| x.view([-1]).sigmoid());
            DCDiscriminator { net }
        }
}

impl nn::ModuleT for DCDiscriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
            self.net.forward_t(xs, train)
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::ModuleT, Device, Kind};

    #[test]
    fn test_discriminator_scores_per_image() {
        let vs = nn::VarStore::new(Device::Cpu);
        let discriminator = DCDiscriminator::new(vs.root(), 8);
        let images = Tensor::rand([5, 3, 32, 32], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let scores = discriminator.forward_t(&images, true);
        assert_eq!(scores.size(), vec![5]);
        assert!(scores.min().double_value(&[]) >= 0.0);
        assert!(scores.max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn test_discriminator_keeps_batch_of_one() {
        let vs = nn::VarStore::new(Device::Cpu);
        let discriminator = DCDiscriminator::new(vs.root(), 8);
        let image = Tensor::zeros([1, 3, 32, 32], (Kind::Float, Device::Cpu));
        let scores = tch::no_grad(|| discriminator.forward_t(&image, false));
        assert_eq!(scores.size(), vec![1]);
    }
}
