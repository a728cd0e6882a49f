//! Image-to-image generator used by the CycleGAN.
//!
//! Both translation directions (`G_XtoY`, `G_YtoX`) share this architecture:
//! a two-step convolutional encoder, a single residual block and a two-step
//! transposed-convolutional decoder.

use tch::{nn, nn::ModuleT, Tensor};

use crate::layers::{conv, deconv, BlockConfig};

/// `x + conv(x)` with a shape preserving 3x3 convolution.
#[derive(Debug)]
pub struct ResnetBlock {
    conv_layer: nn::SequentialT,
}

impl ResnetBlock {
    pub fn new(path: nn::Path, conv_dim: i64) -> ResnetBlock {
        let conv_layer = conv(&path / "conv_layer", conv_dim, conv_dim,
                              BlockConfig::new(3, 1, 1), false);
        ResnetBlock { conv_layer }
    }
}

impl ModuleT for ResnetBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        xs + self.conv_layer.forward_t(xs, train)
    }
}

#[derive(Debug)]
pub struct CycleGenerator {
    net: nn::SequentialT,
}

impl CycleGenerator {
    pub fn new(path: nn::Path, conv_dim: i64, init_zero_weights: bool) -> CycleGenerator {
        let net = nn::seq_t()
            // encoder: 32x32 -> 16x16 -> 8x8
            .add(conv(&path / "conv1", 3, conv_dim, BlockConfig::new(3, 2, 1), init_zero_weights))
            .add_fn(|x| x.relu())
            .add(conv(&path / "conv2", conv_dim, conv_dim * 2, BlockConfig::new(3, 2, 1),
                      init_zero_weights))
            .add_fn(|x| x.relu())
            // transformation
            .add(ResnetBlock::new(&path / "resnet_block", conv_dim * 2))
            .add_fn(|x| x.relu())
            // decoder: 8x8 -> 16x16 -> 32x32
            .add(deconv(&path / "deconv1", conv_dim * 2, conv_dim, BlockConfig::new(4, 2, 1)))
            .add_fn(|x| x.relu())
            .add(deconv(&path / "deconv2", conv_dim, 3, BlockConfig::new(4, 2, 1).without_batch_norm()))
            .add_fn(|x| x.tanh());
        CycleGenerator { net }
    }
}

impl ModuleT for CycleGenerator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.net.forward_t(xs, train)
    }
}
