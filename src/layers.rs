//! Convolution building blocks shared by the generators and discriminators.
//!
//! Every block is a bias-free (transposed) convolution optionally followed by
//! 2d batch normalization, packed into a `SequentialT` so it can be stacked
//! with activations via `add_fn`.

use tch::nn;

/// Standard deviation used for the small random init of generator convolutions.
const SMALL_INIT_STDEV: f64 = 0.001;

#[derive(Debug, Clone, Copy)]
pub struct BlockConfig {
    pub kernel_size: i64,
    pub stride: i64,
    pub padding: i64,
    pub batch_norm: bool,
}

impl BlockConfig {
    pub fn new(kernel_size: i64, stride: i64, padding: i64) -> BlockConfig {
        BlockConfig { kernel_size, stride, padding, batch_norm: true }
    }

    pub fn without_batch_norm(self) -> BlockConfig {
        BlockConfig { batch_norm: false, ..self }
    }
}

/// Convolution, with optional batch normalization.
///
/// When `init_zero_weights` is set the weights start close to zero
/// (N(0, 0.001²)) instead of the default Kaiming init.
pub fn conv(path: nn::Path, in_channels: i64, out_channels: i64,
            config: BlockConfig, init_zero_weights: bool) -> nn::SequentialT {
    let mut conv_config = nn::ConvConfig {
        stride: config.stride,
        padding: config.padding,
        bias: false,
        ..Default::default()
    };
    if init_zero_weights {
        conv_config.ws_init = nn::Init::Randn { mean: 0., stdev: SMALL_INIT_STDEV };
    }

    let block = nn::seq_t()
        .add(nn::conv2d(&path / "conv", in_channels, out_channels,
                        config.kernel_size, conv_config));
    if config.batch_norm {
        block.add(nn::batch_norm2d(&path / "batch_norm", out_channels, Default::default()))
    } else {
        block
    }
}

/// Transposed convolution, with optional batch normalization.
pub fn deconv(path: nn::Path, in_channels: i64, out_channels: i64,
              config: BlockConfig) -> nn::SequentialT {
    let block = nn::seq_t()
        .add(nn::conv_transpose2d(&path / "deconv", in_channels, out_channels,
                                  config.kernel_size,
                                  nn::ConvTransposeConfig {
                                      stride: config.stride,
                                      padding: config.padding,
                                      bias: false,
                                      ..Default::default()
                                  }));
    if config.batch_norm {
        block.add(nn::batch_norm2d(&path / "batch_norm", out_channels, Default::default()))
    } else {
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::ModuleT, Device, Kind, Tensor};

    #[test]
    fn test_conv_halves_spatial_size() {
        let vs = nn::VarStore::new(Device::Cpu);
        let block = conv(vs.root() / "c", 3, 8, BlockConfig::new(3, 2, 1), false);
        let xs = Tensor::randn([2, 3, 32, 32], (Kind::Float, Device::Cpu));
        assert_eq!(block.forward_t(&xs, true).size(), vec![2, 8, 16, 16]);
    }

    #[test]
    fn test_deconv_doubles_spatial_size() {
        let vs = nn::VarStore::new(Device::Cpu);
        let block = deconv(vs.root() / "d", 8, 4, BlockConfig::new(4, 2, 1));
        let xs = Tensor::randn([2, 8, 8, 8], (Kind::Float, Device::Cpu));
        assert_eq!(block.forward_t(&xs, true).size(), vec![2, 4, 16, 16]);
    }

    #[test]
    fn test_blocks_have_no_bias() {
        let vs = nn::VarStore::new(Device::Cpu);
        let _c = conv(vs.root() / "c", 3, 8, BlockConfig::new(3, 2, 1).without_batch_norm(), false);
        let _d = deconv(vs.root() / "d", 8, 3, BlockConfig::new(4, 2, 1).without_batch_norm());
        let names: Vec<String> = vs.variables().into_keys().collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with("weight")));
    }

    #[test]
    fn test_batch_norm_registers_parameters() {
        let vs = nn::VarStore::new(Device::Cpu);
        let _c = conv(vs.root() / "c", 3, 8, BlockConfig::new(3, 2, 1), false);
        let names: Vec<String> = vs.variables().into_keys().collect();
        assert!(names.iter().any(|n| n.starts_with("c.batch_norm")));
    }

    #[test]
    fn test_zero_init_weights_are_small() {
        let vs = nn::VarStore::new(Device::Cpu);
        let _c = conv(vs.root() / "c", 16, 16, BlockConfig::new(3, 1, 1), true);
        let weight = &vs.variables()["c.conv.weight"];
        let max = weight.abs().max().double_value(&[]);
        assert!(max < 0.01, "max |w| = {max}");
    }
}
