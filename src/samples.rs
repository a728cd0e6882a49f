//! Turning generator output into image files: grids, translation pairs and
//! latent morphing animations.

use std::fs::File;
use std::path::Path;

use gif::{Encoder, Frame, Repeat};
use tch::{nn::ModuleT, Kind, Tensor};

use crate::error::{GanError, Result};

/// Maps images in [-1, 1] to `u8` pixels.
pub fn to_pixels(images: &Tensor) -> Tensor {
    ((images + 1.0) * 127.5).round().clamp(0.0, 255.0).to_kind(Kind::Uint8)
}

/// Lays `[N, C, H, W]` out as a single `[C, rows * H, cols * W]` image with
/// `ceil(sqrt(N))` columns. Missing tiles are zero.
pub fn image_grid(images: &Tensor) -> Tensor {
    let (n, c, h, w) = images.size4().unwrap_or((1, 0, 0, 0));
    let cols = (n as f64).sqrt().ceil().max(1.0) as i64;
    let rows = (n + cols - 1) / cols;
    let missing = rows * cols - n;
    let padded = if missing > 0 {
        let blank = Tensor::zeros([missing, c, h, w], (images.kind(), images.device()));
        Tensor::cat(&[images.shallow_clone(), blank], 0)
    } else {
        images.shallow_clone()
    };
    padded
        .reshape([rows, cols, c, h, w])
        .permute([2, 0, 3, 1, 4])
        .reshape([c, rows * h, cols * w])
}

/// Puts each source image next to its translation: `[N, C, H, 2W]`.
pub fn merge_pairs(sources: &Tensor, translated: &Tensor) -> Tensor {
    Tensor::cat(&[sources, translated], 3)
}

/// Saves `[N, 3, H, W]` images in [-1, 1] as one grid image.
pub fn save_grid(path: &Path, images: &Tensor) -> Result<()> {
    if images.dim() != 4 {
        return Err(GanError::invalid("images", format!("expected 4 dims, got {:?}", images.size())));
    }
    let grid = image_grid(&to_pixels(&images.to_device(tch::Device::Cpu)));
    tch::vision::image::save(&grid, path)?;
    Ok(())
}

/// Renders a looping GIF walking the latent space from `start` to `end`
/// (both `[1, noise_size, 1, 1]`).
pub fn morph_gif<G: ModuleT>(path: &Path, generator: &G, start: &Tensor, end: &Tensor,
                             frames: usize) -> Result<()> {
    if frames < 2 {
        return Err(GanError::invalid("frames", "need at least 2 frames"));
    }
    let frame_at = |i: usize| -> Result<(u16, u16, Vec<u8>)> {
        let l = i as f64 / (frames - 1) as f64;
        let image = tch::no_grad(|| ((1.0 - l) * start + l * end).apply_t(generator, false));
        let (_, _, h, w) = image.size4()?;
        let rgb = to_pixels(&image.squeeze_dim(0).permute([1, 2, 0]).to_device(tch::Device::Cpu))
            .flatten(0, -1);
        Ok((w as u16, h as u16, Vec::<u8>::try_from(&rgb)?))
    };

    let (w, h, first) = frame_at(0)?;
    let mut file = File::create(path)?;
    let mut encoder = Encoder::new(&mut file, w, h, &[])?;
    encoder.set_repeat(Repeat::Infinite)?;
    encoder.write_frame(&Frame::from_rgb(w, h, &first))?;
    for i in 1..frames {
        let (w, h, data) = frame_at(i)?;
        encoder.write_frame(&Frame::from_rgb(w, h, &data))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::DCGenerator;
    use tch::{nn, Device};

    #[test]
    fn test_to_pixels_range() {
        let images = Tensor::from_slice(&[-1.0f32, 0.0, 1.0, 3.0]);
        let pixels = Vec::<u8>::try_from(&to_pixels(&images)).unwrap();
        assert_eq!(pixels, vec![0, 128, 255, 255]);
    }

    #[test]
    fn test_image_grid_square() {
        let images = Tensor::ones([16, 3, 4, 4], (Kind::Uint8, Device::Cpu));
        assert_eq!(image_grid(&images).size(), vec![3, 16, 16]);
    }

    #[test]
    fn test_image_grid_pads_missing_tiles() {
        let images = Tensor::ones([5, 3, 2, 2], (Kind::Float, Device::Cpu));
        let grid = image_grid(&images);
        // 3 columns, 2 rows
        assert_eq!(grid.size(), vec![3, 4, 6]);
        assert_eq!(grid.sum(Kind::Float).double_value(&[]), (5 * 3 * 2 * 2) as f64);
        // the last tile (row 1, col 2) is blank
        assert_eq!(grid.narrow(1, 2, 2).narrow(2, 4, 2).sum(Kind::Float).double_value(&[]), 0.0);
    }

    #[test]
    fn test_image_grid_tile_placement() {
        // image i is filled with value i; row-major placement
        let images = Tensor::arange(4, (Kind::Float, Device::Cpu))
            .view([4, 1, 1, 1])
            .expand([4, 1, 2, 2], false);
        let grid = image_grid(&images);
        assert_eq!(grid.double_value(&[0, 0, 0]), 0.0);
        assert_eq!(grid.double_value(&[0, 0, 2]), 1.0);
        assert_eq!(grid.double_value(&[0, 2, 0]), 2.0);
        assert_eq!(grid.double_value(&[0, 3, 3]), 3.0);
    }

    #[test]
    fn test_merge_pairs() {
        let x = Tensor::zeros([2, 3, 8, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::ones([2, 3, 8, 8], (Kind::Float, Device::Cpu));
        let merged = merge_pairs(&x, &y);
        assert_eq!(merged.size(), vec![2, 3, 8, 16]);
        assert_eq!(merged.narrow(3, 8, 8).min().double_value(&[]), 1.0);
    }

    #[test]
    fn test_save_grid_rejects_flat_tensor() {
        let dir = tempfile::TempDir::new().unwrap();
        let images = Tensor::zeros([3, 8, 8], (Kind::Float, Device::Cpu));
        assert!(save_grid(&dir.path().join("x.png"), &images).is_err());
    }

    #[test]
    fn test_save_grid_writes_png() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("grid.png");
        let images = Tensor::rand([4, 3, 8, 8], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        save_grid(&path, &images).unwrap();
        let loaded = tch::vision::image::load(&path).unwrap();
        assert_eq!(loaded.size(), vec![3, 16, 16]);
    }

    #[test]
    fn test_morph_gif() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("morphing.gif");
        let vs = nn::VarStore::new(Device::Cpu);
        let generator = DCGenerator::new(vs.root(), 8, 4);
        let start = Tensor::zeros([1, 8, 1, 1], (Kind::Float, Device::Cpu));
        let end = Tensor::ones([1, 8, 1, 1], (Kind::Float, Device::Cpu));
        morph_gif(&path, &generator, &start, &end, 3).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");

        assert!(morph_gif(&path, &generator, &start, &end, 1).is_err());
    }
}
