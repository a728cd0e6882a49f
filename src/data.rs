//! Emoji image datasets.
//!
//! Layout on disk: `{root}/{Type}` holds the training images and
//! `{root}/Test_{Type}` the test images. Images may sit directly in those
//! directories or one level down (one sub-directory per class).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tch::{Device, Kind, Tensor};

use crate::error::{GanError, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum EmojiType {
    Apple,
    Facebook,
    Windows,
}

impl fmt::Display for EmojiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmojiType::Apple => "Apple",
            EmojiType::Facebook => "Facebook",
            EmojiType::Windows => "Windows",
        };
        f.write_str(name)
    }
}

impl EmojiType {
    pub fn train_dir(&self, root: &Path) -> PathBuf {
        root.join(self.to_string())
    }

    pub fn test_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("Test_{self}"))
    }
}

#[derive(Debug)]
pub struct EmojiDataset {
    /// `[N, 3, H, W]` float images in [-1, 1], kept on the CPU.
    images: Tensor,
}

impl EmojiDataset {
    /// Loads every image below `dir`, resized to `image_size` x `image_size`.
    pub fn load(dir: &Path, image_size: i64) -> Result<EmojiDataset> {
        let files = image_files(dir)?;
        if files.is_empty() {
            return Err(GanError::EmptyDataset(dir.to_path_buf()));
        }
        let images = files
            .iter()
            .map(|file| tch::vision::image::load_and_resize(file, image_size, image_size))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(EmojiDataset::from_pixels(&Tensor::stack(&images, 0)))
    }

    /// Wraps `[N, 3, H, W]` pixels in [0, 255].
    pub fn from_pixels(pixels: &Tensor) -> EmojiDataset {
        let images = pixels.to_kind(Kind::Float) / 127.5 - 1.0;
        EmojiDataset { images }
    }

    pub fn len(&self) -> usize {
        self.images.size()[0] as usize
    }

    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.len().div_ceil(batch_size)
    }

    /// Shuffled minibatches covering the dataset once. The last batch may be short.
    pub fn batches<R: Rng>(&self, batch_size: usize, device: Device, rng: &mut R) -> Batches<'_> {
        let mut order: Vec<i64> = (0..self.len() as i64).collect();
        order.shuffle(rng);
        Batches { dataset: self, order, batch_size: batch_size.max(1), position: 0, device }
    }

    /// The first `count` images, in dataset order.
    pub fn head(&self, count: usize, device: Device) -> Tensor {
        let count = count.min(self.len()) as i64;
        self.images.narrow(0, 0, count).to_device(device)
    }
}

pub struct Batches<'a> {
    dataset: &'a EmojiDataset,
    order: Vec<i64>,
    batch_size: usize,
    position: usize,
    device: Device,
}

impl Iterator for Batches<'_> {
    type Item = Tensor;

    fn next(&mut self) -> Option<Tensor> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let index = Tensor::from_slice(&self.order[self.position..end]);
        self.position = end;
        Some(self.dataset.images.index_select(0, &index).to_device(self.device))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly in `dir` and in its immediate sub-directories, sorted.
fn image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            for inner in fs::read_dir(&path)? {
                let inner = inner?.path();
                if inner.is_file() && is_image(&inner) {
                    files.push(inner);
                }
            }
        } else if is_image(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dataset(n: i64) -> EmojiDataset {
        let pixels = Tensor::arange(n, (Kind::Float, Device::Cpu))
            .view([n, 1, 1, 1])
            .expand([n, 3, 2, 2], false);
        EmojiDataset::from_pixels(&pixels)
    }

    #[test]
    fn test_emoji_dirs() {
        let root = Path::new("emojis");
        assert_eq!(EmojiType::Apple.train_dir(root), PathBuf::from("emojis/Apple"));
        assert_eq!(EmojiType::Windows.test_dir(root), PathBuf::from("emojis/Test_Windows"));
    }

    #[test]
    fn test_pixels_normalized() {
        let pixels = Tensor::from_slice(&[0u8, 255u8, 0, 255]).view([1, 1, 2, 2]);
        let data = EmojiDataset::from_pixels(&pixels);
        assert_eq!(data.images.min().double_value(&[]), -1.0);
        assert_eq!(data.images.max().double_value(&[]), 1.0);
    }

    #[test]
    fn test_batches_cover_dataset_once() {
        let data = dataset(10);
        let mut rng = StdRng::seed_from_u64(11);
        let batches: Vec<Tensor> = data.batches(4, Device::Cpu, &mut rng).collect();
        assert_eq!(batches.len(), data.num_batches(4));
        let sizes: Vec<i64> = batches.iter().map(|b| b.size()[0]).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let mut seen: Vec<i64> = batches
            .iter()
            .flat_map(|b| {
                let first = b.select(1, 0).select(1, 0).select(1, 0);
                let pixels = ((first + 1.0) * 127.5).round().to_kind(Kind::Int64);
                Vec::<i64>::try_from(&pixels).unwrap()
            })
            .collect();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_batches_are_shuffled_by_rng() {
        let data = dataset(32);
        let first = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            data.batches(32, Device::Cpu, &mut rng).next().unwrap()
        };
        assert!(first(1).equal(&first(1)));
        assert!(!first(1).equal(&first(2)));
    }

    #[test]
    fn test_head() {
        let data = dataset(5);
        assert_eq!(data.head(3, Device::Cpu).size(), vec![3, 3, 2, 2]);
        assert_eq!(data.head(16, Device::Cpu).size(), vec![5, 3, 2, 2]);
    }

    #[test]
    fn test_load_empty_dir_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        match EmojiDataset::load(dir.path(), 32) {
            Err(GanError::EmptyDataset(path)) => assert_eq!(path, dir.path().to_path_buf()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_image_files_walks_class_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("class")).unwrap();
        std::fs::write(dir.path().join("class").join("b.png"), b"").unwrap();
        std::fs::write(dir.path().join("a.PNG"), b"").unwrap();
        std::fs::write(dir.path().join("skip.txt"), b"").unwrap();
        let files = image_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.PNG"), dir.path().join("class").join("b.png")]);
    }
}
