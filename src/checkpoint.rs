//! Saving and restoring model weights.
//!
//! A checkpoint directory holds one `{name}.ot` file per `VarStore` plus the
//! `opts.json` the run was started with.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tch::nn;

use crate::error::{GanError, Result};

pub fn weights_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.ot"))
}

pub fn save(dir: &Path, stores: &[(&str, &nn::VarStore)]) -> Result<()> {
    fs::create_dir_all(dir)?;
    for (name, vs) in stores {
        vs.save(weights_path(dir, name))?;
    }
    tracing::debug!(dir = %dir.display(), "saved checkpoint");
    Ok(())
}

/// Restores every store from `dir`; all files must exist before any is loaded.
pub fn load(dir: &Path, stores: &mut [(&str, &mut nn::VarStore)]) -> Result<()> {
    for (name, _) in stores.iter() {
        let path = weights_path(dir, name);
        if !path.is_file() {
            return Err(GanError::MissingCheckpoint(path));
        }
    }
    for (name, vs) in stores.iter_mut() {
        vs.load(weights_path(dir, name))?;
        tracing::info!("Loaded: {}", weights_path(dir, name).display());
    }
    Ok(())
}

pub fn write_options<T: Serialize>(dir: &Path, opts: &T) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("opts.json"), serde_json::to_string_pretty(opts)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind, Tensor};

    fn store(value: f64) -> nn::VarStore {
        let vs = nn::VarStore::new(Device::Cpu);
        let _w = vs.root().var("w", &[2, 2], nn::Init::Const(value));
        vs
    }

    #[test]
    fn test_save_then_load_restores_weights() {
        let dir = tempfile::TempDir::new().unwrap();
        let ckpt = dir.path().join("nested").join("ckpt");
        let g = store(1.5);
        let d = store(-2.0);
        save(&ckpt, &[("G", &g), ("D", &d)]).unwrap();
        assert!(weights_path(&ckpt, "G").is_file());

        let mut g2 = store(0.0);
        let mut d2 = store(0.0);
        load(&ckpt, &mut [("G", &mut g2), ("D", &mut d2)]).unwrap();
        let expected = Tensor::full([2, 2], 1.5, (Kind::Float, Device::Cpu));
        assert!(g2.variables()["w"].allclose(&expected, 1e-6, 1e-6, false));
        assert_eq!(d2.variables()["w"].double_value(&[0, 0]), -2.0);
    }

    #[test]
    fn test_load_missing_file_leaves_stores_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        save(dir.path(), &[("G", &store(3.0))]).unwrap();

        let mut g = store(0.0);
        let mut d = store(0.0);
        let err = load(dir.path(), &mut [("G", &mut g), ("D", &mut d)]).unwrap_err();
        assert!(matches!(err, GanError::MissingCheckpoint(ref p) if p.ends_with("D.ot")));
        assert_eq!(g.variables()["w"].double_value(&[0, 0]), 0.0);
    }

    #[test]
    fn test_write_options() {
        #[derive(Serialize)]
        struct Opts {
            lr: f64,
        }
        let dir = tempfile::TempDir::new().unwrap();
        write_options(dir.path(), &Opts { lr: 0.5 }).unwrap();
        let text = std::fs::read_to_string(dir.path().join("opts.json")).unwrap();
        assert!(text.contains("\"lr\": 0.5"));
    }
}
