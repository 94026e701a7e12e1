use std::path::{Path, PathBuf};

pub mod command;
pub mod config;
pub mod decode;
pub mod encode;
pub mod info;
pub mod progress;

/// `base_path` with its extension replaced by `ext`, or `explicit` when given.
pub fn output_path(base_path: &Path, ext: &str, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None if base_path.as_os_str() == "-" => PathBuf::from(format!("out.{ext}")),
        None => base_path.with_extension(ext),
    }
}
