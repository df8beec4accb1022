//! Go fixture trees for unit tests

use std::fs;

use tempfile::TempDir;

use crate::config::LoaderConfig;
use crate::core::cancellation::CancellationFlag;
use crate::core::program::{PackageLoader, ProgramIndex};

pub const GO_MOD: &str = "module example.com/demo\n\ngo 1.21\n";

/// Write `(relative path, contents)` pairs into a fresh temporary directory
pub fn write_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, contents) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, contents).unwrap();
    }
    dir
}

/// Write and load a fixture tree; the directory must outlive the index
pub fn load_tree(files: &[(&str, &str)]) -> (TempDir, ProgramIndex) {
    let dir = write_tree(files);
    let mut loader = PackageLoader::new(LoaderConfig::default(), CancellationFlag::new()).unwrap();
    let index = loader.load(dir.path()).unwrap();
    (dir, index)
}
