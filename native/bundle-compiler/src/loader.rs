//! Loads a bundle directory (`<namespace>/<name>/...`) from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::bundle::{BundleType, SourceBundle};
use crate::error::CompileError;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk bundle directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("bundle directory {dir} has no entry file {entry}")]
    MissingEntry { dir: PathBuf, entry: String },

    #[error(transparent)]
    Bundle(#[from] CompileError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LoaderError + '_ {
    move |source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Read every file under `dir` into a bundle whose entry is
/// `<namespace>/<name>/<name>.js`. Paths are relative to the directory two
/// levels up, so `modules/foo` yields `modules/foo/foo.js`.
pub fn load_bundle_dir(dir: impl AsRef<Path>, bundle_type: BundleType) -> Result<SourceBundle, LoaderError> {
    let dir = dir.as_ref();
    let dir = dir.canonicalize().map_err(io_error(dir))?;

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let root = match dir.parent() {
        Some(parent) if parent.file_name().is_some() => parent.parent().unwrap_or(parent),
        Some(parent) => parent,
        None => dir.as_path(),
    };

    let mut sources = Vec::new();
    let walker = WalkDir::new(&dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let text = fs::read_to_string(path).map_err(io_error(path))?;
        sources.push((relative, text));
    }

    let entry_path = match dir.strip_prefix(root) {
        Ok(rel) => format!("{}/{}.js", rel.to_string_lossy().replace('\\', "/"), name),
        Err(_) => format!("{}.js", name),
    };
    if !sources.iter().any(|(p, _)| *p == entry_path) {
        return Err(LoaderError::MissingEntry {
            dir: dir.clone(),
            entry: entry_path,
        });
    }

    debug!(dir = %dir.display(), files = sources.len(), entry = %entry_path, "loaded bundle directory");
    Ok(SourceBundle::new(&entry_path, sources, bundle_type)?)
}
