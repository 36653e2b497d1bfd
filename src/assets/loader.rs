use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::{
    assets::decode::{TraitPayload, decode_trait_image},
    foundation::error::{GenError, GenResult},
};

/// Collaborator that turns a source reference into a decoded payload.
///
/// Implementations are called from background decode threads and must be shareable.
pub trait TraitLoader: Send + Sync {
    /// Decode the trait image behind `source`.
    fn decode(&self, source: &str) -> anyhow::Result<TraitPayload>;
}

impl<F> TraitLoader for F
where
    F: Fn(&str) -> anyhow::Result<TraitPayload> + Send + Sync,
{
    fn decode(&self, source: &str) -> anyhow::Result<TraitPayload> {
        self(source)
    }
}

#[derive(Clone, Debug)]
/// Loads trait images from files below a root directory.
pub struct FsTraitLoader {
    root: PathBuf,
}

impl FsTraitLoader {
    /// Loader resolving sources relative to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory sources are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_bytes(&self, norm_path: &str) -> GenResult<Vec<u8>> {
        let path = self.root.join(Path::new(norm_path));
        std::fs::read(&path)
            .with_context(|| format!("read trait image from '{}'", path.display()))
            .map_err(GenError::from)
    }
}

impl TraitLoader for FsTraitLoader {
    fn decode(&self, source: &str) -> anyhow::Result<TraitPayload> {
        let norm = normalize_rel_path(source)?;
        let bytes = self.read_bytes(&norm)?;
        let payload =
            decode_trait_image(&bytes).with_context(|| format!("decode trait image '{norm}'"))?;
        Ok(payload)
    }
}

/// Normalize a relative source path: forward slashes, no `.` segments, no `..`, not absolute.
pub fn normalize_rel_path(source: &str) -> GenResult<String> {
    let s = source.replace('\\', "/");
    if s.is_empty() {
        return Err(GenError::validation("trait source path must be non-empty"));
    }
    if s.starts_with('/') || s.as_bytes().get(1) == Some(&b':') {
        return Err(GenError::validation(format!(
            "trait source path '{source}' must be relative"
        )));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(GenError::validation(format!(
                "trait source path '{source}' must not contain '..'"
            )));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(GenError::validation(format!(
            "trait source path '{source}' must contain a file name"
        )));
    }
    Ok(out.join("/"))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/loader.rs"]
mod tests;
