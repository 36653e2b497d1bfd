use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::{
    assets::cache::ResolveStatus,
    assets::decode::TraitPayload,
    foundation::core::{CombinationKey, PositionIndex, TraitKey, VariantId},
    foundation::error::{GenError, GenResult},
};

/// Configuration handed to an [`ItemSink`] before the first item.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SinkConfig {
    /// Collection name.
    pub collection: String,
    /// Number of items that will be pushed on success.
    pub size: u64,
    /// Global seed of the run.
    pub seed: u64,
    /// Worker partitioning used to derive random substreams.
    pub workers: u32,
    /// Duplicate policy of the run.
    pub allow_duplicates: bool,
}

/// One filled grid slot of a collection item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedLayer {
    /// Grid slot.
    pub position: PositionIndex,
    /// Chosen variant.
    pub variant: VariantId,
    /// Cache-backed decoded image.
    pub payload: TraitPayload,
    /// How the cache served the payload.
    pub status: ResolveStatus,
}

/// A sampled combination with its payloads, ready for the compositor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionItem {
    /// 0-based item index.
    pub index: u64,
    /// Sampled combination.
    pub key: CombinationKey,
    /// Filled slots in position order; empty optional slots are omitted.
    pub layers: Vec<ResolvedLayer>,
}

/// Consumer of generated items.
///
/// Ordering contract: `push_item` is called in strictly increasing item index order.
pub trait ItemSink: Send {
    /// Called once before any item is pushed.
    fn begin(&mut self, cfg: SinkConfig) -> GenResult<()>;
    /// Push one item.
    fn push_item(&mut self, item: &CollectionItem) -> GenResult<()>;
    /// Called once after the last item of a successful run.
    fn end(&mut self) -> GenResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    items: Vec<CollectionItem>,
    finished: bool,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    /// Items in push order.
    pub fn items(&self) -> &[CollectionItem] {
        &self.items
    }

    /// `true` once `end` was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl ItemSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> GenResult<()> {
        self.cfg = Some(cfg);
        self.items.clear();
        self.finished = false;
        Ok(())
    }

    fn push_item(&mut self, item: &CollectionItem) -> GenResult<()> {
        self.items.push(item.clone());
        Ok(())
    }

    fn end(&mut self) -> GenResult<()> {
        self.finished = true;
        Ok(())
    }
}

/// Serialized record of a generated collection.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    /// Collection name.
    pub collection: String,
    /// Global seed of the run.
    pub seed: u64,
    /// Worker partitioning of the run.
    pub workers: u32,
    /// Duplicate policy of the run.
    pub allow_duplicates: bool,
    /// Items in index order.
    pub items: Vec<ManifestItem>,
}

/// One manifest line.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManifestItem {
    /// 0-based item index.
    pub index: u64,
    /// Hex FNV-1a fingerprint of the combination.
    pub fingerprint: String,
    /// Human-readable combination (`1:a|2:-|...`).
    pub combination: String,
    /// Filled slots in position order.
    pub traits: Vec<TraitKey>,
}

/// Sink that writes a JSON [`Manifest`] of combination keys when the run ends.
///
/// Nothing is written for a run that fails or is cancelled.
#[derive(Debug)]
pub struct ManifestSink {
    path: PathBuf,
    manifest: Option<Manifest>,
}

impl ManifestSink {
    /// Sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            manifest: None,
        }
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Manifest collected so far.
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }
}

impl ItemSink for ManifestSink {
    fn begin(&mut self, cfg: SinkConfig) -> GenResult<()> {
        self.manifest = Some(Manifest {
            collection: cfg.collection,
            seed: cfg.seed,
            workers: cfg.workers,
            allow_duplicates: cfg.allow_duplicates,
            items: Vec::with_capacity(cfg.size.min(4096) as usize),
        });
        Ok(())
    }

    fn push_item(&mut self, item: &CollectionItem) -> GenResult<()> {
        let manifest = self
            .manifest
            .as_mut()
            .ok_or_else(|| GenError::validation("manifest sink used before begin"))?;
        manifest.items.push(ManifestItem {
            index: item.index,
            fingerprint: format!("{:016x}", item.key.fingerprint()),
            combination: item.key.to_string(),
            traits: item.key.trait_keys().collect(),
        });
        Ok(())
    }

    fn end(&mut self) -> GenResult<()> {
        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| GenError::validation("manifest sink ended before begin"))?;
        ensure_parent_dir(&self.path)?;
        let f = File::create(&self.path)
            .with_context(|| format!("create manifest '{}'", self.path.display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, manifest)
            .map_err(|e| GenError::serde(format!("write manifest JSON: {e}")))?;
        w.flush()
            .with_context(|| format!("flush manifest '{}'", self.path.display()))?;
        tracing::info!(path = %self.path.display(), items = manifest.items.len(), "wrote manifest");
        Ok(())
    }
}

/// Create the parent directory of `path` if it is missing.
pub fn ensure_parent_dir(path: &Path) -> GenResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/generate/sink.rs"]
mod tests;
