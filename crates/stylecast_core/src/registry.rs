use std::collections::HashMap;

use crate::error::{CompileError, Result};
use crate::types::Asset;

// ---------------------------------------------------------------------------
// AssetRegistry
// ---------------------------------------------------------------------------

/// Assets indexed by name, each holding a stable integer input index in
/// declaration order. The index order determines the emitted `-i` order and
/// the `<index>:v` / `<index>:a` stream labels inside the filter graph.
/// Virtual assets (rasterized containers) are appended after the declared
/// ones in their allocation order.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    assets: Vec<Asset>,
    index: HashMap<String, usize>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a declared asset. Duplicate names are a structural error.
    pub fn insert(&mut self, asset: Asset) -> Result<()> {
        if self.index.contains_key(&asset.name) {
            return Err(CompileError::ProjectStructural(format!(
                "duplicate asset name: {}",
                asset.name
            )));
        }
        self.index.insert(asset.name.clone(), self.assets.len());
        self.assets.push(asset);
        Ok(())
    }

    /// Registers (or refreshes) a virtual asset produced by container
    /// rasterization. Re-registering the same name keeps its index stable.
    pub fn register_virtual(&mut self, asset: Asset) {
        if let Some(&i) = self.index.get(&asset.name) {
            self.assets[i] = asset;
        } else {
            self.index.insert(asset.name.clone(), self.assets.len());
            self.assets.push(asset);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.index.get(name).map(|&i| &self.assets[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Asset> {
        let i = *self.index.get(name)?;
        Some(&mut self.assets[i])
    }

    pub fn expect(&self, name: &str) -> Result<&Asset> {
        self.get(name)
            .ok_or_else(|| CompileError::UnknownAsset(name.to_string()))
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownAsset(name.to_string()))
    }

    /// Input stream label for the asset's video stream.
    pub fn video_label(&self, name: &str) -> Result<String> {
        let asset = self.expect(name)?;
        if !asset.has_video {
            return Err(CompileError::AssetLacksVideo(name.to_string()));
        }
        Ok(format!("{}:v", self.index_of(name)?))
    }

    /// Input stream label for the asset's audio stream, `None` when the
    /// asset has no audio and silence must be synthesized instead.
    pub fn audio_label(&self, name: &str) -> Result<Option<String>> {
        let asset = self.expect(name)?;
        if !asset.has_audio {
            return Ok(None);
        }
        Ok(Some(format!("{}:a", self.index_of(name)?)))
    }

    /// Assets in input-index order.
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Asset> {
        self.assets.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
