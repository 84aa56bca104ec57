use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use stylecast_core::types::Container;

use crate::error::{RenderError, Result};
use crate::rasterize::{container_shell, Rasterizer};

// ---------------------------------------------------------------------------
// Cache key
// ---------------------------------------------------------------------------

/// Content address of one rasterized container: the first 16 hex characters
/// of `SHA-256(html || css || outputName)`. A pure function of the three
/// inputs, so two renders collide exactly when all of them match.
pub fn cache_key(html: &str, css: &str, output_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(html.as_bytes());
    hasher.update(css.as_bytes());
    hasher.update(output_name.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

// ---------------------------------------------------------------------------
// ContainerCache
// ---------------------------------------------------------------------------

/// On-disk PNG store for rasterized containers, one `<key>.png` per entry.
/// Keys touched during a run are remembered; [`ContainerCache::sweep`]
/// removes everything else at the end of the run.
pub struct ContainerCache {
    dir: PathBuf,
    active: HashSet<String>,
}

impl ContainerCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            active: HashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.png"))
    }

    /// Marks a key live for this run without rendering.
    pub fn mark_active(&mut self, key: impl Into<String>) {
        self.active.insert(key.into());
    }

    /// Where the container's PNG lives (or would live), marking the key
    /// active but rendering nothing. Used by dry runs and graph-only
    /// compiles.
    pub fn locate(&mut self, container: &Container, css: &str, output_name: &str) -> PathBuf {
        let key = cache_key(&container.html, css, output_name);
        let path = self.entry_path(&key);
        self.mark_active(key);
        path
    }

    /// Returns the cached PNG for the container, rendering it first if the
    /// cache has no entry. The key is marked active either way.
    pub fn get_or_render(
        &mut self,
        container: &Container,
        css: &str,
        output_name: &str,
        width: u32,
        height: u32,
        rasterizer: &dyn Rasterizer,
    ) -> Result<PathBuf> {
        let key = cache_key(&container.html, css, output_name);
        let path = self.entry_path(&key);
        self.mark_active(key.clone());

        if path.exists() {
            debug!(container = %container.id, key = %key, "container cache hit");
            return Ok(path);
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| RenderError::CacheIo {
            path: self.dir.clone(),
            source,
        })?;
        let shell = container_shell(&container.html, css, width, height);
        rasterizer.render_png(&shell, width, height, &path)?;
        info!(container = %container.id, key = %key, "container rasterized");
        Ok(path)
    }

    /// Deletes every cache file whose key was not marked active during this
    /// run. Returns the number of removed entries; safe to repeat.
    pub fn sweep(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|source| RenderError::CacheIo {
            path: self.dir.clone(),
            source,
        })?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|source| RenderError::CacheIo {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if self.active.contains(key) {
                continue;
            }
            std::fs::remove_file(&path).map_err(|source| RenderError::CacheIo {
                path: path.clone(),
                source,
            })?;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "swept stale container cache entries");
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Writes a marker byte instead of launching a browser, counting calls.
    struct FakeRasterizer {
        calls: Cell<usize>,
    }

    impl FakeRasterizer {
        fn new() -> Self {
            Self { calls: Cell::new(0) }
        }
    }

    impl Rasterizer for FakeRasterizer {
        fn render_png(&self, _html: &str, _w: u32, _h: u32, out: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            std::fs::write(out, b"png").map_err(RenderError::Io)
        }
    }

    fn container(id: &str, html: &str) -> Container {
        Container {
            id: id.to_string(),
            html: html.to_string(),
        }
    }

    #[test]
    fn key_is_pure_and_sensitive_to_every_input() {
        let base = cache_key("<div>hi</div>", "body{color:red}", "yt");
        assert_eq!(base.len(), 16);
        assert!(base.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(base, cache_key("<div>hi</div>", "body{color:red}", "yt"));
        assert_ne!(base, cache_key("<div>ho</div>", "body{color:red}", "yt"));
        assert_ne!(base, cache_key("<div>hi</div>", "body{color:blue}", "yt"));
        assert_ne!(base, cache_key("<div>hi</div>", "body{color:red}", "ig"));
    }

    #[test]
    fn key_matches_reference_digest() {
        // SHA-256("<div>hi</div>" || "body{color:red}" || "yt"), first 16 hex.
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"<div>hi</div>body{color:red}yt");
            format!("{:x}", hasher.finalize())[..16].to_string()
        };
        assert_eq!(cache_key("<div>hi</div>", "body{color:red}", "yt"), expected);
    }

    #[test]
    fn get_or_render_reuses_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ContainerCache::new(dir.path());
        let rasterizer = FakeRasterizer::new();
        let c = container("intro", "<div>hi</div>");

        let first = cache
            .get_or_render(&c, "css", "yt", 1920, 1080, &rasterizer)
            .unwrap();
        assert!(first.exists());
        assert_eq!(rasterizer.calls.get(), 1);

        let second = cache
            .get_or_render(&c, "css", "yt", 1920, 1080, &rasterizer)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(rasterizer.calls.get(), 1, "second run must hit the cache");
    }

    #[test]
    fn sweep_removes_only_inactive_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ContainerCache::new(dir.path());
        let rasterizer = FakeRasterizer::new();

        let live = cache
            .get_or_render(&container("live", "<p>a</p>"), "", "yt", 100, 100, &rasterizer)
            .unwrap();
        let stale = dir.path().join("deadbeefdeadbeef.png");
        std::fs::write(&stale, b"old").unwrap();
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&unrelated, b"keep").unwrap();

        let removed = cache.sweep().unwrap();
        assert_eq!(removed, 1);
        assert!(live.exists());
        assert!(!stale.exists());
        assert!(unrelated.exists(), "non-png files are left alone");

        // Idempotent.
        assert_eq!(cache.sweep().unwrap(), 0);
    }

    #[test]
    fn active_keys_accumulate_across_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ContainerCache::new(dir.path());
        let rasterizer = FakeRasterizer::new();
        let c = container("intro", "<div>hi</div>");

        let for_yt = cache
            .get_or_render(&c, "css", "yt", 1920, 1080, &rasterizer)
            .unwrap();
        let for_ig = cache
            .get_or_render(&c, "css", "ig", 1080, 1920, &rasterizer)
            .unwrap();
        assert_ne!(for_yt, for_ig, "output name is part of the key");

        cache.sweep().unwrap();
        assert!(for_yt.exists());
        assert!(for_ig.exists());
    }

    #[test]
    fn sweep_of_missing_dir_is_a_no_op() {
        let cache = ContainerCache::new("/tmp/stylecast-cache-never-created");
        assert_eq!(cache.sweep().unwrap(), 0);
    }
}
