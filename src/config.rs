/// Runtime configuration.
///
/// Loaded from a JSON file; every field is optional and falls back to the
/// defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Application name used for cache directories
const APP_DIR: &str = "photo-pipeline";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Maximum number of pending generation requests per queue
    pub queue_capacity: usize,
    /// Memory-tier entries kept for thumbnails
    pub thumbnail_cache_capacity: usize,
    /// Memory-tier entries kept for previews
    pub preview_cache_capacity: usize,
    /// Longest edge of generated thumbnails, in pixels
    pub thumbnail_size: u32,
    /// Longest edge of generated previews, in pixels
    pub preview_size: u32,
    /// JPEG quality for generated blobs (1-100)
    pub jpeg_quality: u8,
    /// Root of the persistent tiers; `None` uses the system cache directory
    pub cache_dir: Option<PathBuf>,
    /// Try the GPU compute strategy before the CPU fallback
    pub prefer_gpu: bool,
    /// Scale applied by draft-quality renders
    pub draft_scale: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: 200,
            thumbnail_cache_capacity: 150,
            preview_cache_capacity: 20,
            thumbnail_size: 256,
            preview_size: 2560,
            jpeg_quality: 90,
            cache_dir: None,
            prefer_gpu: true,
            draft_scale: 0.25,
        }
    }
}

impl Config {
    /// Parse a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be > 0".into()));
        }
        if self.thumbnail_cache_capacity == 0 || self.preview_cache_capacity == 0 {
            return Err(Error::Config("cache capacities must be > 0".into()));
        }
        if self.thumbnail_size == 0 || self.preview_size == 0 {
            return Err(Error::Config("generation sizes must be > 0".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if !(self.draft_scale > 0.0 && self.draft_scale <= 1.0) {
            return Err(Error::Config(format!(
                "draft_scale must be in (0, 1], got {}",
                self.draft_scale
            )));
        }
        Ok(())
    }

    /// Resolve the root directory for the persistent cache tiers.
    ///
    /// Returns `None` when no explicit directory is configured and the
    /// platform has no cache or home directory; callers degrade to
    /// memory-only caching in that case.
    pub fn cache_root(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Some(dir.clone());
        }
        let mut path = dirs_next::cache_dir().or_else(dirs_next::home_dir)?;
        path.push(APP_DIR);
        Some(path)
    }
}
