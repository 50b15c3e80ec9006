//! Mount configuration.
//!
//! A RON file naming the disc images to mount and the symbolic links to
//! register:
//!
//! ```ron
//! (
//!     mounts: [
//!         (mount_path: "\\Device\\Cdrom0", image: "~/games/disc.iso"),
//!     ],
//!     symlinks: {
//!         "game:": "\\Device\\Cdrom0",
//!     },
//! )
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::devices::DiscImageDevice;
use crate::error::VfsError;
use crate::mount::VirtualFileSystem;

/// One disc image to mount.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MountConfig {
    pub mount_path: String,
    /// Host path of the image. A leading `~` is expanded.
    pub image: PathBuf,
}

impl MountConfig {
    pub fn expanded_image(&self) -> PathBuf {
        shellexpand::tilde(&self.image.to_string_lossy())
            .as_ref()
            .into()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    pub mounts: Vec<MountConfig>,
    /// Link path to target path, e.g. `"game:"` to `"\\Device\\Cdrom0"`.
    pub symlinks: BTreeMap<String, String>,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("mount failed: {0}")]
    Vfs(#[from] VfsError),
}

impl VfsConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path: PathBuf = shellexpand::tilde(&path.as_ref().to_string_lossy())
            .as_ref()
            .into();
        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_ron_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            mounts = config.mounts.len(),
            symlinks = config.symlinks.len(),
            "loaded VFS config"
        );
        Ok(config)
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Mount every configured image and register every link.
    ///
    /// Stops at the first image that fails to mount; mounts made before
    /// it stay registered.
    pub fn apply(&self, vfs: &VirtualFileSystem) -> Result<(), ConfigError> {
        for mount in &self.mounts {
            let device = DiscImageDevice::open(&mount.mount_path, mount.expanded_image())?;
            vfs.register_device(Arc::new(device))?;
        }
        for (path, target) in &self.symlinks {
            vfs.register_symbolic_link(path, target);
        }
        Ok(())
    }
}
