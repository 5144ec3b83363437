//! # Allocator Configuration
//!
//! Zone sizing is loaded once at startup, usually from a TOML file shipped
//! next to the simulation's other balance data.
//!
//! ```toml
//! zones_capacity = 4
//! initial_size = 1048576
//! ignore_size_restrictions = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, AllocResult};
use crate::memory::{align_up, ALIGNMENT, MAX_BLOCK_SIZE, ZONE_GRANULARITY};

/// Smallest zone size accepted without `ignore_size_restrictions` (512 KiB).
pub const MIN_ZONE_SIZE: u32 = 512 * 1024;

/// Smallest zone directory capacity accepted without `ignore_size_restrictions`.
pub const MIN_ZONES_CAPACITY: u32 = 1;

/// Sizing parameters for a [`MemoryAllocator`](crate::MemoryAllocator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Initial number of slots in the zone directory. Doubles when exhausted.
    pub zones_capacity: u32,
    /// Payload size of the first zone and the minimum size of grown zones.
    pub initial_size: u32,
    /// Skip the minimum-size clamps. Meant for tests and tiny tools.
    pub ignore_size_restrictions: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            zones_capacity: MIN_ZONES_CAPACITY,
            initial_size: MIN_ZONE_SIZE,
            ignore_size_restrictions: false,
        }
    }
}

impl AllocatorConfig {
    /// Creates a configuration with the given directory capacity and zone size.
    #[must_use]
    pub const fn new(zones_capacity: u32, initial_size: u32) -> Self {
        Self {
            zones_capacity,
            initial_size,
            ignore_size_restrictions: false,
        }
    }

    /// Returns the same configuration with the size clamps disabled.
    #[must_use]
    pub const fn unrestricted(mut self) -> Self {
        self.ignore_size_restrictions = true;
        self
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if the text is not valid TOML or
    /// a field has the wrong type.
    pub fn from_toml_str(text: &str) -> AllocResult<Self> {
        toml::from_str(text).map_err(|e| AllocError::InvalidConfig(e.to_string()))
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> AllocResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AllocError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Applies the size clamps and rounds the zone size to the zone granularity.
    ///
    /// This is the configuration the allocator actually runs with.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let (zones_capacity, initial_size) = if self.ignore_size_restrictions {
            (self.zones_capacity, self.initial_size.max(ALIGNMENT))
        } else {
            (
                self.zones_capacity.max(MIN_ZONES_CAPACITY),
                self.initial_size.max(MIN_ZONE_SIZE),
            )
        };

        Self {
            zones_capacity,
            initial_size: align_up(initial_size.min(MAX_BLOCK_SIZE), ZONE_GRANULARITY),
            ignore_size_restrictions: self.ignore_size_restrictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AllocatorConfig::default();
        assert_eq!(config.zones_capacity, 1);
        assert_eq!(config.initial_size, MIN_ZONE_SIZE);
        assert!(!config.ignore_size_restrictions);
    }

    #[test]
    fn test_normalized_clamps() {
        let config = AllocatorConfig::new(0, 1024).normalized();
        assert_eq!(config.zones_capacity, MIN_ZONES_CAPACITY);
        assert_eq!(config.initial_size, MIN_ZONE_SIZE);
    }

    #[test]
    fn test_normalized_unrestricted() {
        let config = AllocatorConfig::new(1, 1000).unrestricted().normalized();
        assert_eq!(config.zones_capacity, 1);
        assert_eq!(config.initial_size, 1000);

        // Rounded up to the zone granularity
        let config = AllocatorConfig::new(1, 61).unrestricted().normalized();
        assert_eq!(config.initial_size, 64);
    }

    #[test]
    fn test_from_toml() {
        let config = AllocatorConfig::from_toml_str(
            "zones_capacity = 4\ninitial_size = 2048\nignore_size_restrictions = true\n",
        )
        .unwrap();
        assert_eq!(config, AllocatorConfig::new(4, 2048).unrestricted());

        // Missing fields fall back to defaults
        let config = AllocatorConfig::from_toml_str("zones_capacity = 8").unwrap();
        assert_eq!(config.zones_capacity, 8);
        assert_eq!(config.initial_size, MIN_ZONE_SIZE);
    }

    #[test]
    fn test_from_toml_invalid() {
        let result = AllocatorConfig::from_toml_str("zones_capacity = \"many\"");
        assert!(matches!(result, Err(AllocError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_file() {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("test_zonemem_{id}.toml"));
        std::fs::write(&path, "initial_size = 4096\nignore_size_restrictions = true\n").unwrap();

        let config = AllocatorConfig::load(&path).unwrap();
        assert_eq!(config.initial_size, 4096);

        std::fs::remove_file(&path).ok();
        assert!(AllocatorConfig::load(&path).is_err());
    }
}
