//! Device identity and the "initialized before" flag.
//!
//! This is the only state that survives a restart; the feed buffer does not.
//! The flag decides whether the session raises `Notice::FirstLoad`, which the
//! viewer answers with the one-time welcome hint.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub device_id: String,
    #[serde(default)]
    pub initialized: bool,
}

/// Persisted [`DeviceState`] plus where it lives.
pub struct DeviceStore {
    path: PathBuf,
    state: DeviceState,
}

impl DeviceStore {
    /// Load the device file, creating a fresh identity if there is none.
    pub fn open(path: &Path) -> Result<Self> {
        let state = match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!("device: loaded {}", path.display());
                toml::from_str(&text)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let state = DeviceState {
                    device_id: uuid::Uuid::new_v4().to_string(),
                    initialized: false,
                };
                info!("device: first launch, new device id {}", state.device_id);
                write_state(path, &state)?;
                state
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.state.device_id
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    /// Record that this device has received its first feed. Idempotent.
    pub fn mark_initialized(&mut self) -> Result<()> {
        if self.state.initialized {
            return Ok(());
        }
        self.state.initialized = true;
        write_state(&self.path, &self.state)?;
        info!("device: marked initialized");
        Ok(())
    }
}

fn write_state(path: &Path, state: &DeviceState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = toml::to_string(state).context("failed to serialize device state")?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Resolve the XDG state path for feedcast.
pub fn device_path() -> Option<PathBuf> {
    let state_dir = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("state"))
        })?;
    Some(state_dir.join("feedcast").join("device.toml"))
}
