use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{DataLocationKind, PortabilityConfig};

pub const STATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub from: DataLocationKind,
    pub to: DataLocationKind,
    pub started_at_unix: u64,
}

/// Persisted record of which data location the application runs from.
///
/// `pending` is written before any data is copied and cleared once the
/// superseded directory carries its deletion marker, so an interrupted
/// transition is visible on the next start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLocationState {
    pub version: u32,
    pub active: DataLocationKind,
    #[serde(default)]
    pub pending: Option<PendingTransition>,
}

impl ActiveLocationState {
    pub fn stable(active: DataLocationKind) -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            active,
            pending: None,
        }
    }

    pub fn begin_transition(
        from: DataLocationKind,
        to: DataLocationKind,
        started_at_unix: u64,
    ) -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            active: from,
            pending: Some(PendingTransition {
                from,
                to,
                started_at_unix,
            }),
        }
    }
}

pub fn read_active_location_state(path: &Path) -> Result<Option<ActiveLocationState>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read portability state file: {}", path.display())
            });
        }
    };

    let state: ActiveLocationState = serde_json::from_str(&raw).with_context(|| {
        format!("failed parsing portability state file: {}", path.display())
    })?;
    if state.version != STATE_FORMAT_VERSION {
        return Err(anyhow!(
            "unsupported portability state version {} in {}",
            state.version,
            path.display()
        ));
    }
    Ok(Some(state))
}

pub fn write_active_location_state(path: &Path, state: &ActiveLocationState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(state).with_context(|| {
        format!(
            "failed serializing portability state file: {}",
            path.display()
        )
    })?;

    let staged = path.with_extension("json.tmp");
    fs::write(&staged, content.as_bytes())
        .with_context(|| format!("failed writing portability state file: {}", staged.display()))?;
    fs::rename(&staged, path).with_context(|| {
        format!(
            "failed replacing portability state file {} with {}",
            path.display(),
            staged.display()
        )
    })
}

/// Location the application should run from.
///
/// A recorded location wins only while it still holds unmarked data;
/// otherwise portable is preferred when it holds unmarked data.
pub fn resolve_active_location(
    config: &PortabilityConfig,
    state: Option<&ActiveLocationState>,
) -> DataLocationKind {
    let usable = |kind: DataLocationKind| {
        let location = config.location(kind);
        location.has_data() && !location.is_marked_for_deletion()
    };

    if let Some(state) = state {
        if usable(state.active) {
            return state.active;
        }
        tracing::debug!(
            recorded = state.active.as_str(),
            "recorded active location holds no usable data; inferring from disk"
        );
    }

    if usable(DataLocationKind::Portable) {
        DataLocationKind::Portable
    } else {
        DataLocationKind::Roaming
    }
}

pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
