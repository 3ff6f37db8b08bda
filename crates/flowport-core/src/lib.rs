mod error;
mod location;
mod outcome;
mod settings;
mod state;

pub use error::{PortabilityError, VerificationMismatch};
pub use location::{
    location_exists, AppIdentity, ConfigOverrides, DataLocation, DataLocationKind,
    PortabilityConfig, DELETION_INDICATOR_FILE, PORTABLE_DATA_DIR_NAME, STATE_FILE_NAME,
};
pub use outcome::MigrationOutcome;
pub use settings::{LauncherSettings, LAUNCHER_SETTINGS_FILE};
pub use state::{
    current_unix_timestamp, read_active_location_state, resolve_active_location,
    write_active_location_state, ActiveLocationState, PendingTransition, STATE_FORMAT_VERSION,
};
