use serde::{Deserialize, Serialize};

use crate::devices::{Device, PowerState};

/// All WebSocket events sent to connected dashboard clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    /// Full device list, sent once when a client connects
    Snapshot { devices: Vec<Device> },
    /// A device was added
    DeviceAdded { device_id: String, name: String },
    /// A device record, schedule, policy or preferences changed
    DeviceUpdated { device_id: String },
    /// A device was removed
    DeviceDeleted { device_id: String },
    /// A device changed power state
    DeviceToggled {
        device_id: String,
        status: PowerState,
        overridden: bool,
    },
    /// Parental controls refused a toggle
    ToggleDenied { device_id: String, reason: String },
    /// The settings document was written to storage
    SettingsSaved,
    /// Somebody signed in (`Some`) or out (`None`)
    SessionChanged { username: Option<String> },
    /// A snapshot could not be written; in-memory state is still current
    StorageWarning { key: String, message: String },
}
