// ── Device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::device_id::DeviceId;
use super::geometry::Resolution;

/// One device's availability as pushed by the feed.
///
/// A partial update: `None` means the field was absent on the wire and the
/// roster's value must be kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub connected: Option<bool>,
    pub available: Option<bool>,
    pub in_use: Option<bool>,
    pub in_use_by: Option<String>,
    pub resolution: Option<Resolution>,
    /// When the batch carrying this snapshot was received.
    pub seen_at: Option<DateTime<Utc>>,
}

impl DeviceSnapshot {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            connected: None,
            available: None,
            in_use: None,
            in_use_by: None,
            resolution: None,
            seen_at: None,
        }
    }
}

/// Coarse status for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum DeviceStatus {
    #[strum(serialize = "offline")]
    Offline,
    #[strum(serialize = "in use")]
    InUse,
    #[strum(serialize = "available")]
    Available,
    #[strum(serialize = "unavailable")]
    Unavailable,
}

/// The operator's long-lived view of one device.
///
/// Seeded from the inventory listing, then overlaid with availability
/// snapshots. The identifier is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    id: DeviceId,
    pub name: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub provider: Option<String>,
    pub usage: Option<String>,
    pub workspace_id: Option<String>,
    pub resolution: Option<Resolution>,
    pub connected: bool,
    pub available: bool,
    pub in_use: bool,
    pub in_use_by: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl RosterEntry {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            os: None,
            os_version: None,
            provider: None,
            usage: None,
            workspace_id: None,
            resolution: None,
            connected: false,
            available: false,
            in_use: false,
            in_use_by: None,
            last_seen: None,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Name if known, else the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// `"iOS 17.4"`, `"Android"`, or empty.
    pub fn platform(&self) -> String {
        match (&self.os, &self.os_version) {
            (Some(os), Some(v)) => format!("{os} {v}"),
            (Some(os), None) => os.clone(),
            (None, Some(v)) => v.clone(),
            (None, None) => String::new(),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        if !self.connected {
            DeviceStatus::Offline
        } else if self.in_use {
            DeviceStatus::InUse
        } else if self.available {
            DeviceStatus::Available
        } else {
            DeviceStatus::Unavailable
        }
    }

    /// Overlay the fields present in `snapshot`. Returns `true` if anything
    /// changed. Snapshots for other devices are ignored.
    pub fn overlay(&mut self, snapshot: &DeviceSnapshot) -> bool {
        if snapshot.id != self.id {
            return false;
        }

        let before = self.clone();
        if let Some(connected) = snapshot.connected {
            self.connected = connected;
        }
        if let Some(available) = snapshot.available {
            self.available = available;
        }
        if let Some(in_use) = snapshot.in_use {
            self.in_use = in_use;
            if !in_use {
                self.in_use_by = None;
            }
        }
        if let Some(by) = &snapshot.in_use_by {
            self.in_use_by = Some(by.clone());
        }
        if let Some(resolution) = snapshot.resolution {
            self.resolution = Some(resolution);
        }
        if let Some(seen_at) = snapshot.seen_at {
            self.last_seen = Some(seen_at);
        }
        *self != before
    }
}
