// Device endpoint response types
//
// The hub's device service has grown several JSON spellings over time
// (`ScreenWidth` vs `screen_width`, `ID` vs `id`). Aliases accept each one;
// `#[serde(default)]` everywhere because fields come and go per provider.

use serde::{Deserialize, Serialize};

// ── Response envelope ────────────────────────────────────────────────

/// Envelope returned by `POST /device/{id}/{action}`.
///
/// ```json
/// { "message": "Tap executed", "result": ... }
/// ```
/// On failure the hub sets `error` instead and returns a non-2xx status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Older providers put screenshot data here instead of `result`.
    #[serde(default)]
    pub screenshot: Option<String>,
}

impl CommandResponse {
    /// Operator-facing confirmation, falling back to a generic message.
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("Action executed")
    }
}

// ── Device info ──────────────────────────────────────────────────────

/// `GET /device/{id}/info`, unwrapped from `result` when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, alias = "UDID")]
    pub udid: Option<String>,
    #[serde(default, alias = "Name")]
    pub name: Option<String>,
    #[serde(default, alias = "ScreenWidth", alias = "screenWidth")]
    pub screen_width: Option<u32>,
    #[serde(default, alias = "ScreenHeight", alias = "screenHeight")]
    pub screen_height: Option<u32>,
    #[serde(default, alias = "WorkspaceID", alias = "workspaceId")]
    pub workspace_id: Option<String>,
    /// Catch-all for provider-specific fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeviceInfo {
    /// Native screen size, if the provider reported both dimensions.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        match (self.screen_width, self.screen_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

// ── Workspace ────────────────────────────────────────────────────────

/// A workspace from `GET /admin/workspaces`. Workspaces scope the
/// availability feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(alias = "ID", alias = "_id")]
    pub id: String,
    #[serde(default, alias = "Name")]
    pub name: Option<String>,
    #[serde(default, alias = "IsDefault")]
    pub is_default: bool,
}

/// Paged listing wrapper: `{ "workspaces": [...] }` or `{ "Workspaces": [...] }`.
#[derive(Debug, Deserialize)]
pub(crate) struct WorkspacePage {
    #[serde(default, alias = "Workspaces")]
    pub workspaces: Vec<Workspace>,
}

/// Inventory wrapper: `{ "devices": [...] }` or `{ "Devices": [...] }`.
///
/// Records stay raw; their shape varies by provider.
#[derive(Debug, Deserialize)]
pub(crate) struct InventoryPage {
    #[serde(default, alias = "Devices")]
    pub devices: Vec<serde_json::Value>,
}

/// Pick the scope to subscribe to: the flagged default, else the first.
pub fn default_workspace(workspaces: &[Workspace]) -> Option<&Workspace> {
    workspaces
        .iter()
        .find(|w| w.is_default)
        .or_else(|| workspaces.first())
}

// ── Orientation ──────────────────────────────────────────────────────

/// Video stream orientation for `update-stream-settings`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Self::Portrait),
            "landscape" => Ok(Self::Landscape),
            other => Err(format!("unknown orientation '{other}' (expected portrait or landscape)")),
        }
    }
}
