// Device command and inventory endpoints
//
// Commands go to `POST /device/{id}/{action}`; reads are plain GETs.
// Admin listings (`/admin/devices`, `/admin/workspaces`) feed the roster
// seed and the scope picker.

use serde_json::json;
use tracing::debug;
use url::Url;

use crate::device::client::{DeviceClient, unwrap_result};
use crate::device::models::{
    CommandResponse, DeviceInfo, InventoryPage, Orientation, Workspace, WorkspacePage,
};
use crate::error::Error;

/// A command the device service can execute.
///
/// Coordinates are device-native pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Tap { x: i64, y: i64 },
    Swipe { x: i64, y: i64, end_x: i64, end_y: i64 },
    TypeText { text: String },
    Screenshot,
    UninstallApp { app: String },
    UpdateStreamSettings { orientation: Orientation },
    Home,
    Lock,
    Unlock,
}

impl DeviceCommand {
    /// Path segment under `/device/{id}/`.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Tap { .. } => "tap",
            Self::Swipe { .. } => "swipe",
            Self::TypeText { .. } => "typeText",
            Self::Screenshot => "screenshot",
            Self::UninstallApp { .. } => "uninstallApp",
            Self::UpdateStreamSettings { .. } => "update-stream-settings",
            Self::Home => "home",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }

    /// JSON request body, if the action takes one.
    pub fn body(&self) -> Option<serde_json::Value> {
        match self {
            Self::Tap { x, y } => Some(json!({ "x": x, "y": y })),
            Self::Swipe { x, y, end_x, end_y } => Some(json!({
                "x": x,
                "y": y,
                "endX": end_x,
                "endY": end_y,
            })),
            Self::TypeText { text } => Some(json!({ "text": text })),
            Self::UninstallApp { app } => Some(json!({ "app": app })),
            Self::UpdateStreamSettings { orientation } => {
                Some(json!({ "orientation": orientation.as_str() }))
            }
            Self::Screenshot | Self::Home | Self::Lock | Self::Unlock => None,
        }
    }
}

impl DeviceClient {
    /// Execute a command on a device.
    ///
    /// `POST /device/{id}/{action}`
    pub async fn send_command(
        &self,
        device_id: &str,
        command: &DeviceCommand,
    ) -> Result<CommandResponse, Error> {
        let url = self.device_url("device", device_id, command.action())?;
        debug!(device_id, action = command.action(), "sending device command");
        let body = command.body();
        let resp: Option<CommandResponse> = self.post(url, body.as_ref()).await?;
        Ok(resp.unwrap_or_default())
    }

    /// Capture the screen. Returns the base64-encoded PNG.
    pub async fn screenshot(&self, device_id: &str) -> Result<String, Error> {
        let resp = self.send_command(device_id, &DeviceCommand::Screenshot).await?;
        let data = match resp.result {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
            _ => resp.screenshot.filter(|s| !s.is_empty()),
        };
        data.ok_or_else(|| Error::Protocol("screenshot response carried no image data".into()))
    }

    /// Upload an application package and install it.
    ///
    /// `POST /device/{id}/uploadAndInstallApp` as multipart field `file`.
    pub async fn install_app(
        &self,
        device_id: &str,
        file_name: &str,
        package: Vec<u8>,
    ) -> Result<CommandResponse, Error> {
        let url = self.device_url("device", device_id, "uploadAndInstallApp")?;
        debug!(device_id, file_name, size = package.len(), "uploading app package");
        let part = reqwest::multipart::Part::bytes(package).file_name(file_name.to_owned());
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp: Option<CommandResponse> = self.post_multipart(url, form).await?;
        Ok(resp.unwrap_or_default())
    }

    /// Remove an installed application. Returns the remaining app list when
    /// the hub reports one.
    pub async fn uninstall_app(
        &self,
        device_id: &str,
        app: &str,
    ) -> Result<Option<Vec<String>>, Error> {
        let resp = self
            .send_command(
                device_id,
                &DeviceCommand::UninstallApp {
                    app: app.to_owned(),
                },
            )
            .await?;
        Ok(resp.result.map(app_names))
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// `GET /device/{id}/info`
    pub async fn info(&self, device_id: &str) -> Result<DeviceInfo, Error> {
        let url = self.device_url("device", device_id, "info")?;
        let raw: serde_json::Value = self.get(url).await?;
        let raw = unwrap_result(raw);
        serde_json::from_value(raw.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: raw.to_string(),
        })
    }

    /// `GET /device/{id}/health`. Shape is provider-defined.
    pub async fn health(&self, device_id: &str) -> Result<serde_json::Value, Error> {
        let url = self.device_url("device", device_id, "health")?;
        self.get(url).await
    }

    /// `GET /device/{id}/apps`
    pub async fn apps(&self, device_id: &str) -> Result<Vec<String>, Error> {
        let url = self.device_url("device", device_id, "apps")?;
        let raw: serde_json::Value = self.get(url).await?;
        Ok(app_names(unwrap_result(raw)))
    }

    /// Device inventory, raw per-device records.
    ///
    /// `GET /admin/devices`
    pub async fn list_inventory(&self) -> Result<Vec<serde_json::Value>, Error> {
        let url = self.url("admin/devices")?;
        let page: InventoryPage = self.get(url).await?;
        debug!(count = page.devices.len(), "listed device inventory");
        Ok(page.devices)
    }

    /// `GET /admin/workspaces?page=1&limit=50`
    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>, Error> {
        let mut url = self.url("admin/workspaces")?;
        url.query_pairs_mut()
            .append_pair("page", "1")
            .append_pair("limit", "50");
        let page: WorkspacePage = self.get(url).await?;
        Ok(page.workspaces)
    }

    /// Force-release a device held by another operator.
    ///
    /// `POST /admin/device/{id}/release`
    pub async fn release(&self, device_id: &str) -> Result<CommandResponse, Error> {
        let url = self.device_url("admin/device", device_id, "release")?;
        debug!(device_id, "force-releasing device");
        let resp: Option<CommandResponse> = self.post(url, None).await?;
        Ok(resp.unwrap_or_default())
    }

    /// MJPEG video URL for a device. Produced for external players, never
    /// fetched here.
    pub fn stream_url(&self, device_id: &str) -> Result<Url, Error> {
        let mut url = self.device_url("device", device_id, "ios-stream-mjpeg")?;
        url.set_query(Some(&self.auth().token_query()));
        Ok(url)
    }
}

/// App lists are usually strings; some providers send objects.
fn app_names(value: serde_json::Value) -> Vec<String> {
    let serde_json::Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(map) => ["bundleId", "package", "name"]
                .iter()
                .find_map(|k| map.get(*k).and_then(|v| v.as_str()).map(String::from)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn swipe_body_uses_camel_case_end_fields() {
        let cmd = DeviceCommand::Swipe {
            x: 540,
            y: 1170,
            end_x: 540,
            end_y: 878,
        };
        assert_eq!(cmd.action(), "swipe");
        assert_eq!(
            cmd.body(),
            Some(json!({"x": 540, "y": 1170, "endX": 540, "endY": 878}))
        );
    }

    #[test]
    fn bodyless_commands() {
        for cmd in [
            DeviceCommand::Screenshot,
            DeviceCommand::Home,
            DeviceCommand::Lock,
            DeviceCommand::Unlock,
        ] {
            assert!(cmd.body().is_none(), "{}", cmd.action());
        }
    }

    #[test]
    fn stream_settings_body() {
        let cmd = DeviceCommand::UpdateStreamSettings {
            orientation: Orientation::Landscape,
        };
        assert_eq!(cmd.action(), "update-stream-settings");
        assert_eq!(cmd.body(), Some(json!({"orientation": "landscape"})));
    }

    #[test]
    fn app_names_accepts_strings_and_objects() {
        let apps = app_names(json!(["com.a", {"bundleId": "com.b"}, {"name": "c"}, 7]));
        assert_eq!(apps, vec!["com.a", "com.b", "c"]);
        assert!(app_names(json!({"not": "a list"})).is_empty());
    }
}
