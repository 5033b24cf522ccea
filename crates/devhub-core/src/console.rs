// ── Console facade ──
//
// One hub, one operator. Owns the command client, the live roster and the
// availability transport; hands out control views for single devices.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use devhub_api::device::{CommandResponse, DeviceInfo, Workspace, default_workspace};
use devhub_api::{
    AuthContext, ControlSession, ControlSessionConfig, DeviceClient, DeviceCommand,
    HttpAvailabilityTransport, SessionState, TerminationReason,
};

use crate::config::ConsoleConfig;
use crate::convert;
use crate::error::CoreError;
use crate::gesture::{Direction, GestureIntent, GestureMapper, GestureTracker, directional_swipe};
use crate::model::{DeviceId, Resolution, SurfaceRect};
use crate::roster::Roster;
use crate::store::{FeedStatus, LiveRoster};
use crate::stream::RosterStream;

// ── Console ──────────────────────────────────────────────────────────

/// Entry point for consumers.
///
/// Cheaply cloneable. Creating one does no I/O; call
/// [`start_live`](Self::start_live) to seed the roster and follow the feed.
#[derive(Clone)]
pub struct Console {
    inner: Arc<ConsoleInner>,
}

struct ConsoleInner {
    config: ConsoleConfig,
    auth: AuthContext,
    client: DeviceClient,
    feed: Arc<HttpAvailabilityTransport>,
    live: LiveRoster,
}

impl Console {
    pub fn new(config: ConsoleConfig) -> Result<Self, CoreError> {
        let transport = config.transport();
        let auth = AuthContext::new(config.token.clone(), config.username.clone());
        let client = DeviceClient::new(config.url.clone(), auth.clone(), &transport)?;
        let feed = Arc::new(HttpAvailabilityTransport::new(
            transport.build_streaming_client()?,
            config.url.clone(),
        ));

        Ok(Self {
            inner: Arc::new(ConsoleInner {
                config,
                auth,
                client,
                feed,
                live: LiveRoster::new(Roster::new()),
            }),
        })
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.inner.config
    }

    /// The underlying command client, for endpoints without a wrapper here.
    pub fn client(&self) -> &DeviceClient {
        &self.inner.client
    }

    // ── Listings ─────────────────────────────────────────────────────

    pub async fn workspaces(&self) -> Result<Vec<Workspace>, CoreError> {
        Ok(self.inner.client.list_workspaces().await?)
    }

    /// The workspace the feed should follow: the configured one, else the
    /// hub's default.
    pub async fn resolve_scope(&self) -> Result<String, CoreError> {
        if let Some(ws) = &self.inner.config.workspace {
            return Ok(ws.clone());
        }
        let workspaces = self.workspaces().await?;
        default_workspace(&workspaces)
            .map(|ws| ws.id.clone())
            .ok_or(CoreError::NoWorkspace)
    }

    /// Re-read the inventory and replace the roster with it.
    pub async fn load_roster(&self) -> Result<Arc<Roster>, CoreError> {
        let records = self.inner.client.list_inventory().await?;
        let roster: Roster = records
            .iter()
            .filter_map(|record| {
                let entry = convert::entry_from_inventory(record);
                if entry.is_none() {
                    warn!(record = %record, "inventory record has no identifier");
                }
                entry
            })
            .collect();
        debug!(devices = roster.len(), "roster seeded from inventory");
        self.inner.live.reseed(roster);
        Ok(self.inner.live.snapshot())
    }

    // ── Live roster ──────────────────────────────────────────────────

    /// Seed the roster and follow the availability feed for the resolved
    /// scope. Returns that scope.
    pub async fn start_live(&self) -> Result<String, CoreError> {
        self.load_roster().await?;
        let scope = self.resolve_scope().await?;
        self.switch_scope(scope.clone());
        Ok(scope)
    }

    /// Follow a different workspace. The previous subscription is cancelled
    /// before the new one opens.
    pub fn switch_scope(&self, scope: impl Into<String>) {
        self.inner.live.follow(
            Arc::clone(&self.inner.feed),
            scope,
            self.inner.auth.clone(),
            self.inner.config.reconnect(),
        );
    }

    pub fn roster(&self) -> Arc<Roster> {
        self.inner.live.snapshot()
    }

    pub fn subscribe(&self) -> RosterStream {
        self.inner.live.subscribe()
    }

    pub fn feed_status(&self) -> FeedStatus {
        self.inner.live.feed_status()
    }

    pub fn feed_receiver(&self) -> watch::Receiver<FeedStatus> {
        self.inner.live.feed_receiver()
    }

    /// Stop following the feed. The roster keeps its last state.
    pub fn stop(&self) {
        self.inner.live.stop();
    }

    // ── Single-device operations ─────────────────────────────────────

    pub async fn device_info(&self, device: &DeviceId) -> Result<DeviceInfo, CoreError> {
        self.inner
            .client
            .info(device.as_str())
            .await
            .map_err(|e| not_found(e, device))
    }

    /// Native resolution, from the roster when known, else from the device.
    pub async fn resolution(&self, device: &DeviceId) -> Result<Resolution, CoreError> {
        if let Some(resolution) = self.roster().get(device).and_then(|e| e.resolution) {
            return Ok(resolution);
        }
        let info = self.device_info(device).await?;
        convert::resolution_from_info(&info).ok_or_else(|| CoreError::ResolutionUnknown {
            device: device.to_string(),
        })
    }

    /// Send one command without a control session.
    pub async fn send(
        &self,
        device: &DeviceId,
        command: &DeviceCommand,
    ) -> Result<CommandResponse, CoreError> {
        self.inner
            .client
            .send_command(device.as_str(), command)
            .await
            .map_err(|e| not_found(e, device))
    }

    /// Force-release a device reserved by someone else.
    pub async fn release(&self, device: &DeviceId) -> Result<CommandResponse, CoreError> {
        self.inner
            .client
            .release(device.as_str())
            .await
            .map_err(|e| not_found(e, device))
    }

    /// Open a control view: look up the resolution, then start a session.
    ///
    /// The video surface starts degenerate; gestures map once
    /// [`ControlView::set_surface`] is called.
    pub async fn control_view(&self, device: DeviceId) -> Result<ControlView, CoreError> {
        let resolution = match self.resolution(&device).await {
            Ok(resolution) => Some(resolution),
            Err(CoreError::ResolutionUnknown { .. }) => None,
            Err(e) => return Err(e),
        };
        let mut view = ControlView {
            console: self.clone(),
            device,
            session: None,
            tracker: GestureTracker::new(GestureMapper::new(
                SurfaceRect::new(0.0, 0.0, 0.0, 0.0),
                resolution,
            )),
        };
        view.reconnect()?;
        Ok(view)
    }

    fn open_session(&self, device: &DeviceId) -> Result<ControlSession, CoreError> {
        let config: ControlSessionConfig = self.inner.config.control_session();
        let session = ControlSession::open(
            &self.inner.config.url,
            device.as_str(),
            &self.inner.auth,
            config,
            &self.inner.config.transport(),
        )?;
        info!(device = %device, "control session opening");
        Ok(session)
    }
}

fn not_found(err: devhub_api::Error, device: &DeviceId) -> CoreError {
    if err.is_not_found() {
        CoreError::DeviceNotFound {
            identifier: device.to_string(),
        }
    } else {
        err.into()
    }
}

// ── ControlView ──────────────────────────────────────────────────────

/// One device under remote control.
///
/// Holds at most one control session; [`reconnect`](Self::reconnect) closes
/// the current session before opening the next. Gestures and commands are
/// dispatched only while the session is active. Dropping the view closes
/// its session.
pub struct ControlView {
    console: Console,
    device: DeviceId,
    session: Option<ControlSession>,
    tracker: GestureTracker,
}

impl ControlView {
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Terminated(TerminationReason::Cancelled), ControlSession::state)
    }

    pub fn state_receiver(&self) -> Option<watch::Receiver<SessionState>> {
        self.session.as_ref().map(ControlSession::state_receiver)
    }

    /// Wait for the session to leave `Connecting`. Errors if it terminated
    /// instead of becoming active.
    pub async fn ready(&self) -> Result<(), CoreError> {
        let Some(mut rx) = self.state_receiver() else {
            return Err(CoreError::SessionNotActive);
        };
        let state = match rx.wait_for(|s| *s != SessionState::Connecting).await {
            Ok(state) => *state,
            Err(_) => SessionState::Terminated(TerminationReason::Closed),
        };
        check_active(state)
    }

    /// Wait until the session terminates and return why.
    pub async fn terminated(&self) -> TerminationReason {
        match &self.session {
            Some(session) => session.terminated().await,
            None => TerminationReason::Cancelled,
        }
    }

    /// Close the current session (if any) and open a fresh one.
    pub fn reconnect(&mut self) -> Result<(), CoreError> {
        if let Some(old) = self.session.take() {
            old.close();
        }
        self.tracker.cancel();
        self.session = Some(self.console.open_session(&self.device)?);
        Ok(())
    }

    /// Close the session. Idempotent.
    pub fn close(&mut self) {
        if let Some(session) = &self.session {
            session.close();
        }
        self.tracker.cancel();
    }

    // ── Input ────────────────────────────────────────────────────────

    pub fn mapper(&self) -> &GestureMapper {
        self.tracker.mapper()
    }

    /// The video surface moved or resized.
    pub fn set_surface(&mut self, surface: SurfaceRect) {
        let resolution = self.tracker.mapper().resolution();
        self.tracker.set_mapper(GestureMapper::new(surface, resolution));
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        let surface = self.tracker.mapper().surface();
        self.tracker.set_mapper(GestureMapper::new(surface, Some(resolution)));
    }

    pub fn pointer_down(&mut self, client_x: f64, client_y: f64) -> bool {
        self.tracker.pointer_down(client_x, client_y)
    }

    /// Finish a gesture and dispatch it. `Ok(None)` when there was nothing
    /// to dispatch.
    pub async fn pointer_up(
        &mut self,
        client_x: f64,
        client_y: f64,
    ) -> Result<Option<GestureIntent>, CoreError> {
        let Some(intent) = self.tracker.pointer_up(client_x, client_y) else {
            return Ok(None);
        };
        self.dispatch(&intent.to_command()).await?;
        Ok(Some(intent))
    }

    /// Center-anchored swipe in `direction`.
    pub async fn swipe(&self, direction: Direction) -> Result<GestureIntent, CoreError> {
        let resolution =
            self.tracker
                .mapper()
                .resolution()
                .ok_or_else(|| CoreError::ResolutionUnknown {
                    device: self.device.to_string(),
                })?;
        let intent = directional_swipe(direction, resolution);
        self.dispatch(&intent.to_command()).await?;
        Ok(intent)
    }

    /// Send a command while the session is active.
    pub async fn dispatch(&self, command: &DeviceCommand) -> Result<CommandResponse, CoreError> {
        check_active(self.state())?;
        self.console.send(&self.device, command).await
    }
}

impl Drop for ControlView {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_active(state: SessionState) -> Result<(), CoreError> {
    match state {
        SessionState::Active => Ok(()),
        SessionState::Connecting => Err(CoreError::SessionNotActive),
        SessionState::Terminated(reason) => Err(CoreError::SessionTerminated { reason }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_sessions_dispatch() {
        assert!(check_active(SessionState::Active).is_ok());
        assert!(matches!(
            check_active(SessionState::Connecting),
            Err(CoreError::SessionNotActive)
        ));
        assert!(matches!(
            check_active(SessionState::Terminated(TerminationReason::Expired)),
            Err(CoreError::SessionTerminated {
                reason: TerminationReason::Expired
            })
        ));
    }
}
