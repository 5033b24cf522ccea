//! Device command handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use devhub_core::{
    Console, CoreError, DeviceInfo, DeviceStatus, ErrorKind, FeedStatus, Roster, RosterEntry,
    SubscriptionState, SubscriptionStatus,
};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts, OutputFormat, StatusFilter};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "UDID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Held By")]
    held_by: String,
    #[tabled(rename = "Resolution")]
    resolution: String,
}

impl DeviceRow {
    fn new(e: &RosterEntry, color: bool) -> Self {
        Self {
            id: e.id().to_string(),
            name: e.name.clone().unwrap_or_default(),
            platform: e.platform(),
            status: output::status_label(e.status(), color),
            held_by: e.in_use_by.clone().unwrap_or_default(),
            resolution: e.resolution.map(|r| r.to_string()).unwrap_or_default(),
        }
    }
}

impl From<StatusFilter> for DeviceStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Offline => Self::Offline,
            StatusFilter::InUse => Self::InUse,
            StatusFilter::Available => Self::Available,
            StatusFilter::Unavailable => Self::Unavailable,
        }
    }
}

#[derive(Serialize)]
struct DeviceDetail {
    info: DeviceInfo,
    health: Option<serde_json::Value>,
}

fn detail(d: &DeviceDetail) -> String {
    let mut lines = vec![
        format!("UDID:       {}", d.info.udid.as_deref().unwrap_or("-")),
        format!("Name:       {}", d.info.name.as_deref().unwrap_or("-")),
        format!(
            "Resolution: {}",
            d.info
                .resolution()
                .map_or_else(|| "-".into(), |(w, h)| format!("{w}x{h}"))
        ),
        format!("Workspace:  {}", d.info.workspace_id.as_deref().unwrap_or("-")),
    ];
    for (key, value) in &d.info.extra {
        lines.push(format!("{key}: {}", scalar(value)));
    }
    if let Some(health) = &d.health {
        lines.push(format!("Health:     {}", scalar(health)));
    }
    lines.join("\n")
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Watch ───────────────────────────────────────────────────────────

/// One device whose coarse status moved between two roster snapshots.
#[derive(Debug, PartialEq, Serialize)]
struct StatusChange {
    id: String,
    name: String,
    from: DeviceStatus,
    to: DeviceStatus,
    in_use_by: Option<String>,
}

impl std::fmt::Display for StatusChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}  {} -> {}", self.name, self.from, self.to)?;
        if let Some(by) = &self.in_use_by {
            write!(f, " ({by})")?;
        }
        Ok(())
    }
}

fn status_changes(previous: &Roster, next: &Roster) -> Vec<StatusChange> {
    next.iter()
        .filter_map(|entry| {
            let before = previous.get(entry.id())?.status();
            let after = entry.status();
            (before != after).then(|| StatusChange {
                id: entry.id().to_string(),
                name: entry.display_name().to_owned(),
                from: before,
                to: after,
                in_use_by: entry.in_use_by.clone(),
            })
        })
        .collect()
}

fn feed_line(status: &SubscriptionStatus) -> String {
    let state = match status.state {
        SubscriptionState::Connecting => "connecting",
        SubscriptionState::Open => "live",
        SubscriptionState::Reconnecting => "unavailable, retrying",
        SubscriptionState::Closed => "closed",
    };
    match status.last_error {
        Some(kind) => format!("feed: {state} (last error: {kind:?})"),
        None => format!("feed: {state}"),
    }
}

fn print_change(change: &StatusChange, global: &GlobalOpts) {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            serde_json::to_string(change).unwrap_or_else(|_| change.to_string())
        }
        OutputFormat::Plain => format!("{}\t{}", change.id, change.to),
        OutputFormat::Table | OutputFormat::Yaml => change.to_string(),
    };
    output::print_output(&line, global.quiet);
}

async fn watch(console: &Console, global: &GlobalOpts) -> Result<(), CliError> {
    let scope = console.start_live().await?;
    let mut roster_rx = console.subscribe();
    let mut feed_rx = console.feed_receiver();
    let mut previous: Arc<Roster> = Arc::clone(roster_rx.current());

    output::print_status(
        &format!(
            "Following workspace {scope} ({} devices). Ctrl-C to stop.",
            previous.len()
        ),
        global.quiet,
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),

            next = roster_rx.changed() => {
                let Some(next) = next else { break Ok(()) };
                for change in status_changes(&previous, &next) {
                    print_change(&change, global);
                }
                previous = next;
            }

            changed = feed_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let FeedStatus { status, .. } = feed_rx.borrow_and_update().clone();
                let Some(status) = status else { continue };
                output::print_status(&feed_line(&status), global.quiet);
                if status.state == SubscriptionState::Closed {
                    break match status.last_error {
                        Some(ErrorKind::Auth) => Err(CliError::AuthFailed {
                            message: "the availability feed rejected the token".into(),
                        }),
                        _ => Ok(()),
                    };
                }
            }
        }
    };

    console.stop();
    result
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    console: &Console,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List { status } => {
            let roster = console.load_roster().await?;
            let entries: Vec<RosterEntry> = match status {
                Some(filter) => roster.with_status(filter.into()).cloned().collect(),
                None => roster.iter().cloned().collect(),
            };
            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &entries,
                |e| DeviceRow::new(e, color),
                |e| e.id().to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Watch => watch(console, global).await,

        DevicesCommand::Info(arg) => {
            let id = util::device_id(&arg.device)?;
            let info = console.device_info(&id).await?;
            let health = match console.client().health(id.as_str()).await {
                Ok(health) => Some(health),
                Err(e) => {
                    tracing::debug!(error = %e, "health unavailable");
                    None
                }
            };
            let view = DeviceDetail { info, health };
            let out = output::render_single(&global.output, &view, detail, |_| id.to_string());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Release(arg) => {
            let id = util::device_id(&arg.device)?;
            if !util::confirm(
                &format!("Force-release device {id}? Its current operator loses control."),
                "devices release",
                global.yes,
            )? {
                return Ok(());
            }
            let resp = console.release(&id).await?;
            util::acknowledge(&resp, global);
            Ok(())
        }

        DevicesCommand::StreamUrl(arg) => {
            let id = util::device_id(&arg.device)?;
            let url = console
                .client()
                .stream_url(id.as_str())
                .map_err(CoreError::from)?;
            output::print_output(url.as_str(), global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, connected: bool, in_use: bool) -> RosterEntry {
        let mut e = RosterEntry::new(id);
        e.connected = connected;
        e.available = connected;
        e.in_use = in_use;
        e
    }

    #[test]
    fn reports_only_status_moves() {
        let previous: Roster = [entry("a", true, false), entry("b", false, false)]
            .into_iter()
            .collect();
        let mut held = entry("a", true, true);
        held.in_use_by = Some("bob".into());
        let next: Roster = [held, entry("b", false, false)].into_iter().collect();

        let changes = status_changes(&previous, &next);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to_string(), "a  available -> in use (bob)");
    }

    #[test]
    fn feed_line_names_last_error() {
        let status = SubscriptionStatus {
            state: SubscriptionState::Reconnecting,
            last_error: Some(ErrorKind::Transport),
        };
        assert_eq!(
            feed_line(&status),
            "feed: unavailable, retrying (last error: Transport)"
        );
    }
}
