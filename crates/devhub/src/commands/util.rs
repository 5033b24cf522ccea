//! Shared helpers for command handlers.

use std::io::IsTerminal;

use devhub_core::{CommandResponse, DeviceId};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so the caller must pass
/// `--yes`.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

pub fn device_id(raw: &str) -> Result<DeviceId, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::Validation {
            field: "device".into(),
            reason: "device identifier cannot be empty".into(),
        });
    }
    Ok(DeviceId::new(trimmed))
}

/// Echo a hub command acknowledgement to stderr.
pub fn acknowledge(resp: &CommandResponse, global: &GlobalOpts) {
    if !global.quiet {
        eprintln!("{}", resp.message_or_default());
    }
}
