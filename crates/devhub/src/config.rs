//! CLI flag overrides on top of `devhub-config` profiles.
//!
//! This is the single boundary where CLI options cross into
//! `devhub_core::ConsoleConfig`.

use std::time::Duration;

use secrecy::SecretString;

use devhub_config::{Config, Profile};
use devhub_core::{ConsoleConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use devhub_config::{config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ConsoleConfig` from the config file, profile, and CLI overrides.
pub fn build_console_config(global: &GlobalOpts) -> Result<ConsoleConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    match cfg.profiles.get(&profile_name) {
        Some(profile) => resolve_profile(profile, &profile_name, global),
        // No profile: the flags / env vars must carry everything.
        None => {
            if global.url.is_none() {
                return Err(CliError::NoConfig {
                    path: config_path().display().to_string(),
                });
            }
            resolve_profile(&Profile::default(), &profile_name, global)
        }
    }
}

/// Translate a profile + global flags into a `ConsoleConfig`.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<ConsoleConfig, CliError> {
    let mut profile = profile.clone();

    // 1. URL and username (flag > env > profile)
    if let Some(url) = &global.url {
        profile.url.clone_from(url);
    }
    if let Some(username) = &global.username {
        profile.username = Some(username.clone());
    }

    // 2. Token (flag > profile chain)
    let token = match &global.token {
        Some(token) => SecretString::from(token.clone()),
        None => devhub_config::resolve_token(&profile, profile_name)?,
    };
    let mut config = devhub_config::console_config_with_token(&profile, profile_name, token)?;

    // 3. Remaining overrides
    if let Some(ws) = &global.workspace {
        config.workspace = Some(ws.clone());
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }

    Ok(config)
}
