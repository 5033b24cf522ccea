//! Screenshots and app management.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use devhub_core::{Console, CoreError, DeviceId};

use crate::cli::{DeviceArg, GlobalOpts, InstallArgs, ScreenshotArgs, UninstallArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// Strip a `data:image/png;base64,` prefix if the provider sent a data URL.
fn decode_image(data: &str) -> Result<Vec<u8>, CliError> {
    let payload = data
        .split_once("base64,")
        .map_or(data, |(_, rest)| rest)
        .trim();
    Ok(STANDARD.decode(payload)?)
}

fn default_screenshot_path(id: &DeviceId) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    PathBuf::from(format!("{id}-{stamp}.png"))
}

fn print_apps(apps: &[String], global: &GlobalOpts) {
    let out = output::render_single(
        &global.output,
        apps,
        |a| {
            if a.is_empty() {
                "No apps reported".into()
            } else {
                a.join("\n")
            }
        },
        |a| a.join("\n"),
    );
    output::print_output(&out, global.quiet);
}

pub async fn screenshot(
    console: &Console,
    args: ScreenshotArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let data = console
        .client()
        .screenshot(id.as_str())
        .await
        .map_err(CoreError::from)?;
    let png = decode_image(&data)?;
    let path = args.file.unwrap_or_else(|| default_screenshot_path(&id));
    std::fs::write(&path, &png)?;
    tracing::debug!(path = %path.display(), bytes = png.len(), "screenshot saved");
    output::print_output(&path.display().to_string(), global.quiet);
    Ok(())
}

pub async fn install(
    console: &Console,
    args: InstallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let file_name = args
        .package
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::Validation {
            field: "package".into(),
            reason: format!("'{}' is not a file", args.package.display()),
        })?
        .to_owned();
    let package = std::fs::read(&args.package)?;

    output::print_status(
        &format!("Uploading {file_name} ({} bytes) to {id}...", package.len()),
        global.quiet,
    );
    let resp = console
        .client()
        .install_app(id.as_str(), &file_name, package)
        .await
        .map_err(CoreError::from)?;
    util::acknowledge(&resp, global);
    Ok(())
}

pub async fn uninstall(
    console: &Console,
    args: UninstallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    if !util::confirm(
        &format!("Uninstall {} from {id}?", args.app),
        "uninstall",
        global.yes,
    )? {
        return Ok(());
    }
    let remaining = console
        .client()
        .uninstall_app(id.as_str(), &args.app)
        .await
        .map_err(CoreError::from)?;
    output::print_status(&format!("Uninstalled {}", args.app), global.quiet);
    if let Some(apps) = remaining {
        print_apps(&apps, global);
    }
    Ok(())
}

pub async fn list(console: &Console, args: DeviceArg, global: &GlobalOpts) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let apps = console
        .client()
        .apps(id.as_str())
        .await
        .map_err(CoreError::from)?;
    print_apps(&apps, global);
    Ok(())
}
