//! Command dispatch: bridges CLI args -> console calls -> output formatting.

pub mod apps;
pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod input;
pub mod util;
pub mod workspaces;

use devhub_core::Console;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a hub-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, console: &Console, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(console, args, global).await,
        Command::Control(args) => control::handle(console, args, global).await,
        Command::Tap(args) => input::tap(console, args, global).await,
        Command::Swipe(args) => input::swipe(console, args, global).await,
        Command::Gesture(args) => input::gesture(console, args, global).await,
        Command::TypeText(args) => input::type_text(console, args, global).await,
        Command::Orientation(args) => input::orientation(console, args, global).await,
        Command::Home(args) => input::button(console, args, input::Button::Home, global).await,
        Command::Lock(args) => input::button(console, args, input::Button::Lock, global).await,
        Command::Unlock(args) => input::button(console, args, input::Button::Unlock, global).await,
        Command::Screenshot(args) => apps::screenshot(console, args, global).await,
        Command::Install(args) => apps::install(console, args, global).await,
        Command::Uninstall(args) => apps::uninstall(console, args, global).await,
        Command::Apps(args) => apps::list(console, args, global).await,
        Command::Workspaces => workspaces::handle(console, global).await,
        // Config and Completions are handled before a console exists
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
