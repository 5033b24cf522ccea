//! `devhub control`: hold a device until Ctrl-C or the hub ends the session.

use std::time::Duration;

use devhub_core::{Console, CoreError};

use crate::cli::{ControlArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(console: &Console, args: ControlArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let console = match args.liveness_ms {
        Some(0) => {
            return Err(CliError::Validation {
                field: "liveness-ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Some(ms) => {
            let mut config = console.config().clone();
            config.liveness_interval = Duration::from_millis(ms);
            Console::new(config)?
        }
        None => console.clone(),
    };

    let id = util::device_id(&args.device)?;
    let mut view = console.control_view(id.clone()).await?;
    output::print_status(&format!("Connecting to {id}..."), global.quiet);
    view.ready().await?;

    output::print_status(
        &format!("Controlling {id}. Press Ctrl-C to let go."),
        global.quiet,
    );

    let ended = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        reason = view.terminated() => Some(reason),
    };

    match ended {
        Some(reason) => Err(CoreError::SessionTerminated { reason }.into()),
        None => {
            view.close();
            output::print_status("Session closed.", global.quiet);
            Ok(())
        }
    }
}
