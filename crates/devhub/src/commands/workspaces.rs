//! Workspace listing.

use tabled::Tabled;

use devhub_core::{Console, Workspace};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct WorkspaceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Default")]
    default: String,
    #[tabled(rename = "Following")]
    following: String,
}

pub async fn handle(console: &Console, global: &GlobalOpts) -> Result<(), CliError> {
    let workspaces = console.workspaces().await?;
    let following = match &console.config().workspace {
        Some(ws) => Some(ws.clone()),
        None => devhub_core::default_workspace(&workspaces).map(|w| w.id.clone()),
    };
    let out = output::render_list(
        &global.output,
        &workspaces,
        |w: &Workspace| WorkspaceRow {
            id: w.id.clone(),
            name: w.name.clone().unwrap_or_default(),
            default: if w.is_default { "yes".into() } else { String::new() },
            following: if following.as_deref() == Some(w.id.as_str()) {
                "*".into()
            } else {
                String::new()
            },
        },
        |w| w.id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
