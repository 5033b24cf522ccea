// Device service: commands, reads, and admin listings over REST.

pub mod client;
pub mod commands;
pub mod models;

pub use client::DeviceClient;
pub use commands::DeviceCommand;
pub use models::{CommandResponse, DeviceInfo, Orientation, Workspace, default_workspace};
