// devhub-core: Live device roster, control views and gesture mapping between devhub-api and consumers.

pub mod config;
pub mod console;
pub mod convert;
pub mod error;
pub mod gesture;
pub mod model;
pub mod roster;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConsoleConfig, TlsVerification};
pub use console::{Console, ControlView};
pub use error::CoreError;
pub use gesture::{Direction, GestureIntent, GestureMapper, GestureTracker, directional_swipe};
pub use roster::{Roster, RosterCounts, reconcile};
pub use store::{FeedStatus, LiveRoster};
pub use stream::RosterStream;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ClientPoint, DeviceId, DeviceSnapshot, DeviceStatus, DevicePoint, Resolution, RosterEntry,
    SurfaceRect,
};

// Transport types consumers need without depending on devhub-api directly.
pub use devhub_api::device::{CommandResponse, DeviceInfo, Orientation, Workspace, default_workspace};
pub use devhub_api::{
    DeviceCommand, ErrorKind, PingReply, SessionState, SubscriptionState, SubscriptionStatus,
    TerminationReason,
};
