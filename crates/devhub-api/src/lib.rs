// devhub-api: async client for device-farm hubs (availability feed, control sessions, device commands)

pub mod auth;
pub mod availability;
pub mod control;
pub mod device;
pub mod error;
pub mod sse;
pub mod transport;

pub use auth::AuthContext;
pub use availability::{
    AvailabilityBatch, AvailabilitySubscription, AvailabilityTransport, HttpAvailabilityTransport,
    ReconnectConfig, SubscriptionState, SubscriptionStatus,
};
pub use control::{
    ControlSession, ControlSessionConfig, PingReply, SessionState, TerminationReason,
};
pub use device::{DeviceClient, DeviceCommand};
pub use error::{Error, ErrorKind};
pub use transport::{TlsMode, TransportConfig};
