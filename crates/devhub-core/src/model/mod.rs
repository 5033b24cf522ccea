// ── Domain model ──
//
// Canonical device types shared by the roster, the live store and the
// control view. Raw hub JSON never leaks past `convert`.

pub mod device;
pub mod device_id;
pub mod geometry;

pub use device::{DeviceSnapshot, DeviceStatus, RosterEntry};
pub use device_id::DeviceId;
pub use geometry::{ClientPoint, DevicePoint, Resolution, SurfaceRect};
