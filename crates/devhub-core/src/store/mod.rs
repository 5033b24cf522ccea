// ── Roster store ──
//
// Shared, observable roster state fed by the availability subscription.

mod live;

pub use live::{FeedStatus, LiveRoster};
