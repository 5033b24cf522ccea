// ── Device roster and availability reconciliation ──
//
// The roster is seeded from inventory and only ever updated in place by
// availability snapshots. The feed never grows or shrinks it.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{DeviceId, DeviceSnapshot, DeviceStatus, RosterEntry};

/// Devices keyed (and ordered) by identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Roster {
    entries: BTreeMap<DeviceId, RosterEntry>,
}

/// Per-status totals for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RosterCounts {
    pub total: usize,
    pub connected: usize,
    pub available: usize,
    pub in_use: usize,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. Returns the entry previously stored
    /// under the same identifier.
    pub fn insert(&mut self, entry: RosterEntry) -> Option<RosterEntry> {
        self.entries.insert(entry.id().clone(), entry)
    }

    pub fn get(&self, id: &DeviceId) -> Option<&RosterEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.values()
    }

    /// Entries whose current status is `status`.
    pub fn with_status(&self, status: DeviceStatus) -> impl Iterator<Item = &RosterEntry> {
        self.iter().filter(move |e| e.status() == status)
    }

    pub fn counts(&self) -> RosterCounts {
        self.iter().fold(
            RosterCounts {
                total: self.len(),
                ..RosterCounts::default()
            },
            |mut c, e| {
                c.connected += usize::from(e.connected);
                c.available += usize::from(e.available);
                c.in_use += usize::from(e.in_use);
                c
            },
        )
    }

    /// Merge a batch of snapshots in place.
    ///
    /// Each snapshot overlays the entry with the same identifier; snapshots
    /// for unknown devices are ignored. Applied in order, so the last
    /// snapshot for a device wins. Returns the number of entries whose
    /// state differs after the whole batch.
    pub fn apply(&mut self, batch: &[DeviceSnapshot]) -> usize {
        let mut before: BTreeMap<DeviceId, RosterEntry> = BTreeMap::new();
        for snapshot in batch {
            if let Some(entry) = self.entries.get_mut(&snapshot.id) {
                before
                    .entry(snapshot.id.clone())
                    .or_insert_with(|| entry.clone());
                entry.overlay(snapshot);
            } else {
                tracing::trace!(device_id = %snapshot.id, "snapshot for device not in roster");
            }
        }
        before
            .iter()
            .filter(|(id, old)| self.entries.get(*id) != Some(*old))
            .count()
    }
}

impl FromIterator<RosterEntry> for Roster {
    fn from_iter<I: IntoIterator<Item = RosterEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.id().clone(), e)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a RosterEntry;
    type IntoIter = std::collections::btree_map::Values<'a, DeviceId, RosterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// Pure form of [`Roster::apply`]: the input roster is left untouched.
pub fn reconcile(roster: &Roster, batch: &[DeviceSnapshot]) -> Roster {
    let mut next = roster.clone();
    next.apply(batch);
    next
}
