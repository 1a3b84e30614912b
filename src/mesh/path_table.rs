// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Forwarding table for mesh paths learned through HWMP.

use {
    crate::{mesh::hwmp_seqno_lt, time::Time, MacAddr},
    std::{collections::HashMap, time::Duration},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTableEntry {
    pub next_hop: MacAddr,
    /// Absent when the path was learned as a side effect of relaying a frame
    /// for the immediate transmitter rather than from an advertised seqno.
    pub hwmp_seqno: Option<u32>,
    pub expiration: Time,
    pub metric: u32,
    pub hop_count: u8,
}

/// Candidate update for a path, applied only when at least as fresh as what the
/// table already holds.
#[derive(Debug, Clone)]
pub struct PathUpdate {
    pub next_hop: MacAddr,
    pub hwmp_seqno: Option<u32>,
    pub lifetime: Duration,
    pub metric: u32,
    pub hop_count: u8,
}

#[derive(Default)]
pub struct PathTable {
    paths: HashMap<MacAddr, PathTableEntry>,
}

impl PathTable {
    pub fn new() -> Self {
        PathTable { paths: HashMap::new() }
    }

    /// Stale entries are only ever discarded here, when a lookup consults them.
    pub fn path_to(&mut self, dest: &MacAddr, now: Time) -> Option<&PathTableEntry> {
        if let Some(entry) = self.paths.get(dest) {
            if entry.expiration < now {
                self.paths.remove(dest);
                return None;
            }
        }
        self.paths.get(dest)
    }

    pub fn update_hwmp_path(
        &mut self,
        dest: MacAddr,
        update: PathUpdate,
        now: Time,
    ) -> &PathTableEntry {
        let expiration = now + update.lifetime;
        let entry = self.paths.entry(dest).or_insert_with(|| PathTableEntry {
            next_hop: update.next_hop,
            hwmp_seqno: update.hwmp_seqno,
            expiration,
            metric: update.metric,
            hop_count: update.hop_count,
        });
        let stale = match (entry.hwmp_seqno, update.hwmp_seqno) {
            (Some(old), Some(new)) => hwmp_seqno_lt(new, old),
            // An update without a seqno never replaces an advertised one.
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !stale {
            entry.next_hop = update.next_hop;
            entry.hwmp_seqno = update.hwmp_seqno.or(entry.hwmp_seqno);
            entry.metric = update.metric;
            entry.hop_count = update.hop_count;
        }
        if expiration > entry.expiration {
            entry.expiration = expiration;
        }
        entry
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn remove(&mut self, dest: &MacAddr) -> Option<PathTableEntry> {
        self.paths.remove(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEST: MacAddr = [1; 6];
    const HOP_A: MacAddr = [2; 6];
    const HOP_B: MacAddr = [3; 6];

    fn update(next_hop: MacAddr, seqno: Option<u32>, metric: u32) -> PathUpdate {
        PathUpdate {
            next_hop,
            hwmp_seqno: seqno,
            lifetime: Duration::from_secs(5),
            metric,
            hop_count: 2,
        }
    }

    #[test]
    fn fresher_seqno_replaces_entry() {
        let mut table = PathTable::new();
        let now = Time::from_nanos(0);
        table.update_hwmp_path(DEST, update(HOP_A, Some(5), 100), now);
        table.update_hwmp_path(DEST, update(HOP_B, Some(6), 300), now);
        let entry = table.path_to(&DEST, now).expect("no path");
        assert_eq!(entry.next_hop, HOP_B);
        assert_eq!(entry.metric, 300);
    }

    #[test]
    fn older_seqno_ignored() {
        let mut table = PathTable::new();
        let now = Time::from_nanos(0);
        table.update_hwmp_path(DEST, update(HOP_A, Some(6), 100), now);
        table.update_hwmp_path(DEST, update(HOP_B, Some(5), 10), now);
        let entry = table.path_to(&DEST, now).expect("no path");
        assert_eq!(entry.next_hop, HOP_A);
        assert_eq!(entry.metric, 100);
    }

    #[test]
    fn seqnoless_update_never_replaces_advertised() {
        let mut table = PathTable::new();
        let now = Time::from_nanos(0);
        table.update_hwmp_path(DEST, update(HOP_A, Some(5), 100), now);
        table.update_hwmp_path(DEST, update(HOP_B, None, 10), now);
        let entry = table.path_to(&DEST, now).expect("no path");
        assert_eq!(entry.next_hop, HOP_A);
        assert_eq!(entry.hwmp_seqno, Some(5));
    }

    #[test]
    fn seqnoless_entry_upgraded_by_advertised() {
        let mut table = PathTable::new();
        let now = Time::from_nanos(0);
        table.update_hwmp_path(DEST, update(HOP_A, None, 100), now);
        table.update_hwmp_path(DEST, update(HOP_B, Some(1), 50), now);
        let entry = table.path_to(&DEST, now).expect("no path");
        assert_eq!(entry.next_hop, HOP_B);
        assert_eq!(entry.hwmp_seqno, Some(1));
    }

    #[test]
    fn stale_entry_dropped_on_lookup() {
        let mut table = PathTable::new();
        let now = Time::from_nanos(0);
        table.update_hwmp_path(DEST, update(HOP_A, Some(1), 100), now);
        assert!(table.path_to(&DEST, now).is_some());

        let later = now + Duration::from_secs(6);
        assert!(table.path_to(&DEST, later).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn update_extends_expiration_even_when_stale() {
        let mut table = PathTable::new();
        let now = Time::from_nanos(0);
        table.update_hwmp_path(DEST, update(HOP_A, Some(6), 100), now);
        let later = now + Duration::from_secs(3);
        table.update_hwmp_path(DEST, update(HOP_B, Some(5), 10), later);
        // Still the fresher path, but alive for the new lifetime.
        let at = now + Duration::from_secs(7);
        let entry = table.path_to(&DEST, at).expect("no path");
        assert_eq!(entry.next_hop, HOP_A);
    }
}
