//! IP reputation tracking for pairing requests.
//!
//! Counts confirmation attempts from addresses that did not request the
//! active code and temporarily blacklists repeat offenders.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct ReputationEntry {
    violations: u32,
    blacklisted_until: Option<DateTime<Utc>>,
}

impl ReputationEntry {
    fn blacklist_expired(&self, now: DateTime<Utc>) -> bool {
        self.blacklisted_until.is_some_and(|until| until <= now)
    }
}

/// An address currently denied, as reported by [`IpReputationTracker::blacklisted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    pub addr: IpAddr,
    pub violations: u32,
    pub blacklisted_until: DateTime<Utc>,
}

pub struct IpReputationTracker {
    entries: Mutex<HashMap<IpAddr, ReputationEntry>>,
    max_violations: u32,
    blacklist_duration: Duration,
}

impl IpReputationTracker {
    pub fn new(max_violations: u32, blacklist_duration: std::time::Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_violations: max_violations.max(1),
            blacklist_duration: Duration::from_std(blacklist_duration)
                .unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<IpAddr, ReputationEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_blacklisted(&self, addr: IpAddr) -> bool {
        self.is_blacklisted_at(addr, Utc::now())
    }

    /// An expired entry for `addr` is evicted as a side effect.
    pub fn is_blacklisted_at(&self, addr: IpAddr, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get(&addr) else {
            return false;
        };
        match entry.blacklisted_until {
            Some(until) if until > now => true,
            Some(_) => {
                entries.remove(&addr);
                debug!(%addr, "Blacklist expired; entry evicted");
                false
            }
            None => false,
        }
    }

    /// Returns true when this violation leaves `addr` blacklisted.
    pub fn record_violation(&self, addr: IpAddr) -> bool {
        self.record_violation_at(addr, Utc::now())
    }

    pub fn record_violation_at(&self, addr: IpAddr, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        let entry = entries.entry(addr).or_default();
        if entry.blacklist_expired(now) {
            *entry = ReputationEntry::default();
        }

        entry.violations += 1;
        if entry.violations >= self.max_violations {
            let until = now + self.blacklist_duration;
            entry.blacklisted_until = Some(until);
            warn!(%addr, violations = entry.violations, %until, "Address blacklisted");
            true
        } else {
            info!(%addr, violations = entry.violations, max = self.max_violations, "IP violation recorded");
            false
        }
    }

    /// Removes every entry whose blacklist has passed. Returns how many were pruned.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| !e.blacklist_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Pruned expired blacklist entries");
        }
        removed
    }

    pub fn violation_count(&self, addr: IpAddr) -> u32 {
        self.entries().get(&addr).map(|e| e.violations).unwrap_or(0)
    }

    /// Snapshot of currently blacklisted addresses.
    pub fn blacklisted(&self) -> Vec<BlacklistEntry> {
        let now = Utc::now();
        let mut list: Vec<BlacklistEntry> = self
            .entries()
            .iter()
            .filter_map(|(addr, e)| match e.blacklisted_until {
                Some(until) if until > now => Some(BlacklistEntry {
                    addr: *addr,
                    violations: e.violations,
                    blacklisted_until: until,
                }),
                _ => None,
            })
            .collect();
        list.sort_by_key(|e| e.blacklisted_until);
        list
    }

    /// Forgets all violation history.
    pub fn clear(&self) {
        self.entries().clear();
        info!("IP reputation cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn tracker() -> IpReputationTracker {
        IpReputationTracker::new(3, std::time::Duration::from_secs(3600))
    }

    #[test]
    fn blacklists_after_max_violations() {
        let t = tracker();
        let a = addr("192.168.1.50");
        assert!(!t.record_violation(a));
        assert!(!t.record_violation(a));
        assert!(!t.is_blacklisted(a));
        assert!(t.record_violation(a));
        assert!(t.is_blacklisted(a));
        assert_eq!(t.blacklisted().len(), 1);
    }

    #[test]
    fn blacklist_lapses_and_sweep_resets_count() {
        let t = tracker();
        let a = addr("10.0.0.9");
        let now = Utc::now();
        for _ in 0..3 {
            t.record_violation_at(a, now);
        }
        assert!(t.is_blacklisted_at(a, now + Duration::minutes(59)));

        let later = now + Duration::minutes(61);
        assert_eq!(t.sweep_at(later), 1);
        assert!(!t.is_blacklisted_at(a, later));
        assert_eq!(t.violation_count(a), 0);
    }

    #[test]
    fn lookup_evicts_expired_entry() {
        let t = tracker();
        let a = addr("10.0.0.10");
        let now = Utc::now();
        for _ in 0..3 {
            t.record_violation_at(a, now);
        }
        assert!(!t.is_blacklisted_at(a, now + Duration::hours(2)));
        assert_eq!(t.violation_count(a), 0);
    }

    #[test]
    fn sweep_keeps_unexpired_history() {
        let t = tracker();
        let a = addr("10.0.0.11");
        t.record_violation(a);
        assert_eq!(t.sweep(), 0);
        assert_eq!(t.violation_count(a), 1);
    }

    #[test]
    fn addresses_are_tracked_independently() {
        let t = tracker();
        for _ in 0..3 {
            t.record_violation(addr("10.0.0.1"));
        }
        assert!(t.is_blacklisted(addr("10.0.0.1")));
        assert!(!t.is_blacklisted(addr("10.0.0.2")));
        t.clear();
        assert!(!t.is_blacklisted(addr("10.0.0.1")));
    }
}
