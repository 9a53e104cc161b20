//! Durable ban registry for lanroom.
//!
//! The registry is consulted on every join, so lookups are a pair of
//! `HashMap` probes keyed by [`BanFacet`]. Entries are persisted to a JSON
//! file rewritten on every mutation; the write goes to a temp file that is
//! fsynced and renamed into place, so a crash leaves either the old list
//! or the new one, never a torn file.
//!
//! All mutations happen inside the room controller task, serialized with
//! membership changes. This crate is deliberately synchronous; the file is
//! small and the flush must complete before the ban takes effect anyway.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use lanroom_protocol::{BanFacet, FacetKind};

/// Errors raised by ban persistence.
///
/// At startup these are process-fatal; at runtime the registry keeps the
/// entry in memory and the caller decides whether to run degraded.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("ban file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ban file is not valid: {0}")]
    Format(#[from] serde_json::Error),
}

/// One persisted exclusion record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    pub facet: BanFacet,
    pub reason: String,
    /// Unix timestamp (seconds) of when the ban was issued.
    pub timestamp: u64,
}

impl BanEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(facet: BanFacet, reason: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            facet,
            reason: reason.into(),
            timestamp,
        }
    }
}

/// The authoritative set of excluded identities.
pub struct BanRegistry {
    entries: HashMap<BanFacet, BanEntry>,
    path: Option<PathBuf>,
}

impl BanRegistry {
    /// Creates a registry with no backing file. Bans live only as long as
    /// the process; used by tests and by degraded operation.
    pub fn in_memory() -> Self {
        Self {
            entries: HashMap::new(),
            path: None,
        }
    }

    /// Loads the registry from `path`.
    ///
    /// A missing file is an empty registry; an unreadable or malformed
    /// file is an error, because silently starting with zero bans would
    /// un-ban everyone.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => {
                let list: Vec<BanEntry> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|e| (e.facet.clone(), e)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), bans = entries.len(), "ban registry loaded");
        Ok(Self {
            entries,
            path: Some(path),
        })
    }

    /// Returns the facet kind that matches a joining identity, if any.
    ///
    /// Checked on every admission; any single matching facet is enough.
    pub fn matched_facet(&self, nickname: &str, net_addr: IpAddr, hwid: &str) -> Option<FacetKind> {
        let probes = [
            BanFacet {
                kind: FacetKind::Nickname,
                value: nickname.to_string(),
            },
            BanFacet {
                kind: FacetKind::NetAddr,
                value: net_addr.to_string(),
            },
            BanFacet {
                kind: FacetKind::Hwid,
                value: hwid.to_string(),
            },
        ];
        probes
            .into_iter()
            .find(|facet| self.entries.contains_key(facet))
            .map(|facet| facet.kind)
    }

    /// Returns `true` if any facet of the identity is banned.
    pub fn is_banned(&self, nickname: &str, net_addr: IpAddr, hwid: &str) -> bool {
        self.matched_facet(nickname, net_addr, hwid).is_some()
    }

    /// Adds an entry and flushes the file.
    ///
    /// Idempotent: re-banning an already banned facet returns `Ok(false)`
    /// and leaves the original entry (and file) untouched. On a
    /// persistence failure the entry stays in memory and the error is
    /// returned so the caller can surface the lost durability.
    pub fn add(&mut self, entry: BanEntry) -> Result<bool, StorageError> {
        if self.entries.contains_key(&entry.facet) {
            return Ok(false);
        }
        self.entries.insert(entry.facet.clone(), entry);
        self.persist()?;
        Ok(true)
    }

    /// Removes the entry for `facet` and flushes the file.
    ///
    /// Returns `Ok(false)` if no such entry existed.
    pub fn remove(&mut self, facet: &BanFacet) -> Result<bool, StorageError> {
        if self.entries.remove(facet).is_none() {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Returns all entries, oldest first.
    pub fn list(&self) -> Vec<&BanEntry> {
        let mut entries: Vec<&BanEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            (a.timestamp, &a.facet.value).cmp(&(b.timestamp, &b.facet.value))
        });
        entries
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrites the backing file via temp file + fsync + rename.
    fn persist(&self) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let entries: Vec<&BanEntry> = self.list();
        let tmp = tmp_path(path);
        {
            let file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&file, &entries)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn nick(value: &str) -> BanFacet {
        BanFacet {
            kind: FacetKind::Nickname,
            value: value.into(),
        }
    }

    fn hwid(value: &str) -> BanFacet {
        BanFacet {
            kind: FacetKind::Hwid,
            value: value.into(),
        }
    }

    fn ip() -> IpAddr {
        "10.0.0.7".parse().unwrap()
    }

    #[test]
    fn test_empty_registry_bans_nobody() {
        let reg = BanRegistry::in_memory();
        assert!(!reg.is_banned("alice", ip(), "hw-1"));
    }

    #[test]
    fn test_each_facet_matches_independently() {
        let mut reg = BanRegistry::in_memory();
        reg.add(BanEntry::new(nick("alice"), "spam")).unwrap();
        reg.add(BanEntry::new(hwid("hw-2"), "cheating")).unwrap();
        reg.add(BanEntry::new(
            BanFacet {
                kind: FacetKind::NetAddr,
                value: "10.0.0.9".into(),
            },
            "abuse",
        ))
        .unwrap();

        assert_eq!(
            reg.matched_facet("alice", ip(), "hw-1"),
            Some(FacetKind::Nickname)
        );
        assert_eq!(
            reg.matched_facet("bob", ip(), "hw-2"),
            Some(FacetKind::Hwid)
        );
        assert_eq!(
            reg.matched_facet("bob", "10.0.0.9".parse().unwrap(), "hw-1"),
            Some(FacetKind::NetAddr)
        );
        assert_eq!(reg.matched_facet("bob", ip(), "hw-1"), None);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut reg = BanRegistry::in_memory();
        assert!(reg.add(BanEntry::new(nick("alice"), "first")).unwrap());
        assert!(!reg.add(BanEntry::new(nick("alice"), "second")).unwrap());
        assert_eq!(reg.len(), 1);
        // The original entry wins.
        assert_eq!(reg.list()[0].reason, "first");
    }

    #[test]
    fn test_remove() {
        let mut reg = BanRegistry::in_memory();
        reg.add(BanEntry::new(nick("alice"), "spam")).unwrap();
        assert!(reg.remove(&nick("alice")).unwrap());
        assert!(!reg.remove(&nick("alice")).unwrap());
        assert!(reg.is_empty());
        assert!(!reg.is_banned("alice", ip(), "hw-1"));
    }

    #[test]
    fn test_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.json");

        {
            let mut reg = BanRegistry::load(&path).unwrap();
            reg.add(BanEntry::new(nick("alice"), "spam")).unwrap();
            reg.add(BanEntry::new(hwid("hw-2"), "cheating")).unwrap();
        }

        let reg = BanRegistry::load(&path).unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.is_banned("alice", ip(), "hw-9"));
        assert!(reg.is_banned("bob", ip(), "hw-2"));
    }

    #[test]
    fn test_remove_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.json");

        {
            let mut reg = BanRegistry::load(&path).unwrap();
            reg.add(BanEntry::new(nick("alice"), "spam")).unwrap();
            reg.remove(&nick("alice")).unwrap();
        }

        let reg = BanRegistry::load(&path).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let reg = BanRegistry::load(dir.path().join("absent.json")).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            BanRegistry::load(&path),
            Err(StorageError::Format(_))
        ));
    }

    #[test]
    fn test_list_is_oldest_first() {
        let mut reg = BanRegistry::in_memory();
        reg.add(BanEntry {
            facet: nick("newer"),
            reason: String::new(),
            timestamp: 200,
        })
        .unwrap();
        reg.add(BanEntry {
            facet: nick("older"),
            reason: String::new(),
            timestamp: 100,
        })
        .unwrap();

        let listed = reg.list();
        assert_eq!(listed[0].facet.value, "older");
        assert_eq!(listed[1].facet.value, "newer");
    }
}
