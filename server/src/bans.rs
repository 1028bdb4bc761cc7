//! Ban records and their persisted store
//!
//! A [`BanStore`] maps player names to [`BanRecord`]s. The server keeps two:
//! one for temporary bans, consulted early in admission and cleaned up
//! lazily, and one holding the banner/reason text for permanent bans, which
//! are enforced through the reserved banned rank.
//!
//! Records are stored one per line as
//! `name banner rank issued_unix expiry_unix|- reason...`.

use crate::error::{StoreError, StoreResult};
use crate::lists::KeyedList;
use chrono::{DateTime, TimeZone, Utc};
use log::info;
use shared::Rank;
use std::path::PathBuf;

const NO_EXPIRY: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub banner: String,
    pub reason: String,
    /// Rank held before the ban, restored on unban
    pub rank: Rank,
    pub issued: DateTime<Utc>,
    /// `None` for a permanent ban
    pub expiry: Option<DateTime<Utc>>,
}

impl BanRecord {
    pub fn permanent(banner: &str, reason: &str, rank: Rank, issued: DateTime<Utc>) -> Self {
        Self {
            banner: banner.to_string(),
            reason: reason.to_string(),
            rank,
            issued,
            expiry: None,
        }
    }

    pub fn temporary(
        banner: &str,
        reason: &str,
        rank: Rank,
        issued: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            expiry: Some(expiry),
            ..Self::permanent(banner, reason, rank, issued)
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| now >= expiry)
    }

    fn encode(&self) -> String {
        let expiry = match self.expiry {
            Some(expiry) => expiry.timestamp().to_string(),
            None => NO_EXPIRY.to_string(),
        };
        format!(
            "{} {} {} {} {}",
            self.banner,
            self.rank.0,
            self.issued.timestamp(),
            expiry,
            self.reason
        )
        .trim_end()
        .to_string()
    }

    fn decode(key: &str, data: &str) -> StoreResult<Self> {
        let corrupt = |detail: &str| StoreError::Corrupt {
            key: key.to_string(),
            detail: detail.to_string(),
        };
        let mut parts = data.splitn(5, ' ');
        let banner = parts.next().filter(|s| !s.is_empty());
        let rank = parts.next();
        let issued = parts.next();
        let expiry = parts.next();
        let reason = parts.next().unwrap_or("").trim();

        let (Some(banner), Some(rank), Some(issued), Some(expiry)) = (banner, rank, issued, expiry)
        else {
            return Err(corrupt("missing fields"));
        };

        let rank = rank
            .parse::<i32>()
            .map(Rank)
            .map_err(|_| corrupt("bad rank"))?;
        let issued = parse_timestamp(issued).ok_or_else(|| corrupt("bad issue time"))?;
        let expiry = match expiry {
            NO_EXPIRY => None,
            value => Some(parse_timestamp(value).ok_or_else(|| corrupt("bad expiry time"))?),
        };

        Ok(Self {
            banner: banner.to_string(),
            reason: reason.to_string(),
            rank,
            issued,
            expiry,
        })
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let secs = text.parse::<i64>().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Outcome of looking a name up in the temp-ban store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TempBanStatus {
    NotBanned,
    /// The record had lapsed and has been removed and persisted.
    Expired,
    Active {
        record: BanRecord,
        remaining: chrono::Duration,
    },
}

#[derive(Debug, Default)]
pub struct BanStore {
    records: KeyedList,
}

impl BanStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Ok(Self {
            records: KeyedList::load(path)?,
        })
    }

    pub fn insert(&self, name: &str, record: &BanRecord) {
        self.records.set(name, record.encode());
    }

    /// Stores record data as given, without encoding it.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, name: &str, data: &str) {
        self.records.set(name, data);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains(name)
    }

    pub fn lookup(&self, name: &str) -> StoreResult<Option<BanRecord>> {
        self.records
            .find(name)
            .map(|data| BanRecord::decode(name, &data))
            .transpose()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.records.remove(name)
    }

    pub fn save(&self) -> StoreResult<()> {
        self.records.save()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Evaluates the temp ban for `name` at `now`, expiring it lazily.
    ///
    /// A lapsed record is removed and the store saved before this returns.
    /// Two callers racing on the same lapsed record both see `Expired`; the
    /// second removal is a no-op.
    pub fn check_temp(&self, name: &str, now: DateTime<Utc>) -> StoreResult<TempBanStatus> {
        let Some(record) = self.lookup(name)? else {
            return Ok(TempBanStatus::NotBanned);
        };
        let Some(expiry) = record.expiry else {
            return Ok(TempBanStatus::NotBanned);
        };

        if now >= expiry {
            if self.remove(name) {
                info!("Temp ban for {} expired, removing", name);
            }
            self.save()?;
            return Ok(TempBanStatus::Expired);
        }

        Ok(TempBanStatus::Active {
            remaining: expiry - now,
            record,
        })
    }
}

/// Formats a duration in coarse units, e.g. `2d 3h 15m`.
///
/// Zero components are skipped; seconds are only shown when asked for. An
/// all-zero duration renders as `0s` or `0m`.
pub fn shorten(duration: chrono::Duration, seconds: bool) -> String {
    let negative = duration < chrono::Duration::zero();
    let total = duration.num_seconds().unsigned_abs();

    let units = [
        (total / 86_400, 'd'),
        ((total / 3_600) % 24, 'h'),
        ((total / 60) % 60, 'm'),
        (if seconds { total % 60 } else { 0 }, 's'),
    ];
    let parts: Vec<String> = units
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect();

    let text = if parts.is_empty() {
        (if seconds { "0s" } else { "0m" }).to_string()
    } else {
        parts.join(" ")
    };
    if negative {
        format!("-{}", text)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_record_encoding() {
        let record = BanRecord::temporary("Op", "griefing the spawn", Rank::BUILDER, at(100), at(200));
        assert_eq!(record.encode(), "Op 30 100 200 griefing the spawn");

        let decoded = BanRecord::decode("alice", &record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_permanent_record_without_reason() {
        let record = BanRecord::permanent("Op", "", Rank::GUEST, at(100));
        assert_eq!(record.encode(), "Op 0 100 -");

        let decoded = BanRecord::decode("alice", "Op 0 100 -").unwrap();
        assert_eq!(decoded.expiry, None);
        assert_eq!(decoded.reason, "");
    }

    #[test]
    fn test_corrupt_records() {
        assert!(matches!(
            BanRecord::decode("alice", "Op"),
            Err(StoreError::Corrupt { .. })
        ));
        assert!(matches!(
            BanRecord::decode("alice", "Op notarank 100 -"),
            Err(StoreError::Corrupt { .. })
        ));
        assert!(matches!(
            BanRecord::decode("alice", "Op 0 100 soon reason"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_lookup_corrupt_record_errors() {
        let store = BanStore::in_memory();
        store.insert_raw("alice", "garbage");
        assert!(store.lookup("alice").is_err());
        assert!(store.check_temp("alice", at(0)).is_err());
    }

    #[test]
    fn test_active_temp_ban() {
        let store = BanStore::in_memory();
        let record = BanRecord::temporary("Op", "spam", Rank::GUEST, at(0), at(3_600));
        store.insert("Alice", &record);

        let status = store.check_temp("alice", at(600)).unwrap();
        assert_eq!(
            status,
            TempBanStatus::Active {
                record,
                remaining: Duration::seconds(3_000),
            }
        );
        assert!(store.contains("alice"));
    }

    #[test]
    fn test_expired_temp_ban_is_removed() {
        let store = BanStore::in_memory();
        store.insert(
            "alice",
            &BanRecord::temporary("Op", "", Rank::GUEST, at(0), at(100)),
        );

        assert_eq!(store.check_temp("alice", at(100)).unwrap(), TempBanStatus::Expired);
        assert!(!store.contains("alice"));
        assert_eq!(store.check_temp("alice", at(100)).unwrap(), TempBanStatus::NotBanned);
    }

    #[test]
    fn test_expired_removal_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tempbans.txt");

        let store = BanStore::load(&path).unwrap();
        store.insert(
            "alice",
            &BanRecord::temporary("Op", "", Rank::GUEST, at(0), at(100)),
        );
        store.insert(
            "bob",
            &BanRecord::temporary("Op", "", Rank::GUEST, at(0), at(10_000)),
        );
        store.save().unwrap();

        store.check_temp("alice", at(500)).unwrap();

        let reloaded = BanStore::load(&path).unwrap();
        assert!(!reloaded.contains("alice"));
        assert!(reloaded.contains("bob"));
    }

    #[test]
    fn test_permanent_record_is_not_a_temp_ban() {
        let store = BanStore::in_memory();
        store.insert("alice", &BanRecord::permanent("Op", "x", Rank::GUEST, at(0)));
        assert_eq!(store.check_temp("alice", at(1_000_000)).unwrap(), TempBanStatus::NotBanned);
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten(Duration::seconds(0), true), "0s");
        assert_eq!(shorten(Duration::seconds(0), false), "0m");
        assert_eq!(shorten(Duration::seconds(59), true), "59s");
        assert_eq!(shorten(Duration::seconds(59), false), "0m");
        assert_eq!(shorten(Duration::seconds(3_000), true), "50m");
        assert_eq!(shorten(Duration::seconds(90_061), true), "1d 1h 1m 1s");
        assert_eq!(shorten(Duration::seconds(7_200), false), "2h");
        assert_eq!(shorten(Duration::seconds(-90), true), "-1m 30s");
    }
}
