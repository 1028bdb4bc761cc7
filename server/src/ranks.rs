//! Name to rank assignments.

use crate::error::StoreResult;
use crate::lists::KeyedList;
use log::warn;
use shared::Rank;
use std::path::PathBuf;

/// Explicit rank assignments, falling back to a default rank.
///
/// Stored as `name rank` lines where rank is a name (`operator`) or a number.
#[derive(Debug)]
pub struct RankTable {
    assignments: KeyedList,
    default_rank: Rank,
}

impl RankTable {
    pub fn in_memory(default_rank: Rank) -> Self {
        Self {
            assignments: KeyedList::in_memory(),
            default_rank,
        }
    }

    pub fn load(path: impl Into<PathBuf>, default_rank: Rank) -> StoreResult<Self> {
        Ok(Self {
            assignments: KeyedList::load(path)?,
            default_rank,
        })
    }

    /// Rank for `name`. Unparseable entries fall back to the default rank.
    pub fn rank_of(&self, name: &str) -> Rank {
        match self.assignments.find(name) {
            Some(data) => Rank::parse(&data).unwrap_or_else(|| {
                warn!("Unknown rank '{}' assigned to {}", data, name);
                self.default_rank
            }),
            None => self.default_rank,
        }
    }

    pub fn set_rank(&self, name: &str, rank: Rank) {
        if rank == self.default_rank {
            self.assignments.remove(name);
        } else {
            self.assignments.set(name, rank.0.to_string());
        }
    }

    pub fn save(&self) -> StoreResult<()> {
        self.assignments.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rank() {
        let table = RankTable::in_memory(Rank::GUEST);
        assert_eq!(table.rank_of("nobody"), Rank::GUEST);
    }

    #[test]
    fn test_assigned_rank() {
        let table = RankTable::in_memory(Rank::GUEST);
        table.set_rank("Alice", Rank::OPERATOR);
        table.set_rank("griefer", Rank::BANNED);

        assert_eq!(table.rank_of("alice"), Rank::OPERATOR);
        assert_eq!(table.rank_of("GRIEFER"), Rank::BANNED);

        table.set_rank("alice", Rank::GUEST);
        assert_eq!(table.rank_of("alice"), Rank::GUEST);
    }

    #[test]
    fn test_named_ranks_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranks.txt");
        std::fs::write(&path, "alice operator\nbob 45\ncarol wizard\n").unwrap();

        let table = RankTable::load(&path, Rank::GUEST).unwrap();
        assert_eq!(table.rank_of("alice"), Rank::OPERATOR);
        assert_eq!(table.rank_of("bob"), Rank(45));
        assert_eq!(table.rank_of("carol"), Rank::GUEST);
    }
}
