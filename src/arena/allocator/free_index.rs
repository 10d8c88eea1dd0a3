//! Free-Size Index.

use std::cmp;
use std::collections::BTreeSet;
use std::ops::Bound::{Included, Unbounded};

use super::region_list::SlotIndex;
use crate::{ErrorKind, Result};

/// 空き領域インデックスの一つのエントリ.
///
/// 比較は"空き領域のサイズ順"で行われ、サイズが等しい場合にはスロット位置順となる.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FreeEntry {
    size: u64,
    slot: SlotIndex,
}
impl FreeEntry {
    pub fn new(size: u64, slot: SlotIndex) -> Self {
        FreeEntry { size, slot }
    }

    pub fn size(self) -> u64 {
        self.size
    }

    pub fn slot(self) -> SlotIndex {
        self.slot
    }
}
impl PartialOrd for FreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for FreeEntry {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match self.size.cmp(&other.size) {
            cmp::Ordering::Equal => self.slot.cmp(&other.slot),
            not_equal => not_equal,
        }
    }
}

/// 空き領域をサイズ順に管理するためのインデックス.
///
/// 空き領域一つにつき、ちょうど一つのエントリを保持する.
#[derive(Debug, Default)]
pub(crate) struct FreeSizeIndex {
    entries: BTreeSet<FreeEntry>,
}
impl FreeSizeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// `slot`に格納されている`size`バイトの空き領域を登録する.
    ///
    /// 登録されたエントリが返り値となる.
    pub fn insert(&mut self, slot: SlotIndex, size: u64) -> Result<FreeEntry> {
        let entry = FreeEntry::new(size, slot);
        track_assert!(
            self.entries.insert(entry),
            ErrorKind::InconsistentState,
            "{:?}",
            entry
        );
        Ok(entry)
    }

    /// 以前に登録されたエントリを削除する.
    ///
    /// # Errors
    ///
    /// `entry`が登録されていない場合には、種類が`ErrorKind::InconsistentState`のエラーが返される.
    pub fn remove(&mut self, entry: FreeEntry) -> Result<()> {
        track_assert!(
            self.entries.remove(&entry),
            ErrorKind::InconsistentState,
            "{:?}",
            entry
        );
        Ok(())
    }

    /// サイズが`size`以上の空き領域のうち、最小のものを返す.
    ///
    /// 同じサイズの候補が複数ある場合に、どれが選ばれるかは規定しない.
    pub fn best_fit(&self, size: u64) -> Option<FreeEntry> {
        let key = FreeEntry::new(size, 0);
        self.entries
            // `FreeEntry`の全順序を用いて `size` 以上かつ最小のエントリを探す
            .range((Included(&key), Unbounded))
            .next()
            .cloned()
    }

    /// サイズが最大の空き領域を返す.
    pub fn largest(&self) -> Option<FreeEntry> {
        self.entries.iter().next_back().cloned()
    }

    pub fn contains(&self, entry: FreeEntry) -> bool {
        self.entries.contains(&entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn best_fit_works() -> TestResult {
        let mut index = FreeSizeIndex::new();
        track!(index.insert(0, 10))?;
        track!(index.insert(1, 30))?;
        track!(index.insert(2, 20))?;

        assert_eq!(index.best_fit(15), Some(FreeEntry::new(20, 2)));
        assert_eq!(index.best_fit(20), Some(FreeEntry::new(20, 2)));
        assert_eq!(index.best_fit(1), Some(FreeEntry::new(10, 0)));
        assert_eq!(index.best_fit(30), Some(FreeEntry::new(30, 1)));
        assert_eq!(index.best_fit(31), None);
        assert_eq!(index.largest(), Some(FreeEntry::new(30, 1)));
        Ok(())
    }

    #[test]
    fn same_size_entries_work() -> TestResult {
        let mut index = FreeSizeIndex::new();
        let a = track!(index.insert(3, 20))?;
        let b = track!(index.insert(7, 20))?;
        assert_eq!(index.len(), 2);

        // どちらが選ばれるかは規定しないが、条件を満たすものが選ばれる
        let found = index.best_fit(11);
        assert!(found == Some(a) || found == Some(b));
        assert_eq!(found.map(|e| e.size()), Some(20));

        track!(index.remove(a))?;
        assert_eq!(index.best_fit(11), Some(b));
        assert!(!index.contains(a));
        assert!(index.contains(b));
        Ok(())
    }

    #[test]
    fn removing_unknown_entry_fails() -> TestResult {
        let mut index = FreeSizeIndex::new();
        let entry = track!(index.insert(0, 10))?;
        track!(index.remove(entry))?;

        let e = index.remove(entry).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InconsistentState));

        let e = index.remove(FreeEntry::new(5, 1)).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InconsistentState));
        Ok(())
    }
}
