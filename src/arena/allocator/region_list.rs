//! Region List.

use super::free_index::FreeEntry;
use crate::{ErrorKind, Result};

/// 部分領域を格納するスロットの位置.
pub(crate) type SlotIndex = u32;

/// リスト内の一つの部分領域.
///
/// `[start, end)`の半開区間を表し、アドレス上で隣接する部分領域へのリンクを保持している.
#[derive(Debug, Clone)]
pub(crate) struct RegionNode {
    pub start: u64,
    pub end: u64,
    pub prev: Option<SlotIndex>,
    pub next: Option<SlotIndex>,

    /// 空き領域インデックス内の、この部分領域のエントリ.
    ///
    /// `Some`であることが、この部分領域が空いていることを意味する.
    pub free_entry: Option<FreeEntry>,
}
#[allow(clippy::len_without_is_empty)]
impl RegionNode {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_free(&self) -> bool {
        self.free_entry.is_some()
    }
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    node: Option<RegionNode>,
}

/// アドレス順に並んだ部分領域のリスト.
///
/// 部分領域群は互いに素であり、隙間なく連続して、アリーナ全体`[0, capacity)`を覆う.
///
/// 各部分領域はスロット配列に格納され、`prev`/`next`のスロット位置で連結されている.
/// そのため、ある部分領域の分割や結合が、無関係な部分領域のスロット位置を変えることはない.
///
/// 結合によって破棄されたスロットは世代番号を進めた上で再利用される.
/// 世代番号が上限に達したスロットは、以後再利用されない.
///
/// このリスト自体は、どの部分領域が空いているかの管理(i.e., 空き領域インデックスの更新)は行わない.
#[derive(Debug)]
pub(crate) struct RegionList {
    slots: Vec<Slot>,
    vacant: Vec<SlotIndex>,
    head: SlotIndex,
    len: usize,
}
impl RegionList {
    /// 一つの部分領域`[0, capacity)`のみを含むリストを生成する.
    ///
    /// # Panics
    ///
    /// `capacity`が`0`の場合には、現在のスレッドがパニックする.
    pub fn new(capacity: u64) -> Self {
        assert!(capacity > 0);
        let node = RegionNode {
            start: 0,
            end: capacity,
            prev: None,
            next: None,
            free_entry: None,
        };
        RegionList {
            slots: vec![Slot {
                generation: 0,
                node: Some(node),
            }],
            vacant: Vec::new(),
            head: 0,
            len: 1,
        }
    }

    /// アドレスが最も小さい部分領域のスロット位置を返す.
    pub fn head(&self) -> SlotIndex {
        self.head
    }

    /// 部分領域の数を返す.
    pub fn len(&self) -> usize {
        self.len
    }

    /// これ以上の部分領域を追加できない場合には`true`を返す.
    pub fn is_full(&self) -> bool {
        self.vacant.is_empty() && self.slots.len() > SlotIndex::max_value() as usize
    }

    pub fn get(&self, slot: SlotIndex) -> Option<&RegionNode> {
        self.slots
            .get(slot as usize)
            .and_then(|s| s.node.as_ref())
    }

    pub fn region(&self, slot: SlotIndex) -> Result<&RegionNode> {
        let node = track_assert_some!(self.get(slot), ErrorKind::InconsistentState; slot);
        Ok(node)
    }

    pub fn region_mut(&mut self, slot: SlotIndex) -> Result<&mut RegionNode> {
        let node = track_assert_some!(
            self.slots
                .get_mut(slot as usize)
                .and_then(|s| s.node.as_mut()),
            ErrorKind::InconsistentState; slot
        );
        Ok(node)
    }

    /// スロットの現在の世代番号を返す.
    pub fn generation(&self, slot: SlotIndex) -> Option<u64> {
        self.slots.get(slot as usize).map(|s| s.generation)
    }

    /// スロットの世代番号を一つ進める.
    ///
    /// それ以前の世代番号を保持するハンドルは、全て無効となる.
    ///
    /// # Errors
    ///
    /// 世代番号が上限に達している場合には、何も変更せずに
    /// 種類が`ErrorKind::InconsistentState`のエラーが返される.
    pub fn bump_generation(&mut self, slot: SlotIndex) -> Result<()> {
        let s = track_assert_some!(
            self.slots.get_mut(slot as usize),
            ErrorKind::InconsistentState; slot
        );
        s.generation = track_assert_some!(
            s.generation.checked_add(1),
            ErrorKind::InconsistentState,
            "Generation overflow: slot={}",
            slot
        );
        Ok(())
    }

    /// アドレス上で直前にある部分領域を返す.
    pub fn predecessor(&self, slot: SlotIndex) -> Result<Option<SlotIndex>> {
        Ok(track!(self.region(slot))?.prev)
    }

    /// アドレス上で直後にある部分領域を返す.
    pub fn successor(&self, slot: SlotIndex) -> Result<Option<SlotIndex>> {
        Ok(track!(self.region(slot))?.next)
    }

    /// 部分領域`[s, e)`を、`at`の位置で`[s, at)`と`[at, e)`に分割する.
    ///
    /// 前半は元のスロットを引き継ぎ、後半は新たなスロットに格納される.
    /// 後半のスロット位置が返り値となる.
    ///
    /// `at == e`の場合には何も行わず`None`が返される.
    ///
    /// # Errors
    ///
    /// `s < at <= e`を満たさない場合には、種類が`ErrorKind::InconsistentState`のエラーが返される.
    pub fn split(&mut self, slot: SlotIndex, at: u64) -> Result<Option<SlotIndex>> {
        let (end, next) = {
            let node = track!(self.region(slot))?;
            track_assert!(
                node.start < at && at <= node.end,
                ErrorKind::InconsistentState,
                "start={}, end={}, at={}",
                node.start,
                node.end,
                at
            );
            if at == node.end {
                return Ok(None);
            }
            (node.end, node.next)
        };

        let tail = RegionNode {
            start: at,
            end,
            prev: Some(slot),
            next,
            free_entry: None,
        };
        let tail_slot = track!(self.insert_slot(tail))?;
        if let Some(next) = next {
            track!(self.region_mut(next))?.prev = Some(tail_slot);
        }
        let node = track!(self.region_mut(slot))?;
        node.end = at;
        node.next = Some(tail_slot);
        Ok(Some(tail_slot))
    }

    /// 隣接する二つの部分領域`a`と`b`(`b`は`a`の直後)を結合する.
    ///
    /// 結合後の領域`[a.start, b.end)`は`a`のスロットに格納され、`b`のスロットは破棄される.
    pub fn merge(&mut self, a: SlotIndex, b: SlotIndex) -> Result<()> {
        let (end, next) = {
            let node = track!(self.region(b))?;
            track_assert_eq!(node.prev, Some(a), ErrorKind::InconsistentState);
            (node.end, node.next)
        };
        {
            let node = track!(self.region_mut(a))?;
            track_assert_eq!(node.next, Some(b), ErrorKind::InconsistentState);
            node.end = end;
            node.next = next;
        }
        if let Some(next) = next {
            track!(self.region_mut(next))?.prev = Some(a);
        }
        track!(self.remove_slot(b))?;
        Ok(())
    }

    /// アドレス順に部分領域を走査するイテレータを返す.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            next: Some(self.head),
        }
    }

    fn insert_slot(&mut self, node: RegionNode) -> Result<SlotIndex> {
        let slot = if let Some(slot) = self.vacant.pop() {
            self.slots[slot as usize].node = Some(node);
            slot
        } else {
            track_assert!(!self.is_full(), ErrorKind::OutOfMemory, "Too many regions");
            let slot = self.slots.len() as SlotIndex;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            slot
        };
        self.len += 1;
        Ok(slot)
    }

    fn remove_slot(&mut self, slot: SlotIndex) -> Result<()> {
        let s = track_assert_some!(
            self.slots.get_mut(slot as usize),
            ErrorKind::InconsistentState; slot
        );
        track_assert!(s.node.is_some(), ErrorKind::InconsistentState; slot);
        s.node = None;
        self.len -= 1;
        if let Some(generation) = s.generation.checked_add(1) {
            s.generation = generation;
            self.vacant.push(slot);
        }
        Ok(())
    }
}

/// `RegionList`の要素をアドレス順に走査するイテレータ.
#[derive(Debug)]
pub(crate) struct Iter<'a> {
    list: &'a RegionList,
    next: Option<SlotIndex>,
}
impl<'a> Iterator for Iter<'a> {
    type Item = (SlotIndex, &'a RegionNode);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        let node = self.list.get(slot)?;
        self.next = node.next;
        Some((slot, node))
    }
}
