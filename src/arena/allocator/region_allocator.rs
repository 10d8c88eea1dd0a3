//! Region Allocator.

use std::sync::atomic::{AtomicU64, Ordering};

use super::free_index::FreeSizeIndex;
use super::region_list::{RegionList, RegionNode, SlotIndex};
use crate::arena::{Region, RegionHandle, RegionState};
use crate::metrics::AllocatorMetrics;
use crate::{ErrorKind, Result};

// プロセス内でアロケータを一意に識別するための番号
static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(0);

/// アリーナ用のアロケータ.
///
/// 指定された容量を有するアリーナから、個々の割当要求に必要な部分領域の割当を担当する.
///
/// 割当の単位はバイトであり、アライメントは考慮しない.
///
/// この実装自体は、完全にメモリ上のデータ構造であり、状態は永続化されない.
///
/// # 割当戦略
///
/// このアロケータは"BestFit"戦略を採用している.
///
/// "BestFit"戦略では、空き領域をサイズ順に並べたインデックスを管理している.
///
/// 新規割当要求が発行された際には、インデックスを探索し、
/// 要求サイズを満たす空き領域の中で、一番サイズが小さいものが選択される.
///
/// 選択された空き領域は、その先頭から要求サイズ分だけの割当を行い、
/// もしまだ余剰分がある場合には、分割された上で再びインデックスに戻される.
///
/// 解放された領域は、アドレス上で隣接する空き領域が存在すれば、それらと結合される.
/// そのため、隣り合う二つの空き領域が存在することはない.
#[derive(Debug)]
pub struct RegionAllocator {
    id: u64,
    list: RegionList,
    index: FreeSizeIndex,
    free_bytes: u64,
    metrics: AllocatorMetrics,
}
impl RegionAllocator {
    /// アロケータを構築する.
    ///
    /// アロケータが利用可能な領域のサイズ（キャパシティ）の情報は、`metrics`から取得される.
    /// 構築直後は、全体が一つの空き領域となる.
    ///
    /// # Errors
    ///
    /// キャパシティが`0`の場合には、種類が`ErrorKind::InvalidCapacity`のエラーが返される.
    pub fn new(metrics: AllocatorMetrics) -> Result<Self> {
        let capacity = metrics.capacity_bytes();
        track_assert!(capacity > 0, ErrorKind::InvalidCapacity);

        let mut allocator = RegionAllocator {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            list: RegionList::new(capacity),
            index: FreeSizeIndex::new(),
            free_bytes: 0,
            metrics,
        };
        let head = allocator.list.head();
        track!(allocator.add_free_region(head))?;
        Ok(allocator)
    }

    /// `size`バイトの部分領域の割当を行う.
    ///
    /// # Errors
    ///
    /// 以下の場合には、状態を一切変更せずにエラーを返す:
    ///
    /// - `size`が`0`の場合には、種類が`ErrorKind::InvalidSize`のエラー
    /// - 十分な空き領域が存在しない場合には、種類が`ErrorKind::OutOfMemory`のエラー
    pub fn allocate(&mut self, size: u64) -> Result<RegionHandle> {
        track_assert!(size > 0, ErrorKind::InvalidSize);

        let free = if let Some(free) = self.index.best_fit(size) {
            free
        } else {
            self.metrics.nospace_failures.increment();
            track_panic!(
                ErrorKind::OutOfMemory,
                "size={}, free_bytes={}",
                size,
                self.free_bytes
            );
        };
        debug_assert!(size <= free.size());
        if size < free.size() && self.list.is_full() {
            self.metrics.nospace_failures.increment();
            track_panic!(ErrorKind::OutOfMemory, "Too many regions");
        }

        let slot = free.slot();
        track!(self.delete_free_region(slot))?;
        let start = track!(self.list.region(slot))?.start;
        if let Some(tail) = track!(self.list.split(slot, start + size))? {
            // まだ余剰分がある場合は再利用する
            self.metrics.split_regions.increment();
            track!(self.add_free_region(tail))?;
        }

        let generation = track_assert_some!(
            self.list.generation(slot),
            ErrorKind::InconsistentState; slot
        );
        self.metrics.count_allocation(size);
        Ok(RegionHandle::new(self.id, slot, generation, start, size))
    }

    /// 割当済みの部分領域の解放を行う.
    ///
    /// 解放された領域は、前後の空き領域と結合された上で、空き領域インデックスに戻される.
    ///
    /// # Errors
    ///
    /// `handle`が割当済みの部分領域を指していない場合(e.g., 二重解放)には、
    /// 状態を一切変更せずに、種類が`ErrorKind::InvalidHandle`のエラーを返す.
    pub fn release(&mut self, handle: RegionHandle) -> Result<()> {
        track!(self.validate_handle(&handle))?;

        // 以後、このハンドル(およびそのクローン)は無効となる
        let mut slot = handle.slot;
        track!(self.list.bump_generation(slot))?;
        self.metrics.count_releasion(handle.len());

        if let Some(prev) = track!(self.list.predecessor(slot))? {
            if track!(self.list.region(prev))?.is_free() {
                track!(self.delete_free_region(prev))?;
                track!(self.list.merge(prev, slot))?;
                self.metrics.merged_regions.increment();
                slot = prev;
            }
        }
        if let Some(next) = track!(self.list.successor(slot))? {
            if track!(self.list.region(next))?.is_free() {
                track!(self.delete_free_region(next))?;
                track!(self.list.merge(slot, next))?;
                self.metrics.merged_regions.increment();
            }
        }
        track!(self.add_free_region(slot))?;
        Ok(())
    }

    /// `handle`が指す部分領域を返す.
    ///
    /// # Errors
    ///
    /// `handle`が割当済みの部分領域を指していない場合には、
    /// 種類が`ErrorKind::InvalidHandle`のエラーが返される.
    pub fn resolve(&self, handle: &RegionHandle) -> Result<Region> {
        track!(self.validate_handle(handle))?;
        Ok(Region {
            start: handle.offset(),
            end: handle.end(),
            state: RegionState::Allocated,
        })
    }

    /// `handle`が指す部分領域の開始位置を返す.
    pub fn offset_of(&self, handle: &RegionHandle) -> Result<u64> {
        let region = track!(self.resolve(handle))?;
        Ok(region.start)
    }

    /// 全ての部分領域を、アドレス順に返す.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.list.iter().map(|(_, node)| to_region(node))
    }

    /// アロケータが管理する領域の容量を返す.
    pub fn capacity(&self) -> u64 {
        self.metrics.capacity_bytes()
    }

    /// 空き領域の合計バイト数を返す.
    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    /// 割当済みの領域の合計バイト数を返す.
    pub fn allocated_bytes(&self) -> u64 {
        self.capacity() - self.free_bytes
    }

    /// 空き領域の数を返す.
    pub fn free_region_count(&self) -> usize {
        self.index.len()
    }

    /// 最大の空き領域を返す.
    ///
    /// これより大きなサイズの割当要求は、必ず`ErrorKind::OutOfMemory`となる.
    pub fn largest_free_region(&self) -> Option<Region> {
        self.index
            .largest()
            .and_then(|entry| self.list.get(entry.slot()))
            .map(to_region)
    }

    /// アロケータ用のメトリクスを返す.
    pub fn metrics(&self) -> &AllocatorMetrics {
        &self.metrics
    }

    /// 内部状態の整合性を検査する.
    ///
    /// 以下が成立していることを確認する:
    ///
    /// - 部分領域群が隙間なく連続して`[0, capacity)`を覆っている
    /// - 隣接する二つの部分領域が、ともに空き領域であることはない
    /// - 空き領域とインデックスのエントリが一対一に対応している
    ///
    /// # Errors
    ///
    /// 不整合が検出された場合には、種類が`ErrorKind::InconsistentState`のエラーが返される.
    pub fn check_invariants(&self) -> Result<()> {
        let mut expected_start = 0;
        let mut prev: Option<(SlotIndex, bool)> = None;
        let mut regions = 0;
        let mut free_regions = 0;
        let mut free_bytes = 0;
        for (slot, node) in self.list.iter() {
            track_assert_eq!(node.start, expected_start, ErrorKind::InconsistentState);
            track_assert!(
                node.start < node.end,
                ErrorKind::InconsistentState; slot, node.start, node.end
            );
            track_assert_eq!(
                node.prev,
                prev.map(|(s, _)| s),
                ErrorKind::InconsistentState
            );
            if let Some(entry) = node.free_entry {
                track_assert!(
                    prev.map_or(true, |(_, free)| !free),
                    ErrorKind::InconsistentState,
                    "Adjacent free regions: start={}",
                    node.start
                );
                track_assert_eq!(entry.slot(), slot, ErrorKind::InconsistentState);
                track_assert_eq!(entry.size(), node.len(), ErrorKind::InconsistentState);
                track_assert!(
                    self.index.contains(entry),
                    ErrorKind::InconsistentState; entry
                );
                free_regions += 1;
                free_bytes += node.len();
            }
            regions += 1;
            expected_start = node.end;
            prev = Some((slot, node.is_free()));
        }
        track_assert_eq!(expected_start, self.capacity(), ErrorKind::InconsistentState);
        track_assert_eq!(regions, self.list.len(), ErrorKind::InconsistentState);
        track_assert_eq!(free_regions, self.index.len(), ErrorKind::InconsistentState);
        track_assert_eq!(free_bytes, self.free_bytes, ErrorKind::InconsistentState);
        Ok(())
    }

    fn add_free_region(&mut self, slot: SlotIndex) -> Result<()> {
        let node = track!(self.list.region_mut(slot))?;
        track_assert!(
            node.free_entry.is_none(),
            ErrorKind::InconsistentState; slot
        );
        let entry = track!(self.index.insert(slot, node.len()))?;
        node.free_entry = Some(entry);
        self.free_bytes += entry.size();
        self.metrics.inserted_free_regions.increment();
        Ok(())
    }

    fn delete_free_region(&mut self, slot: SlotIndex) -> Result<()> {
        let node = track!(self.list.region_mut(slot))?;
        let entry = track_assert_some!(
            node.free_entry.take(),
            ErrorKind::InconsistentState; slot
        );
        track!(self.index.remove(entry))?;
        self.free_bytes -= entry.size();
        self.metrics.removed_free_regions.increment();
        Ok(())
    }

    // 自身が発行したハンドルであり、スロットの世代番号と領域の範囲が発行時から変わっておらず、
    // かつ割当済みである場合に限り、有効なハンドルであると判断する.
    fn validate_handle(&self, handle: &RegionHandle) -> Result<()> {
        let valid = match self.list.get(handle.slot) {
            Some(node) if handle.allocator_id == self.id => {
                self.list.generation(handle.slot) == Some(handle.generation)
                    && !node.is_free()
                    && node.start == handle.offset()
                    && node.end == handle.end()
            }
            _ => false,
        };
        if !valid {
            self.metrics.invalid_handles.increment();
            track_panic!(ErrorKind::InvalidHandle, "{:?}", handle);
        }
        Ok(())
    }
}

fn to_region(node: &RegionNode) -> Region {
    let state = if node.is_free() {
        RegionState::Free
    } else {
        RegionState::Allocated
    };
    Region {
        start: node.start,
        end: node.end,
        state,
    }
}
