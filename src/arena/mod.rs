//! アリーナ.
//!
//! [BufferArena]は、[RegionAllocator]による部分領域の計算と、
//! [BackingStore]へのペイロードの書き込み、を取りまとめる.
//!
//! ```text
//! allocate: 空き領域インデックスを検索 => 部分領域を分割 => バッキングストアへ書き込み
//! free:     前後の空き領域と結合 => 空き領域インデックスに戻す
//! ```
//!
//! # Examples
//!
//! ```
//! use regionarena::arena::ArenaBuilder;
//! use regionarena::ErrorKind;
//!
//! let mut arena = ArenaBuilder::new().create_in_memory(100).unwrap();
//!
//! let a = arena.allocate(&[1; 50]).unwrap();
//! let b = arena.allocate(&[2; 50]).unwrap();
//! assert_eq!(a.offset(), 0);
//! assert_eq!(b.offset(), 50);
//!
//! let e = arena.allocate(&[3]).err().map(|e| *e.kind());
//! assert_eq!(e, Some(ErrorKind::OutOfMemory));
//!
//! arena.free(a).unwrap();
//! let c = arena.allocate(&[4; 10]).unwrap();
//! assert_eq!(c.offset(), 0);
//! assert_eq!(arena.get(&c).unwrap(), vec![4; 10]);
//! ```
//!
//! [BufferArena]: ./struct.BufferArena.html
//! [RegionAllocator]: ./allocator/struct.RegionAllocator.html
//! [BackingStore]: ../store/trait.BackingStore.html
use slog::Logger;
use std::convert::TryFrom;
use uuid::Uuid;

pub use self::builder::ArenaBuilder;
pub use self::handle::RegionHandle;
pub use self::region::{Region, RegionState};

use self::allocator::RegionAllocator;
use crate::metrics::ArenaMetrics;
use crate::store::BackingStore;
use crate::{ErrorKind, Result};

pub mod allocator;

mod builder;
mod handle;
mod region;

/// 固定容量のバッキングストアを、可変長の部分領域群に切り分けて利用するためのアリーナ.
///
/// 割当時には、部分領域の確保に続けて、ペイロードがバッキングストアの対応する位置に書き込まれる.
///
/// 全ての操作は同期的に完了し、内部で同期処理は行わない.
/// 複数のスレッドから利用する場合には、利用者側で排他制御を行う必要がある.
///
/// アリーナを破棄すると、バッキングストアも破棄される.
#[derive(Debug)]
pub struct BufferArena<S> {
    allocator: RegionAllocator,
    store: S,
    logger: Logger,
    metrics: ArenaMetrics,
    instance_uuid: Uuid,
}
impl<S> BufferArena<S>
where
    S: BackingStore,
{
    pub(crate) fn new(
        allocator: RegionAllocator,
        store: S,
        logger: Logger,
        metrics: ArenaMetrics,
        instance_uuid: Uuid,
    ) -> Self {
        BufferArena {
            allocator,
            store,
            logger,
            metrics,
            instance_uuid,
        }
    }

    /// `payload`を格納するための部分領域を割り当て、その位置に`payload`を書き込む.
    ///
    /// 割り当てられる領域のサイズは`payload.len()`と等しい.
    /// 格納場所はアリーナが決定し、その位置は返り値のハンドルから取得できる.
    ///
    /// # Errors
    ///
    /// - `payload`が空の場合には、種類が`ErrorKind::InvalidSize`のエラーが返される
    /// - 十分な空き領域がない場合には、種類が`ErrorKind::OutOfMemory`のエラーが返される
    /// - バッキングストアへの書き込みに失敗した場合には、割当は取り消された上で、そのエラーが返される
    pub fn allocate(&mut self, payload: &[u8]) -> Result<RegionHandle> {
        let size = payload.len() as u64;
        let handle = match self.allocator.allocate(size) {
            Ok(handle) => handle,
            Err(e) => {
                if *e.kind() == ErrorKind::OutOfMemory {
                    warn!(self.logger, "No free region is large enough";
                          "size" => size,
                          "free_bytes" => self.allocator.free_bytes(),
                          "free_regions" => self.allocator.free_region_count());
                }
                return Err(track!(e));
            }
        };

        if let Err(e) = self.store.write_at(handle.offset(), payload) {
            self.metrics.write_failures.increment();
            warn!(self.logger, "Cannot write payload to the backing store: {}", e;
                  "offset" => handle.offset(), "size" => size);
            track!(self.allocator.release(handle))?;
            return Err(track!(e));
        }
        self.metrics.written_bytes.add_u64(size);

        debug!(self.logger, "Allocated"; "offset" => handle.offset(), "size" => size);
        Ok(handle)
    }

    /// `handle`が指す部分領域を解放する.
    ///
    /// # Errors
    ///
    /// `handle`が既に解放済みの場合等には、種類が`ErrorKind::InvalidHandle`のエラーが返される.
    /// その場合、アリーナの状態は変化しない.
    pub fn free(&mut self, handle: RegionHandle) -> Result<()> {
        let (offset, size) = (handle.offset(), handle.len());
        if let Err(e) = self.allocator.release(handle) {
            warn!(self.logger, "Cannot free region: {}", e; "offset" => offset, "size" => size);
            return Err(track!(e));
        }
        debug!(self.logger, "Freed"; "offset" => offset, "size" => size);
        Ok(())
    }

    /// `handle`が指す部分領域に格納されているバイト列を読み込む.
    ///
    /// # Errors
    ///
    /// - `handle`が既に解放済みの場合等には、種類が`ErrorKind::InvalidHandle`のエラーが返される
    /// - 領域がメモリ上のバッファに収まらない場合には、種類が`ErrorKind::InvalidInput`のエラーが返される
    pub fn get(&mut self, handle: &RegionHandle) -> Result<Vec<u8>> {
        let region = track!(self.allocator.resolve(handle))?;
        let len = track!(buffer_len(region.len()))?;
        let mut buf = vec![0; len];
        track!(self.store.read_at(region.start, &mut buf))?;
        Ok(buf)
    }

    /// `handle`が指す部分領域の開始位置を返す.
    ///
    /// `RegionHandle::offset`とは異なり、ハンドルが有効かどうかの検証を行う.
    pub fn offset(&self, handle: &RegionHandle) -> Result<u64> {
        track!(self.allocator.offset_of(handle))
    }

    /// アリーナの容量を返す.
    pub fn capacity(&self) -> u64 {
        self.allocator.capacity()
    }

    /// アリーナのUUIDを返す.
    pub fn instance_uuid(&self) -> Uuid {
        self.instance_uuid
    }

    /// 全ての部分領域を、アドレス順に返す.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.allocator.regions()
    }

    /// アロケータへの参照を返す.
    pub fn allocator(&self) -> &RegionAllocator {
        &self.allocator
    }

    /// バッキングストアへの参照を返す.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// バッキングストアへの可変参照を返す.
    ///
    /// 割当済みの領域の内容を直接更新する場合等に使用する.
    /// ここで行った書き込みの範囲については、アリーナは関知しない.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// アリーナを破棄して、バッキングストアを返す.
    pub fn into_store(self) -> S {
        self.store
    }

    /// バッキングストアの内容を、物理的な媒体に同期する.
    pub fn sync(&mut self) -> Result<()> {
        track!(self.store.sync())
    }

    /// アリーナのメトリクスを返す.
    pub fn metrics(&self) -> &ArenaMetrics {
        &self.metrics
    }
}

fn buffer_len(len: u64) -> Result<usize> {
    let len = track_assert_some!(usize::try_from(len).ok(), ErrorKind::InvalidInput; len);
    Ok(len)
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;
    use std::io::{self, Read, Seek, SeekFrom, Write};
    use tempdir::TempDir;
    use trackable::result::TestResult;
    use uuid::Uuid;

    use super::*;
    use crate::store::{MemoryStore, SharedMemoryStore};
    use crate::ErrorKind;

    #[test]
    fn arena_works() -> TestResult {
        let store = SharedMemoryStore::new(vec![0; 16]);
        let observer = store.clone();
        let mut arena = track!(ArenaBuilder::new().create(store))?;
        assert_eq!(arena.capacity(), 16);

        let foo = track!(arena.allocate(b"foo"))?;
        let barbaz = track!(arena.allocate(b"barbaz"))?;
        assert_eq!((foo.offset(), foo.len()), (0, 3));
        assert_eq!((barbaz.offset(), barbaz.len()), (3, 6));

        // 書き込んだ内容は、外部から観測可能
        assert_eq!(&track!(observer.to_bytes())?[..9], b"foobarbaz");
        assert_eq!(track!(arena.get(&barbaz))?, b"barbaz".to_vec());
        assert_eq!(track!(arena.offset(&barbaz))?, 3);

        track!(arena.free(foo))?;
        let qux = track!(arena.allocate(b"qu"))?;
        assert_eq!(qux.offset(), 0);
        assert_eq!(&track!(observer.to_bytes())?[..9], b"quobarbaz");

        let m = arena.metrics();
        assert_eq!(m.capacity_bytes(), 16);
        assert_eq!(m.written_bytes(), 11);
        assert_eq!(m.usage_bytes(), 8);
        assert_eq!(m.allocator().allocated_regions(), 3);
        assert_eq!(m.allocator().released_regions(), 1);
        Ok(())
    }

    #[test]
    fn exhaustion_works() -> TestResult {
        let mut arena = track!(ArenaBuilder::new().create_in_memory(100))?;
        let _a = track!(arena.allocate(&[0; 50]))?;
        let _b = track!(arena.allocate(&[0; 50]))?;
        let e = arena.allocate(&[0; 1]).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::OutOfMemory));
        assert_eq!(arena.metrics().allocator().nospace_failures(), 1);
        Ok(())
    }

    #[test]
    fn empty_payload_is_rejected() -> TestResult {
        let mut arena = track!(ArenaBuilder::new().create_in_memory(10))?;
        let e = arena.allocate(&[]).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidSize));
        assert_eq!(arena.regions().count(), 1);
        Ok(())
    }

    #[test]
    fn double_free_is_rejected() -> TestResult {
        let mut arena = track!(ArenaBuilder::new().create_in_memory(10))?;
        let a = track!(arena.allocate(b"abc"))?;
        let stale = a.clone();
        track!(arena.free(a))?;

        let e = arena.free(stale.clone()).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidHandle));
        let e = arena.get(&stale).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidHandle));

        let regions = arena.regions().collect::<Vec<_>>();
        assert_eq!(
            regions,
            vec![Region {
                start: 0,
                end: 10,
                state: RegionState::Free
            }]
        );
        track!(arena.allocator().check_invariants())?;
        Ok(())
    }

    #[test]
    fn failed_write_is_rolled_back() -> TestResult {
        let store = BrokenStore {
            inner: MemoryStore::new(vec![0; 32]),
            broken: false,
        };
        let mut arena = track!(ArenaBuilder::new().create(store))?;
        let a = track!(arena.allocate(b"hello"))?;

        arena.store_mut().broken = true;
        let e = arena.allocate(b"world").err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::Other));
        let regions = arena
            .regions()
            .map(|r| (r.start, r.end, r.is_free()))
            .collect::<Vec<_>>();
        assert_eq!(regions, vec![(0, 5, false), (5, 32, true)]);
        assert_eq!(arena.metrics().write_failures(), 1);
        assert_eq!(arena.metrics().usage_bytes(), 5);

        arena.store_mut().broken = false;
        assert_eq!(track!(arena.get(&a))?, b"hello".to_vec());
        let b = track!(arena.allocate(b"world"))?;
        assert_eq!(b.offset(), 5);
        track!(arena.allocator().check_invariants())?;
        Ok(())
    }

    #[test]
    fn capacity_errors_work() -> TestResult {
        let e = ArenaBuilder::new()
            .create(MemoryStore::new(Vec::new()))
            .err()
            .map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidCapacity));

        let e = ArenaBuilder::new()
            .create_in_memory(0)
            .err()
            .map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidCapacity));

        let e = ArenaBuilder::new()
            .capacity(0)
            .create(MemoryStore::new(vec![0; 8]))
            .err()
            .map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidCapacity));

        let e = ArenaBuilder::new()
            .capacity(9)
            .create(MemoryStore::new(vec![0; 8]))
            .err()
            .map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::ArenaCreationFailed));

        let e = ArenaBuilder::new()
            .create_in_memory(u64::max_value())
            .err()
            .map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::ArenaCreationFailed));
        Ok(())
    }

    #[test]
    fn partial_capacity_works() -> TestResult {
        let uuid = Uuid::new_v4();
        let mut arena = track!(ArenaBuilder::new()
            .capacity(4)
            .instance_uuid(uuid)
            .metrics(MetricBuilder::new())
            .create(MemoryStore::new(vec![9; 8])))?;
        assert_eq!(arena.capacity(), 4);
        assert_eq!(arena.instance_uuid(), uuid);

        let a = track!(arena.allocate(&[1; 4]))?;
        assert_eq!(a.offset(), 0);
        let e = arena.allocate(&[1]).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::OutOfMemory));

        // 管理範囲外のバイト列には触れない
        let store = arena.into_store();
        assert_eq!(store.as_bytes(), &[1, 1, 1, 1, 9, 9, 9, 9][..]);
        Ok(())
    }

    #[test]
    fn buffer_len_works() {
        assert_eq!(buffer_len(10).ok(), Some(10));
        assert_eq!(
            buffer_len(usize::max_value() as u64).ok(),
            Some(usize::max_value())
        );

        #[cfg(target_pointer_width = "32")]
        assert_eq!(
            buffer_len(u64::from(u32::max_value()) + 1)
                .err()
                .map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
    }

    #[test]
    fn foreign_handle_is_rejected() -> TestResult {
        let mut a = track!(ArenaBuilder::new().create_in_memory(10))?;
        let mut b = track!(ArenaBuilder::new().create_in_memory(10))?;
        let ha = track!(a.allocate(b"abc"))?;
        let hb = track!(b.allocate(b"xyz"))?;

        let e = b.free(ha.clone()).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidHandle));
        let e = b.get(&ha).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidHandle));

        // 本来の所有者の領域と内容は保たれている
        let regions = b
            .regions()
            .map(|r| (r.start, r.end, r.is_free()))
            .collect::<Vec<_>>();
        assert_eq!(regions, vec![(0, 3, false), (3, 10, true)]);
        assert_eq!(track!(b.get(&hb))?, b"xyz".to_vec());
        assert_eq!(track!(a.get(&ha))?, b"abc".to_vec());
        Ok(())
    }

    #[test]
    fn file_backed_arena_works() -> TestResult {
        let dir = track_io!(TempDir::new("regionarena_test"))?;
        let path = dir.path().join("arena.bin");
        let mut arena = track!(ArenaBuilder::new().create_on_file(&path, 1024))?;

        let a = track!(arena.allocate(&[7; 100]))?;
        let b = track!(arena.allocate(&[8; 200]))?;
        track!(arena.sync())?;
        assert_eq!(track!(arena.get(&a))?, vec![7; 100]);
        assert_eq!(track!(arena.get(&b))?, vec![8; 200]);
        track!(arena.free(a))?;
        track!(arena.free(b))?;
        assert_eq!(arena.regions().count(), 1);

        // 既存のファイルを上書きして作成することはできない
        std::mem::drop(arena);
        assert!(ArenaBuilder::new().create_on_file(&path, 1024).is_err());
        Ok(())
    }

    /// 書き込みを失敗させることができる`BackingStore`.
    #[derive(Debug)]
    struct BrokenStore {
        inner: MemoryStore,
        broken: bool,
    }
    impl BackingStore for BrokenStore {
        fn sync(&mut self) -> Result<()> {
            self.inner.sync()
        }
        fn position(&self) -> u64 {
            self.inner.position()
        }
        fn capacity(&self) -> u64 {
            self.inner.capacity()
        }
    }
    impl Seek for BrokenStore {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }
    impl Read for BrokenStore {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }
    impl Write for BrokenStore {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                Err(io::Error::new(io::ErrorKind::Other, "broken"))
            } else {
                self.inner.write(buf)
            }
        }
        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }
}
