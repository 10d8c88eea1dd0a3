use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::path::Path;
use uuid::Uuid;

use crate::arena::allocator::RegionAllocator;
use crate::arena::BufferArena;
use crate::metrics::{AllocatorMetrics, ArenaMetrics};
use crate::store::{BackingStore, FileStore, MemoryStore};
use crate::{ErrorKind, Result};

/// `BufferArena`のビルダ.
#[derive(Debug, Clone)]
pub struct ArenaBuilder {
    capacity: Option<u64>,
    instance_uuid: Option<Uuid>,
    logger: Logger,
    metrics: MetricBuilder,
}
impl ArenaBuilder {
    /// 新しい`ArenaBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        ArenaBuilder {
            capacity: None,
            instance_uuid: None,
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// アリーナの容量(バイト単位)を設定する.
    ///
    /// アリーナはバッキングストアの先頭から、この容量分の範囲を管理する.
    ///
    /// 本メソッドが呼ばれていない場合は、バッキングストアの容量全体が使用される.
    ///
    /// # 注意
    ///
    /// ここで指定した値がバッキングストアの容量を超えている場合には、
    /// アリーナの構築時に`ErrorKind::ArenaCreationFailed`のエラーが返される.
    pub fn capacity(&mut self, capacity: u64) -> &mut Self {
        self.capacity = Some(capacity);
        self
    }

    /// アリーナインスタンスを識別するためのUUIDを設定する.
    ///
    /// ログおよびメトリクスのラベルとして使用される.
    ///
    /// 本メソッドが呼ばれていない場合は、ランダムなUUIDが割り当てられる.
    pub fn instance_uuid(&mut self, uuid: Uuid) -> &mut Self {
        self.instance_uuid = Some(uuid);
        self
    }

    /// ロガーを設定する.
    ///
    /// デフォルト値は`Logger::root(Discard, o!())`.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// `store`を実体とするアリーナを生成する.
    ///
    /// 生成直後のアリーナは、全体が一つの空き領域となる.
    ///
    /// # Errors
    ///
    /// - 容量が`0`の場合には、種類が`ErrorKind::InvalidCapacity`のエラーが返される
    /// - 容量がバッキングストアの容量を超えている場合には、種類が`ErrorKind::ArenaCreationFailed`のエラーが返される
    pub fn create<S>(&self, store: S) -> Result<BufferArena<S>>
    where
        S: BackingStore,
    {
        let store_capacity = store.capacity();
        let capacity = self.capacity.unwrap_or(store_capacity);
        track_assert!(capacity > 0, ErrorKind::InvalidCapacity);
        track_assert!(
            capacity <= store_capacity,
            ErrorKind::ArenaCreationFailed,
            "Too small backing store: capacity={}, store_capacity={}",
            capacity,
            store_capacity
        );

        let instance_uuid = self.instance_uuid.unwrap_or_else(Uuid::new_v4);
        let allocator_metrics = AllocatorMetrics::new(&self.metrics, capacity);
        let allocator = track!(RegionAllocator::new(allocator_metrics.clone()))?;
        let metrics = ArenaMetrics::new(&self.metrics, &instance_uuid, allocator_metrics);

        let logger = self.logger.new(o!(
            "arena" => instance_uuid.to_string(),
            "capacity" => capacity
        ));
        info!(logger, "Arena created"; "store_capacity" => store_capacity);
        Ok(BufferArena::new(
            allocator,
            store,
            logger,
            metrics,
            instance_uuid,
        ))
    }

    /// `capacity`バイトの`MemoryStore`を実体とするアリーナを生成する.
    ///
    /// # Errors
    ///
    /// - 容量が`0`の場合には、種類が`ErrorKind::InvalidCapacity`のエラーが返される
    /// - メモリの確保に失敗した場合には、種類が`ErrorKind::ArenaCreationFailed`のエラーが返される
    pub fn create_in_memory(&self, capacity: u64) -> Result<BufferArena<MemoryStore>> {
        track_assert!(capacity > 0, ErrorKind::InvalidCapacity);
        let store = track!(MemoryStore::with_capacity(capacity))?;
        track!(self.create(store))
    }

    /// `filepath`に`capacity`バイトのファイルを新規に作成し、それを実体とするアリーナを生成する.
    ///
    /// # Errors
    ///
    /// - 容量が`0`の場合には、種類が`ErrorKind::InvalidCapacity`のエラーが返される
    /// - ファイルの領域確保に失敗した場合には、種類が`ErrorKind::ArenaCreationFailed`のエラーが返される
    pub fn create_on_file<P: AsRef<Path>>(
        &self,
        filepath: P,
        capacity: u64,
    ) -> Result<BufferArena<FileStore>> {
        track_assert!(capacity > 0, ErrorKind::InvalidCapacity);
        let store = track!(FileStore::create(filepath, capacity))?;
        track!(self.create(store))
    }
}
impl Default for ArenaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
