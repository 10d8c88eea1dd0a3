//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};
use uuid::Uuid;

/// 部分領域アロケータのメトリクス.
#[derive(Debug, Clone)]
pub struct AllocatorMetrics {
    pub(crate) inserted_free_regions: Counter,
    pub(crate) removed_free_regions: Counter,
    pub(crate) allocated_regions: Counter,
    pub(crate) allocated_bytes: Counter,
    pub(crate) released_regions: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) split_regions: Counter,
    pub(crate) merged_regions: Counter,
    pub(crate) nospace_failures: Counter,
    pub(crate) invalid_handles: Counter,
    pub(crate) capacity_bytes: u64,
}
impl AllocatorMetrics {
    /// 空き領域インデックスに挿入された要素の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_inserted_free_regions_total <COUNTER>
    /// ```
    pub fn inserted_free_regions(&self) -> u64 {
        self.inserted_free_regions.value() as u64
    }

    /// 空き領域インデックスから削除された要素の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_removed_free_regions_total <COUNTER>
    /// ```
    pub fn removed_free_regions(&self) -> u64 {
        self.removed_free_regions.value() as u64
    }

    /// 空き領域インデックスの長さ(i.e., 現在の空き領域の数).
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_inserted_free_regions_total - regionarena_allocator_removed_free_regions_total
    /// ```
    pub fn free_list_len(&self) -> usize {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.removed_free_regions();
        let inc = self.inserted_free_regions();
        (inc - dec) as usize
    }

    /// 部分領域の割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_allocated_regions_total <COUNTER>
    /// ```
    pub fn allocated_regions(&self) -> u64 {
        self.allocated_regions.value() as u64
    }

    /// これまでに割り当てた部分領域のバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_allocated_bytes_total <COUNTER>
    /// ```
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.value() as u64
    }

    /// 部分領域の解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_released_regions_total <COUNTER>
    /// ```
    pub fn released_regions(&self) -> u64 {
        self.released_regions.value() as u64
    }

    /// これまでに解放された部分領域のバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// 割当時に空き領域が分割された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_split_regions_total <COUNTER>
    /// ```
    pub fn split_regions(&self) -> u64 {
        self.split_regions.value() as u64
    }

    /// 解放時に隣接する空き領域と結合された回数.
    ///
    /// 一回の解放で、前後両方の領域と結合された場合には`2`が加算される.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_merged_regions_total <COUNTER>
    /// ```
    pub fn merged_regions(&self) -> u64 {
        self.merged_regions.value() as u64
    }

    /// 空き領域不足による割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_nospace_failures_total <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    /// 不正なハンドル(e.g., 解放済み)が指定された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_invalid_handles_total <COUNTER>
    /// ```
    pub fn invalid_handles(&self) -> u64 {
        self.invalid_handles.value() as u64
    }

    /// アロケータが管理する領域の容量.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// 現在割当済みのバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_allocated_bytes_total - regionarena_allocator_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_bytes();
        let inc = self.allocated_bytes();
        inc - dec
    }

    /// 新しい`AllocatorMetrics`インスタンスを生成する.
    pub fn new(builder: &MetricBuilder, capacity_bytes: u64) -> Self {
        let mut builder = builder.clone();
        builder.namespace("regionarena").subsystem("allocator");
        AllocatorMetrics {
            inserted_free_regions: builder
                .counter("inserted_free_regions_total")
                .help("Number of inserted regions into free-size index")
                .finish()
                .expect("Never fails"),
            removed_free_regions: builder
                .counter("removed_free_regions_total")
                .help("Number of removed regions from free-size index")
                .finish()
                .expect("Never fails"),
            allocated_regions: builder
                .counter("allocated_regions_total")
                .help("Number of allocated regions")
                .finish()
                .expect("Never fails"),
            allocated_bytes: builder
                .counter("allocated_bytes_total")
                .help("Number of allocated bytes")
                .finish()
                .expect("Never fails"),
            released_regions: builder
                .counter("released_regions_total")
                .help("Number of released regions")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of released bytes")
                .finish()
                .expect("Never fails"),
            split_regions: builder
                .counter("split_regions_total")
                .help("Number of free regions split by allocations")
                .finish()
                .expect("Never fails"),
            merged_regions: builder
                .counter("merged_regions_total")
                .help("Number of free regions coalesced by releases")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of allocation failures caused by no available space")
                .finish()
                .expect("Never fails"),
            invalid_handles: builder
                .counter("invalid_handles_total")
                .help("Number of rejected stale or unknown handles")
                .finish()
                .expect("Never fails"),
            capacity_bytes,
        }
    }

    pub(crate) fn count_allocation(&self, size: u64) {
        self.allocated_regions.increment();
        self.allocated_bytes.add_u64(size);
    }

    pub(crate) fn count_releasion(&self, size: u64) {
        self.released_regions.increment();
        self.released_bytes.add_u64(size);
    }
}

/// [`BufferArena`]のメトリクス.
///
/// [`BufferArena`]: ../arena/struct.BufferArena.html
#[derive(Debug, Clone)]
pub struct ArenaMetrics {
    pub(crate) header: Gauge,
    pub(crate) capacity_bytes: Gauge,
    pub(crate) written_bytes: Counter,
    pub(crate) write_failures: Counter,
    allocator: AllocatorMetrics,
}
impl ArenaMetrics {
    /// アリーナの容量を返す.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_arena_capacity_bytes <GAUGE>
    /// ```
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.value() as u64
    }

    /// バッキングストアに書き込まれたペイロードのバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_arena_written_bytes_total <COUNTER>
    /// ```
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes.value() as u64
    }

    /// バッキングストアへの書き込みに失敗した回数.
    ///
    /// 失敗した割当は取り消されるので、使用量には反映されない.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_arena_write_failures_total <COUNTER>
    /// ```
    pub fn write_failures(&self) -> u64 {
        self.write_failures.value() as u64
    }

    /// アリーナの使用量を返す.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// regionarena_allocator_allocated_bytes_total - regionarena_allocator_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        self.allocator.usage_bytes()
    }

    /// アロケータのメトリクスを返す.
    pub fn allocator(&self) -> &AllocatorMetrics {
        &self.allocator
    }

    pub(crate) fn new(
        builder: &MetricBuilder,
        instance_uuid: &Uuid,
        allocator: AllocatorMetrics,
    ) -> Self {
        let mut builder = builder.clone();
        builder.namespace("regionarena").subsystem("arena");
        let capacity = allocator.capacity_bytes();
        ArenaMetrics {
            header: builder
                .gauge("header")
                .help("Header information of the arena")
                .label("uuid", &instance_uuid.to_string())
                .label("capacity", &capacity.to_string())
                .initial_value(1.0)
                .finish()
                .expect("Never fails"),
            capacity_bytes: builder
                .gauge("capacity_bytes")
                .help("Capacity of the arena")
                .initial_value(capacity as f64)
                .finish()
                .expect("Never fails"),
            written_bytes: builder
                .counter("written_bytes_total")
                .help("Number of payload bytes written to the backing store")
                .finish()
                .expect("Never fails"),
            write_failures: builder
                .counter("write_failures_total")
                .help("Number of failed writes to the backing store")
                .finish()
                .expect("Never fails"),
            allocator,
        }
    }
}
