//! 部分領域のアロケータ.
//!
//! アロケータは、容量が固定された連続した領域(アリーナ)を（仮想的に）受け取り、
//! 個々の割当要求に対して、その中から必要なサイズの部分領域を割り当てる責務を負っている。
//!
//! アロケータが担当するのは、領域の計算処理のみで、実際のデータの読み書き等を、この中で行うことは無い.
pub use self::region_allocator::RegionAllocator;

pub(crate) use self::region_list::SlotIndex;

mod free_index;
mod region_allocator;
mod region_list;
