use crate::arena::allocator::SlotIndex;

/// 割当済みの部分領域を指すハンドル.
///
/// [`RegionAllocator::allocate`]ないし[`BufferArena::allocate`]の返り値として発行され、
/// 解放時に消費される.
///
/// 無関係な部分領域の割当・解放によって無効になることはない.
///
/// ハンドルは発行元のアロケータを記憶しており、別のアリーナに渡された場合には
/// `ErrorKind::InvalidHandle`のエラーとなる.
///
/// ハンドルは一度だけ解放可能であり、解放済みのハンドル(のクローン)を再度使用した場合には
/// `ErrorKind::InvalidHandle`のエラーとなる.
///
/// [`RegionAllocator::allocate`]: ./allocator/struct.RegionAllocator.html#method.allocate
/// [`BufferArena::allocate`]: ./struct.BufferArena.html#method.allocate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionHandle {
    pub(crate) allocator_id: u64,
    pub(crate) slot: SlotIndex,
    pub(crate) generation: u64,
    offset: u64,
    len: u64,
}
#[allow(clippy::len_without_is_empty)]
impl RegionHandle {
    pub(crate) fn new(
        allocator_id: u64,
        slot: SlotIndex,
        generation: u64,
        offset: u64,
        len: u64,
    ) -> Self {
        RegionHandle {
            allocator_id,
            slot,
            generation,
            offset,
            len,
        }
    }

    /// 領域の開始位置(アリーナ先頭からのオフセット)を返す.
    ///
    /// この値は、ハンドルが解放されるまでの間のみ有効.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 領域のサイズを返す.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// 領域の終端位置を返す.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}
