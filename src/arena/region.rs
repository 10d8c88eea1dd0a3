//! アリーナ内の部分領域.

/// 部分領域の状態.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionState {
    /// 空き(割当可能)領域.
    Free,

    /// 割当済みの領域.
    Allocated,
}

/// アリーナ内の部分領域`[start, end)`.
///
/// アロケータの内部状態のスナップショットであり、これを保持していても領域の所有権は得られない.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// 開始位置(バイト単位).
    pub start: u64,

    /// 終端位置(バイト単位、排他的).
    pub end: u64,

    /// 領域の状態.
    pub state: RegionState,
}
#[allow(clippy::len_without_is_empty)]
impl Region {
    /// 領域のサイズを返す.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// 空き領域なら`true`を返す.
    pub fn is_free(&self) -> bool {
        self.state == RegionState::Free
    }

    /// `offset`がこの領域に含まれるなら`true`を返す.
    pub fn contains(&self, offset: u64) -> bool {
        self.start <= offset && offset < self.end
    }
}
