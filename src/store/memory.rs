use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use trackable::error::ErrorKindExt;

use crate::store::BackingStore;
use crate::{Error, ErrorKind, Result};

type Memory = Cursor<Vec<u8>>;

/// メモリベースの`BackingStore`の実装.
///
/// 容量は生成時のバイト列の長さに固定され、それを超える書き込みはエラーとなる.
#[derive(Debug)]
pub struct MemoryStore {
    memory: Memory,
}
impl MemoryStore {
    /// 新しい`MemoryStore`インスタンスを生成する.
    ///
    /// `memory`の長さが、そのままストアの容量となる.
    pub fn new(memory: Vec<u8>) -> Self {
        MemoryStore {
            memory: Cursor::new(memory),
        }
    }

    /// `capacity`バイトのゼロ埋めされた領域を確保して、新しい`MemoryStore`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// メモリの確保に失敗した場合には、種類が`ErrorKind::ArenaCreationFailed`のエラーが返される.
    pub fn with_capacity(capacity: u64) -> Result<Self> {
        track_assert!(
            capacity <= usize::max_value() as u64,
            ErrorKind::ArenaCreationFailed,
            "Too large capacity: {}",
            capacity
        );
        let len = capacity as usize;
        let mut memory = Vec::new();
        if let Err(e) = memory.try_reserve_exact(len) {
            let e = Error::from(ErrorKind::ArenaCreationFailed.cause(e));
            return Err(track!(e, "capacity={}", capacity));
        }
        memory.resize(len, 0);
        Ok(Self::new(memory))
    }

    /// 保持しているバイト列を返す.
    pub fn as_bytes(&self) -> &[u8] {
        self.memory.get_ref()
    }

    /// インスタンスを破棄して、保持しているバイト列を返す.
    pub fn into_bytes(self) -> Vec<u8> {
        self.memory.into_inner()
    }

    fn seek_impl(&mut self, position: u64) -> Result<()> {
        track_assert!(position <= self.capacity(), ErrorKind::InvalidInput);
        self.memory.set_position(position);
        Ok(())
    }
    fn read_impl(&mut self, buf: &mut [u8]) -> Result<usize> {
        track_io!(self.memory.read(buf))
    }
    fn write_impl(&mut self, buf: &[u8]) -> Result<()> {
        // `Cursor<Vec<u8>>`は末尾を超えた書き込みでバッファを伸長してしまうので、事前に弾く
        let end = self.position() + buf.len() as u64;
        track_assert!(
            end <= self.capacity(),
            ErrorKind::InvalidInput,
            "end={}, capacity={}",
            end,
            self.capacity()
        );
        track_io!(self.memory.write_all(buf))
    }
}
impl BackingStore for MemoryStore {
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
    fn position(&self) -> u64 {
        self.memory.position()
    }
    fn capacity(&self) -> u64 {
        self.memory.get_ref().len() as u64
    }
}
impl Seek for MemoryStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.convert_to_offset(pos)?;
        track!(self.seek_impl(position))?;
        Ok(position)
    }
}
impl Read for MemoryStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read_size = track!(self.read_impl(buf))?;
        Ok(read_size)
    }
}
impl Write for MemoryStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        track!(self.write_impl(buf))?;
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
