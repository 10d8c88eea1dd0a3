use std::cmp;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::store::BackingStore;
use crate::{Error, ErrorKind, Result};

/// インスタンスを共有可能な、メモリベースの`BackingStore`の実装.
///
/// クローンされたインスタンス同士は同じバイト列を参照する.
/// アリーナに渡したストアとは別のクローンを手元に残しておくことで、
/// アリーナが書き込んだ内容を外部(e.g., バッファの利用者)から観測することができる.
#[derive(Debug, Clone)]
pub struct SharedMemoryStore {
    memory: Arc<Mutex<Vec<u8>>>,
    capacity: usize,
    position: usize,
}
impl SharedMemoryStore {
    /// 新しい`SharedMemoryStore`インスタンスを生成する.
    pub fn new(memory: Vec<u8>) -> Self {
        let capacity = memory.len();
        SharedMemoryStore {
            memory: Arc::new(Mutex::new(memory)),
            capacity,
            position: 0,
        }
    }

    /// 現在の内容のコピーを返す.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let lock = track!(self.memory.lock().map_err(Error::from))?;
        Ok(lock.clone())
    }

    fn with_bytes_mut<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut [u8]) -> T,
    {
        match self.memory.lock() {
            Ok(mut lock) => Ok(f(&mut lock[self.position..self.capacity])),
            Err(error) => Err(track!(Error::from(error))),
        }
    }

    fn seek_impl(&mut self, position: u64) -> Result<()> {
        track_assert!(position <= self.capacity(), ErrorKind::InvalidInput);
        self.position = position as usize;
        Ok(())
    }

    fn read_impl(&mut self, buf: &mut [u8]) -> Result<usize> {
        let size = track!(self.with_bytes_mut(|memory| {
            let len = cmp::min(memory.len(), buf.len());
            (&mut buf[..len]).copy_from_slice(&memory[..len]);
            len
        }))?;
        self.position += size;
        Ok(size)
    }

    fn write_impl(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.position + buf.len();
        track_assert!(
            end <= self.capacity,
            ErrorKind::InvalidInput,
            "end={}, capacity={}",
            end,
            self.capacity
        );

        track!(self.with_bytes_mut(|memory| {
            (&mut memory[..buf.len()]).copy_from_slice(buf);
        }))?;
        self.position = end;
        Ok(())
    }
}
impl BackingStore for SharedMemoryStore {
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
    fn position(&self) -> u64 {
        self.position as u64
    }
    fn capacity(&self) -> u64 {
        self.capacity as u64
    }
}
impl Seek for SharedMemoryStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.convert_to_offset(pos)?;
        track!(self.seek_impl(position))?;
        Ok(position)
    }
}
impl Read for SharedMemoryStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read_size = track!(self.read_impl(buf))?;
        Ok(read_size)
    }
}
impl Write for SharedMemoryStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        track!(self.write_impl(buf))?;
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
