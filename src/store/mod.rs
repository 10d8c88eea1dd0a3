//! バッキングストアのインターフェース定義と実装群.
//!
//! このモジュールは[BufferArena](../arena/struct.BufferArena.html)が割当領域へのペイロードの書き込みに使用する
//! バイト列(アリーナの実体)を提供する.
use std::io::{Read, Seek, SeekFrom, Write};

pub use self::file::{FileStore, FileStoreBuilder};
pub use self::memory::MemoryStore;
pub use self::shared_memory::SharedMemoryStore;

use crate::{ErrorKind, Result};

mod file;
mod memory;
mod shared_memory;

/// アリーナの実体となるバイト列を表すトレイト.
///
/// 読み書きの単位はバイトであり、位置およびサイズにアライメントの制約はない.
///
/// アロケータ自身がこのバイト列の中身を解釈することはなく、
/// 割当時に「計算したオフセットへペイロードをコピーする」ためにのみ使用される.
pub trait BackingStore: Sized + Read + Write + Seek {
    /// 内容を、物理的な媒体に同期する.
    ///
    /// 内部的にバッファ管理等を行っておらず、常に内容が同期されている場合には、
    /// このメソッド内で特に何かを行う必要はない。
    fn sync(&mut self) -> Result<()>;

    /// 読み書き用カーソルの現在位置を返す.
    fn position(&self) -> u64;

    /// 容量(バイト単位)を返す.
    fn capacity(&self) -> u64;

    /// `SeekFrom`形式で指定された位置を、開始地点からのオフセットに変換する.
    ///
    /// # Errors
    ///
    /// 「指定位置が容量を超えている」ないし「`0`未満」の場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    fn convert_to_offset(&self, pos: SeekFrom) -> Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                track_assert!(offset <= self.capacity(), ErrorKind::InvalidInput);
                Ok(offset)
            }
            SeekFrom::End(delta) => {
                let offset = self.capacity() as i64 + delta;
                track_assert!(0 <= offset, ErrorKind::InvalidInput);
                track_assert!(offset as u64 <= self.capacity(), ErrorKind::InvalidInput);
                Ok(offset as u64)
            }
            SeekFrom::Current(delta) => {
                let offset = self.position() as i64 + delta;
                track_assert!(0 <= offset, ErrorKind::InvalidInput);
                track_assert!(offset as u64 <= self.capacity(), ErrorKind::InvalidInput);
                Ok(offset as u64)
            }
        }
    }

    /// `offset`の位置から`bytes`を書き込む.
    ///
    /// このメソッドから戻った時点で、`[offset, offset + bytes.len())`の範囲の読み込みを行えば、
    /// 書き込んだ内容が観測できることが保証される.
    ///
    /// # Errors
    ///
    /// 書き込み範囲が容量を超えている場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = track_assert_some!(
            offset.checked_add(bytes.len() as u64),
            ErrorKind::InvalidInput
        );
        track_assert!(
            end <= self.capacity(),
            ErrorKind::InvalidInput,
            "offset={}, len={}, capacity={}",
            offset,
            bytes.len(),
            self.capacity()
        );
        track_io!(self.seek(SeekFrom::Start(offset)))?;
        track_io!(self.write_all(bytes))?;
        track_io!(self.flush())?;
        Ok(())
    }

    /// `offset`の位置から`buf`のサイズ分だけ読み込む.
    ///
    /// # Errors
    ///
    /// 読み込み範囲が容量を超えている場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = track_assert_some!(
            offset.checked_add(buf.len() as u64),
            ErrorKind::InvalidInput
        );
        track_assert!(end <= self.capacity(), ErrorKind::InvalidInput);
        track_io!(self.seek(SeekFrom::Start(offset)))?;
        track_io!(self.read_exact(buf))?;
        Ok(())
    }
}
