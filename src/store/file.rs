#[cfg(unix)]
use libc;
use std::cmp;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::Path;
use trackable::error::ErrorKindExt;

use crate::store::BackingStore;
use crate::{Error, ErrorKind, Result};

/// `FileStore`のビルダ
///
/// 二つのメンバを持ち、それぞれ次の意味を表す:
/// exclusive_lock: `FileStore`の実体ファイルに対するアクセスの排他制御を行うかどうか
/// preallocate: 生成時に、容量分のディスク領域を事前に確保するかどうか
#[derive(Debug, Clone)]
pub struct FileStoreBuilder {
    exclusive_lock: bool,
    preallocate: bool,
}

impl FileStoreBuilder {
    /// デフォルト設定で`FileStoreBuilder`インスタンスを作成する
    ///
    /// デフォルトでは、exclusive_lock = trueかつpreallocate = trueとなる
    pub fn new() -> Self {
        FileStoreBuilder {
            exclusive_lock: true,
            preallocate: true,
        }
    }

    #[cfg(unix)]
    fn set_exclusive_file_lock_if_flag_is_on(&self, file: &File) -> Result<()> {
        use std::os::unix::io::AsRawFd;
        if self.exclusive_lock {
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
                track_io!(Err(io::Error::last_os_error()))
            } else {
                Ok(())
            }
        } else {
            Ok(())
        }
    }
    #[cfg(not(unix))]
    fn set_exclusive_file_lock_if_flag_is_on(&self, _file: &File) -> Result<()> {
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn allocate_space(&self, file: &File, capacity: u64) -> Result<()> {
        use std::os::unix::io::AsRawFd;
        if !self.preallocate {
            return track!(set_len(file, capacity));
        }

        // `posix_fallocate`はerrnoを設定せず、エラーコードを直接返す
        let code = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, capacity as libc::off_t) };
        if code != 0 {
            let e = io::Error::from_raw_os_error(code);
            let e = Error::from(ErrorKind::ArenaCreationFailed.cause(e));
            return Err(track!(e, "capacity={}", capacity));
        }
        Ok(())
    }
    #[cfg(not(target_os = "linux"))]
    fn allocate_space(&self, file: &File, capacity: u64) -> Result<()> {
        track!(set_len(file, capacity))
    }

    /// exclusive_lockのon/offを設定する
    pub fn exclusive_lock(&mut self, enabled: bool) -> &mut Self {
        self.exclusive_lock = enabled;
        self
    }

    /// preallocateのon/offを設定する
    ///
    /// offの場合でも、ファイルのサイズ自体は容量分に拡張される(ただし疎なファイルとなり得る).
    pub fn preallocate(&mut self, enabled: bool) -> &mut Self {
        self.preallocate = enabled;
        self
    }

    /// ファイルを新規に作成して`FileStore`インスタンスを生成する.
    ///
    /// 作成されたファイルのサイズは`capacity`となり、内容はゼロで埋められている.
    ///
    /// # Errors
    ///
    /// ファイルの領域確保に失敗した場合には、種類が`ErrorKind::ArenaCreationFailed`のエラーが返される.
    ///
    /// 領域確保に失敗した場合には、作成したファイルは削除される.
    pub fn create<P: AsRef<Path>>(&mut self, filepath: P, capacity: u64) -> Result<FileStore> {
        track!(check_capacity(capacity))?;
        let filepath = filepath.as_ref();
        if let Some(dir) = filepath.parent() {
            track_io!(fs::create_dir_all(dir))?;
        }
        let file = track_io!(fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(filepath))?;
        let result = self
            .set_exclusive_file_lock_if_flag_is_on(&file)
            .and_then(|()| self.allocate_space(&file, capacity));
        if let Err(e) = result {
            mem::drop(file);
            track_io!(fs::remove_file(filepath))?;
            return Err(track!(e));
        }
        Ok(FileStore::new(file, capacity))
    }

    /// 既存のファイルを開いて`FileStore`インスタンスを生成する.
    ///
    /// 容量はファイルのサイズとなる.
    pub fn open<P: AsRef<Path>>(&mut self, filepath: P) -> Result<FileStore> {
        let file = track_io!(fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(filepath))?;
        track!(self.set_exclusive_file_lock_if_flag_is_on(&file))?;
        let capacity = track_io!(file.metadata())?.len();
        Ok(FileStore::new(file, capacity))
    }
}
impl Default for FileStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_capacity(capacity: u64) -> Result<()> {
    track_assert!(
        capacity <= i64::max_value() as u64,
        ErrorKind::ArenaCreationFailed,
        "Too large capacity: {}",
        capacity
    );
    #[cfg(unix)]
    track_assert!(
        capacity <= libc::off_t::max_value() as u64,
        ErrorKind::ArenaCreationFailed,
        "Too large capacity: {}",
        capacity
    );
    Ok(())
}

fn set_len(file: &File, capacity: u64) -> Result<()> {
    if let Err(e) = file.set_len(capacity) {
        let e = Error::from(ErrorKind::ArenaCreationFailed.cause(e));
        return Err(track!(e, "capacity={}", capacity));
    }
    Ok(())
}

/// ファイルベースの`BackingStore`の実装.
///
/// デフォルト設定では、ファイルは排他ロック付きでオープンされ、
/// 生成時に容量分のディスク領域が確保される.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    cursor_position: u64,
    capacity: u64,
}
impl FileStore {
    /// デフォルト設定でファイルを新規に作成して`FileStore`インスタンスを生成する.
    ///
    /// `filepath`が既に存在する場合にはエラーとなる.
    pub fn create<P: AsRef<Path>>(filepath: P, capacity: u64) -> Result<Self> {
        FileStoreBuilder::new().create(filepath, capacity)
    }

    /// デフォルト設定で既存のファイルを開き`FileStore`インスタンスを生成する。
    pub fn open<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        FileStoreBuilder::new().open(filepath)
    }

    fn new(file: File, capacity: u64) -> FileStore {
        FileStore {
            file,
            cursor_position: 0,
            capacity,
        }
    }

    fn seek_impl(&mut self, position: u64) -> Result<()> {
        track_assert!(position <= self.capacity, ErrorKind::InvalidInput);
        track_io!(self.file.seek(io::SeekFrom::Start(position)))?;
        self.cursor_position = position;
        Ok(())
    }
    fn read_impl(&mut self, buf: &mut [u8]) -> Result<usize> {
        let max_len = (self.capacity - self.cursor_position) as usize;
        let len = cmp::min(max_len, buf.len());
        let read_size = track_io!(self.file.read(&mut buf[..len]))?;
        self.cursor_position += read_size as u64;
        Ok(read_size)
    }
    fn write_impl(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.cursor_position + buf.len() as u64;
        track_assert!(
            end <= self.capacity,
            ErrorKind::InvalidInput,
            "end={}, capacity={}",
            end,
            self.capacity
        );
        track_io!(self.file.write_all(buf))?;
        self.cursor_position = end;
        Ok(())
    }
}
impl BackingStore for FileStore {
    fn sync(&mut self) -> Result<()> {
        track_io!(self.file.sync_data())?;
        Ok(())
    }
    fn position(&self) -> u64 {
        self.cursor_position
    }
    fn capacity(&self) -> u64 {
        self.capacity
    }
}
impl Seek for FileStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.convert_to_offset(pos)?;
        track!(self.seek_impl(position))?;
        Ok(position)
    }
}
impl Read for FileStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read_size = track!(self.read_impl(buf))?;
        Ok(read_size)
    }
}
impl Write for FileStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        track!(self.write_impl(buf))?;
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        track_io!(self.file.flush())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::mem;
    use tempdir::TempDir;
    use trackable::result::TestResult;

    use super::*;
    use crate::store::BackingStore;
    use crate::ErrorKind;

    #[test]
    fn open_and_create_works() -> TestResult {
        let dir = track_io!(TempDir::new("regionarena_test"))?;
        let capacity = 10 * 1024;

        // 存在しないファイルは開けない
        assert!(FileStore::open(dir.path().join("foo")).is_err());

        // ファイル作成
        let mut store = track!(FileStore::create(dir.path().join("foo"), capacity))?;
        assert_eq!(store.capacity(), capacity);
        assert_eq!(
            track_io!(fs::metadata(dir.path().join("foo")))?.len(),
            capacity
        );
        track!(store.write_at(100, b"bar"))?;

        // 既に存在するファイルは作成できない
        assert!(FileStore::create(dir.path().join("foo"), capacity).is_err());

        // 同じファイルを同時に開くことはできない
        assert!(FileStore::open(dir.path().join("foo")).is_err());

        // 一度閉じれば、オープン可能
        mem::drop(store);
        let mut store = track!(FileStore::open(dir.path().join("foo")))?;
        assert_eq!(store.capacity(), capacity);
        let mut buf = [0; 5];
        track!(store.read_at(99, &mut buf))?;
        assert_eq!(&buf, b"\0bar\0");
        Ok(())
    }

    #[test]
    fn disabling_exclusive_lock_works() -> TestResult {
        let dir = track_io!(TempDir::new("regionarena_test"))?;
        let _store = track!(FileStoreBuilder::new()
            .exclusive_lock(false)
            .create(dir.path().join("foo"), 1024))?;
        let _another = track!(FileStoreBuilder::new()
            .exclusive_lock(false)
            .open(dir.path().join("foo")))?;
        Ok(())
    }

    #[test]
    fn error_handlings_works() -> TestResult {
        let dir = track_io!(TempDir::new("regionarena_test"))?;
        let capacity = 1024;

        let mut store = track!(FileStoreBuilder::new()
            .preallocate(false)
            .create(dir.path().join("foo"), capacity))?;
        assert!(store.write_all(&[2; 2048][..]).is_err()); // キャパシティ超過
        assert_eq!(store.position(), 0);
        assert!(store.seek(SeekFrom::Start(capacity + 1)).is_err());

        let e = store.write_at(1000, &[3; 100]).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidInput));
        Ok(())
    }

    #[test]
    fn failed_creation_can_be_retried() -> TestResult {
        let dir = track_io!(TempDir::new("regionarena_test"))?;
        let path = dir.path().join("foo");

        for &preallocate in &[true, false] {
            let e = FileStoreBuilder::new()
                .preallocate(preallocate)
                .create(&path, u64::max_value())
                .err()
                .map(|e| *e.kind());
            assert_eq!(e, Some(ErrorKind::ArenaCreationFailed));
            assert!(!path.exists());
        }

        // ファイル作成後に領域確保に失敗した場合も、ファイルは残らない
        #[cfg(target_os = "linux")]
        {
            let e = FileStore::create(&path, i64::max_value() as u64)
                .err()
                .map(|e| *e.kind());
            assert_eq!(e, Some(ErrorKind::ArenaCreationFailed));
            assert!(!path.exists());
        }

        // 容量を小さくすれば、同じパスで作成し直せる
        let store = track!(FileStore::create(&path, 1024))?;
        assert_eq!(store.capacity(), 1024);
        Ok(())
    }

    #[test]
    fn store_operations_works() -> TestResult {
        let dir = track_io!(TempDir::new("regionarena_test"))?;

        let mut store = track!(FileStore::create(dir.path().join("foo"), 1024))?;
        assert_eq!(store.capacity(), 1024);
        assert_eq!(store.position(), 0);

        // read, write, seek
        let mut buf = vec![0; 512];
        track_io!(store.read_exact(&mut buf))?;
        assert_eq!(&buf[..], &[0; 512][..]);
        assert_eq!(store.position(), 512);

        track_io!(store.write(&[1; 512][..]))?;
        assert_eq!(store.position(), 1024);

        track_io!(store.seek(SeekFrom::Start(512)))?;
        assert_eq!(store.position(), 512);

        track_io!(store.read_exact(&mut buf))?;
        assert_eq!(&buf[..], &[1; 512][..]);
        assert_eq!(store.position(), 1024);

        // 末尾からは何も読めない
        assert!(store.read_exact(&mut buf).is_err());
        track!(store.sync())?;
        Ok(())
    }
}
