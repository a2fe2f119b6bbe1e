//! Synchronous file primitives / 同步文件原语

use std::{
  fs::{File, OpenOptions},
  io::{Read, Seek, SeekFrom, Write},
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

use crate::{
  consts::WRITE_RETRY,
  error::{E, R},
};

/// Open for reading / 打开用于读取
#[inline]
pub fn open_read(path: impl AsRef<Path>) -> std::io::Result<File> {
  OpenOptions::new().read(true).open(path)
}

/// Open for reading and writing / 打开用于读写
#[inline]
pub fn open_read_write(path: impl AsRef<Path>) -> std::io::Result<File> {
  OpenOptions::new().read(true).write(true).open(path)
}

/// Open for reading and writing, create if missing
/// 打开用于读写，不存在则创建
#[inline]
pub fn open_read_write_create(path: impl AsRef<Path>) -> std::io::Result<File> {
  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .open(path)
}

/// Append an extra extension: `a.db` → `a.db.op`
/// 追加扩展名：`a.db` → `a.db.op`
pub fn add_ext(path: &Path, ext: &str) -> PathBuf {
  let mut s = path.as_os_str().to_os_string();
  s.push(".");
  s.push(ext);
  PathBuf::from(s)
}

/// Epoch seconds / 纪元秒
#[inline]
pub fn now() -> u32 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs() as u32)
    .unwrap_or(0)
}

/// Read exactly `buf.len()` bytes at `off` / 在 `off` 处精确读取
pub fn read_at(file: &mut File, off: u64, buf: &mut [u8]) -> R<()> {
  file.seek(SeekFrom::Start(off))?;
  file.read_exact(buf)?;
  Ok(())
}

/// Read one byte, `None` at EOF / 读取一个字节，文件尾返回 `None`
pub fn read_byte(file: &mut File, off: u64) -> R<Option<u8>> {
  file.seek(SeekFrom::Start(off))?;
  let mut buf = [0u8; 1];
  match file.read(&mut buf)? {
    0 => Ok(None),
    _ => Ok(Some(buf[0])),
  }
}

/// Write all bytes from the current position, retrying short writes and
/// continuing from the bytes actually written.
/// 从当前位置写入全部字节，短写时重试，从已写入的字节处继续。
pub fn write_retry(file: &mut File, data: &[u8]) -> R<()> {
  let mut done = 0;
  for _ in 0..WRITE_RETRY {
    if done == data.len() {
      return Ok(());
    }
    match file.write(&data[done..]) {
      Ok(0) => break,
      Ok(n) => done += n,
      Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
      Err(e) => return Err(e.into()),
    }
  }
  if done == data.len() {
    Ok(())
  } else {
    Err(E::Io(std::io::Error::new(
      std::io::ErrorKind::WriteZero,
      "short write after retries",
    )))
  }
}

/// Write at an absolute offset / 在绝对偏移处写入
pub fn write_at(file: &mut File, off: u64, data: &[u8]) -> R<()> {
  file.seek(SeekFrom::Start(off))?;
  write_retry(file, data)
}

/// Append at EOF, returning the pre-write offset
/// 追加到文件尾，返回写前偏移
pub fn append(file: &mut File, data: &[u8]) -> R<u64> {
  let off = file.seek(SeekFrom::End(0))?;
  write_retry(file, data)?;
  Ok(off)
}

/// Read a little-endian u32 / 读取小端 u32
pub fn read_u32(file: &mut File, off: u64) -> R<u32> {
  let mut buf = [0u8; 4];
  read_at(file, off, &mut buf)?;
  Ok(u32::from_le_bytes(buf))
}

/// Write a little-endian u32 / 写入小端 u32
pub fn write_u32(file: &mut File, off: u64, v: u32) -> R<()> {
  write_at(file, off, &v.to_le_bytes())
}
