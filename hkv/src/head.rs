//! Global file header / 全局文件头
//!
//! ## Layout (11 bytes, after the optional script-guard prefix)
//! ```text
//! | test(1) | status(1) | optimized(1) | create_time(4) | count(4) |
//! ```
//!
//! `status` and `optimized` are ASCII digits so a partially-created or
//! mid-compaction file is recognizable in a hex dump.
//! `status` 与 `optimized` 为 ASCII 数字，便于在十六进制转储中辨认
//! 创建未完成或压缩进行中的文件。

use std::fs::File;

use zerocopy::{
  FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::little_endian::U32,
};

use crate::{
  consts::HEAD_TEST,
  error::{E, R},
  fs,
};

/// Store status byte / 存储状态字节
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(u8);

impl Status {
  pub const NORMAL: Self = Self(b'0');
  pub const CLEARING: Self = Self(b'1');
  pub const CREATING: Self = Self(b'2');
  pub const WAIT_OPTIMIZE: Self = Self(b'3');

  #[inline(always)]
  pub const fn from_u8(v: u8) -> Self {
    Self(v)
  }

  #[inline(always)]
  pub const fn as_u8(self) -> u8 {
    self.0
  }

  #[inline(always)]
  pub const fn as_char(self) -> char {
    self.0 as char
  }
}

/// Fixed global header (11 bytes) / 定长全局头（11 字节）
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Head {
  pub test: u8,
  pub status: u8,
  pub optimized: u8,
  pub create_time: U32,
  pub count: U32,
}

// the header size is the on-disk format; pin it
// 头大小即磁盘格式；固定住
const _: () = assert!(size_of::<Head>() as u64 == crate::consts::HEAD_SIZE);

// Field offsets for partial patches / 局部修补的字段偏移
pub const STATUS_OFF: u64 = 1;
pub const OPTIMIZED_OFF: u64 = 2;
pub const CREATE_OFF: u64 = 3;
pub const COUNT_OFF: u64 = 7;

impl Head {
  pub fn new(create_time: u32, status: Status) -> Self {
    Self {
      test: HEAD_TEST,
      status: status.as_u8(),
      optimized: b'0',
      create_time: U32::new(create_time),
      count: U32::new(0),
    }
  }

  /// Read the header at `prefix` / 在 `prefix` 处读取头
  pub fn read(file: &mut File, prefix: u64) -> R<Self> {
    let mut buf = [0u8; size_of::<Self>()];
    fs::read_at(file, prefix, &mut buf).map_err(|_| E::Format(prefix))?;
    Self::read_from_bytes(&buf).map_err(|_| E::Format(prefix))
  }

  /// Write the header at `prefix` / 在 `prefix` 处写入头
  pub fn write(&self, file: &mut File, prefix: u64) -> R<()> {
    fs::write_at(file, prefix, self.as_bytes())
  }

  #[inline(always)]
  pub fn status(&self) -> Status {
    Status::from_u8(self.status)
  }

  #[inline(always)]
  pub fn is_optimizing(&self) -> bool {
    self.optimized == b'1'
  }
}

/// Read just the status byte / 只读状态字节
pub fn read_status(file: &mut File, prefix: u64) -> R<Status> {
  let mut buf = [0u8; 1];
  fs::read_at(file, prefix + STATUS_OFF, &mut buf).map_err(|_| E::Format(prefix))?;
  Ok(Status::from_u8(buf[0]))
}

/// Patch just the status byte / 只写状态字节
pub fn write_status(file: &mut File, prefix: u64, status: Status) -> R<()> {
  fs::write_at(file, prefix + STATUS_OFF, &[status.as_u8()])
}

/// Compaction-in-progress flag / 压缩进行中标志
pub fn read_optimized(file: &mut File, prefix: u64) -> R<bool> {
  let mut buf = [0u8; 1];
  fs::read_at(file, prefix + OPTIMIZED_OFF, &mut buf).map_err(|_| E::Format(prefix))?;
  Ok(buf[0] == b'1')
}

pub fn write_optimized(file: &mut File, prefix: u64, on: bool) -> R<()> {
  fs::write_at(file, prefix + OPTIMIZED_OFF, &[if on { b'1' } else { b'0' }])
}

pub fn read_create_time(file: &mut File, prefix: u64) -> R<u32> {
  fs::read_u32(file, prefix + CREATE_OFF)
}

/// Live-record count / 有效记录计数
pub fn read_count(file: &mut File, prefix: u64) -> R<u32> {
  fs::read_u32(file, prefix + COUNT_OFF)
}

/// Adjust the count, clamped at zero. Caller holds the write lock.
/// 调整计数，下限为零。调用方须持有写锁。
pub fn add_count(file: &mut File, prefix: u64, delta: i64) -> R<()> {
  let cur = fs::read_u32(file, prefix + COUNT_OFF)? as i64;
  fs::write_u32(file, prefix + COUNT_OFF, (cur + delta).max(0) as u32)
}
