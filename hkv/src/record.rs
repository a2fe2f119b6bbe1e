//! Record engine / 记录引擎
//!
//! ## Layouts (little-endian, offsets absolute, 0 = no link)
//! ```text
//! KV record        | k_len(2) | e_len(4) | v_len(4) | crc(4) | expire(4) | prev(4) | next(4) | key | value[e_len] |
//! Key-set record   | prev(4) | next(4) | md5raw(16) |
//! List key-header  | k_len(2) | prev(4) | next(4) | value_head(4) | key |
//! List value       | v_len(4) | prev(4) | next(4) | crc(4) | value |
//! ```
//!
//! `k_len = 0` marks a KV record or list key-header dead. Set records and
//! list values die by unlinking alone.
//! `k_len = 0` 表示 KV 记录或列表键头已删除。集合记录与列表值仅靠摘链删除。

use std::{collections::HashSet, fs::File};

use zerocopy::{
  FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
  byteorder::little_endian::{U16, U32},
};

use crate::{
  error::{E, R},
  fs,
};

/// KV record header size / KV 记录头大小
pub const KV_HEAD: usize = 26;

/// Key-set record size / 键集合记录大小
pub const SET_REC: usize = 24;

/// List key-header size / 列表键头大小
pub const LIST_KEY_HEAD: usize = 14;

/// List value header size / 列表值头大小
pub const LIST_VAL_HEAD: usize = 16;

/// Doubly-linked record layout: where the link fields live in the header
/// 双向链记录布局：链接字段在头中的位置
pub trait Linked: FromBytes + IntoBytes + Immutable + Copy {
  const PREV_OFF: u64;
  const NEXT_OFF: u64;

  fn prev_link(&self) -> u64;
  fn next_link(&self) -> u64;
}

/// KV record header (26 bytes) / KV 记录头（26 字节）
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct KvHead {
  pub k_len: U16,
  /// Allocated value slot, ≥ v_len; the excess is filler
  /// 分配的值槽，≥ v_len；多余部分为填充
  pub e_len: U32,
  pub v_len: U32,
  pub crc: U32,
  /// 0 = never, else absolute epoch seconds / 0 永不过期，否则为绝对纪元秒
  pub expire: U32,
  pub prev: U32,
  pub next: U32,
}

impl KvHead {
  pub const EXPIRE_OFF: u64 = 14;
}

impl Linked for KvHead {
  const PREV_OFF: u64 = 18;
  const NEXT_OFF: u64 = 22;

  #[inline(always)]
  fn prev_link(&self) -> u64 {
    self.prev.get() as u64
  }

  #[inline(always)]
  fn next_link(&self) -> u64 {
    self.next.get() as u64
  }
}

/// Key-set record (24 bytes) / 键集合记录（24 字节）
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SetRec {
  pub prev: U32,
  pub next: U32,
  pub md5: [u8; 16],
}

impl Linked for SetRec {
  const PREV_OFF: u64 = 0;
  const NEXT_OFF: u64 = 4;

  #[inline(always)]
  fn prev_link(&self) -> u64 {
    self.prev.get() as u64
  }

  #[inline(always)]
  fn next_link(&self) -> u64 {
    self.next.get() as u64
  }
}

/// List key-header (14 bytes + key) / 列表键头（14 字节 + 键）
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ListKeyHead {
  pub k_len: U16,
  pub prev: U32,
  pub next: U32,
  /// Head of this key's own value chain, 0 when empty
  /// 此键自身值链的头，空为 0
  pub value_head: U32,
}

impl ListKeyHead {
  pub const VALUE_HEAD_OFF: u64 = 10;
}

impl Linked for ListKeyHead {
  const PREV_OFF: u64 = 2;
  const NEXT_OFF: u64 = 6;

  #[inline(always)]
  fn prev_link(&self) -> u64 {
    self.prev.get() as u64
  }

  #[inline(always)]
  fn next_link(&self) -> u64 {
    self.next.get() as u64
  }
}

/// List value header (16 bytes + value) / 列表值头（16 字节 + 值）
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ListValHead {
  pub v_len: U32,
  pub prev: U32,
  pub next: U32,
  pub crc: U32,
}

impl Linked for ListValHead {
  const PREV_OFF: u64 = 4;
  const NEXT_OFF: u64 = 8;

  #[inline(always)]
  fn prev_link(&self) -> u64 {
    self.prev.get() as u64
  }

  #[inline(always)]
  fn next_link(&self) -> u64 {
    self.next.get() as u64
  }
}

/// Keys must be nonempty and fit the 16-bit length field
/// 键须非空且长度适配 16 位字段
pub(crate) fn check_key(key: &[u8]) -> R<()> {
  if key.is_empty() {
    return Err(E::arg("empty key"));
  }
  if key.len() > u16::MAX as usize {
    return Err(E::arg("key too long"));
  }
  Ok(())
}

/// Read a fixed header at `off`; a truncated read is a format error, the
/// record is unreadable rather than the store broken.
/// 在 `off` 读取定长头；截断读取视为格式错误，仅该记录不可读。
pub fn read_head<T: FromBytes>(file: &mut File, off: u64) -> R<T> {
  let mut buf = vec![0u8; size_of::<T>()];
  match fs::read_at(file, off, &mut buf) {
    Ok(()) => {}
    Err(E::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(E::Format(off)),
    Err(e) => return Err(e),
  }
  T::read_from_bytes(&buf).map_err(|_| E::Format(off))
}

/// Rewrite a fixed header at `off` / 在 `off` 重写定长头
#[inline]
pub fn write_head<T: IntoBytes + Immutable>(file: &mut File, off: u64, head: &T) -> R<()> {
  fs::write_at(file, off, head.as_bytes())
}

/// Chain walk guard: visited-set cycle detection plus an optional length cap.
/// A corrupted file must not loop the walker forever.
/// 链遍历守卫：访问集合环检测加可选长度上限。损坏的文件不能让遍历死循环。
pub struct Chain {
  visited: HashSet<u64>,
  cap: u32,
}

impl Chain {
  pub fn new(cap: Option<u32>) -> Self {
    Self {
      visited: HashSet::new(),
      cap: cap.unwrap_or(u32::MAX),
    }
  }

  /// `Ok(true)` to visit, `Ok(false)` past the cap (record invisible)
  /// `Ok(true)` 继续访问，`Ok(false)` 超过上限（记录不可见）
  pub fn step(&mut self, off: u64) -> R<bool> {
    if !self.visited.insert(off) {
      return Err(E::Cycle(off));
    }
    Ok(self.visited.len() as u64 <= self.cap as u64)
  }
}

/// Patch a record's prev pointer / 修补记录的 prev 指针
#[inline]
pub fn set_prev<T: Linked>(file: &mut File, off: u64, to: u64) -> R<()> {
  fs::write_u32(file, off + T::PREV_OFF, to as u32)
}

/// Patch a record's next pointer / 修补记录的 next 指针
#[inline]
pub fn set_next<T: Linked>(file: &mut File, off: u64, to: u64) -> R<()> {
  fs::write_u32(file, off + T::NEXT_OFF, to as u32)
}

/// Head-insert relink. The new record was appended carrying
/// `prev = 0, next = old_head`; point the chain-head pointer at it, then fix
/// the old head's back link.
/// 头插重链。新记录追加时已带 `prev = 0, next = 旧链头`；
/// 将链头指针指向新记录，再修旧链头的回链。
pub fn link_head_at<T: Linked>(
  file: &mut File,
  head_ptr: u64,
  new_off: u64,
  old_head: u64,
) -> R<()> {
  fs::write_u32(file, head_ptr, new_off as u32)?;
  if old_head != 0 {
    set_prev::<T>(file, old_head, new_off)?;
  }
  Ok(())
}

/// Splice a record out: forward pointer of the predecessor (or the chain-head
/// pointer itself), back pointer of the successor.
/// 摘链：改前驱的前向指针（或链头指针本身），再改后继的回链。
pub fn splice_at<T: Linked>(file: &mut File, head_ptr: u64, prev: u64, next: u64) -> R<()> {
  if prev == 0 {
    fs::write_u32(file, head_ptr, next as u32)?;
  } else {
    fs::write_u32(file, prev + T::NEXT_OFF, next as u32)?;
  }
  if next != 0 {
    set_prev::<T>(file, next, prev)?;
  }
  Ok(())
}

// header sizes are the on-disk format; pin them
// 头大小即磁盘格式；固定住
const _: () = {
  assert!(size_of::<KvHead>() == KV_HEAD);
  assert!(size_of::<SetRec>() == SET_REC);
  assert!(size_of::<ListKeyHead>() == LIST_KEY_HEAD);
  assert!(size_of::<ListValHead>() == LIST_VAL_HEAD);
};

/// Point predecessor and successor at a replacement record that already
/// carries the same `prev`/`next` as the record it replaces.
/// 将前驱与后继指向替换记录；替换记录须已携带与被替换者相同的 `prev`/`next`。
pub fn replace_at<T: Linked>(
  file: &mut File,
  head_ptr: u64,
  prev: u64,
  next: u64,
  new_off: u64,
) -> R<()> {
  if prev == 0 {
    fs::write_u32(file, head_ptr, new_off as u32)?;
  } else {
    fs::write_u32(file, prev + T::NEXT_OFF, new_off as u32)?;
  }
  if next != 0 {
    set_prev::<T>(file, next, new_off)?;
  }
  Ok(())
}
