//! List flavor / 列表存储
//!
//! Each key owns a doubly-linked chain of value records, headed by a
//! key-header record in the ordinary bucket chain. Write operations flush a
//! pending value buffer into the chain at an anchor; positional and pivot
//! edits live in [`edit`], read walks in [`walk`].
//! 每个键拥有一条双向链的值记录，由常规桶链中的键头记录牵头。
//! 写操作把待写值缓冲冲刷到链上的锚点；位置与基准值编辑在 [`edit`]，
//! 读遍历在 [`walk`]。

mod edit;
pub(crate) mod walk;

use std::{
  fs::File,
  io::{Seek, SeekFrom},
};

use zerocopy::{
  IntoBytes,
  byteorder::little_endian::{U16, U32},
};

use crate::{
  bucket,
  codec::{Bytes, Codec},
  conf::Conf,
  error::{E, R},
  fs, head, iter,
  record::{self, Chain, LIST_KEY_HEAD, LIST_VAL_HEAD, Linked, ListKeyHead, ListValHead, check_key},
  store::{Op, Store},
};

/// List store over one file / 单文件列表存储
pub struct List<C: Codec = Bytes> {
  pub(crate) store: Store,
  pub(crate) codec: C,
  /// Serialized values awaiting the next write operation
  /// 等待下一次写操作的已序列化值
  pending: Vec<Vec<u8>>,
}

/// Where pending values land in a value chain / 待写值在值链中的落点
pub(crate) enum Anchor {
  Head,
  Tail,
  /// Before/after the first value whose stored CRC matches
  /// 在首个 CRC 匹配的值之前/之后
  BeforeCrc(u32),
  AfterCrc(u32),
  /// Before/after a position; negative counts from the end
  /// 在某位置之前/之后；负数从尾部数
  Before(i64),
  After(i64),
}

impl List<Bytes> {
  pub fn open(conf: Conf) -> R<Self> {
    Self::open_with(conf, Bytes)
  }
}

impl<C: Codec> List<C> {
  pub fn open_with(conf: Conf, codec: C) -> R<Self> {
    Ok(Self {
      store: Store::open(conf)?,
      codec,
      pending: Vec::new(),
    })
  }

  /// Queue one value for the next write operation
  /// 为下一次写操作排队一个值
  pub fn add_value(&mut self, val: &C::Val) -> &mut Self {
    self.pending.push(self.codec.ser(val));
    self
  }

  /// Replace the pending buffer / 替换待写缓冲
  pub fn set_value(&mut self, vals: &[C::Val]) -> &mut Self {
    self.pending.clear();
    for v in vals {
      self.pending.push(self.codec.ser(v));
    }
    self
  }

  pub fn clear_value(&mut self) -> &mut Self {
    self.pending.clear();
    self
  }

  fn take_pending(&mut self) -> R<Vec<Vec<u8>>> {
    if self.pending.is_empty() {
      return Err(E::arg("no pending values"));
    }
    Ok(std::mem::take(&mut self.pending))
  }

  /// Append the pending values to the tail; creates the key
  /// 将待写值追加到尾部；键不存在则创建
  pub fn push(&mut self, key: &[u8]) -> R<()> {
    self.flush_anchor(key, Anchor::Tail, true)
  }

  /// Prepend the pending values, order preserved; creates the key
  /// 将待写值插到头部，保持顺序；键不存在则创建
  pub fn insert(&mut self, key: &[u8]) -> R<()> {
    self.flush_anchor(key, Anchor::Head, true)
  }

  /// Read-then-unlink the tail value / 读取并摘除尾值
  pub fn pop(&mut self, key: &[u8]) -> R<Option<C::Val>> {
    self.take_end(key, true)
  }

  /// Read-then-unlink the head value / 读取并摘除首值
  pub fn shift(&mut self, key: &[u8]) -> R<Option<C::Val>> {
    self.take_end(key, false)
  }

  pub fn exist(&mut self, key: &[u8]) -> R<bool> {
    check_key(key)?;
    Ok(self.key_header_read(key)?.is_some())
  }

  /// Drop the key and its whole value chain / 删除键及其整个值链
  pub fn rm_key(&mut self, key: &[u8]) -> R<()> {
    check_key(key)?;
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    {
      let _lock = self.store.lock_write()?;
      let file = self.store.file_mut()?;
      rm_key_in(file, prefix, cap, key)?;
    }
    // the compactor must not re-insert this key from the old store
    // 压缩进程不得从旧存储重新插入此键
    if let Some(mut old) = self.store.open_old_rw() {
      let _ = rm_key_in(&mut old, prefix, cap, key);
    }
    Ok(())
  }

  pub fn count(&mut self) -> R<u32> {
    self.store.count()
  }

  pub fn clear(&mut self) -> R<()> {
    self.store.clear()
  }

  pub fn close(&mut self) {
    self.store.close()
  }

  pub fn is_optimizing(&mut self) -> R<bool> {
    self.store.is_optimizing()
  }

  pub fn set_iterator_slice(&mut self, n: u32) {
    self.store.conf.iterator_slice = n.max(1);
  }

  /// Flush the pending buffer at an anchor, under one lock
  /// 在单个锁内把待写缓冲冲刷到锚点
  pub(crate) fn flush_anchor(&mut self, key: &[u8], anchor: Anchor, may_create: bool) -> R<()> {
    check_key(key)?;
    let vals = self.take_pending()?;
    let cap = self.store.conf.chain_cap;
    let _lock = self.store.lock_write()?;
    let Some((key_off, kh)) = self.key_header_locked(key, may_create)? else {
      return Err(E::NotFound);
    };
    let file = self.store.file_mut()?;
    let value_head = kh.value_head.get() as u64;
    let head_ptr = key_off + ListKeyHead::VALUE_HEAD_OFF;
    let (prev, next) = match anchor {
      Anchor::Head => (0, value_head),
      Anchor::Tail => (walk::tail_of(file, cap, value_head)?, 0),
      Anchor::AfterCrc(crc) => {
        let Some((off, h)) = walk::find_crc(file, cap, value_head, crc)? else {
          return Err(E::NotFound);
        };
        (off, h.next_link())
      }
      Anchor::BeforeCrc(crc) => {
        let Some((off, h)) = walk::find_crc(file, cap, value_head, crc)? else {
          return Err(E::NotFound);
        };
        (h.prev_link(), off)
      }
      Anchor::After(idx) => {
        let hs = walk::heads(file, cap, value_head)?;
        let i = walk::norm_index(hs.len(), idx).ok_or(E::NotFound)?;
        (hs[i].0, hs[i].1.next_link())
      }
      Anchor::Before(idx) => {
        let hs = walk::heads(file, cap, value_head)?;
        let i = walk::norm_index(hs.len(), idx).ok_or(E::NotFound)?;
        (hs[i].1.prev_link(), hs[i].0)
      }
    };
    splice_in(file, head_ptr, prev, next, &vals)?;
    Ok(())
  }

  fn take_end(&mut self, key: &[u8], tail: bool) -> R<Option<C::Val>> {
    check_key(key)?;
    let cap = self.store.conf.chain_cap;
    let _lock = self.store.lock_write()?;
    let Some((key_off, kh)) = self.key_header_locked(key, false)? else {
      return Ok(None);
    };
    let value_head = kh.value_head.get() as u64;
    if value_head == 0 {
      return Ok(None);
    }
    let bytes = {
      let file = self.store.file_mut()?;
      let off = if tail {
        walk::tail_of(file, cap, value_head)?
      } else {
        value_head
      };
      let h: ListValHead = record::read_head(file, off)?;
      let bytes = walk::read_val(file, off, &h)?;
      record::splice_at::<ListValHead>(
        file,
        key_off + ListKeyHead::VALUE_HEAD_OFF,
        h.prev_link(),
        h.next_link(),
      )?;
      bytes
    };
    Ok(bytes.and_then(|b| self.codec.de(&b)))
  }

  /// Key-header lookup for writes; the caller holds the lock. Falls back to
  /// migrating from the old store, then to creating.
  /// 写路径的键头查找；调用方持锁。依次回退到从旧存储迁移、再到创建。
  pub(crate) fn key_header_locked(
    &mut self,
    key: &[u8],
    may_create: bool,
  ) -> R<Option<(u64, ListKeyHead)>> {
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    {
      let file = self.store.file_mut()?;
      if let Some(found) = find_key(file, prefix, cap, key)? {
        return Ok(Some(found));
      }
    }
    if self.migrate_locked(key)? {
      let file = self.store.file_mut()?;
      return find_key(file, prefix, cap, key);
    }
    if may_create {
      let file = self.store.file_mut()?;
      let off = create_key(file, prefix, key)?;
      let h: ListKeyHead = record::read_head(file, off)?;
      return Ok(Some((off, h)));
    }
    Ok(None)
  }

  /// Key-header lookup for reads. A key found only in the old store is
  /// copied over under the lock first, so coverage of the new store only
  /// grows.
  /// 读路径的键头查找。仅存在于旧存储的键先在锁内复制过来，
  /// 新存储的覆盖只增不减。
  pub(crate) fn key_header_read(&mut self, key: &[u8]) -> R<Option<(u64, ListKeyHead)>> {
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    {
      let file = self.store.handle(Op::Read)?;
      if let Some(found) = find_key(file, prefix, cap, key)? {
        return Ok(Some(found));
      }
    }
    if !self.store.op_path().exists() {
      return Ok(None);
    }
    let _lock = self.store.lock_write()?;
    {
      let file = self.store.file_mut()?;
      if let Some(found) = find_key(file, prefix, cap, key)? {
        return Ok(Some(found));
      }
    }
    if self.migrate_locked(key)? {
      let file = self.store.file_mut()?;
      return find_key(file, prefix, cap, key);
    }
    Ok(None)
  }

  /// Copy a key's whole value chain from the old store. Caller holds the
  /// lock. `false` when there is nothing to migrate.
  /// 从旧存储复制键的整个值链。调用方持锁。无可迁移时返回 `false`。
  fn migrate_locked(&mut self, key: &[u8]) -> R<bool> {
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    let Some(mut old) = self.store.open_old_read() else {
      return Ok(false);
    };
    // a racing clear() empties both stores; copy nothing out of a teardown
    // 竞态的 clear() 清空两个存储；不从清空中的存储复制
    if head::read_status(&mut old, prefix)? == head::Status::CLEARING {
      return Ok(false);
    }
    let Some((_, old_kh)) = find_key(&mut old, prefix, cap, key)? else {
      return Ok(false);
    };
    let vals = walk::collect_bytes(&mut old, cap, old_kh.value_head.get() as u64)?;
    let file = self.store.file_mut()?;
    // a concurrent writer may have created the key meanwhile; theirs wins
    // 并发写者可能已创建该键；以其为准
    if find_key(file, prefix, cap, key)?.is_some() {
      return Ok(true);
    }
    let key_off = create_key(file, prefix, key)?;
    if !vals.is_empty() {
      splice_in(file, key_off + ListKeyHead::VALUE_HEAD_OFF, 0, 0, &vals)?;
    }
    Ok(true)
  }
}

/// Walk the bucket chain for `key`'s key-header / 在桶链中查找键头
pub(crate) fn find_key(
  file: &mut File,
  prefix: u64,
  cap: Option<u32>,
  key: &[u8],
) -> R<Option<(u64, ListKeyHead)>> {
  let b = bucket::bucket_of(key);
  let mut off = bucket::read_slot(file, prefix, b)?;
  let mut chain = Chain::new(cap);
  while off != 0 {
    if !chain.step(off)? {
      return Ok(None);
    }
    let h: ListKeyHead = record::read_head(file, off)?;
    let k_len = h.k_len.get() as usize;
    if k_len == key.len() {
      let mut kb = vec![0u8; k_len];
      fs::read_at(file, off + LIST_KEY_HEAD as u64, &mut kb)?;
      if kb == key {
        return Ok(Some((off, h)));
      }
    }
    off = h.next_link();
  }
  Ok(None)
}

/// Append a key-header with an empty value chain and head-insert it
/// 追加空值链的键头并头插
pub(crate) fn create_key(file: &mut File, prefix: u64, key: &[u8]) -> R<u64> {
  let b = bucket::bucket_of(key);
  let old_head = bucket::read_slot(file, prefix, b)?;
  let h = ListKeyHead {
    k_len: U16::new(key.len() as u16),
    prev: U32::new(0),
    next: U32::new(old_head as u32),
    value_head: U32::new(0),
  };
  let mut rec = Vec::with_capacity(LIST_KEY_HEAD + key.len());
  rec.extend_from_slice(h.as_bytes());
  rec.extend_from_slice(key);
  let off = fs::append(file, &rec)?;
  record::link_head_at::<ListKeyHead>(file, bucket::slot_off(prefix, b), off, old_head)?;
  head::add_count(file, prefix, 1)?;
  Ok(off)
}

fn rm_key_in(file: &mut File, prefix: u64, cap: Option<u32>, key: &[u8]) -> R<bool> {
  let Some((off, h)) = find_key(file, prefix, cap, key)? else {
    return Ok(false);
  };
  // dead-mark first; a torn splice still leaves the key invisible
  // 先标记删除；摘链中断时键仍不可见
  fs::write_at(file, off, &0u16.to_le_bytes())?;
  let b = bucket::bucket_of(key);
  record::splice_at::<ListKeyHead>(
    file,
    bucket::slot_off(prefix, b),
    h.prev_link(),
    h.next_link(),
  )?;
  head::add_count(file, prefix, -1)?;
  Ok(true)
}

/// Append `vals` as one pre-linked run and splice it between `prev` and
/// `next`. Offsets are computable up front because the whole run lands at
/// EOF under the caller's lock. Append first, relink after.
/// 将 `vals` 作为预链接的连续记录追加，并接入 `prev` 与 `next` 之间。
/// 整段在调用方锁内落在文件尾，偏移可预先算出。先追加，后重链。
pub(crate) fn splice_in(
  file: &mut File,
  head_ptr: u64,
  prev: u64,
  next: u64,
  vals: &[Vec<u8>],
) -> R<()> {
  if vals.is_empty() {
    return Err(E::arg("no pending values"));
  }
  let base = file.seek(SeekFrom::End(0))?;
  let mut offs = Vec::with_capacity(vals.len());
  let mut cur = base;
  for v in vals {
    offs.push(cur);
    cur += (LIST_VAL_HEAD + v.len()) as u64;
  }
  let mut buf = Vec::with_capacity((cur - base) as usize);
  for (i, v) in vals.iter().enumerate() {
    let p = if i == 0 { prev } else { offs[i - 1] };
    let n = if i + 1 == vals.len() { next } else { offs[i + 1] };
    let h = ListValHead {
      v_len: U32::new(v.len() as u32),
      prev: U32::new(p as u32),
      next: U32::new(n as u32),
      crc: U32::new(crc32fast::hash(v)),
    };
    buf.extend_from_slice(h.as_bytes());
    buf.extend_from_slice(v);
  }
  fs::write_retry(file, &buf)?;
  let first = offs[0];
  let last = offs[vals.len() - 1];
  if prev == 0 {
    fs::write_u32(file, head_ptr, first as u32)?;
  } else {
    fs::write_u32(file, prev + ListValHead::NEXT_OFF, first as u32)?;
  }
  if next != 0 {
    fs::write_u32(file, next + ListValHead::PREV_OFF, last as u32)?;
  }
  Ok(())
}

/// Copy a whole list into a compacting target only when the key is absent
/// 仅当键不存在时把整个列表复制进压缩目标
pub(crate) fn write_optimize(
  file: &mut File,
  prefix: u64,
  cap: Option<u32>,
  key: &[u8],
  vals: &[Vec<u8>],
) -> R<bool> {
  if find_key(file, prefix, cap, key)?.is_some() {
    return Ok(false);
  }
  let key_off = create_key(file, prefix, key)?;
  if !vals.is_empty() {
    splice_in(file, key_off + ListKeyHead::VALUE_HEAD_OFF, 0, 0, vals)?;
  }
  Ok(true)
}

/// Live lists of one bucket chain: `(key, value bytes)` per key-header
/// 单桶链的有效列表：每个键头一个 `(键, 值字节)`
pub(crate) fn bucket_lists(
  file: &mut File,
  cap: Option<u32>,
  head: u64,
) -> R<Vec<(Vec<u8>, Vec<Vec<u8>>)>> {
  let mut out = Vec::new();
  iter::walk_chain::<ListKeyHead, _>(file, cap, head, |file, off, h| {
    let k_len = h.k_len.get() as usize;
    if k_len == 0 {
      return Ok(());
    }
    let mut key = vec![0u8; k_len];
    fs::read_at(file, off + LIST_KEY_HEAD as u64, &mut key)?;
    let vals = walk::collect_bytes(file, cap, h.value_head.get() as u64)?;
    out.push((key, vals));
    Ok(())
  })?;
  Ok(out)
}
