//! Pivot, positional, and slice edits / 基准值、位置与切片编辑
//!
//! Pivot matching compares the stored CRC of the serialized value, the same
//! checksum the engine already keeps per record.
//! 基准值匹配比较序列化值的 CRC，即引擎本就为每条记录保存的校验和。

use std::{collections::HashMap, fs::File};

use zerocopy::byteorder::little_endian::U32;

use crate::{
  codec::Codec,
  error::{E, R},
  fs,
  list::{Anchor, List, splice_in, walk},
  record::{self, LIST_VAL_HEAD, Linked, ListKeyHead, ListValHead, check_key},
};

impl<C: Codec> List<C> {
  /// Insert the pending values after the first value matching the pivot
  /// 将待写值插到首个匹配基准值之后
  pub fn append(&mut self, key: &[u8], pivot: &C::Val) -> R<()> {
    let crc = crc32fast::hash(&self.codec.ser(pivot));
    self.flush_anchor(key, Anchor::AfterCrc(crc), false)
  }

  /// Insert the pending values before the first value matching the pivot
  /// 将待写值插到首个匹配基准值之前
  pub fn prepend(&mut self, key: &[u8], pivot: &C::Val) -> R<()> {
    let crc = crc32fast::hash(&self.codec.ser(pivot));
    self.flush_anchor(key, Anchor::BeforeCrc(crc), false)
  }

  /// Insert after position `idx`; `-1` is the end sentinel and behaves like
  /// [`List::push`], creating the key when absent
  /// 插到位置 `idx` 之后；`-1` 为末尾哨兵，行为同 [`List::push`]，
  /// 键不存在时创建
  pub fn append_by_index(&mut self, key: &[u8], idx: i64) -> R<()> {
    if idx == -1 {
      self.flush_anchor(key, Anchor::Tail, true)
    } else {
      self.flush_anchor(key, Anchor::After(idx), false)
    }
  }

  /// Insert before position `idx`; `0` is the head sentinel and behaves like
  /// [`List::insert`], creating the key when absent
  /// 插到位置 `idx` 之前；`0` 为头部哨兵，行为同 [`List::insert`]，
  /// 键不存在时创建
  pub fn prepend_by_index(&mut self, key: &[u8], idx: i64) -> R<()> {
    if idx == 0 {
      self.flush_anchor(key, Anchor::Head, true)
    } else {
      self.flush_anchor(key, Anchor::Before(idx), false)
    }
  }

  /// Rewrite the value at `idx`: in place when the new serialization fits
  /// the old one, otherwise grow-and-relink within the chain
  /// 重写位置 `idx` 的值：新序列化不大于旧值时原地，否则在链内增长重链
  pub fn alter(&mut self, key: &[u8], idx: i64, val: &C::Val) -> R<()> {
    check_key(key)?;
    let bytes = self.codec.ser(val);
    let cap = self.store.conf.chain_cap;
    let _lock = self.store.lock_write()?;
    let Some((key_off, kh)) = self.key_header_locked(key, false)? else {
      return Err(E::NotFound);
    };
    let file = self.store.file_mut()?;
    let hs = walk::heads(file, cap, kh.value_head.get() as u64)?;
    let i = walk::norm_index(hs.len(), idx).ok_or(E::NotFound)?;
    let (off, h) = hs[i];
    if bytes.len() as u32 <= h.v_len.get() {
      let nh = ListValHead {
        v_len: U32::new(bytes.len() as u32),
        prev: h.prev,
        next: h.next,
        crc: U32::new(crc32fast::hash(&bytes)),
      };
      record::write_head(file, off, &nh)?;
      fs::write_at(file, off + LIST_VAL_HEAD as u64, &bytes)?;
    } else {
      // inserting the replacement between the old neighbors orphans the old
      // record in one step
      // 把替换值插到旧邻居之间，一步孤立旧记录
      splice_in(
        file,
        key_off + ListKeyHead::VALUE_HEAD_OFF,
        h.prev_link(),
        h.next_link(),
        std::slice::from_ref(&bytes),
      )?;
    }
    Ok(())
  }

  /// Unlink a slice; `len = None` runs to the end. `rm(key, 0, None)` zeroes
  /// the chain head in one write.
  /// 摘除切片；`len = None` 到末尾。`rm(key, 0, None)` 一次写清零链头。
  pub fn rm(&mut self, key: &[u8], start: i64, len: Option<u32>) -> R<()> {
    check_key(key)?;
    let cap = self.store.conf.chain_cap;
    let _lock = self.store.lock_write()?;
    let Some((key_off, kh)) = self.key_header_locked(key, false)? else {
      return Ok(());
    };
    let file = self.store.file_mut()?;
    let head_ptr = key_off + ListKeyHead::VALUE_HEAD_OFF;
    if start == 0 && len.is_none() {
      fs::write_u32(file, head_ptr, 0)?;
      return Ok(());
    }
    let offs = walk::offsets(file, cap, kh.value_head.get() as u64)?;
    let (a, b) = walk::slice_range(offs.len(), start, len);
    if a >= b {
      return Ok(());
    }
    let prev = if a == 0 { 0 } else { offs[a - 1] };
    let next = if b == offs.len() { 0 } else { offs[b] };
    record::splice_at::<ListValHead>(file, head_ptr, prev, next)
  }

  /// Retain only the slice / 仅保留切片
  pub fn keep(&mut self, key: &[u8], start: i64, len: Option<u32>) -> R<()> {
    check_key(key)?;
    let cap = self.store.conf.chain_cap;
    let _lock = self.store.lock_write()?;
    let Some((key_off, kh)) = self.key_header_locked(key, false)? else {
      return Ok(());
    };
    let file = self.store.file_mut()?;
    let head_ptr = key_off + ListKeyHead::VALUE_HEAD_OFF;
    let offs = walk::offsets(file, cap, kh.value_head.get() as u64)?;
    let (a, b) = walk::slice_range(offs.len(), start, len);
    if a >= b {
      fs::write_u32(file, head_ptr, 0)?;
      return Ok(());
    }
    fs::write_u32(file, head_ptr, offs[a] as u32)?;
    fs::write_u32(file, offs[a] + ListValHead::PREV_OFF, 0)?;
    fs::write_u32(file, offs[b - 1] + ListValHead::NEXT_OFF, 0)?;
    Ok(())
  }

  /// Unlink an arbitrary index set / 摘除任意下标集合
  pub fn rm_index(&mut self, key: &[u8], idxs: &[i64]) -> R<()> {
    self.sift(key, idxs, false)
  }

  /// Retain only an arbitrary index set / 仅保留任意下标集合
  pub fn keep_index(&mut self, key: &[u8], idxs: &[i64]) -> R<()> {
    self.sift(key, idxs, true)
  }

  fn sift(&mut self, key: &[u8], idxs: &[i64], keep: bool) -> R<()> {
    check_key(key)?;
    let cap = self.store.conf.chain_cap;
    let _lock = self.store.lock_write()?;
    let Some((key_off, kh)) = self.key_header_locked(key, false)? else {
      return Ok(());
    };
    let file = self.store.file_mut()?;
    let offs = walk::offsets(file, cap, kh.value_head.get() as u64)?;
    let mut marked = vec![false; offs.len()];
    for &i in idxs {
      if let Some(p) = walk::norm_index(offs.len(), i) {
        marked[p] = true;
      }
    }
    let survive: Vec<u64> = offs
      .iter()
      .enumerate()
      .filter(|(i, _)| marked[*i] == keep)
      .map(|(_, o)| *o)
      .collect();
    relink(file, key_off + ListKeyHead::VALUE_HEAD_OFF, &offs, &survive)
  }
}

/// Rewrite only the pointers that differ between the old chain and the
/// surviving sublist. Old neighbors derive from positions in the walk, so no
/// headers are re-read.
/// 只重写旧链与存留子链之间有差异的指针。旧邻居由遍历位置推得，无须重读头。
fn relink(file: &mut File, head_ptr: u64, offs: &[u64], survive: &[u64]) -> R<()> {
  let old_head = offs.first().copied().unwrap_or(0);
  let new_head = survive.first().copied().unwrap_or(0);
  if old_head != new_head {
    fs::write_u32(file, head_ptr, new_head as u32)?;
  }
  if survive.is_empty() {
    return Ok(());
  }
  let mut old_link = HashMap::with_capacity(offs.len());
  for (i, &o) in offs.iter().enumerate() {
    let p = if i == 0 { 0 } else { offs[i - 1] };
    let n = if i + 1 == offs.len() { 0 } else { offs[i + 1] };
    old_link.insert(o, (p, n));
  }
  for (i, &o) in survive.iter().enumerate() {
    let new_p = if i == 0 { 0 } else { survive[i - 1] };
    let new_n = if i + 1 == survive.len() { 0 } else { survive[i + 1] };
    let (old_p, old_n) = old_link.get(&o).copied().unwrap_or((0, 0));
    if old_p != new_p {
      fs::write_u32(file, o + ListValHead::PREV_OFF, new_p as u32)?;
    }
    if old_n != new_n {
      fs::write_u32(file, o + ListValHead::NEXT_OFF, new_n as u32)?;
    }
  }
  Ok(())
}
