//! Slice-based bucket iteration / 基于桶切片的迭代
//!
//! Reads a window of bucket slots, then walks each nonzero chain. No lock is
//! taken: a larger window costs fewer reads but widens the staleness window
//! under concurrent writers. Chains relinked mid-walk are tolerated by
//! re-reading the previous record's next pointer.
//! 读取一个桶槽窗口，再遍历每条非空链。全程不加锁：窗口越大读取越少，
//! 但并发写下的过期窗口越宽。遍历中被重链的链通过复读前一记录的
//! next 指针来容忍。

use std::fs::File;

use crate::{
  bucket,
  codec::Codec,
  consts::BUCKET_N,
  error::{E, R},
  fs,
  kv::{self, Kv},
  list::{self, List},
  record::{Chain, Linked},
  set::{self, KeySet},
  store::Op,
};

/// Windowed scan position over the bucket array
/// 桶数组上的窗口扫描游标
pub(crate) struct BucketCursor {
  next_bucket: u32,
  /// Nonzero slots of the current window, reversed so pop() ascends
  /// 当前窗口的非空槽，倒序存放使 pop() 递增
  window: Vec<(u32, u64)>,
}

impl BucketCursor {
  pub fn new() -> Self {
    Self {
      next_bucket: 0,
      window: Vec::new(),
    }
  }

  /// Next nonzero bucket `(index, chain head)` / 下一个非空桶
  pub fn next(&mut self, file: &mut File, prefix: u64, slice: u32) -> R<Option<(u32, u64)>> {
    loop {
      if let Some(x) = self.window.pop() {
        return Ok(Some(x));
      }
      if self.next_bucket >= BUCKET_N {
        return Ok(None);
      }
      let start = self.next_bucket;
      let len = slice.max(1).min(BUCKET_N - start);
      let slots = bucket::read_slots(file, prefix, start, len)?;
      self.next_bucket += len;
      self.window = slots
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, s)| **s != 0)
        .map(|(i, s)| (start + i as u32, *s as u64))
        .collect();
    }
  }
}

/// Walk one chain, calling `f` per record. When a header fails to parse the
/// previous record's next pointer is re-read; if a concurrent writer moved
/// it, the walk resumes from the new target.
/// 遍历单条链，对每条记录调用 `f`。头解析失败时复读前一记录的 next 指针；
/// 若被并发写者改动，则从新目标继续。
pub(crate) fn walk_chain<T: Linked, F>(
  file: &mut File,
  cap: Option<u32>,
  head: u64,
  mut f: F,
) -> R<()>
where
  F: FnMut(&mut File, u64, T) -> R<()>,
{
  let mut chain = Chain::new(cap);
  let mut prev = 0u64;
  let mut off = head;
  while off != 0 {
    if !chain.step(off)? {
      break;
    }
    match crate::record::read_head::<T>(file, off) {
      Ok(h) => {
        let next = h.next_link();
        f(file, off, h)?;
        prev = off;
        off = next;
      }
      Err(E::Format(_)) if prev != 0 => {
        let moved = fs::read_u32(file, prev + T::NEXT_OFF)? as u64;
        if moved != off && moved != 0 {
          off = moved;
        } else {
          break;
        }
      }
      Err(E::Format(_)) => break,
      Err(e) => return Err(e),
    }
  }
  Ok(())
}

/// Iterator over live KV entries / 有效 KV 条目迭代器
pub struct KvIter<'a, C: Codec> {
  kv: &'a mut Kv<C>,
  cursor: BucketCursor,
  pending: Vec<(Vec<u8>, Vec<u8>)>,
}

impl<C: Codec> Kv<C> {
  /// Restartable scan of all live entries; dirty reads are possible under
  /// concurrent writers, check [`Kv::is_optimizing`] first when sensitive
  /// 可重启地扫描全部有效条目；并发写下可能读到脏数据，
  /// 敏感场景先检查 [`Kv::is_optimizing`]
  pub fn iter(&mut self) -> KvIter<'_, C> {
    KvIter {
      kv: self,
      cursor: BucketCursor::new(),
      pending: Vec::new(),
    }
  }
}

impl<C: Codec> Iterator for KvIter<'_, C> {
  type Item = R<(Vec<u8>, C::Val)>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some((k, v)) = self.pending.pop() {
        match self.kv.codec.de(&v) {
          Some(val) => return Some(Ok((k, val))),
          None => continue,
        }
      }
      let prefix = self.kv.store.prefix;
      let cap = self.kv.store.conf.chain_cap;
      let slice = self.kv.store.conf.iterator_slice;
      let file = match self.kv.store.handle(Op::Read) {
        Ok(f) => f,
        Err(e) => return Some(Err(e)),
      };
      match self.cursor.next(file, prefix, slice) {
        Ok(None) => return None,
        Ok(Some((_, head))) => match kv::bucket_entries(file, cap, head) {
          Ok(mut entries) => {
            entries.reverse();
            self.pending = entries.into_iter().map(|(k, v, _)| (k, v)).collect();
          }
          Err(e) => return Some(Err(e)),
        },
        Err(e) => return Some(Err(e)),
      }
    }
  }
}

/// Iterator over set digests / 集合摘要迭代器
pub struct KeySetIter<'a> {
  set: &'a mut KeySet,
  cursor: BucketCursor,
  pending: Vec<[u8; 16]>,
}

impl KeySet {
  pub fn iter(&mut self) -> KeySetIter<'_> {
    KeySetIter {
      set: self,
      cursor: BucketCursor::new(),
      pending: Vec::new(),
    }
  }
}

impl Iterator for KeySetIter<'_> {
  type Item = R<[u8; 16]>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(d) = self.pending.pop() {
        return Some(Ok(d));
      }
      let prefix = self.set.store.prefix;
      let cap = self.set.store.conf.chain_cap;
      let slice = self.set.store.conf.iterator_slice;
      let file = match self.set.store.handle(Op::Read) {
        Ok(f) => f,
        Err(e) => return Some(Err(e)),
      };
      match self.cursor.next(file, prefix, slice) {
        Ok(None) => return None,
        Ok(Some((_, head))) => match set::bucket_digests(file, cap, head) {
          Ok(mut digests) => {
            digests.reverse();
            self.pending = digests;
          }
          Err(e) => return Some(Err(e)),
        },
        Err(e) => return Some(Err(e)),
      }
    }
  }
}

/// Iterator over list keys with their values / 列表键及其值的迭代器
pub struct ListIter<'a, C: Codec> {
  list: &'a mut List<C>,
  cursor: BucketCursor,
  pending: Vec<(Vec<u8>, Vec<Vec<u8>>)>,
}

impl<C: Codec> List<C> {
  pub fn iter(&mut self) -> ListIter<'_, C> {
    ListIter {
      list: self,
      cursor: BucketCursor::new(),
      pending: Vec::new(),
    }
  }
}

impl<C: Codec> Iterator for ListIter<'_, C> {
  type Item = R<(Vec<u8>, Vec<C::Val>)>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some((k, vals)) = self.pending.pop() {
        let decoded = vals
          .iter()
          .filter_map(|v| self.list.codec.de(v))
          .collect::<Vec<_>>();
        return Some(Ok((k, decoded)));
      }
      let prefix = self.list.store.prefix;
      let cap = self.list.store.conf.chain_cap;
      let slice = self.list.store.conf.iterator_slice;
      let file = match self.list.store.handle(Op::Read) {
        Ok(f) => f,
        Err(e) => return Some(Err(e)),
      };
      match self.cursor.next(file, prefix, slice) {
        Ok(None) => return None,
        Ok(Some((_, head))) => match list::bucket_lists(file, cap, head) {
          Ok(mut lists) => {
            lists.reverse();
            self.pending = lists;
          }
          Err(e) => return Some(Err(e)),
        },
        Err(e) => return Some(Err(e)),
      }
    }
  }
}
