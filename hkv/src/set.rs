//! Key-set flavor / 键集合存储
//!
//! Membership only. Records carry the 16-byte raw MD5 of the user key and
//! nothing else; removal is pure unlinking. Distinct user keys collide only
//! on a full 128-bit MD5 collision, treated as impossible.
//! 仅成员关系。记录只携带用户键的 16 字节原始 MD5；删除即摘链。
//! 不同用户键仅在完整 128 位 MD5 碰撞时冲突，视为不可能。

use std::fs::File;

use md5::{Digest, Md5};
use zerocopy::{IntoBytes, byteorder::little_endian::U32};

use crate::{
  bucket,
  conf::Conf,
  error::R,
  fs, head, iter,
  record::{self, Chain, Linked, SetRec, check_key},
  store::{Op, Store},
};

/// Membership set over one file / 单文件成员集合
pub struct KeySet {
  pub(crate) store: Store,
}

/// 16-byte raw digest of a user key / 用户键的 16 字节原始摘要
#[inline]
pub fn digest(key: &[u8]) -> [u8; 16] {
  Md5::digest(key).into()
}

impl KeySet {
  pub fn open(conf: Conf) -> R<Self> {
    Ok(Self {
      store: Store::open(conf)?,
    })
  }

  /// Insert; already-present is a no-op success
  /// 插入；已存在时为成功的空操作
  pub fn add(&mut self, key: &[u8]) -> R<()> {
    check_key(key)?;
    let md5 = digest(key);
    let b = bucket::bucket_of(key);
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    let _lock = self.store.lock_write()?;
    let file = self.store.file_mut()?;
    add_digest(file, prefix, cap, b, &md5)?;
    Ok(())
  }

  pub fn has(&mut self, key: &[u8]) -> R<bool> {
    check_key(key)?;
    let md5 = digest(key);
    let b = bucket::bucket_of(key);
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    {
      let file = self.store.handle(Op::Read)?;
      if find_digest(file, prefix, cap, b, &md5)?.is_some() {
        return Ok(true);
      }
    }
    // during a compaction the member may not have migrated yet
    // 压缩期间成员可能尚未迁移
    if let Some(mut old) = self.store.open_old_read() {
      return Ok(find_digest(&mut old, prefix, cap, b, &md5)?.is_some());
    }
    Ok(false)
  }

  /// Unsplice; absent keys succeed / 摘链；键不存在也算成功
  pub fn rm(&mut self, key: &[u8]) -> R<()> {
    check_key(key)?;
    let md5 = digest(key);
    let b = bucket::bucket_of(key);
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    {
      let _lock = self.store.lock_write()?;
      let file = self.store.file_mut()?;
      rm_digest(file, prefix, cap, b, &md5)?;
    }
    // the compactor must not re-insert this member from the old store
    // 压缩进程不得从旧存储重新插入此成员
    if let Some(mut old) = self.store.open_old_rw() {
      let _ = rm_digest(&mut old, prefix, cap, b, &md5);
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
}

fn find_digest(
  file: &mut File,
  prefix: u64,
  cap: Option<u32>,
  b: u32,
  md5: &[u8; 16],
) -> R<Option<(u64, SetRec)>> {
  let mut off = bucket::read_slot(file, prefix, b)?;
  let mut chain = Chain::new(cap);
  while off != 0 {
    if !chain.step(off)? {
      return Ok(None);
    }
    let rec: SetRec = record::read_head(file, off)?;
    if &rec.md5 == md5 {
      return Ok(Some((off, rec)));
    }
    off = rec.next_link();
  }
  Ok(None)
}

/// Insert unless present; the bucket index travels separately from the key
/// so a compactor can re-insert digests it cannot reverse.
/// 不存在时插入；桶号与键分离传递，压缩进程得以重插无法还原的摘要。
pub(crate) fn add_digest(
  file: &mut File,
  prefix: u64,
  cap: Option<u32>,
  b: u32,
  md5: &[u8; 16],
) -> R<bool> {
  if find_digest(file, prefix, cap, b, md5)?.is_some() {
    return Ok(false);
  }
  let old_head = bucket::read_slot(file, prefix, b)?;
  let rec = SetRec {
    prev: U32::new(0),
    next: U32::new(old_head as u32),
    md5: *md5,
  };
  let off = fs::append(file, rec.as_bytes())?;
  record::link_head_at::<SetRec>(file, bucket::slot_off(prefix, b), off, old_head)?;
  head::add_count(file, prefix, 1)?;
  Ok(true)
}

fn rm_digest(file: &mut File, prefix: u64, cap: Option<u32>, b: u32, md5: &[u8; 16]) -> R<bool> {
  let Some((_, rec)) = find_digest(file, prefix, cap, b, md5)? else {
    return Ok(false);
  };
  record::splice_at::<SetRec>(
    file,
    bucket::slot_off(prefix, b),
    rec.prev_link(),
    rec.next_link(),
  )?;
  head::add_count(file, prefix, -1)?;
  Ok(true)
}

/// All digests of one bucket chain / 单桶链的全部摘要
pub(crate) fn bucket_digests(file: &mut File, cap: Option<u32>, head: u64) -> R<Vec<[u8; 16]>> {
  let mut out = Vec::new();
  iter::walk_chain::<SetRec, _>(file, cap, head, |_, _, rec| {
    out.push(rec.md5);
    Ok(())
  })?;
  Ok(out)
}
