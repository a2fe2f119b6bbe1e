//! KV flavor / KV 存储
//!
//! Opaque values with optional TTL and in-place decimal counters. Writes
//! follow lock → find → append-or-inplace → relink → count → unlock; reads
//! walk the chain without locking.
//! 不透明值，可选 TTL，原地十进制计数器。写操作遵循
//! 锁 → 查找 → 追加或原地 → 重链 → 计数 → 解锁；读操作无锁遍历。

use std::fs::File;

use zerocopy::{
  IntoBytes,
  byteorder::little_endian::{U16, U32},
};

use crate::{
  bucket,
  codec::{Bytes, Codec, int_of},
  conf::Conf,
  consts::COUNTER_SLOT,
  error::R,
  fs, head, iter,
  record::{self, Chain, KV_HEAD, KvHead, Linked, check_key},
  store::{Op, Store},
};

/// Remaining time to live / 剩余存活时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
  /// Key absent / 键不存在
  Missing,
  /// Key exists, never expires / 键存在，永不过期
  Never,
  /// Seconds until expiry; 0 when already expired / 距过期秒数；已过期为 0
  Sec(u32),
}

/// KV store over one file / 单文件 KV 存储
pub struct Kv<C: Codec = Bytes> {
  pub(crate) store: Store,
  pub(crate) codec: C,
}

impl Kv<Bytes> {
  pub fn open(conf: Conf) -> R<Self> {
    Self::open_with(conf, Bytes)
  }
}

impl<C: Codec> Kv<C> {
  pub fn open_with(conf: Conf, codec: C) -> R<Self> {
    Ok(Self {
      store: Store::open(conf)?,
      codec,
    })
  }

  /// Store a value; `ttl_sec = 0` means no expiry
  /// 存储值；`ttl_sec = 0` 表示不过期
  pub fn set(&mut self, key: &[u8], val: &C::Val, ttl_sec: u32) -> R<()> {
    self.set_opt(key, Some(val), ttl_sec)
  }

  /// `None` value removes the key / 值为 `None` 等同删除键
  pub fn set_opt(&mut self, key: &[u8], val: Option<&C::Val>, ttl_sec: u32) -> R<()> {
    let Some(val) = val else { return self.rm(key) };
    check_key(key)?;
    let bytes = self.codec.ser(val);
    let expire = if ttl_sec == 0 { 0 } else { fs::now() + ttl_sec };
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    let _lock = self.store.lock_write()?;
    let file = self.store.file_mut()?;
    write_kv(file, prefix, cap, key, &bytes, 0, Some(expire))?;
    Ok(())
  }

  /// `None` when absent, expired, or checksum-invalid
  /// 不存在、已过期或校验失败时返回 `None`
  pub fn get(&mut self, key: &[u8]) -> R<Option<C::Val>> {
    check_key(key)?;
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    {
      let file = self.store.handle(Op::Read)?;
      if let Some(bytes) = read_kv(file, prefix, cap, key)? {
        return Ok(self.codec.de(&bytes));
      }
    }
    // during a compaction the key may not have migrated yet
    // 压缩期间键可能尚未迁移
    if let Some(mut old) = self.store.open_old_read()
      && let Some(bytes) = read_kv(&mut old, prefix, cap, key)?
    {
      return Ok(self.codec.de(&bytes));
    }
    Ok(None)
  }

  pub fn ttl(&mut self, key: &[u8]) -> R<Ttl> {
    check_key(key)?;
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    {
      let file = self.store.handle(Op::Read)?;
      match ttl_of(file, prefix, cap, key)? {
        Ttl::Missing => {}
        t => return Ok(t),
      }
    }
    if let Some(mut old) = self.store.open_old_read() {
      return ttl_of(&mut old, prefix, cap, key);
    }
    Ok(Ttl::Missing)
  }

  /// Patch the expiry in place: negative = expire now, 0 = never,
  /// positive = `now + secs`. Returns whether the key existed.
  /// 原地修补过期时间：负数立即过期，0 永不过期，正数为 `now + secs`。
  /// 返回键是否存在。
  pub fn expire(&mut self, key: &[u8], secs: i64) -> R<bool> {
    check_key(key)?;
    let expire = if secs < 0 {
      1
    } else if secs == 0 {
      0
    } else {
      fs::now().saturating_add(secs.min(u32::MAX as i64) as u32)
    };
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    let found = {
      let _lock = self.store.lock_write()?;
      let file = self.store.file_mut()?;
      patch_expire(file, prefix, cap, key, expire)?
    };
    // keep the old store in step so migration cannot resurrect the old expiry
    // 同步旧存储，避免迁移复活旧的过期时间
    if let Some(mut old) = self.store.open_old_rw() {
      let _ = patch_expire(&mut old, prefix, cap, key, expire);
    }
    Ok(found)
  }

  /// Atomic counter update; the stored value is decimal ASCII. A fresh
  /// counter gets a padded slot so later updates stay in place. Relies on
  /// advisory locks being honored; weak-lock filesystems (NFS) are
  /// unspecified.
  /// 原子计数更新；存储值为十进制 ASCII。新计数器分配填充槽，
  /// 使后续更新原地进行。依赖建议锁生效；弱锁文件系统（NFS）行为未定义。
  pub fn increase(&mut self, key: &[u8], delta: i64, ttl_sec: u32) -> R<i64> {
    check_key(key)?;
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    let expire = if ttl_sec == 0 {
      None
    } else {
      Some(fs::now() + ttl_sec)
    };
    let _lock = self.store.lock_write()?;
    // resolve the current value through the cooperative read path so a
    // counter survives a concurrent optimize
    // 通过协作读路径取当前值，计数器在并发压缩中不丢失
    let cur = {
      let file = self.store.file_mut()?;
      read_kv(file, prefix, cap, key)?
    };
    let cur = match cur {
      Some(b) => Some(b),
      None => match self.store.open_old_read() {
        Some(mut old) => read_kv(&mut old, prefix, cap, key)?,
        None => None,
      },
    };
    let next = int_of(cur.as_deref().unwrap_or_default()) + delta;
    let bytes = next.to_string().into_bytes();
    let file = self.store.file_mut()?;
    write_kv(file, prefix, cap, key, &bytes, COUNTER_SLOT, expire)?;
    Ok(next)
  }

  /// Dead-mark and splice; absent keys succeed
  /// 标记删除并摘链；键不存在也算成功
  pub fn rm(&mut self, key: &[u8]) -> R<()> {
    check_key(key)?;
    let prefix = self.store.prefix;
    let cap = self.store.conf.chain_cap;
    {
      let _lock = self.store.lock_write()?;
      let file = self.store.file_mut()?;
      rm_kv(file, prefix, cap, key)?;
    }
    // the compactor must not re-insert this key from the old store
    // 压缩进程不得从旧存储重新插入此键
    if let Some(mut old) = self.store.open_old_rw() {
      let _ = rm_kv(&mut old, prefix, cap, key);
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

/// Walk the bucket chain for `key` / 在桶链中查找键
pub(crate) fn find(
  file: &mut File,
  prefix: u64,
  cap: Option<u32>,
  key: &[u8],
) -> R<Option<(u64, KvHead)>> {
  let b = bucket::bucket_of(key);
  let mut off = bucket::read_slot(file, prefix, b)?;
  let mut chain = Chain::new(cap);
  while off != 0 {
    if !chain.step(off)? {
      // past the cap: invisible
      return Ok(None);
    }
    let h: KvHead = record::read_head(file, off)?;
    let k_len = h.k_len.get() as usize;
    if k_len == key.len() {
      let mut kb = vec![0u8; k_len];
      fs::read_at(file, off + KV_HEAD as u64, &mut kb)?;
      if kb == key {
        return Ok(Some((off, h)));
      }
    }
    off = h.next_link();
  }
  Ok(None)
}

/// Live, unexpired, checksum-valid value bytes / 有效、未过期、校验通过的值
pub(crate) fn read_kv(
  file: &mut File,
  prefix: u64,
  cap: Option<u32>,
  key: &[u8],
) -> R<Option<Vec<u8>>> {
  let Some((off, h)) = find(file, prefix, cap, key)? else {
    return Ok(None);
  };
  let expire = h.expire.get();
  if expire != 0 && expire <= fs::now() {
    return Ok(None);
  }
  let mut buf = vec![0u8; h.v_len.get() as usize];
  fs::read_at(file, off + KV_HEAD as u64 + h.k_len.get() as u64, &mut buf)?;
  if crc32fast::hash(&buf) != h.crc.get() {
    return Ok(None);
  }
  Ok(Some(buf))
}

fn ttl_of(file: &mut File, prefix: u64, cap: Option<u32>, key: &[u8]) -> R<Ttl> {
  match find(file, prefix, cap, key)? {
    None => Ok(Ttl::Missing),
    Some((_, h)) => {
      let expire = h.expire.get();
      if expire == 0 {
        return Ok(Ttl::Never);
      }
      let now = fs::now();
      Ok(Ttl::Sec(expire.saturating_sub(now)))
    }
  }
}

fn patch_expire(file: &mut File, prefix: u64, cap: Option<u32>, key: &[u8], expire: u32) -> R<bool> {
  let Some((off, _)) = find(file, prefix, cap, key)? else {
    return Ok(false);
  };
  fs::write_u32(file, off + KvHead::EXPIRE_OFF, expire)?;
  Ok(true)
}

fn rm_kv(file: &mut File, prefix: u64, cap: Option<u32>, key: &[u8]) -> R<bool> {
  let Some((off, h)) = find(file, prefix, cap, key)? else {
    return Ok(false);
  };
  // dead-mark first; a torn splice still leaves the record invisible
  // 先标记删除；摘链中断时记录仍不可见
  fs::write_at(file, off, &0u16.to_le_bytes())?;
  let b = bucket::bucket_of(key);
  record::splice_at::<KvHead>(
    file,
    bucket::slot_off(prefix, b),
    h.prev_link(),
    h.next_link(),
  )?;
  head::add_count(file, prefix, -1)?;
  Ok(true)
}

/// Insert or update under the caller's lock. `e_len_min` pads fresh slots;
/// `expire` of `None` keeps the existing expiry (0 for new records).
/// 在调用方锁内插入或更新。`e_len_min` 填充新槽；
/// `expire` 为 `None` 时保留原过期时间（新记录为 0）。
pub(crate) fn write_kv(
  file: &mut File,
  prefix: u64,
  cap: Option<u32>,
  key: &[u8],
  bytes: &[u8],
  e_len_min: u32,
  expire: Option<u32>,
) -> R<()> {
  let v_len = bytes.len() as u32;
  let crc = crc32fast::hash(bytes);
  match find(file, prefix, cap, key)? {
    Some((off, h)) if v_len <= h.e_len.get() => {
      // in place: same slot, filler past v_len stays as garbage
      // 原地更新：槽不变，v_len 之后的填充保持原样
      let nh = KvHead {
        k_len: h.k_len,
        e_len: h.e_len,
        v_len: U32::new(v_len),
        crc: U32::new(crc),
        expire: U32::new(expire.unwrap_or(h.expire.get())),
        prev: h.prev,
        next: h.next,
      };
      record::write_head(file, off, &nh)?;
      fs::write_at(file, off + KV_HEAD as u64 + key.len() as u64, bytes)?;
    }
    Some((off, h)) => {
      // grow: the replacement carries the old links, the old record dies
      // 增长：替换记录携带旧链接，旧记录废弃
      let new_off = append_kv(
        file,
        key,
        bytes,
        v_len.max(e_len_min),
        expire.unwrap_or(h.expire.get()),
        h.prev_link(),
        h.next_link(),
      )?;
      let b = bucket::bucket_of(key);
      record::replace_at::<KvHead>(
        file,
        bucket::slot_off(prefix, b),
        h.prev_link(),
        h.next_link(),
        new_off,
      )?;
      fs::write_at(file, off, &0u16.to_le_bytes())?;
    }
    None => {
      let b = bucket::bucket_of(key);
      let old_head = bucket::read_slot(file, prefix, b)?;
      let new_off = append_kv(
        file,
        key,
        bytes,
        v_len.max(e_len_min),
        expire.unwrap_or(0),
        0,
        old_head,
      )?;
      record::link_head_at::<KvHead>(file, bucket::slot_off(prefix, b), new_off, old_head)?;
      head::add_count(file, prefix, 1)?;
    }
  }
  Ok(())
}

/// Write into a compacting target only when the key is absent; a concurrent
/// writer's newer value must win.
/// 仅当键不存在时写入压缩目标；并发写者的新值优先。
pub(crate) fn write_optimize(
  file: &mut File,
  prefix: u64,
  cap: Option<u32>,
  key: &[u8],
  bytes: &[u8],
  expire: u32,
) -> R<bool> {
  if find(file, prefix, cap, key)?.is_some() {
    return Ok(false);
  }
  let b = bucket::bucket_of(key);
  let old_head = bucket::read_slot(file, prefix, b)?;
  let new_off = append_kv(file, key, bytes, bytes.len() as u32, expire, 0, old_head)?;
  record::link_head_at::<KvHead>(file, bucket::slot_off(prefix, b), new_off, old_head)?;
  head::add_count(file, prefix, 1)?;
  Ok(true)
}

fn append_kv(
  file: &mut File,
  key: &[u8],
  bytes: &[u8],
  e_len: u32,
  expire: u32,
  prev: u64,
  next: u64,
) -> R<u64> {
  let h = KvHead {
    k_len: U16::new(key.len() as u16),
    e_len: U32::new(e_len),
    v_len: U32::new(bytes.len() as u32),
    crc: U32::new(crc32fast::hash(bytes)),
    expire: U32::new(expire),
    prev: U32::new(prev as u32),
    next: U32::new(next as u32),
  };
  let total = KV_HEAD + key.len() + e_len as usize;
  let mut rec = Vec::with_capacity(total);
  rec.extend_from_slice(h.as_bytes());
  rec.extend_from_slice(key);
  rec.extend_from_slice(bytes);
  rec.resize(total, 0);
  fs::append(file, &rec)
}

/// Live entries of one bucket chain: `(key, value bytes, expire)`. Dead,
/// expired, and checksum-invalid records are skipped.
/// 单桶链的有效条目：`(键, 值字节, 过期)`。已删除、已过期、校验失败的跳过。
pub(crate) fn bucket_entries(
  file: &mut File,
  cap: Option<u32>,
  head: u64,
) -> R<Vec<(Vec<u8>, Vec<u8>, u32)>> {
  let now = fs::now();
  let mut out = Vec::new();
  iter::walk_chain::<KvHead, _>(file, cap, head, |file, off, h| {
    let k_len = h.k_len.get() as usize;
    if k_len == 0 {
      return Ok(());
    }
    let expire = h.expire.get();
    if expire != 0 && expire <= now {
      return Ok(());
    }
    let mut key = vec![0u8; k_len];
    fs::read_at(file, off + KV_HEAD as u64, &mut key)?;
    let mut val = vec![0u8; h.v_len.get() as usize];
    fs::read_at(file, off + KV_HEAD as u64 + k_len as u64, &mut val)?;
    if crc32fast::hash(&val) == h.crc.get() {
      out.push((key, val, expire));
    }
    Ok(())
  })?;
  Ok(out)
}
