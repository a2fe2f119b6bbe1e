//! Online compaction / 在线压缩
//!
//! Rename-based rewrite. The live file moves aside to `<path>.op`, a fresh
//! store takes its place at the original path, and live records backfill
//! through the normal write path while other processes keep reading and
//! writing. The path identity is the lock boundary: peers re-open the path
//! and immediately find a writable, empty store.
//! 基于重命名的重写。现用文件移到 `<path>.op`，新存储在原路径就位，
//! 有效记录经普通写路径回填，其他进程持续读写。路径本身即锁边界：
//! 对等进程重新打开路径，立即得到可写的空存储。
//!
//! ## Protocol / 协议
//!
//! 1. `<path>.op` exists → someone else is compacting, skip.
//! 2. Announce: create `<path>.lock`, write status `'3'`, close the handle.
//! 3. Rename `<path>` → `<path>.op` (peers close and retry on status 3).
//! 4. Recreate a fresh store with `optimized = '1'`, drop the gate file.
//! 5. Backfill live records, skipping keys a concurrent writer re-wrote.
//! 6. Reset `optimized`, delete `<path>.op`.

use std::{fs::File, path::Path, thread::sleep, time::Duration};

use log::warn;

use crate::{
  codec::Codec,
  consts::{BUCKET_N, CLEANUP_RETRY, CLEANUP_SLEEP_MS, RENAME_RETRY, RENAME_SLEEP_MS},
  error::{E, R},
  fs, head,
  head::Status,
  iter::BucketCursor,
  kv::{self, Kv},
  list::{self, List},
  set::{self, KeySet},
  store::{Op, Store},
};

/// One flavor's part of a compaction / 单个形态在压缩中的职责
pub(crate) trait Optimize {
  fn store_mut(&mut self) -> &mut Store;

  /// Copy one old-store bucket's live entries into self. Skip keys that
  /// already exist: a concurrent writer's newer value must win.
  /// 将旧存储单桶的有效条目复制到自身。跳过已存在的键：
  /// 并发写者的新值必须获胜。
  fn backfill_bucket(&mut self, old: &mut File, bucket: u32, head: u64) -> R<()>;
}

/// Run the whole protocol; `false` when skipped (a peer is compacting, or
/// the store is younger than `min_interval` seconds).
/// 执行完整协议；跳过时返回 `false`（有进程在压缩，或存储未到最小间隔）。
pub(crate) fn run<T: Optimize>(
  t: &mut T,
  min_interval: u32,
  mut progress: Option<&mut dyn FnMut(u32)>,
) -> R<bool> {
  let (op_path, lock_path, prefix, path, quiet) = {
    let s = t.store_mut();
    (
      s.op_path(),
      s.lock_path(),
      s.prefix,
      s.conf.path.clone(),
      s.conf.quiet,
    )
  };
  if op_path.exists() {
    return Ok(false);
  }
  {
    let s = t.store_mut();
    let file = s.handle(Op::Write)?;
    let created = head::read_create_time(file, prefix)?;
    if fs::now() < created.saturating_add(min_interval) {
      return Ok(false);
    }
    // announce: the gate file goes first so peers that read status 3 can
    // tell a live compaction from a stale one
    // 公告：先建门闸文件，读到状态 3 的对等进程可区分压缩存活与陈旧
    File::create(&lock_path)?;
    head::write_status(file, prefix, Status::WAIT_OPTIMIZE)?;
    s.close();
  }

  // peers may still hold the file open; they close and retry on status 3
  // 对等进程可能仍持有文件；它们会在状态 3 下关闭重试
  let mut last_err = None;
  for _ in 0..RENAME_RETRY {
    match std::fs::rename(&path, &op_path) {
      Ok(()) => {
        last_err = None;
        break;
      }
      Err(e) => {
        last_err = Some(e);
        sleep(Duration::from_millis(RENAME_SLEEP_MS));
      }
    }
  }
  if let Some(e) = last_err {
    // roll the announcement back so peers resume on the same file
    // 回滚公告，对等进程在原文件上恢复
    if let Ok(mut f) = fs::open_read_write(&path) {
      let _ = head::write_status(&mut f, prefix, Status::NORMAL);
    }
    let _ = std::fs::remove_file(&lock_path);
    return Err(E::Io(e));
  }

  // fresh store at the original path; ordinary writers resume as soon as
  // the gate drops
  // 在原路径就位的新存储；门闸一撤，普通写者即恢复
  {
    let s = t.store_mut();
    s.create()?;
    let file = s.file_mut()?;
    head::write_optimized(file, prefix, true)?;
  }
  let _ = std::fs::remove_file(&lock_path);

  let res = backfill(t, prefix, &op_path, &mut progress);

  // the in-progress flag drops on success and on error alike
  // 成功与出错都要撤下进行中标志
  {
    let s = t.store_mut();
    if let Ok(file) = s.handle(Op::Write) {
      let _ = head::write_optimized(file, prefix, false);
    }
  }
  res?;

  for i in 0..CLEANUP_RETRY {
    if std::fs::remove_file(&op_path).is_ok() || !op_path.exists() {
      break;
    }
    if i + 1 == CLEANUP_RETRY && !quiet {
      warn!("optimize: old store left behind: {}", op_path.display());
    }
    sleep(Duration::from_millis(CLEANUP_SLEEP_MS));
  }
  Ok(true)
}

fn backfill<T: Optimize>(
  t: &mut T,
  prefix: u64,
  op_path: &Path,
  progress: &mut Option<&mut dyn FnMut(u32)>,
) -> R<()> {
  let mut old = fs::open_read_write(op_path)?;
  let slice = {
    let s = t.store_mut();
    if s.conf.op_one_by_one {
      1
    } else {
      s.conf.iterator_slice
    }
  };
  let mut cursor = BucketCursor::new();
  let mut last_pct = u32::MAX;
  loop {
    // a concurrent clear() empties both stores: nothing left to migrate
    // 并发 clear() 清空两个存储：无可迁移
    if head::read_status(&mut old, prefix)? == Status::CLEARING {
      break;
    }
    let Some((bucket, chain_head)) = cursor.next(&mut old, prefix, slice)? else {
      break;
    };
    t.backfill_bucket(&mut old, bucket, chain_head)?;
    if let Some(cb) = progress.as_mut() {
      let pct = (bucket as u64 * 100 / BUCKET_N as u64) as u32;
      if pct != last_pct {
        last_pct = pct;
        cb(pct);
      }
    }
  }
  Ok(())
}

impl<C: Codec> Optimize for Kv<C> {
  fn store_mut(&mut self) -> &mut Store {
    &mut self.store
  }

  fn backfill_bucket(&mut self, old: &mut File, _bucket: u32, head: u64) -> R<()> {
    let cap = self.store.conf.chain_cap;
    let prefix = self.store.prefix;
    // expired records are dropped here; the rewrite exists to shed them
    // 过期记录在此丢弃；重写本就为了甩掉它们
    let entries = kv::bucket_entries(old, cap, head)?;
    for (key, bytes, expire) in entries {
      let _lock = self.store.lock_write()?;
      let file = self.store.file_mut()?;
      kv::write_optimize(file, prefix, cap, &key, &bytes, expire)?;
    }
    Ok(())
  }
}

impl<C: Codec> Kv<C> {
  /// Online compaction: dead records drop, live ones carry over while other
  /// processes keep operating. `false` when skipped.
  /// [`crate::consts::OPTIMIZE_INTERVAL`] is the conventional `min_interval`.
  /// 在线压缩：废弃记录消失，有效记录保留，其他进程持续操作。
  /// 跳过时返回 `false`。常规间隔见 [`crate::consts::OPTIMIZE_INTERVAL`]。
  pub fn optimize(&mut self, min_interval: u32, progress: Option<&mut dyn FnMut(u32)>) -> R<bool> {
    run(self, min_interval, progress)
  }
}

impl Optimize for KeySet {
  fn store_mut(&mut self) -> &mut Store {
    &mut self.store
  }

  fn backfill_bucket(&mut self, old: &mut File, bucket: u32, head: u64) -> R<()> {
    let cap = self.store.conf.chain_cap;
    let prefix = self.store.prefix;
    // digests cannot be reversed to keys; the bucket index travels with them
    // 摘要无法还原为键；桶号随摘要一起传递
    let digests = set::bucket_digests(old, cap, head)?;
    for md5 in digests {
      let _lock = self.store.lock_write()?;
      let file = self.store.file_mut()?;
      set::add_digest(file, prefix, cap, bucket, &md5)?;
    }
    Ok(())
  }
}

impl KeySet {
  /// See [`Kv::optimize`] / 见 [`Kv::optimize`]
  pub fn optimize(&mut self, min_interval: u32, progress: Option<&mut dyn FnMut(u32)>) -> R<bool> {
    run(self, min_interval, progress)
  }
}

impl<C: Codec> Optimize for List<C> {
  fn store_mut(&mut self) -> &mut Store {
    &mut self.store
  }

  fn backfill_bucket(&mut self, old: &mut File, _bucket: u32, head: u64) -> R<()> {
    let cap = self.store.conf.chain_cap;
    let prefix = self.store.prefix;
    let lists = list::bucket_lists(old, cap, head)?;
    for (key, vals) in lists {
      let _lock = self.store.lock_write()?;
      let file = self.store.file_mut()?;
      list::write_optimize(file, prefix, cap, &key, &vals)?;
    }
    Ok(())
  }
}

impl<C: Codec> List<C> {
  /// See [`Kv::optimize`] / 见 [`Kv::optimize`]
  pub fn optimize(&mut self, min_interval: u32, progress: Option<&mut dyn FnMut(u32)>) -> R<bool> {
    run(self, min_interval, progress)
  }
}
