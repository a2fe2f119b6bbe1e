//! File manager and status machine / 文件管理与状态机
//!
//! One `Store` is one path plus its cached descriptor. Every operation goes
//! through [`Store::handle`], which re-reads the status byte and settles the
//! file into a usable state first.
//! 一个 `Store` 对应一个路径及其缓存的文件描述符。每个操作都经过
//! [`Store::handle`]，它先复读状态字节，把文件稳定到可用状态。

use std::{fs::File, io::Seek, path::PathBuf, thread::sleep, time::Duration};

use hkv_lock::Ex;
use log::warn;
use zerocopy::IntoBytes;

use crate::{
  bucket,
  conf::Conf,
  consts::{
    BUCKET_N, CREATE_CHUNK, GUARD, OPTIMIZE_RETRY, OPTIMIZE_SLEEP_MS, SLOT_SIZE, STATE_RETRY,
    STATE_SLEEP_MS,
  },
  error::{E, R},
  fs,
  head::{self, Head, Status},
};

/// Handle intent / 句柄用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Read,
  Write,
}

/// One store instance / 一个存储实例
pub struct Store {
  pub conf: Conf,
  /// Script-guard prefix length, 0 or 13 / 脚本守卫前缀长度，0 或 13
  pub prefix: u64,
  file: Option<File>,
}

impl Store {
  /// Open the store, creating the file when absent
  /// 打开存储，文件不存在则创建
  pub fn open(conf: Conf) -> R<Self> {
    if conf.path.as_os_str().is_empty() {
      return Err(E::config("empty path"));
    }
    let prefix = conf.prefix();
    let mut store = Self {
      conf,
      prefix,
      file: None,
    };
    store.handle(Op::Write)?;
    Ok(store)
  }

  /// Cached descriptor; `handle` must have settled it first
  /// 缓存的描述符；须先经 `handle` 稳定
  pub(crate) fn file_mut(&mut self) -> R<&mut File> {
    self.file.as_mut().ok_or_else(|| E::config("store closed"))
  }

  /// Drop the descriptor; the next operation reopens
  /// 释放描述符；下次操作重新打开
  pub fn close(&mut self) {
    self.file = None;
  }

  fn ensure_open(&mut self) -> R<()> {
    if self.file.is_some() {
      return Ok(());
    }
    if !self.conf.path.exists() {
      return self.create();
    }
    let mut file = fs::open_read_write(&self.conf.path).map_err(|e| {
      if e.kind() == std::io::ErrorKind::PermissionDenied {
        E::config("path not writable")
      } else {
        E::Io(e)
      }
    })?;
    // fresh-handle quirk: read one byte before the first lock attempt
    // 新句柄特性：首次加锁前先读取一个字节
    let _ = fs::read_byte(&mut file, 0);
    self.file = Some(file);
    Ok(())
  }

  /// Create the file and initialize it from scratch
  /// 创建文件并从零初始化
  pub(crate) fn create(&mut self) -> R<()> {
    let mut file = fs::open_read_write_create(&self.conf.path).map_err(|e| {
      if e.kind() == std::io::ErrorKind::PermissionDenied {
        E::config("path not writable")
      } else {
        E::Io(e)
      }
    })?;
    let _ = fs::read_byte(&mut file, 0);
    let _lock = Ex::lock(&file)?;
    // another process may have finished creation while we waited on the lock
    // 等锁期间其他进程可能已完成创建
    let done = file.metadata()?.len() >= bucket::heap_off(self.prefix)
      && head::read_status(&mut file, self.prefix)? == Status::NORMAL;
    if !done {
      Self::init_file(&mut file, self.prefix)?;
    }
    self.file = Some(file);
    Ok(())
  }

  /// Guard, header with status creating, zeroed buckets, then status normal.
  /// Chunked zero fill keeps a torn creation detectable.
  /// 写守卫、创建中状态的头、零桶数组，再置为正常状态。
  /// 分块零填充使创建中断可被检测。
  fn init_file(file: &mut File, prefix: u64) -> R<()> {
    file.set_len(0)?;
    file.seek(std::io::SeekFrom::Start(0))?;
    if prefix != 0 {
      fs::write_retry(file, GUARD)?;
    }
    let head = Head::new(fs::now(), Status::CREATING);
    fs::write_retry(file, head.as_bytes())?;
    let total = BUCKET_N as usize * SLOT_SIZE as usize;
    let chunk = vec![0u8; CREATE_CHUNK];
    let mut left = total;
    while left > 0 {
      let n = left.min(CREATE_CHUNK);
      fs::write_retry(file, &chunk[..n])?;
      left -= n;
    }
    head::write_status(file, prefix, Status::NORMAL)
  }

  /// Rebuild after a clear or a detected torn creation
  /// 清空后或检测到创建不完整时重建
  fn recreate(&mut self) -> R<()> {
    self.ensure_open()?;
    let prefix = self.prefix;
    let file = self.file_mut()?;
    let _lock = Ex::lock(file)?;
    // only the first writer through the lock rebuilds
    // 只有第一个拿到锁的写者重建
    let rebuild = match head::read_status(file, prefix) {
      Ok(s) => s == Status::CLEARING,
      Err(E::Format(_)) => true,
      Err(e) => return Err(e),
    };
    if rebuild {
      Self::init_file(file, prefix)?;
    }
    Ok(())
  }

  /// Status-machine handle acquisition / 状态机句柄获取
  pub fn handle(&mut self, op: Op) -> R<&mut File> {
    let mut wait_optimize = 0usize;
    let mut last = Status::NORMAL;
    for _ in 0..STATE_RETRY {
      self.ensure_open()?;
      let prefix = self.prefix;
      let status = {
        let file = self.file_mut()?;
        match head::read_status(file, prefix) {
          Ok(s) => s,
          // header not fully there: a torn creation
          // 头不完整：创建被中断
          Err(E::Format(_)) => Status::CLEARING,
          Err(e) => return Err(e),
        }
      };
      last = status;
      match status {
        Status::NORMAL => return self.file_mut(),
        Status::CLEARING => {
          if op == Op::Read {
            return Err(E::Busy(status.as_char()));
          }
          // rebuild whatever file is at the path now, not a stale descriptor
          // 重建当前路径上的文件，而非过期的描述符
          self.close();
          self.recreate()?;
        }
        Status::CREATING => {
          if op == Op::Read {
            return Err(E::Busy(status.as_char()));
          }
          sleep(Duration::from_millis(STATE_SLEEP_MS));
        }
        Status::WAIT_OPTIMIZE => {
          if !self.lock_path().exists() {
            // stale: a dead compactor left 3 behind, or this descriptor
            // outlived the rename; reset and reopen the path
            // 陈旧状态：压缩进程死亡遗留 3，或描述符已跨过重命名；
            // 复位并重新打开路径
            let file = self.file_mut()?;
            head::write_status(file, prefix, Status::NORMAL)?;
            self.close();
            continue;
          }
          if wait_optimize >= OPTIMIZE_RETRY {
            return Err(E::Busy(status.as_char()));
          }
          wait_optimize += 1;
          // release our OS reference so the compactor's rename can proceed
          // 释放描述符，让压缩进程的重命名得以进行
          self.close();
          sleep(Duration::from_millis(OPTIMIZE_SLEEP_MS));
        }
        other => return Err(E::Busy(other.as_char())),
      }
    }
    Err(E::Busy(last.as_char()))
  }

  /// Lock for a write critical section after the status machine settles
  /// 状态机稳定后为写临界区加锁
  pub(crate) fn lock_write(&mut self) -> R<Ex> {
    let file = self.handle(Op::Write)?;
    Ok(Ex::lock(file)?)
  }

  /// `<path>.op`: the renamed old store during compaction. Its absence
  /// means no compaction is in progress by anyone.
  /// `<path>.op`：压缩期间改名的旧存储。不存在即无人在压缩。
  pub fn op_path(&self) -> PathBuf {
    fs::add_ext(&self.conf.path, "op")
  }

  /// `<path>.lock`: rename gate; present while handles must close and wait
  /// `<path>.lock`：重命名门闸；存在期间句柄须关闭等待
  pub fn lock_path(&self) -> PathBuf {
    fs::add_ext(&self.conf.path, "lock")
  }

  /// Old store, read-only, when a compaction is in flight
  /// 压缩进行中时只读打开旧存储
  pub(crate) fn open_old_read(&self) -> Option<File> {
    let p = self.op_path();
    if p.exists() { fs::open_read(&p).ok() } else { None }
  }

  /// Old store, read-write, for keeping deletions in step
  /// 读写打开旧存储，用于同步删除类操作
  pub(crate) fn open_old_rw(&self) -> Option<File> {
    let p = self.op_path();
    if p.exists() {
      fs::open_read_write(&p).ok()
    } else {
      None
    }
  }

  /// Number of live records; advisory / 有效记录数；仅供参考
  pub fn count(&mut self) -> R<u32> {
    let prefix = self.prefix;
    let file = self.handle(Op::Read)?;
    head::read_count(file, prefix)
  }

  /// Is a compaction in progress by some process
  /// 是否有进程正在压缩
  pub fn is_optimizing(&mut self) -> R<bool> {
    if self.op_path().exists() {
      return Ok(true);
    }
    let prefix = self.prefix;
    let file = self.handle(Op::Read)?;
    head::read_optimized(file, prefix)
  }

  /// Mark the store cleared; the next operation rebuilds it from scratch
  /// 标记存储已清空；下一次操作从零重建
  pub fn clear(&mut self) -> R<()> {
    let prefix = self.prefix;
    {
      let file = self.handle(Op::Write)?;
      let _lock = Ex::lock(&*file)?;
      head::write_status(file, prefix, Status::CLEARING)?;
    }
    // a concurrent compactor must see the clear too; it aborts its backfill
    // 并发的压缩进程也须看到清空；它会中止回填
    if let Some(mut old) = self.open_old_rw()
      && let Err(e) = head::write_status(&mut old, prefix, Status::CLEARING)
      && !self.conf.quiet
    {
      warn!("clear: old store not marked: {e}");
    }
    Ok(())
  }
}
