//! Exclusive per-operation lock / 单次操作的排他锁
//!
//! The guard owns a duplicated descriptor. flock state is shared between
//! duplicates of one open file description, so unlocking the duplicate
//! releases the lock taken here.
//! 守卫持有复制的文件描述符。flock 状态在同一打开文件描述的副本间共享，
//! 解锁副本即释放此处获取的锁。

use std::fs;

use fs4::fs_std::FileExt;

use crate::Result;

/// Exclusive whole-file advisory lock, released on drop
/// 整个文件的排他建议锁，drop 时释放
pub struct Ex {
  file: fs::File,
}

impl Ex {
  /// Block until the exclusive lock is held / 阻塞直到持有排他锁
  pub fn lock(file: &fs::File) -> Result<Self> {
    let file = file.try_clone()?;
    file.lock_exclusive()?;
    Ok(Self { file })
  }

  /// Non-blocking variant; `None` when another holder exists
  /// 非阻塞版本；已有持有者时返回 `None`
  pub fn try_lock(file: &fs::File) -> Result<Option<Self>> {
    let file = file.try_clone()?;
    if file.try_lock_exclusive()? {
      Ok(Some(Self { file }))
    } else {
      Ok(None)
    }
  }
}

impl Drop for Ex {
  fn drop(&mut self) {
    let _ = FileExt::unlock(&self.file);
  }
}
