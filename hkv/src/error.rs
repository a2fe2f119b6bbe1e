//! Error types for hkv / hkv 错误类型

use thiserror::Error;

pub type R<T> = Result<T, E>;

#[derive(Error, Debug)]
pub enum E {
  #[error("config: {0}")]
  Config(Box<str>),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("lock: {0}")]
  Lock(#[from] hkv_lock::Error),

  #[error("bad record header at {0}")]
  Format(u64),

  #[error("store busy: status {0}")]
  Busy(char),

  #[error("chain cycle at {0}")]
  Cycle(u64),

  #[error("not found")]
  NotFound,

  #[error("arg: {0}")]
  Arg(Box<str>),
}

impl E {
  /// 创建 Config 错误 Create Config error
  #[inline]
  pub fn config(msg: impl Into<Box<str>>) -> Self {
    Self::Config(msg.into())
  }

  /// 创建 Arg 错误 Create Arg error
  #[inline]
  pub fn arg(msg: impl Into<Box<str>>) -> Self {
    Self::Arg(msg.into())
  }
}
