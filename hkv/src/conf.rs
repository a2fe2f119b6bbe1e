//! Store configuration / 存储配置

use std::path::PathBuf;

use crate::consts::{GUARD, GUARD_EXT, ITER_SLICE};

/// Store configuration / 存储配置
#[derive(Debug, Clone)]
pub struct Conf {
  pub path: PathBuf,
  /// Suppress operational warnings / 抑制运行警告
  pub quiet: bool,
  /// Bucket window size for iteration; 1 minimizes staleness, larger values
  /// minimize read cost
  /// 迭代的桶窗口大小；1 staleness 最小，更大的值读开销最小
  pub iterator_slice: u32,
  /// Force window = 1 while backfilling a compaction
  /// 压缩回填期间强制窗口为 1
  pub op_one_by_one: bool,
  /// Optional ceiling on chain walks; records past it are invisible
  /// 链遍历的可选上限；超出的记录不可见
  pub chain_cap: Option<u32>,
}

impl Conf {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      quiet: false,
      iterator_slice: ITER_SLICE,
      op_one_by_one: false,
      chain_cap: None,
    }
  }

  pub fn with_quiet(mut self, quiet: bool) -> Self {
    self.quiet = quiet;
    self
  }

  pub fn with_iterator_slice(mut self, n: u32) -> Self {
    self.iterator_slice = n.max(1);
    self
  }

  pub fn with_op_one_by_one(mut self, on: bool) -> Self {
    self.op_one_by_one = on;
    self
  }

  pub fn with_chain_cap(mut self, cap: u32) -> Self {
    self.chain_cap = Some(cap);
    self
  }

  /// Script-guard prefix length for this path, constant for the file's life
  /// 此路径的脚本守卫前缀长度，文件生命周期内不变
  pub fn prefix(&self) -> u64 {
    if self
      .path
      .extension()
      .is_some_and(|e| e.eq_ignore_ascii_case(GUARD_EXT))
    {
      GUARD.len() as u64
    } else {
      0
    }
  }
}
