//! # hkv_lock - File locking for hkv / hkv 文件锁
//!
//! Cross-process advisory file locking using flock/LockFileEx.
//! 使用 flock/LockFileEx 实现跨进程建议文件锁。
//!
//! Writes hold the exclusive lock for one critical section; reads never lock.
//! 写操作在单个临界区内持有排他锁；读操作不加锁。

pub mod error;
pub mod ex;

pub use error::{Error, Result};
pub use ex::Ex;
