//! Format constants and retry budgets / 格式常量与重试预算

/// Bucket slot count, a file-format constant
/// 桶数量，文件格式常量
pub const BUCKET_N: u32 = 0x8FFFF;

/// Script guard written when the path has the guard extension
/// 路径带守卫扩展名时写入的脚本守卫
pub const GUARD: &[u8; 13] = b"<?php exit;?>";

/// Extension that activates the guard / 激活守卫的扩展名
pub const GUARD_EXT: &str = "php";

/// Global header size / 全局头大小
pub const HEAD_SIZE: u64 = 11;

/// Header test byte. A fresh write handle reads it once before its first
/// lock attempt; some platforms refuse to lock an unread handle.
/// 头部测试字节。新写句柄在首次加锁前先读取一次；
/// 某些平台拒绝锁定未读取过的句柄。
pub const HEAD_TEST: u8 = b'*';

/// Bucket slot width / 桶槽宽度
pub const SLOT_SIZE: u64 = 4;

/// Zero-fill chunk during creation / 创建时的零填充块大小
pub const CREATE_CHUNK: usize = 256 * 1024;

/// Short-write retry budget / 短写重试预算
pub const WRITE_RETRY: usize = 100;

/// Status 1/2 wait: attempts and sleep / 状态 1/2 等待：次数与间隔
pub const STATE_RETRY: usize = 100;
pub const STATE_SLEEP_MS: u64 = 20;

/// Status 3 wait / 状态 3 等待
pub const OPTIMIZE_RETRY: usize = 30;
pub const OPTIMIZE_SLEEP_MS: u64 = 100;

/// Rename retries during compaction / 压缩期间重命名重试
pub const RENAME_RETRY: usize = 200;
pub const RENAME_SLEEP_MS: u64 = 10;

/// Old-store cleanup retries / 旧存储清理重试
pub const CLEANUP_RETRY: usize = 20;
pub const CLEANUP_SLEEP_MS: u64 = 100;

/// Default iterator bucket window / 默认迭代桶窗口
pub const ITER_SLICE: u32 = 10_000;

/// Counter value slot so integer updates stay in place
/// 计数器值槽大小，保证整数更新原地进行
pub const COUNTER_SLOT: u32 = 16;

/// Default minimum seconds between compactions
/// 两次压缩之间的默认最小间隔秒数
pub const OPTIMIZE_INTERVAL: u32 = 7200;
