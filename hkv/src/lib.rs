#![cfg_attr(docsrs, feature(doc_cfg))]

//! # hkv - single-file multi-process KV store / 单文件多进程 KV 存储
//!
//! A fixed-size on-disk hash table with chained records behind one regular
//! file. Writes serialize across unrelated processes through an exclusive
//! advisory lock; reads are lock-free and may observe slightly stale data.
//! Online compaction rewrites the file while readers and writers keep going.
//! 固定大小的磁盘哈希表，链式记录，存于单个普通文件。写操作通过排他建议锁
//! 跨进程串行；读操作无锁，可能读到略旧的数据。在线压缩在不中断读写的
//! 情况下重写文件。
//!
//! ## Flavors / 存储形态
//!
//! | Flavor | Keyed by | Record |
//! |---|---|---|
//! | [`Kv`] | user key | value + TTL + counters |
//! | [`KeySet`] | 16-byte MD5 digest | membership only |
//! | [`List`] | user key | doubly-linked value chain |
//!
//! The store is a cache: durability is whatever the filesystem gives after a
//! write returns, and there are no cross-key transactions.
//! 本存储是缓存：持久性等同文件系统在写返回后的保证，无跨键事务。

pub mod bucket;
pub mod codec;
mod compact;
pub mod conf;
pub mod consts;
pub mod error;
pub mod fs;
pub mod head;
pub mod iter;
pub mod kv;
pub mod list;
pub mod record;
pub mod set;
pub mod store;

pub use codec::{Bytes, Codec, Json};
pub use conf::Conf;
pub use error::{E, R};
pub use iter::{KeySetIter, KvIter, ListIter};
pub use kv::{Kv, Ttl};
pub use list::List;
pub use set::KeySet;
pub use store::Store;
