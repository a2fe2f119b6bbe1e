//! Bucket index / 桶索引
//!
//! `bucket = crc32(key) mod N`. Each slot is a little-endian u32 holding the
//! absolute offset of its chain head, 0 when empty.
//! `bucket = crc32(key) mod N`。每个槽为小端 u32，保存链头绝对偏移，0 为空。

use std::fs::File;

use crate::{
  consts::{BUCKET_N, HEAD_SIZE, SLOT_SIZE},
  error::R,
  fs,
};

/// Bucket of a key / 键所在桶
#[inline]
pub fn bucket_of(key: &[u8]) -> u32 {
  crc32fast::hash(key) % BUCKET_N
}

/// Absolute offset of a bucket slot / 桶槽绝对偏移
#[inline]
pub fn slot_off(prefix: u64, bucket: u32) -> u64 {
  prefix + HEAD_SIZE + bucket as u64 * SLOT_SIZE
}

/// First offset past the bucket array, the record heap base
/// 桶数组之后的首个偏移，即记录堆起点
#[inline]
pub fn heap_off(prefix: u64) -> u64 {
  slot_off(prefix, BUCKET_N)
}

/// Read a chain head / 读取链头
#[inline]
pub fn read_slot(file: &mut File, prefix: u64, bucket: u32) -> R<u64> {
  Ok(fs::read_u32(file, slot_off(prefix, bucket))? as u64)
}

/// Write a chain head / 写入链头
#[inline]
pub fn write_slot(file: &mut File, prefix: u64, bucket: u32, off: u64) -> R<()> {
  fs::write_u32(file, slot_off(prefix, bucket), off as u32)
}

/// Read a window of `len` slots starting at `start`, clamped to the array end
/// 从 `start` 读取 `len` 个槽的窗口，截断到数组末尾
pub fn read_slots(file: &mut File, prefix: u64, start: u32, len: u32) -> R<Vec<u32>> {
  let len = len.min(BUCKET_N - start);
  let mut buf = vec![0u8; len as usize * SLOT_SIZE as usize];
  fs::read_at(file, slot_off(prefix, start), &mut buf)?;
  Ok(
    buf
      .chunks_exact(4)
      .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}
