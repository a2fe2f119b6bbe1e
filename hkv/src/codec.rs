//! Value serialization hook / 值序列化钩子
//!
//! The engine stores serialized bytes and checksums them; the [`Codec`] seam
//! decides what those bytes mean. Set keys bypass the codec entirely.
//! 引擎存储并校验序列化后的字节；[`Codec`] 接缝决定字节的含义。
//! 集合键完全绕过编解码。

use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};

/// Serialize/deserialize seam between caller values and stored bytes
/// 调用方值与存储字节之间的序列化接缝
pub trait Codec {
  type Val;

  fn ser(&self, val: &Self::Val) -> Vec<u8>;

  /// `None` when the bytes do not decode / 字节无法解码时返回 `None`
  fn de(&self, bytes: &[u8]) -> Option<Self::Val>;
}

/// Identity codec over raw bytes (the default)
/// 原始字节的恒等编解码（默认）
#[derive(Debug, Default, Clone, Copy)]
pub struct Bytes;

impl Codec for Bytes {
  type Val = Vec<u8>;

  #[inline(always)]
  fn ser(&self, val: &Vec<u8>) -> Vec<u8> {
    val.clone()
  }

  #[inline(always)]
  fn de(&self, bytes: &[u8]) -> Option<Vec<u8>> {
    Some(bytes.to_vec())
  }
}

/// serde_json codec for structured values
/// 结构化值的 serde_json 编解码
#[derive(Debug)]
pub struct Json<T>(PhantomData<T>);

impl<T> Default for Json<T> {
  fn default() -> Self {
    Self(PhantomData)
  }
}

impl<T: Serialize + DeserializeOwned> Codec for Json<T> {
  type Val = T;

  fn ser(&self, val: &T) -> Vec<u8> {
    serde_json::to_vec(val).unwrap_or_default()
  }

  fn de(&self, bytes: &[u8]) -> Option<T> {
    serde_json::from_slice(bytes).ok()
  }
}

/// Parse stored counter bytes as a decimal integer; invalid or absent is 0
/// 将存储的计数字节按十进制整数解析；无效或缺失为 0
#[inline]
pub(crate) fn int_of(bytes: &[u8]) -> i64 {
  std::str::from_utf8(bytes)
    .ok()
    .and_then(|s| s.trim().parse().ok())
    .unwrap_or(0)
}
