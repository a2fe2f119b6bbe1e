//! Value-chain walks / 值链遍历
//!
//! Non-negative positional queries walk forward and stop early; negative
//! anchors need the whole chain first, then slice positionally.
//! 非负位置查询向前遍历并提前停止；负数锚点先取整条链，再按位置切片。

use std::fs::File;

use crate::{
  codec::Codec,
  error::R,
  fs,
  list::List,
  record::{self, Chain, LIST_VAL_HEAD, Linked, ListValHead, check_key},
};

/// `(offset, header)` of every record in the chain / 链上每条记录的偏移与头
pub(crate) fn heads(file: &mut File, cap: Option<u32>, head: u64) -> R<Vec<(u64, ListValHead)>> {
  let mut out = Vec::new();
  let mut chain = Chain::new(cap);
  let mut off = head;
  while off != 0 {
    if !chain.step(off)? {
      break;
    }
    let h: ListValHead = record::read_head(file, off)?;
    let next = h.next_link();
    out.push((off, h));
    off = next;
  }
  Ok(out)
}

/// Offsets only / 仅偏移
pub(crate) fn offsets(file: &mut File, cap: Option<u32>, head: u64) -> R<Vec<u64>> {
  Ok(heads(file, cap, head)?.into_iter().map(|(o, _)| o).collect())
}

/// Last record's offset, 0 when the chain is empty / 末记录偏移，空链为 0
pub(crate) fn tail_of(file: &mut File, cap: Option<u32>, head: u64) -> R<u64> {
  Ok(heads(file, cap, head)?.last().map_or(0, |(o, _)| *o))
}

/// Value bytes of one record; `None` when the checksum fails
/// 单条记录的值字节；校验失败为 `None`
pub(crate) fn read_val(file: &mut File, off: u64, h: &ListValHead) -> R<Option<Vec<u8>>> {
  let mut buf = vec![0u8; h.v_len.get() as usize];
  fs::read_at(file, off + LIST_VAL_HEAD as u64, &mut buf)?;
  if crc32fast::hash(&buf) != h.crc.get() {
    return Ok(None);
  }
  Ok(Some(buf))
}

/// All checksum-valid values in chain order / 按链序收集校验通过的值
pub(crate) fn collect_bytes(file: &mut File, cap: Option<u32>, head: u64) -> R<Vec<Vec<u8>>> {
  let mut out = Vec::new();
  for (off, h) in heads(file, cap, head)? {
    if let Some(v) = read_val(file, off, &h)? {
      out.push(v);
    }
  }
  Ok(out)
}

/// First record whose stored CRC matches / 首个 CRC 匹配的记录
pub(crate) fn find_crc(
  file: &mut File,
  cap: Option<u32>,
  head: u64,
  crc: u32,
) -> R<Option<(u64, ListValHead)>> {
  let mut chain = Chain::new(cap);
  let mut off = head;
  while off != 0 {
    if !chain.step(off)? {
      break;
    }
    let h: ListValHead = record::read_head(file, off)?;
    if h.crc.get() == crc {
      return Ok(Some((off, h)));
    }
    off = h.next_link();
  }
  Ok(None)
}

/// Clamp `(start, want)` into a `[a, b)` index range / 归一化切片范围
pub(crate) fn slice_range(len: usize, start: i64, want: Option<u32>) -> (usize, usize) {
  let a = if start < 0 {
    len - len.min(start.unsigned_abs() as usize)
  } else {
    len.min(start as usize)
  };
  let b = match want {
    None => len,
    Some(w) => len.min(a + w as usize),
  };
  (a, b)
}

/// Resolve a possibly-negative index / 解析可能为负的下标
pub(crate) fn norm_index(len: usize, idx: i64) -> Option<usize> {
  if idx < 0 {
    let back = idx.unsigned_abs() as usize;
    if back <= len { Some(len - back) } else { None }
  } else if (idx as usize) < len {
    Some(idx as usize)
  } else {
    None
  }
}

impl<C: Codec> List<C> {
  /// Values of the slice, empty when the key is absent
  /// 切片内的值，键不存在时为空
  pub fn range(&mut self, key: &[u8], start: i64, len: Option<u32>) -> R<Vec<C::Val>> {
    check_key(key)?;
    let cap = self.store.conf.chain_cap;
    let Some((_, kh)) = self.key_header_read(key)? else {
      return Ok(Vec::new());
    };
    let head = kh.value_head.get() as u64;
    let bytes = {
      let file = self.store.file_mut()?;
      if start >= 0 {
        // forward walk, stop once the slice is full
        // 向前遍历，切片满即停
        let mut out = Vec::new();
        let mut chain = Chain::new(cap);
        let mut off = head;
        let mut pos = 0i64;
        while off != 0 {
          if !chain.step(off)? {
            break;
          }
          let h: ListValHead = record::read_head(file, off)?;
          let next = h.next_link();
          if pos >= start {
            if let Some(w) = len
              && out.len() >= w as usize
            {
              break;
            }
            if let Some(v) = read_val(file, off, &h)? {
              out.push(v);
            }
          }
          pos += 1;
          off = next;
        }
        out
      } else {
        let hs = heads(file, cap, head)?;
        let (a, b) = slice_range(hs.len(), start, len);
        let mut out = Vec::with_capacity(b - a);
        for (off, h) in &hs[a..b] {
          if let Some(v) = read_val(file, *off, h)? {
            out.push(v);
          }
        }
        out
      }
    };
    Ok(bytes.iter().filter_map(|b| self.codec.de(b)).collect())
  }

  /// Value count of the key / 键的值数量
  pub fn len(&mut self, key: &[u8]) -> R<usize> {
    check_key(key)?;
    let cap = self.store.conf.chain_cap;
    let Some((_, kh)) = self.key_header_read(key)? else {
      return Ok(0);
    };
    let file = self.store.file_mut()?;
    Ok(offsets(file, cap, kh.value_head.get() as u64)?.len())
  }

  /// Position of the first value whose serialized CRC matches
  /// 首个序列化 CRC 匹配的值的位置
  pub fn search(&mut self, key: &[u8], val: &C::Val) -> R<Option<usize>> {
    check_key(key)?;
    let crc = crc32fast::hash(&self.codec.ser(val));
    let cap = self.store.conf.chain_cap;
    let Some((_, kh)) = self.key_header_read(key)? else {
      return Ok(None);
    };
    let file = self.store.file_mut()?;
    let mut chain = Chain::new(cap);
    let mut off = kh.value_head.get() as u64;
    let mut pos = 0usize;
    while off != 0 {
      if !chain.step(off)? {
        break;
      }
      let h: ListValHead = record::read_head(file, off)?;
      if h.crc.get() == crc {
        return Ok(Some(pos));
      }
      pos += 1;
      off = h.next_link();
    }
    Ok(None)
  }
}
