//! KV flavor tests / KV 存储测试

use aok::{OK, Void};
use hkv::{Conf, Json, Kv, Ttl};
use tempfile::tempdir;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

fn b(s: &str) -> Vec<u8> {
  s.as_bytes().to_vec()
}

#[test]
fn test_round_trip() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("rt.db")))?;

  assert_eq!(kv.get(b"foo")?, None);
  kv.set(b"foo", &b("foo"), 0)?;
  assert_eq!(kv.get(b"foo")?, Some(b("foo")));

  // shorter fits the slot in place / 更短的值原地写入
  kv.set(b"foo", &b("fo"), 0)?;
  assert_eq!(kv.get(b"foo")?, Some(b("fo")));

  // longer forces grow-and-relink / 更长的值触发增长重链
  kv.set(b"foo", &b("foofoofoofoo"), 0)?;
  assert_eq!(kv.get(b"foo")?, Some(b("foofoofoofoo")));

  assert_eq!(kv.count()?, 1);
  OK
}

#[test]
fn test_persist() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("persist.db");
  {
    let mut kv = Kv::open(Conf::new(&path))?;
    kv.set(b"k1", &b("v1"), 0)?;
    kv.set(b"k2", &b("v2"), 0)?;
  }
  let mut kv = Kv::open(Conf::new(&path))?;
  assert_eq!(kv.get(b"k1")?, Some(b("v1")));
  assert_eq!(kv.get(b"k2")?, Some(b("v2")));
  assert_eq!(kv.count()?, 2);
  OK
}

#[test]
fn test_ttl() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("ttl.db")))?;

  kv.set(b"foo", &b("foo"), 0)?;
  assert_eq!(kv.ttl(b"foo")?, Ttl::Never);

  kv.set(b"bar", &b("bar"), 100)?;
  match kv.ttl(b"bar")? {
    Ttl::Sec(n) => assert!(n > 98 && n <= 100, "ttl {n}"),
    t => panic!("expected seconds, got {t:?}"),
  }

  assert!(kv.expire(b"foo", 600)?);
  match kv.ttl(b"foo")? {
    Ttl::Sec(n) => assert!(n > 598 && n <= 600, "ttl {n}"),
    t => panic!("expected seconds, got {t:?}"),
  }

  // negative expiry kills the key at once / 负数过期立即生效
  assert!(kv.expire(b"foo", -1)?);
  assert_eq!(kv.get(b"foo")?, None);

  // zero clears the expiry / 0 清除过期时间
  assert!(kv.expire(b"bar", 0)?);
  assert_eq!(kv.ttl(b"bar")?, Ttl::Never);

  assert_eq!(kv.ttl(b"absent")?, Ttl::Missing);
  assert!(!kv.expire(b"absent", 10)?);
  OK
}

#[test]
fn test_ttl_lapse() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("lapse.db")))?;

  kv.set(b"gone", &b("gone"), 1)?;
  assert_eq!(kv.get(b"gone")?, Some(b("gone")));
  std::thread::sleep(std::time::Duration::from_millis(2100));
  assert_eq!(kv.get(b"gone")?, None);
  assert_eq!(kv.ttl(b"gone")?, Ttl::Sec(0));
  OK
}

#[test]
fn test_increase() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("incr.db")))?;

  assert_eq!(kv.get(b"foo")?, None);
  assert_eq!(kv.increase(b"foo", 1, 0)?, 1);
  assert_eq!(kv.get(b"foo")?, Some(b("1")));
  assert_eq!(kv.increase(b"foo", 2, 0)?, 3);

  assert_eq!(kv.get(b"bar")?, None);
  assert_eq!(kv.increase(b"bar", 3, 0)?, 3);
  assert_eq!(kv.increase(b"bar", 2, 0)?, 5);
  assert_eq!(kv.get(b"bar")?, Some(b("5")));

  // counters go negative and stay in the padded slot
  // 计数器可为负，且留在填充槽内
  assert_eq!(kv.increase(b"bar", -12, 0)?, -7);
  assert_eq!(kv.get(b"bar")?, Some(b("-7")));
  OK
}

#[test]
fn test_rm_idempotent() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("rm.db")))?;

  kv.set(b"k", &b("v"), 0)?;
  assert_eq!(kv.count()?, 1);
  kv.rm(b"k")?;
  assert_eq!(kv.get(b"k")?, None);
  assert_eq!(kv.count()?, 0);
  // removing again still succeeds / 再删一次仍然成功
  kv.rm(b"k")?;
  kv.rm(b"never-there")?;
  assert_eq!(kv.count()?, 0);
  OK
}

#[test]
fn test_set_none_removes() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("none.db")))?;

  kv.set(b"k", &b("v"), 0)?;
  kv.set_opt(b"k", None, 0)?;
  assert_eq!(kv.get(b"k")?, None);
  assert_eq!(kv.count()?, 0);
  OK
}

#[test]
fn test_crc_corrupt() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("crc.db");
  {
    let mut kv = Kv::open(Conf::new(&path))?;
    kv.set(b"crckey", &b("UNIQUE_VALUE_BYTES"), 0)?;
  }

  // flip one value byte on disk / 翻转磁盘上的一个值字节
  let mut data = std::fs::read(&path)?;
  let pat = b"UNIQUE_VALUE_BYTES";
  let pos = data
    .windows(pat.len())
    .position(|w| w == pat)
    .expect("value bytes on disk");
  data[pos] ^= 0xFF;
  std::fs::write(&path, &data)?;

  let mut kv = Kv::open(Conf::new(&path))?;
  assert_eq!(kv.get(b"crckey")?, None);
  OK
}

#[test]
fn test_guard_prefix() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("store.php");
  {
    let mut kv = Kv::open(Conf::new(&path))?;
    kv.set(b"k", &b("v"), 0)?;
    assert_eq!(kv.get(b"k")?, Some(b("v")));
  }
  let data = std::fs::read(&path)?;
  assert_eq!(&data[..13], b"<?php exit;?>");
  OK
}

#[test]
fn test_clear() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("clear.db")))?;

  kv.set(b"a", &b("1"), 0)?;
  kv.set(b"b", &b("2"), 0)?;
  kv.clear()?;
  // the next write rebuilds the file / 下一次写触发重建
  kv.set(b"c", &b("3"), 0)?;
  assert_eq!(kv.get(b"a")?, None);
  assert_eq!(kv.get(b"c")?, Some(b("3")));
  assert_eq!(kv.count()?, 1);
  OK
}

#[test]
fn test_json_codec() -> Void {
  let dir = tempdir()?;
  let mut kv: Kv<Json<Vec<String>>> =
    Kv::open_with(Conf::new(dir.path().join("json.db")), Json::default())?;

  let v = vec!["a".to_string(), "b".to_string()];
  kv.set(b"k", &v, 0)?;
  assert_eq!(kv.get(b"k")?, Some(v));
  OK
}

#[test]
fn test_empty_key_rejected() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("arg.db")))?;
  assert!(kv.set(b"", &b("v"), 0).is_err());
  assert!(kv.get(b"").is_err());
  OK
}
