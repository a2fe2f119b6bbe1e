//! Iterator tests / 迭代器测试

use std::collections::HashMap;

use aok::{OK, Void};
use hkv::{Conf, Kv, List};
use tempfile::tempdir;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

#[test]
fn test_kv_iter_all() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("iter.db")))?;

  let mut expect = HashMap::new();
  for i in 0..30u32 {
    let k = format!("key-{i}").into_bytes();
    let v = format!("val-{i}").into_bytes();
    kv.set(&k, &v, 0)?;
    expect.insert(k, v);
  }

  let mut seen = HashMap::new();
  for entry in kv.iter() {
    let (k, v) = entry?;
    seen.insert(k, v);
  }
  assert_eq!(seen, expect);
  OK
}

#[test]
fn test_kv_iter_skips_dead_and_expired() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("dead.db")))?;

  for i in 0..10u32 {
    kv.set(format!("k{i}").as_bytes(), &format!("v{i}").into_bytes(), 0)?;
  }
  kv.rm(b"k3")?;
  kv.rm(b"k7")?;
  kv.set(b"short-lived", &b"x".to_vec(), 1)?;
  std::thread::sleep(std::time::Duration::from_millis(2100));

  let keys: Vec<_> = kv
    .iter()
    .collect::<Result<Vec<_>, _>>()?
    .into_iter()
    .map(|(k, _)| k)
    .collect();
  assert_eq!(keys.len(), 8);
  assert!(!keys.contains(&b"k3".to_vec()));
  assert!(!keys.contains(&b"short-lived".to_vec()));
  OK
}

#[test]
fn test_kv_iter_slice_one() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("slice1.db")).with_iterator_slice(1))?;

  for i in 0..5u32 {
    kv.set(format!("k{i}").as_bytes(), &b"v".to_vec(), 0)?;
  }
  // the minimal window still sees everything, one bucket at a time
  // 最小窗口仍能看到全部，一次一桶
  assert_eq!(kv.iter().count(), 5);
  OK
}

#[test]
fn test_iter_count_matches_header() -> Void {
  let dir = tempdir()?;
  let mut kv = Kv::open(Conf::new(dir.path().join("count.db")))?;

  for i in 0..50u32 {
    kv.set(format!("k{i}").as_bytes(), &b"v".to_vec(), 0)?;
  }
  for i in 0..10u32 {
    kv.rm(format!("k{i}").as_bytes())?;
  }
  let live = kv.iter().collect::<Result<Vec<_>, _>>()?.len() as u32;
  assert_eq!(live, 40);
  assert_eq!(kv.count()?, live);
  OK
}

#[test]
fn test_list_iter() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("liter.db")))?;

  l.set_value(&[b"a".to_vec(), b"b".to_vec()]).push(b"k1")?;
  l.set_value(&[b"c".to_vec()]).push(b"k2")?;
  l.set_value(&[b"x".to_vec()]).push(b"k3")?;
  l.rm_key(b"k3")?;

  let mut seen: Vec<_> = l.iter().collect::<Result<Vec<_>, _>>()?;
  seen.sort();
  assert_eq!(
    seen,
    vec![
      (b"k1".to_vec(), vec![b"a".to_vec(), b"b".to_vec()]),
      (b"k2".to_vec(), vec![b"c".to_vec()]),
    ]
  );
  OK
}
