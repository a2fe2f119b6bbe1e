//! Key-set flavor tests / 键集合存储测试

use aok::{OK, Void};
use hkv::{Conf, KeySet};
use tempfile::tempdir;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

#[test]
fn test_membership() -> Void {
  let dir = tempdir()?;
  let mut set = KeySet::open(Conf::new(dir.path().join("set.db")))?;

  assert!(!set.has(b"foo")?);
  set.add(b"foo")?;
  assert!(set.has(b"foo")?);
  assert!(!set.has(b"bar")?);
  assert_eq!(set.count()?, 1);

  // adding again is a no-op success / 重复添加为成功的空操作
  set.add(b"foo")?;
  assert!(set.has(b"foo")?);
  assert_eq!(set.count()?, 1);

  set.rm(b"foo")?;
  assert!(!set.has(b"foo")?);
  assert_eq!(set.count()?, 0);
  // removing again still succeeds / 再删一次仍然成功
  set.rm(b"foo")?;
  set.rm(b"never-there")?;
  OK
}

#[test]
fn test_persist() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("persist.db");
  {
    let mut set = KeySet::open(Conf::new(&path))?;
    for i in 0..20u32 {
      set.add(format!("member-{i}").as_bytes())?;
    }
  }
  let mut set = KeySet::open(Conf::new(&path))?;
  for i in 0..20u32 {
    assert!(set.has(format!("member-{i}").as_bytes())?);
  }
  assert_eq!(set.count()?, 20);
  OK
}

#[test]
fn test_iter_digests() -> Void {
  let dir = tempdir()?;
  let mut set = KeySet::open(Conf::new(dir.path().join("iter.db")))?;

  for i in 0..10u32 {
    set.add(format!("m{i}").as_bytes())?;
  }
  set.rm(b"m3")?;

  let digests: Vec<_> = set.iter().collect::<Result<_, _>>()?;
  assert_eq!(digests.len(), 9);
  assert!(digests.contains(&hkv::set::digest(b"m0")));
  assert!(!digests.contains(&hkv::set::digest(b"m3")));
  OK
}
