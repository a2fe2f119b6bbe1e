//! List flavor tests / 列表存储测试

use aok::{OK, Void};
use hkv::{Conf, List};
use tempfile::tempdir;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

fn bv(s: &[&str]) -> Vec<Vec<u8>> {
  s.iter().map(|x| x.as_bytes().to_vec()).collect()
}

#[test]
fn test_push_insert_pivot() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("pivot.db")))?;

  l.set_value(&bv(&["foo1", "foo2"])).push(b"foo")?;
  assert_eq!(l.range(b"foo", 0, None)?, bv(&["foo1", "foo2"]));

  l.set_value(&bv(&["foo0"])).insert(b"foo")?;
  assert_eq!(l.range(b"foo", 0, None)?, bv(&["foo0", "foo1", "foo2"]));

  l.set_value(&bv(&["bar"])).append(b"foo", &b"foo1".to_vec())?;
  assert_eq!(l.range(b"foo", 0, None)?, bv(&["foo0", "foo1", "bar", "foo2"]));

  l.set_value(&bv(&["biz"])).prepend(b"foo", &b"foo1".to_vec())?;
  assert_eq!(
    l.range(b"foo", 0, None)?,
    bv(&["foo0", "biz", "foo1", "bar", "foo2"])
  );
  OK
}

#[test]
fn test_pivot_missing_fails() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("missing.db")))?;

  l.set_value(&bv(&["a"])).push(b"k")?;
  assert!(
    l.set_value(&bv(&["x"]))
      .append(b"k", &b"no-such".to_vec())
      .is_err()
  );
  assert!(l.set_value(&bv(&["x"])).append(b"nokey", &b"a".to_vec()).is_err());
  // the list is untouched / 列表原样
  assert_eq!(l.range(b"k", 0, None)?, bv(&["a"]));
  OK
}

#[test]
fn test_slice() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("slice.db")))?;
  let six = ["f1", "f2", "f3", "f4", "f5", "f6"];

  l.set_value(&bv(&six)).push(b"s1")?;
  l.rm(b"s1", 2, None)?;
  assert_eq!(l.range(b"s1", 0, None)?, bv(&["f1", "f2"]));

  l.set_value(&bv(&six)).push(b"s2")?;
  l.rm(b"s2", -2, None)?;
  assert_eq!(l.range(b"s2", 0, None)?, bv(&["f1", "f2", "f3", "f4"]));

  l.set_value(&bv(&six)).push(b"s3")?;
  l.keep(b"s3", 2, Some(3))?;
  assert_eq!(l.range(b"s3", 0, None)?, bv(&["f3", "f4", "f5"]));

  l.set_value(&bv(&six)).push(b"s4")?;
  l.keep(b"s4", -5, Some(3))?;
  assert_eq!(l.range(b"s4", 0, None)?, bv(&["f2", "f3", "f4"]));

  // the whole-list shortcut / 整表快捷清空
  l.set_value(&bv(&six)).push(b"s5")?;
  l.rm(b"s5", 0, None)?;
  assert_eq!(l.range(b"s5", 0, None)?, bv(&[]));
  assert!(l.exist(b"s5")?);
  OK
}

#[test]
fn test_index_sets() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("idx.db")))?;
  let six = ["f1", "f2", "f3", "f4", "f5", "f6"];

  l.set_value(&bv(&six)).push(b"r")?;
  l.rm_index(b"r", &[0, 2, 5])?;
  assert_eq!(l.range(b"r", 0, None)?, bv(&["f2", "f4", "f5"]));

  l.set_value(&bv(&six)).push(b"k")?;
  l.keep_index(b"k", &[0, 2, 5])?;
  assert_eq!(l.range(b"k", 0, None)?, bv(&["f1", "f3", "f6"]));

  // negative indices count from the end / 负数下标从尾部数
  l.set_value(&bv(&six)).push(b"n")?;
  l.rm_index(b"n", &[-1, -6])?;
  assert_eq!(l.range(b"n", 0, None)?, bv(&["f2", "f3", "f4", "f5"]));
  OK
}

#[test]
fn test_by_index() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("byidx.db")))?;

  l.set_value(&bv(&["a", "c"])).push(b"bi")?;
  l.set_value(&bv(&["b"])).append_by_index(b"bi", 0)?;
  assert_eq!(l.range(b"bi", 0, None)?, bv(&["a", "b", "c"]));

  l.set_value(&bv(&["z"])).prepend_by_index(b"bi", -1)?;
  assert_eq!(l.range(b"bi", 0, None)?, bv(&["a", "b", "z", "c"]));

  // the end sentinel behaves like push / 末尾哨兵行为同 push
  l.set_value(&bv(&["t"])).append_by_index(b"bi", -1)?;
  assert_eq!(l.range(b"bi", 0, None)?, bv(&["a", "b", "z", "c", "t"]));

  // the head sentinel creates the key / 头部哨兵可创建键
  l.set_value(&bv(&["h"])).prepend_by_index(b"fresh", 0)?;
  assert_eq!(l.range(b"fresh", 0, None)?, bv(&["h"]));
  OK
}

#[test]
fn test_pop_shift() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("pop.db")))?;

  l.set_value(&bv(&["a", "b", "c"])).push(b"q")?;
  assert_eq!(l.pop(b"q")?, Some(b"c".to_vec()));
  assert_eq!(l.shift(b"q")?, Some(b"a".to_vec()));
  assert_eq!(l.range(b"q", 0, None)?, bv(&["b"]));
  assert_eq!(l.len(b"q")?, 1);

  assert_eq!(l.pop(b"q")?, Some(b"b".to_vec()));
  assert_eq!(l.pop(b"q")?, None);
  assert_eq!(l.shift(b"q")?, None);
  assert_eq!(l.pop(b"no-such-key")?, None);
  OK
}

#[test]
fn test_alter() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("alter.db")))?;

  l.set_value(&bv(&["aaa", "bbb"])).push(b"a")?;
  // shorter rewrites in place / 更短的值原地重写
  l.alter(b"a", 1, &b"bb".to_vec())?;
  assert_eq!(l.range(b"a", 0, None)?, bv(&["aaa", "bb"]));

  // longer grows and relinks / 更长的值增长重链
  l.alter(b"a", 0, &b"xxxxxx".to_vec())?;
  assert_eq!(l.range(b"a", 0, None)?, bv(&["xxxxxx", "bb"]));

  // negative index hits the tail / 负数下标命中尾部
  l.alter(b"a", -1, &b"y".to_vec())?;
  assert_eq!(l.range(b"a", 0, None)?, bv(&["xxxxxx", "y"]));

  assert!(l.alter(b"a", 9, &b"z".to_vec()).is_err());
  assert!(l.alter(b"ghost", 0, &b"z".to_vec()).is_err());
  OK
}

#[test]
fn test_range_search_len() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("walk.db")))?;
  let six = ["f1", "f2", "f3", "f4", "f5", "f6"];

  l.set_value(&bv(&six)).push(b"w")?;
  assert_eq!(l.range(b"w", 1, Some(2))?, bv(&["f2", "f3"]));
  assert_eq!(l.range(b"w", -2, None)?, bv(&["f5", "f6"]));
  assert_eq!(l.range(b"w", -2, Some(1))?, bv(&["f5"]));
  assert_eq!(l.range(b"w", 10, None)?, bv(&[]));
  assert_eq!(l.range(b"ghost", 0, None)?, bv(&[]));

  assert_eq!(l.len(b"w")?, 6);
  assert_eq!(l.len(b"ghost")?, 0);

  assert_eq!(l.search(b"w", &b"f4".to_vec())?, Some(3));
  assert_eq!(l.search(b"w", &b"f9".to_vec())?, None);
  OK
}

#[test]
fn test_rm_key() -> Void {
  let dir = tempdir()?;
  let mut l = List::open(Conf::new(dir.path().join("drop.db")))?;

  l.set_value(&bv(&["x"])).push(b"k1")?;
  l.set_value(&bv(&["y"])).push(b"k2")?;
  assert_eq!(l.count()?, 2);

  l.rm_key(b"k1")?;
  assert!(!l.exist(b"k1")?);
  assert!(l.exist(b"k2")?);
  assert_eq!(l.count()?, 1);
  // dropping again still succeeds / 再删一次仍然成功
  l.rm_key(b"k1")?;
  OK
}

#[test]
fn test_persist() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("persist.db");
  {
    let mut l = List::open(Conf::new(&path))?;
    l.set_value(&bv(&["a", "b", "c"])).push(b"k")?;
  }
  let mut l = List::open(Conf::new(&path))?;
  assert_eq!(l.range(b"k", 0, None)?, bv(&["a", "b", "c"]));
  OK
}
