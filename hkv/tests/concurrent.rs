//! Multi-handle concurrency tests / 多句柄并发测试
//!
//! Each thread opens its own store instance, so each holds its own file
//! descriptor and the advisory locks contend exactly as between processes.
//! 每个线程打开独立的存储实例，各持独立文件描述符，
//! 建议锁的竞争与进程间完全一致。

use aok::{OK, Void};
use hkv::{Conf, E, Kv, fs::add_ext};
use log::info;
use tempfile::tempdir;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

#[test]
fn test_disjoint_writers() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("multi.db");
  // settle the file before the race / 竞争前先落好文件
  Kv::open(Conf::new(&path))?;

  let mut threads = Vec::new();
  for t in 0..3u32 {
    let path = path.clone();
    threads.push(std::thread::spawn(move || -> Result<(), E> {
      let mut kv = Kv::open(Conf::new(&path))?;
      for i in 0..300u32 {
        kv.set(
          format!("t{t}-k{i}").as_bytes(),
          &format!("t{t}-v{i}").into_bytes(),
          0,
        )?;
      }
      Ok(())
    }));
  }
  for th in threads {
    th.join().expect("join")?;
  }

  let mut kv = Kv::open(Conf::new(&path))?;
  assert_eq!(kv.count()?, 900);
  for t in 0..3u32 {
    for i in 0..300u32 {
      assert_eq!(
        kv.get(format!("t{t}-k{i}").as_bytes())?,
        Some(format!("t{t}-v{i}").into_bytes())
      );
    }
  }
  info!("900 disjoint keys survived 3 writers");
  OK
}

#[test]
fn test_concurrent_increase() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("ctr.db");
  Kv::open(Conf::new(&path))?;

  let mut threads = Vec::new();
  for _ in 0..2 {
    let path = path.clone();
    threads.push(std::thread::spawn(move || -> Result<(), E> {
      let mut kv = Kv::open(Conf::new(&path))?;
      for _ in 0..200 {
        kv.increase(b"ctr", 1, 0)?;
      }
      Ok(())
    }));
  }
  for th in threads {
    th.join().expect("join")?;
  }

  let mut kv = Kv::open(Conf::new(&path))?;
  assert_eq!(kv.get(b"ctr")?, Some(b"400".to_vec()));
  OK
}

#[test]
fn test_optimize_with_concurrent_writers() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("live.db");
  {
    let mut kv = Kv::open(Conf::new(&path))?;
    for i in 0..300u32 {
      kv.set(format!("k{i}").as_bytes(), &format!("v1-{i}").into_bytes(), 0)?;
    }
  }

  let opt = {
    let path = path.clone();
    std::thread::spawn(move || -> Result<bool, E> {
      let mut kv = Kv::open(Conf::new(&path))?;
      kv.optimize(0, None)
    })
  };

  let mut writers = Vec::new();
  for t in 0..2u32 {
    let path = path.clone();
    writers.push(std::thread::spawn(move || -> Result<(), E> {
      // let the rename settle so every write sees the new store
      // 等重命名落定，使每次写都落在新存储
      std::thread::sleep(std::time::Duration::from_millis(30));
      let mut kv = Kv::open(Conf::new(&path))?;
      for i in (t..300).step_by(2) {
        kv.set(format!("k{i}").as_bytes(), &format!("v2-{i}").into_bytes(), 0)?;
      }
      Ok(())
    }));
  }

  assert!(opt.join().expect("join optimize")?);
  for th in writers {
    th.join().expect("join writer")?;
  }

  let mut kv = Kv::open(Conf::new(&path))?;
  assert!(!add_ext(&path, "op").exists());
  assert_eq!(kv.count()?, 300);
  for i in 0..300u32 {
    assert_eq!(
      kv.get(format!("k{i}").as_bytes())?,
      Some(format!("v2-{i}").into_bytes()),
      "k{i}"
    );
  }
  OK
}

#[test]
fn test_rm_during_optimize_stays_dead() -> Void {
  let dir = tempdir()?;
  let path = dir.path().join("dead.db");
  {
    let mut kv = Kv::open(Conf::new(&path))?;
    kv.set(b"victim", &b"v".to_vec(), 0)?;
    kv.set(b"keeper", &b"v".to_vec(), 0)?;
  }
  // freeze a compaction mid-flight: old store present, new store empty
  // 冻结压缩中间态：旧存储在，新存储为空
  std::fs::rename(&path, add_ext(&path, "op"))?;
  let mut kv = Kv::open(Conf::new(&path))?;

  // a remove during the overlap reaches the old store too, so a later
  // backfill cannot resurrect the key
  // 重叠期的删除同步到旧存储，之后的回填无法复活该键
  kv.rm(b"victim")?;
  assert_eq!(kv.get(b"victim")?, None);

  let mut old = Kv::open(Conf::new(add_ext(&path, "op")))?;
  assert_eq!(old.get(b"victim")?, None);
  assert_eq!(old.get(b"keeper")?, Some(b"v".to_vec()));
  OK
}
