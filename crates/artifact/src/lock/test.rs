use std::sync::Arc;
use std::time::Duration;

use super::{LOCK_FILE, SolutionLocks};

#[test]
fn second_acquire_is_contended() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let solution = dir.path().join("com/acme/lib/1.0");
    let locks = Arc::new(SolutionLocks::new(Duration::from_secs(600)));

    let guard = locks.try_acquire(&solution)?;
    assert!(guard.is_some());
    assert!(solution.join(LOCK_FILE).exists());
    assert!(locks.is_held(&solution));
    assert!(locks.try_acquire(&solution)?.is_none());

    drop(guard);
    assert!(!solution.join(LOCK_FILE).exists());
    assert!(!locks.is_held(&solution));
    assert!(locks.try_acquire(&solution)?.is_some());
    Ok(())
}

#[test]
fn foreign_lock_file_is_respected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join(LOCK_FILE), "4242\n")?;

    // another registry stands in for another process
    let locks = Arc::new(SolutionLocks::new(Duration::from_secs(600)));
    assert!(locks.try_acquire(dir.path())?.is_none());
    assert!(dir.path().join(LOCK_FILE).exists());
    Ok(())
}

#[test]
fn stale_lock_file_is_broken() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join(LOCK_FILE), "4242\n")?;

    let locks = Arc::new(SolutionLocks::new(Duration::ZERO));
    let guard = locks.try_acquire(dir.path())?;
    assert!(guard.is_some());
    let owner = std::fs::read_to_string(dir.path().join(LOCK_FILE))?;
    assert_eq!(owner.trim(), std::process::id().to_string());
    Ok(())
}

#[test]
fn threads_exclude_each_other() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let locks = Arc::new(SolutionLocks::new(Duration::from_secs(600)));
    let barrier = Arc::new(std::sync::Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let locks = Arc::clone(&locks);
            let barrier = Arc::clone(&barrier);
            let path = dir.path().to_owned();
            std::thread::spawn(move || {
                barrier.wait();
                locks.try_acquire(&path).map(|g| {
                    let won = g.is_some();
                    // keep the lock until every thread had its try
                    std::thread::sleep(Duration::from_millis(50));
                    won
                })
            })
        })
        .collect();

    let mut winners = 0;
    for h in handles {
        if h.join().map_err(|_| anyhow::anyhow!("thread panicked"))?? {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}
