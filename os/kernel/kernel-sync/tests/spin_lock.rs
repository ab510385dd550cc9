use kernel_sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let l = SpinLock::new("counter", 0_u32);
    {
        let mut g = l.lock();
        *g = 41;
        assert!(l.is_locked());
    }
    assert!(!l.is_locked());
    l.with_lock(|v| *v += 1);
    assert_eq!(*l.lock(), 42);
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new("flag", 1_u8);
    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert!(l.try_lock().is_none());
    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn name_and_debug() {
    let l = SpinLock::new("kmem", ());
    assert_eq!(l.name(), "kmem");
    let s = format!("{l:?}");
    assert!(s.contains("kmem"));
    assert!(s.contains("locked: false"));
}

#[test]
fn get_mut_and_into_inner() {
    let mut l = SpinLock::new("list", vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.into_inner(), vec![1, 2, 3, 4]);
}

#[test]
fn contended_pushes_are_exclusive() {
    let threads = 8;
    let iters = 2_000;

    let lock = Arc::new(SpinLock::new("stack", Vec::new()));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for i in 0..iters {
                    lock.with_lock(|v: &mut Vec<usize>| {
                        let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "mutual exclusion violated");
                        v.push(t * iters + i);
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let mut all = lock.with_lock(|v| v.clone());
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), threads * iters);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new("p", 0_u32);
    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err());
    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new("s", 0_u8);
    takes_sync(&l);
}
