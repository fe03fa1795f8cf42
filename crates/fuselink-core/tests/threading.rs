//! Cross-thread behavior: submissions are totally ordered by the manager
//! lock, listeners observe every commit exactly once, and concurrent
//! readers never deadlock or observe a half-applied write.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use fuselink_core::{Hook, LinkMode, NexusManager, SubmitOptions};

const WRITER_THREADS: i64 = 4;
const WRITES_PER_THREAD: i64 = 50;

#[test]
fn every_forced_submission_commits_exactly_once() {
    let manager = NexusManager::new();
    let hook = Hook::new(&manager, 0_i64);
    let commits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&commits);
    hook.add_listener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    thread::scope(|scope| {
        for t in 0..WRITER_THREADS {
            let hook = hook.clone();
            scope.spawn(move || {
                for i in 0..WRITES_PER_THREAD {
                    hook.submit_with(t * 1_000 + i, SubmitOptions::forced())
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(
        commits.load(Ordering::SeqCst),
        (WRITER_THREADS * WRITES_PER_THREAD) as usize
    );
}

#[test]
fn commits_form_a_single_chain() {
    // Each reaction records (previous, current). Total ordering means every
    // entry's previous value equals the preceding entry's current value.
    let manager = NexusManager::new();
    let log: Arc<Mutex<Vec<(i64, i64)>>> = Arc::new(Mutex::new(Vec::new()));
    let reaction_log = Arc::clone(&log);
    let hook = Hook::with_reaction(&manager, 0_i64, move |current, previous| {
        reaction_log.lock().unwrap().push((*previous, *current));
    });

    thread::scope(|scope| {
        for t in 1..=WRITER_THREADS {
            let hook = hook.clone();
            scope.spawn(move || {
                for i in 0..WRITES_PER_THREAD {
                    hook.submit_with(t * 10_000 + i, SubmitOptions::forced())
                        .unwrap();
                }
            });
        }
    });

    let log = log.lock().unwrap();
    assert_eq!(log.len(), (WRITER_THREADS * WRITES_PER_THREAD) as usize);
    for window in log.windows(2) {
        assert_eq!(
            window[1].0, window[0].1,
            "a commit's previous value must be the prior commit's current value"
        );
    }
}

#[test]
fn readers_run_concurrently_with_writers() {
    let manager = NexusManager::new();
    let a = Hook::new(&manager, 0_i64);
    let b = Hook::new(&manager, 0_i64);
    a.link(&b, LinkMode::UseSelf).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    thread::scope(|scope| {
        for reader_hook in [a.clone(), b.clone()] {
            let done = Arc::clone(&done);
            scope.spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let value = reader_hook.get().unwrap();
                    assert!((0..=WRITES_PER_THREAD).contains(&value));
                }
            });
        }

        let writer = a.clone();
        let writer_done = Arc::clone(&done);
        scope.spawn(move || {
            for i in 1..=WRITES_PER_THREAD {
                writer.submit(i).unwrap();
            }
            writer_done.store(true, Ordering::Release);
        });
    });

    assert_eq!(a.get().unwrap(), WRITES_PER_THREAD);
    assert_eq!(b.get().unwrap(), WRITES_PER_THREAD);
}

#[test]
fn fusions_and_writes_interleave_safely() {
    let manager = NexusManager::new();
    let anchor = Hook::new(&manager, 0_i64);

    thread::scope(|scope| {
        let writer = anchor.clone();
        scope.spawn(move || {
            for i in 1..=WRITES_PER_THREAD {
                writer.submit_with(i, SubmitOptions::forced()).unwrap();
            }
        });

        let linker = anchor.clone();
        let linker_manager = manager.clone();
        scope.spawn(move || {
            for _ in 0..WRITES_PER_THREAD {
                let satellite = Hook::new(&linker_manager, -1_i64);
                linker.link(&satellite, LinkMode::UseSelf).unwrap();
                satellite.isolate().unwrap();
                satellite.release().unwrap();
            }
        });
    });

    assert_eq!(anchor.get().unwrap(), WRITES_PER_THREAD);
    assert_eq!(manager.hook_count(), 1);
    assert_eq!(manager.nexus_count(), 1);
}
