use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel;

use shared_ownership::{ReferenceCounted, Shared, SharedRef, ThreadSafe, Weak};

const THREADS: usize = 8;
const ROUNDS: usize = 10_000;

struct Counted {
    value: usize,
    drops: Arc<AtomicUsize>,
}

impl Counted {
    fn new(value: usize, drops: &Arc<AtomicUsize>) -> Self {
        Counted { value, drops: drops.clone() }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn concurrent_clone_and_drop_keeps_counts_exact() {
    let drops = Arc::new(AtomicUsize::new(0));
    let shared: Shared<Counted, ThreadSafe> = Shared::new(Counted::new(42, &drops));

    crossbeam::scope(|s| {
        for _ in 0..THREADS {
            let shared = &shared;
            s.spawn(move |_| {
                for _ in 0..ROUNDS {
                    let copy = shared.clone();
                    let weak = copy.to_weak();
                    assert_eq!(copy.get().map(|c| c.value), Some(42));
                    drop(copy);
                    assert!(weak.lock().is_valid());
                }
            });
        }
    })
    .unwrap();

    assert_eq!(Shared::strong_count(&shared), 1);
    assert_eq!(Shared::weak_count(&shared), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(shared);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn lock_racing_last_drop_destroys_once() {
    for round in 0..1_000 {
        let drops = Arc::new(AtomicUsize::new(0));
        let shared: Shared<Counted, ThreadSafe> = Shared::new(Counted::new(round, &drops));
        let weak = shared.to_weak();

        crossbeam::scope(|s| {
            s.spawn(|_| {
                let mut shared = shared;
                shared.reset();
            });

            for _ in 0..2 {
                let weak = weak.clone();
                s.spawn(move |_| loop {
                    let locked = weak.lock();
                    match locked.get() {
                        Some(object) => assert_eq!(object.value, round),
                        None => break,
                    }
                });
            }
        })
        .unwrap();

        assert!(weak.expired());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(Weak::weak_count(&weak), 1);
    }
}

#[test]
fn handles_travel_over_channels() {
    let drops = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = channel::unbounded::<Weak<Counted, ThreadSafe>>();
    let (done_tx, done_rx) = channel::unbounded::<usize>();

    let objects: Vec<SharedRef<Counted, ThreadSafe>> =
        (1..=THREADS).map(|value| SharedRef::new(Counted::new(value, &drops))).collect();

    crossbeam::scope(|s| {
        for _ in 0..THREADS {
            let rx = rx.clone();
            let done_tx = done_tx.clone();
            s.spawn(move |_| {
                let sum: usize = rx
                    .iter()
                    .filter_map(|weak| weak.lock().get().map(|c| c.value))
                    .sum();
                done_tx.send(sum).unwrap();
            });
        }
        drop(done_tx);

        for object in &objects {
            for _ in 0..ROUNDS / 100 {
                tx.send(SharedRef::to_weak(object)).unwrap();
            }
        }
        drop(tx);
    })
    .unwrap();

    let total: usize = done_rx.iter().sum();
    assert_eq!(total, (1..=THREADS).sum::<usize>() * (ROUNDS / 100));

    for object in &objects {
        assert_eq!(SharedRef::strong_count(object), 1);
        assert_eq!(SharedRef::weak_count(object), 0);
    }

    drop(objects);
    assert_eq!(drops.load(Ordering::SeqCst), THREADS);
}
