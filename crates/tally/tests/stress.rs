use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tally::{InstanceRegistry, Release};

const ROUNDS: usize = 200;
const THREADS: usize = 8;

/// Records, at the moment it is destroyed, how many releases had been issued.
struct Native {
    releases_issued: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
    releases_seen_at_destroy: Arc<AtomicUsize>,
}

impl Drop for Native {
    fn drop(&mut self) {
        self.releases_seen_at_destroy
            .store(self.releases_issued.load(Ordering::SeqCst), Ordering::SeqCst);
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

fn jitter(seed: usize) {
    for _ in 0..(seed % 5) {
        thread::yield_now();
    }
}

#[test]
fn concurrent_holders_destroy_shared_instance_once() {
    for round in 0..ROUNDS {
        let registry = Arc::new(InstanceRegistry::new("native"));
        let releases_issued = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let releases_seen_at_destroy = Arc::new(AtomicUsize::new(0));

        let id = registry.adopt(Native {
            releases_issued: Arc::clone(&releases_issued),
            destroyed: Arc::clone(&destroyed),
            releases_seen_at_destroy: Arc::clone(&releases_seen_at_destroy),
        });

        let start = Arc::new(Barrier::new(THREADS + 1));
        let added = Arc::new(Barrier::new(THREADS + 1));
        let workers: Vec<_> = (0..THREADS)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                let start = Arc::clone(&start);
                let added = Arc::clone(&added);
                let releases_issued = Arc::clone(&releases_issued);
                thread::spawn(move || {
                    start.wait();
                    jitter(worker + round);
                    let count = registry
                        .add_reference(id)
                        .expect("creator still holds a reference");
                    assert!(count >= 2);
                    added.wait();
                    jitter(worker * 3 + round);
                    releases_issued.fetch_add(1, Ordering::SeqCst);
                    registry.release_reference(id)
                })
            })
            .collect();

        start.wait();
        added.wait();
        jitter(round);
        // Creator reference goes away while workers are still releasing.
        releases_issued.fetch_add(1, Ordering::SeqCst);
        let creator_release = registry.release_reference(id);

        let mut outcomes: Vec<Release> = workers
            .into_iter()
            .map(|w| w.join().expect("worker panicked"))
            .collect();
        outcomes.push(creator_release);

        let destroyed_by = outcomes.iter().filter(|r| r.is_destroyed()).count();
        assert_eq!(destroyed_by, 1, "round {round}: {outcomes:?}");
        assert!(outcomes.iter().all(|r| r.is_tracked()), "round {round}: {outcomes:?}");
        assert_eq!(destroyed.load(Ordering::SeqCst), 1, "round {round}");
        assert_eq!(
            releases_seen_at_destroy.load(Ordering::SeqCst),
            THREADS + 1,
            "round {round}: destroyed before every release was issued"
        );
        assert!(registry.is_empty());
        assert_eq!(registry.release_reference(id), Release::Untracked);
    }
}

#[test]
fn racing_releases_past_zero_never_double_destroy() {
    for round in 0..ROUNDS {
        let registry = Arc::new(InstanceRegistry::new("native"));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let id = registry.adopt(Native {
            releases_issued: Arc::new(AtomicUsize::new(0)),
            destroyed: Arc::clone(&destroyed),
            releases_seen_at_destroy: Arc::new(AtomicUsize::new(0)),
        });
        for _ in 1..THREADS / 2 {
            registry.add_reference(id);
        }

        // Twice as many releases as references.
        let start = Arc::new(Barrier::new(THREADS));
        let workers: Vec<_> = (0..THREADS)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    jitter(worker + round);
                    registry.release_reference(id)
                })
            })
            .collect();

        let outcomes: Vec<Release> = workers
            .into_iter()
            .map(|w| w.join().expect("worker panicked"))
            .collect();

        let untracked = outcomes.iter().filter(|r| !r.is_tracked()).count();
        let destroyed_by = outcomes.iter().filter(|r| r.is_destroyed()).count();
        assert_eq!(untracked, THREADS / 2, "round {round}: {outcomes:?}");
        assert_eq!(destroyed_by, 1, "round {round}: {outcomes:?}");
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn distinct_instances_are_counted_independently_across_threads() {
    let registry = Arc::new(InstanceRegistry::new("native"));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let ids: Vec<_> = (0..THREADS)
        .map(|_| {
            registry.adopt(Native {
                releases_issued: Arc::new(AtomicUsize::new(0)),
                destroyed: Arc::clone(&destroyed),
                releases_seen_at_destroy: Arc::new(AtomicUsize::new(0)),
            })
        })
        .collect();

    let workers: Vec<_> = ids
        .iter()
        .copied()
        .map(|id| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    registry.add_reference(id);
                }
                for _ in 0..ROUNDS {
                    assert!(!registry.release_reference(id).is_destroyed());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    assert_eq!(registry.len(), THREADS);
    assert_eq!(registry.snapshot().total_references(), THREADS as u64);
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    for id in ids {
        assert_eq!(registry.release_reference(id), Release::Destroyed);
    }
    assert_eq!(destroyed.load(Ordering::SeqCst), THREADS);
}
