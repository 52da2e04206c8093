//! A native database object shared by proxies that are finalized on another thread.
//!
//! Each round the main thread asks for the database again (getting a fresh
//! proxy), and hands the previous proxy to a finalizer thread, the way a
//! garbage collector would once the proxy became unreachable. The finalizer
//! drops proxies whenever it gets to them. If the registry let a finalizer
//! destroy the database while a newer proxy still pointed at it, the main
//! thread would find its proxy dangling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tally::InstanceId;
use tracing::info;

use super::Database;
use crate::cache::InstanceCache;
use crate::AnyResult;

const URL: &str = "db://shared";

type DatabaseCache = InstanceCache<String, Database>;

struct Proxy {
    id: InstanceId<Database>,
    cache: Arc<DatabaseCache>,
}

impl Drop for Proxy {
    fn drop(&mut self) {
        let _ = self.cache.release(self.id);
    }
}

fn get_instance(
    cache: &Arc<DatabaseCache>,
    created: &AtomicU64,
    destroyed: &Arc<AtomicU64>,
) -> Proxy {
    let id = cache.get_or_create(&URL.to_owned(), |url| {
        created.fetch_add(1, Ordering::SeqCst);
        Database::new(url.clone(), Arc::clone(destroyed))
    });
    Proxy {
        id,
        cache: Arc::clone(cache),
    }
}

pub async fn run(rounds: u64) -> AnyResult<()> {
    tokio::task::spawn_blocking(move || run_blocking(rounds))
        .await
        .map_err(|e| format!("finalizer-race scenario panicked: {e}"))?
}

fn run_blocking(rounds: u64) -> AnyResult<()> {
    let cache = Arc::new(DatabaseCache::new("finalizer-race"));
    let created = AtomicU64::new(0);
    let destroyed = Arc::new(AtomicU64::new(0));

    let (finalize_tx, finalize_rx) = mpsc::channel::<Proxy>();
    let finalizer = thread::Builder::new()
        .name("finalizer".into())
        .spawn(move || {
            let mut finalized = 0u64;
            for proxy in finalize_rx {
                if finalized % 3 == 0 {
                    thread::yield_now();
                }
                drop(proxy);
                finalized += 1;
            }
            finalized
        })
        .map_err(|e| format!("failed to spawn finalizer thread: {e}"))?;

    let mut live = get_instance(&cache, &created, &destroyed);
    let mut dangling = 0u64;
    for _ in 0..rounds {
        let next = get_instance(&cache, &created, &destroyed);
        finalize_tx
            .send(live)
            .map_err(|_| "finalizer thread hung up".to_owned())?;
        live = next;

        if cache.registry().with(live.id, |db| db.url.len()).is_none() {
            dangling += 1;
        }
    }
    drop(live);
    drop(finalize_tx);

    let finalized = finalizer
        .join()
        .map_err(|_| "finalizer thread panicked".to_owned())?;
    let created = created.load(Ordering::SeqCst);
    let destroyed = destroyed.load(Ordering::SeqCst);

    info!(
        registry = cache.registry().name(),
        rounds,
        finalized,
        created,
        destroyed,
        dangling,
        "finalizer race finished"
    );
    println!(
        "finalizer-race: {rounds} rounds, {finalized} proxies finalized, {created} databases created, {destroyed} destroyed"
    );

    if dangling > 0 {
        return Err(format!(
            "{dangling} proxies pointed at a destroyed database"
        ));
    }
    if created != destroyed {
        return Err(format!(
            "created {created} databases but destroyed {destroyed}"
        ));
    }
    if !cache.registry().is_empty() || cache.cached_keys() != 0 {
        return Err(format!(
            "registry not empty after all proxies were finalized: {:?}",
            cache.registry().snapshot()
        ));
    }
    Ok(())
}
