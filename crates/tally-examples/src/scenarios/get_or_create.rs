use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::Database;
use crate::cache::InstanceCache;
use crate::AnyResult;

/// Many concurrent callers ask for one of `keys` databases; each key must end
/// up with exactly one live instance, referenced once per caller.
pub async fn run(callers: u64, keys: u64) -> AnyResult<()> {
    if keys == 0 {
        return Err("--keys must be at least 1".to_owned());
    }

    let cache = Arc::new(InstanceCache::<String, Database>::new("get-or-create"));
    let created = Arc::new(AtomicU64::new(0));
    let destroyed = Arc::new(AtomicU64::new(0));

    let tasks: Vec<_> = (0..callers)
        .map(|caller| {
            let cache = Arc::clone(&cache);
            let created = Arc::clone(&created);
            let destroyed = Arc::clone(&destroyed);
            tokio::task::spawn_blocking(move || {
                let key = format!("db://shard-{}", caller % keys);
                let id = cache.get_or_create(&key, |url| {
                    created.fetch_add(1, Ordering::SeqCst);
                    Database::new(url.clone(), Arc::clone(&destroyed))
                });
                let url = cache.registry().with(id, |db| db.url.clone());
                (key, id, url)
            })
        })
        .collect();

    let mut held = Vec::with_capacity(tasks.len());
    for task in tasks {
        let (key, id, url) = task
            .await
            .map_err(|e| format!("caller task failed: {e}"))?;
        if url.as_deref() != Some(key.as_str()) {
            return Err(format!("caller for {key} got {url:?}"));
        }
        held.push(id);
    }

    let expected_live = keys.min(callers);
    let snapshot = cache.registry().snapshot();
    let live = snapshot.instances.len() as u64;
    info!(
        callers,
        keys,
        live,
        references = snapshot.total_references(),
        "all callers hold their instance"
    );
    if live != expected_live {
        return Err(format!("expected {expected_live} live databases, found {live}"));
    }
    if snapshot.total_references() != callers {
        return Err(format!(
            "expected {callers} references, found {}",
            snapshot.total_references()
        ));
    }

    for id in held {
        let _ = cache.release(id);
    }

    let created = created.load(Ordering::SeqCst);
    let destroyed = destroyed.load(Ordering::SeqCst);
    println!(
        "get-or-create: {callers} callers over {keys} keys, {created} databases created, {destroyed} destroyed"
    );
    if created != expected_live || destroyed != created {
        return Err(format!(
            "expected {expected_live} databases created and destroyed, got {created}/{destroyed}"
        ));
    }
    if !cache.registry().is_empty() || cache.cached_keys() != 0 {
        return Err("cache still holds entries after every caller released".to_owned());
    }
    Ok(())
}
