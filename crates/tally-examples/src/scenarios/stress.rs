use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tally::{InstanceRegistry, Release};
use tracing::{debug, info};

use super::Database;
use crate::AnyResult;

pub async fn run(threads: u64, rounds: u64) -> AnyResult<()> {
    if threads == 0 {
        return Err("--threads must be at least 1".to_owned());
    }
    tokio::task::spawn_blocking(move || run_blocking(threads as usize, rounds))
        .await
        .map_err(|e| format!("stress scenario panicked: {e}"))?
}

/// Each round: `threads` holders add a reference to one shared database,
/// then all of them and the creator release concurrently. Exactly one
/// release per round may destroy it.
fn run_blocking(threads: usize, rounds: u64) -> AnyResult<()> {
    let registry = InstanceRegistry::new("stress");
    let destroyed = Arc::new(AtomicU64::new(0));

    for round in 0..rounds {
        let id = registry.adopt(Database::new(
            format!("db://stress-{round}"),
            Arc::clone(&destroyed),
        ));
        let added = Barrier::new(threads + 1);

        let outcomes = thread::scope(|scope| -> AnyResult<Vec<Release>> {
            let workers: Vec<_> = (0..threads)
                .map(|_| {
                    let registry = &registry;
                    let added = &added;
                    scope.spawn(move || {
                        let refs = registry.add_reference(id);
                        added.wait();
                        (refs, registry.release_reference(id))
                    })
                })
                .collect();

            added.wait();
            let mut outcomes = vec![registry.release_reference(id)];
            // Join every worker before reporting, so none is left for the
            // scope to re-panic on.
            let joined: Vec<_> = workers.into_iter().map(|handle| handle.join()).collect();
            for (worker, result) in joined.into_iter().enumerate() {
                let (refs, outcome) = result.map_err(|payload| {
                    format!(
                        "round {round}: worker {worker} panicked: {}",
                        panic_message(&*payload)
                    )
                })?;
                if refs.is_none() {
                    debug!(round, worker, "worker could not add a reference");
                    outcomes.push(Release::Untracked);
                }
                outcomes.push(outcome);
            }
            Ok(outcomes)
        })?;

        let destroyed_by = outcomes.iter().filter(|r| r.is_destroyed()).count();
        let untracked = outcomes.iter().filter(|r| !r.is_tracked()).count();
        if destroyed_by != 1 || untracked != 0 {
            return Err(format!(
                "round {round}: {destroyed_by} destroying releases, {untracked} untracked: {outcomes:?}"
            ));
        }
    }

    let destroyed = destroyed.load(Ordering::SeqCst);
    info!(
        registry = registry.name(),
        threads,
        rounds,
        destroyed,
        "stress finished"
    );
    println!("stress: {threads} threads x {rounds} rounds, {destroyed} databases destroyed");
    if destroyed != rounds {
        return Err(format!("expected {rounds} destructions, saw {destroyed}"));
    }
    if !registry.is_empty() {
        return Err(format!("registry not empty: {:?}", registry.snapshot()));
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
