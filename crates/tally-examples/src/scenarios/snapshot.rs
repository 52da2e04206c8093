use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tally::InstanceRegistry;

use super::Database;
use crate::AnyResult;

/// Prints the JSON snapshot of a small registry, then releases everything.
pub fn run() -> AnyResult<()> {
    let destroyed = Arc::new(AtomicU64::new(0));
    let registry = InstanceRegistry::new("snapshot-demo");

    let primary = registry.adopt(Database::new("db://primary", Arc::clone(&destroyed)));
    let replica = registry.adopt(Database::new("db://replica", Arc::clone(&destroyed)));
    let scratch = registry.adopt(Database::new("db://scratch", Arc::clone(&destroyed)));
    registry.add_reference(primary);
    registry.add_reference(primary);
    registry.add_reference(replica);
    let _ = registry.release_reference(scratch);

    let snapshot = registry.snapshot();
    let json = facet_json::to_string(&snapshot).map_err(|e| e.to_string())?;
    println!("{json}");

    for id in [primary, primary, primary, replica, replica] {
        let _ = registry.release_reference(id);
    }
    let destroyed = destroyed.load(Ordering::SeqCst);
    if destroyed != 3 || !registry.is_empty() {
        return Err(format!("expected 3 databases destroyed, saw {destroyed}"));
    }
    Ok(())
}
