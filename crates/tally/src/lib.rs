//! Reference-counting registry for instances shared between independent holders.
//!
//! An [`InstanceRegistry`] owns a set of instances of one type and counts, for
//! each of them, how many holders currently claim it. The registry is the only
//! thing allowed to destroy a tracked instance, and it does so exactly once:
//! inside the critical section of the release that takes the count from 1 to 0.
//!
//! The motivating case is a native object handed out to several proxies that
//! live in a garbage-collected runtime. One proxy's finalizer may release the
//! object at the same moment another caller looks it up again. With a single
//! lock arbitrating every count change, the lookup either sees the object
//! still alive and bumps its count, or sees it gone and creates a new one.
//!
//! # Lifecycle
//!
//! ```text
//! untracked ──adopt──▶ tracked(1) ──add/release──▶ tracked(n) ──release to 0──▶ destroyed
//! ```
//!
//! ```
//! use tally::{InstanceRegistry, Release};
//!
//! let registry = InstanceRegistry::new("connections");
//! let conn = registry.adopt(String::from("db://primary"));
//! assert_eq!(registry.add_reference(conn), Some(2));
//! assert_eq!(registry.release_reference(conn), Release::Retained(1));
//! assert_eq!(registry.release_reference(conn), Release::Destroyed);
//! assert_eq!(registry.release_reference(conn).count(), -1);
//! ```
//!
//! # Composing with lookup
//!
//! The registry does not know how callers find or create instances. Callers
//! that need "find or create, then add a reference" to be atomic hold the
//! registry's own lock across both steps via [`InstanceRegistry::lock`]:
//!
//! ```
//! use std::collections::HashMap;
//! use tally::{InstanceId, InstanceRegistry};
//!
//! fn get_instance(
//!     registry: &InstanceRegistry<String>,
//!     cache: &mut HashMap<String, InstanceId<String>>,
//!     url: &str,
//! ) -> InstanceId<String> {
//!     let mut guard = registry.lock();
//!     if let Some(&id) = cache.get(url) {
//!         if guard.contains(id) {
//!             guard.add_reference(id);
//!             return id;
//!         }
//!     }
//!     let id = guard.adopt(url.to_owned());
//!     cache.insert(url.to_owned(), id);
//!     id
//! }
//! ```
//!
//! # Teardown
//!
//! Instances still tracked when a registry is dropped are reported with
//! `tracing::warn!` and leaked rather than destroyed.

mod id;
mod registry;
mod release;
mod slab;

pub use id::InstanceId;
pub use registry::{InstanceRegistry, RegistryGuard};
pub use release::Release;
pub use tally_types::{RefCountError, RegistrySnapshot, TrackedInstanceSnapshot};
