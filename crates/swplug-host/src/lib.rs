//! Host implementations of the worker collaborator traits.
//!
//! [`MemoryScope`] is a complete worker global scope held in memory: it
//! records registered listeners, owns cache storage, clients, and a
//! notification log, and drives events through the listeners the way a
//! browser would. [`HttpNetwork`] is a real network backed by `reqwest`.

pub mod cache;
pub mod clients;
pub mod http_network;
pub mod network;
pub mod notifications;
pub mod scope;

use std::sync::{Mutex, MutexGuard};

pub use cache::{MemoryCache, MemoryCacheStorage};
pub use clients::MemoryClients;
pub use http_network::HttpNetwork;
pub use network::MemoryNetwork;
pub use notifications::RecordingNotifications;
pub use scope::MemoryScope;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
