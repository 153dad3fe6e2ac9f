/*!
A bounded, thread-safe, whole-file LRU byte cache with a background
prefetch worker.

`quark-cache` covers the pieces of Quark's predictive prefetch pipeline
that don't need to know anything about *prediction*: normalizing a path
into a stable cache key, storing and evicting whole files under a memory
budget, and draining a fetch queue in the background to populate the
cache without blocking reads.
*/

mod cache;
mod fetch;
mod path;

pub use cache::{ByteCache, CacheStatus};
pub use fetch::{spawn_fetch_worker, FetchError, FetchQueue};
pub use path::{normalize, VirtualPath};
