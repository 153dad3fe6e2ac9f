use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::cache::ByteCache;
use crate::path::{normalize, VirtualPath};

/// Non-fatal outcomes of a single fetch attempt, each mapped to the
/// diagnostic logging level it deserves at the call site.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0} does not exist or is unreadable: {1}")]
    NotFound(VirtualPath, std::io::Error),

    #[error("{0} ({1} bytes) exceeds the cache budget of {2} bytes")]
    Oversize(VirtualPath, u64, usize),

    #[error("{0} is already resident")]
    AlreadyResident(VirtualPath),

    #[error("failed to read {0}: {1}")]
    ReadFailed(VirtualPath, std::io::Error),

    #[error("{0} changed size during read ({1} -> {2} bytes)")]
    SizeMismatch(VirtualPath, u64, usize),
}

/// Producer handle for the fetch queue. Enqueue is non-blocking and never
/// fails from the caller's perspective: a closed worker simply drops the
/// request.
#[derive(Clone)]
pub struct FetchQueue {
    sender: Sender<String>,
}

impl FetchQueue {
    /// Request that `path` be prefetched. Accepts the raw, possibly
    /// unnormalized string a caller observed; normalization happens on the
    /// worker side.
    pub fn enqueue(&self, path: impl Into<String>) {
        let _ = self.sender.send(path.into());
    }
}

/// Spawn the single fetch worker thread and return a producer handle plus
/// its join handle. The queue is an unbounded FIFO; duplicates are fine,
/// deduplication happens at fetch time against cache residence.
pub fn spawn_fetch_worker(root: PathBuf, cache: Arc<ByteCache>) -> (FetchQueue, JoinHandle<()>) {
    let (sender, receiver) = crossbeam_channel::unbounded();

    let handle = thread::spawn(move || fetch_worker_loop(&root, &cache, receiver));

    (FetchQueue { sender }, handle)
}

fn fetch_worker_loop(root: &Path, cache: &ByteCache, receiver: Receiver<String>) {
    for raw in receiver {
        match fetch_one(root, cache, &raw) {
            Ok(path) => log::debug!("fetch worker: cached {path}"),
            Err(FetchError::AlreadyResident(_)) => {}
            Err(err @ FetchError::Oversize(..)) => log::debug!("fetch worker: {err}"),
            Err(err) => log::warn!("fetch worker: {err}"),
        }
    }
    log::trace!("fetch worker exiting: queue closed");
}

fn fetch_one(root: &Path, cache: &ByteCache, raw: &str) -> Result<VirtualPath, FetchError> {
    let path = normalize(raw);
    let full_path = path.resolve(root);

    let metadata =
        fs_err::metadata(&full_path).map_err(|err| FetchError::NotFound(path.clone(), err))?;
    let file_size = metadata.len();

    if file_size > cache.budget() as u64 {
        return Err(FetchError::Oversize(path, file_size, cache.budget()));
    }

    if cache.contains(&path) {
        return Err(FetchError::AlreadyResident(path));
    }

    let data =
        fs_err::read(&full_path).map_err(|err| FetchError::ReadFailed(path.clone(), err))?;

    if data.len() as u64 != file_size {
        return Err(FetchError::SizeMismatch(path, file_size, data.len()));
    }

    if cache.contains(&path) {
        return Err(FetchError::AlreadyResident(path));
    }

    if cache.insert(path.clone(), data) {
        Ok(path)
    } else {
        Err(FetchError::Oversize(path, file_size, cache.budget()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn fetch_populates_cache() {
        let dir = tempdir().unwrap();
        fs_err::write(dir.path().join("a.txt"), b"hello").unwrap();

        let cache = Arc::new(ByteCache::new(1024));
        let (queue, _handle) = spawn_fetch_worker(dir.path().to_path_buf(), cache.clone());

        queue.enqueue("a.txt");

        assert!(wait_until(|| cache.contains(&normalize("a.txt"))));
        assert_eq!(
            cache.lookup_range(&normalize("a.txt"), 5, 0).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn missing_file_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(ByteCache::new(1024));
        let (queue, _handle) = spawn_fetch_worker(dir.path().to_path_buf(), cache.clone());

        queue.enqueue("nope.txt");
        queue.enqueue("also-nope.txt");

        // The worker thread should still be alive and able to process more
        // work after encountering missing files.
        fs_err::write(dir.path().join("real.txt"), b"ok").unwrap();
        queue.enqueue("real.txt");
        assert!(wait_until(|| cache.contains(&normalize("real.txt"))));
    }

    #[test]
    fn oversize_file_never_cached() {
        let dir = tempdir().unwrap();
        fs_err::write(dir.path().join("big.bin"), vec![0u8; 2048]).unwrap();

        let cache = Arc::new(ByteCache::new(10));
        let (queue, _handle) = spawn_fetch_worker(dir.path().to_path_buf(), cache.clone());
        queue.enqueue("big.bin");

        thread::sleep(Duration::from_millis(100));
        assert!(!cache.contains(&normalize("big.bin")));
    }
}
