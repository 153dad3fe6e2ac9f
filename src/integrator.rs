use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quark_cache::{normalize, ByteCache, FetchQueue, VirtualPath};
use quark_predict::{PredictionModel, Predictor};

/// Glues the cache, predictor and fetch queue into a single read-path
/// operation. Cheaply cloneable: every field is already an `Arc` or a
/// producer handle, so filesystem operation threads can each hold a clone.
#[derive(Clone)]
pub struct ReadIntegrator {
    root: PathBuf,
    cache: Arc<ByteCache>,
    predictor: Arc<Predictor>,
    fetch_queue: FetchQueue,
    prefetch_enabled: Arc<AtomicBool>,
}

/// How many successor paths to request a prediction for on every read,
/// per the read-path integrator contract.
const PREDICTIONS_PER_READ: usize = 2;

impl ReadIntegrator {
    pub fn new(
        root: PathBuf,
        cache: Arc<ByteCache>,
        predictor: Arc<Predictor>,
        fetch_queue: FetchQueue,
        prefetch_enabled: bool,
    ) -> Self {
        Self {
            root,
            cache,
            predictor,
            fetch_queue,
            prefetch_enabled: Arc::new(AtomicBool::new(prefetch_enabled)),
        }
    }

    pub fn prefetch_enabled(&self) -> bool {
        self.prefetch_enabled.load(Ordering::Relaxed)
    }

    pub fn set_prefetch_enabled(&self, enabled: bool) {
        self.prefetch_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn toggle_prefetch(&self) -> bool {
        !self.prefetch_enabled.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn cache(&self) -> &ByteCache {
        &self.cache
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn fetch_queue(&self) -> &FetchQueue {
        &self.fetch_queue
    }

    /// Serve a read at `raw_path`, consulting the cache first and falling
    /// back to a direct read through the backing file. Always runs
    /// `log_and_predict` before returning, whether the read was a cache hit
    /// or not: the sequence of accesses is the same either way.
    pub fn read(&self, raw_path: &str, size: usize, offset: usize) -> io::Result<Vec<u8>> {
        let path = normalize(raw_path);

        let bytes = match self.cache.lookup_range(&path, size, offset) {
            Some(bytes) => bytes,
            None => self.read_through(&path, size, offset)?,
        };

        self.log_and_predict(&path);
        Ok(bytes)
    }

    fn read_through(&self, path: &VirtualPath, size: usize, offset: usize) -> io::Result<Vec<u8>> {
        let full_path = path.resolve(&self.root);
        let mut file = File::open(full_path)?;
        file.seek(SeekFrom::Start(offset as u64))?;

        let mut buffer = vec![0u8; size];
        let read = file.read(&mut buffer)?;
        buffer.truncate(read);
        Ok(buffer)
    }

    fn log_and_predict(&self, path: &VirtualPath) {
        if self.predictor.last(None).as_ref() != Some(path) {
            self.predictor.log(path);
        }

        if !self.prefetch_enabled() {
            return;
        }

        for predicted in self.predictor.predict(Some(path), PREDICTIONS_PER_READ) {
            self.fetch_queue.enqueue(predicted.as_str().to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quark_cache::spawn_fetch_worker;
    use std::time::Duration;
    use tempfile::tempdir;

    fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn integrator(root: PathBuf, prefetch_enabled: bool) -> ReadIntegrator {
        let cache = Arc::new(ByteCache::new(1024));
        let (queue, _handle) = spawn_fetch_worker(root.clone(), cache.clone());
        let predictor = Arc::new(Predictor::swg());
        ReadIntegrator::new(root, cache, predictor, queue, prefetch_enabled)
    }

    #[test]
    fn direct_read_falls_through_on_cache_miss() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world").unwrap();

        let integrator = integrator(dir.path().to_path_buf(), false);
        let bytes = integrator.read("a.txt", 5, 0).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn read_past_end_of_file_returns_short_buffer_not_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();

        let integrator = integrator(dir.path().to_path_buf(), false);
        let bytes = integrator.read("a.txt", 100, 0).unwrap();
        assert_eq!(bytes, b"hi");
    }

    #[test]
    fn prefetch_dispatches_predicted_successor() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("foo"), b"foo-bytes").unwrap();
        std::fs::write(dir.path().join("bar"), b"bar-bytes").unwrap();

        let integrator = integrator(dir.path().to_path_buf(), true);

        // Teach the predictor foo -> bar, then replay the read that should
        // trigger the prefetch.
        integrator.read("foo", 9, 0).unwrap();
        integrator.read("bar", 9, 0).unwrap();
        integrator.read("foo", 9, 0).unwrap();

        assert!(wait_until(|| integrator.cache().contains(&normalize("bar"))));
    }

    #[test]
    fn prefetch_disabled_by_default_does_not_populate_cache() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("foo"), b"foo-bytes").unwrap();
        std::fs::write(dir.path().join("bar"), b"bar-bytes").unwrap();

        let integrator = integrator(dir.path().to_path_buf(), false);
        integrator.read("foo", 9, 0).unwrap();
        integrator.read("bar", 9, 0).unwrap();
        integrator.read("foo", 9, 0).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert!(!integrator.cache().contains(&normalize("bar")));
    }

    #[test]
    fn toggle_prefetch_flips_state() {
        let integrator = integrator(tempdir().unwrap().path().to_path_buf(), false);
        assert!(!integrator.prefetch_enabled());
        assert!(integrator.toggle_prefetch());
        assert!(integrator.prefetch_enabled());
        assert!(!integrator.toggle_prefetch());
    }
}
