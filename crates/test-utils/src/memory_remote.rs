use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use monodag::cache::{IndexRecord, RemoteBackend};
use monodag::exec::BoxFuture;

/// In-memory [`RemoteBackend`] for cache tests: a plain object map plus an
/// index map, with switchable failure injection and call counters.
#[derive(Default)]
pub struct MemoryRemote {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    index: Mutex<HashMap<String, IndexRecord>>,
    failing: AtomicBool,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation return a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn index_record(&self, key: &str) -> Option<IndexRecord> {
        self.index.lock().unwrap().get(key).cloned()
    }

    /// Seed an index record directly, bypassing the put path.
    pub fn seed_index(&self, key: &str, record: IndexRecord) {
        self.index.lock().unwrap().insert(key.to_string(), record);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("injected transport failure");
        }
        Ok(())
    }
}

impl RemoteBackend for MemoryRemote {
    fn put_object(&self, key: String, bytes: Vec<u8>) -> BoxFuture<anyhow::Result<()>> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let res = self.check().map(|()| {
            self.objects.lock().unwrap().insert(key, bytes);
        });
        Box::pin(async move { res })
    }

    fn get_object(&self, key: String) -> BoxFuture<anyhow::Result<Option<Vec<u8>>>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let res = self
            .check()
            .map(|()| self.objects.lock().unwrap().get(&key).cloned());
        Box::pin(async move { res })
    }

    fn put_index(&self, key: String, record: IndexRecord) -> BoxFuture<anyhow::Result<()>> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let res = self.check().map(|()| {
            self.index.lock().unwrap().insert(key, record);
        });
        Box::pin(async move { res })
    }

    fn get_index(&self, key: String) -> BoxFuture<anyhow::Result<Option<IndexRecord>>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let res = self
            .check()
            .map(|()| self.index.lock().unwrap().get(&key).cloned());
        Box::pin(async move { res })
    }
}
