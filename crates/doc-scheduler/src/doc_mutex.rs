use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-key exclusion so two jobs targeting the same document never run
/// concurrently (spec §4.7, testable property P8), without serializing
/// unrelated documents behind a single global lock the way a naive `Mutex`
/// around the whole queue would.
///
/// Keys are plain strings (a normalized source or a `doc_id`) rather than
/// `DocumentId` so `Add` jobs — which don't have a `DocumentId` yet — can
/// still serialize against later `Update`/`Remove` jobs for the same source.
#[derive(Default)]
pub struct DocMutex {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocMutex {
    pub fn new() -> Self {
        DocMutex::default()
    }

    fn cell(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("doc mutex map poisoned");
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Blocks until `key` is free, runs `f`, then releases. The map entry
    /// for `key` is pruned afterward if no other caller is waiting on it,
    /// so the map doesn't grow without bound over a long-running process.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let cell = self.cell(key);
        let result = {
            let _guard = cell.lock().expect("doc mutex cell poisoned");
            f()
        };
        let mut locks = self.locks.lock().expect("doc mutex map poisoned");
        if let Some(existing) = locks.get(key) {
            if Arc::strong_count(existing) <= 2 {
                locks.remove(key);
            }
        }
        result
    }

    /// Non-blocking check used by the queue's `pull` to skip jobs whose key
    /// is currently held by another worker, rather than blocking the puller.
    pub fn is_locked(&self, key: &str) -> bool {
        let locks = self.locks.lock().expect("doc mutex map poisoned");
        match locks.get(key) {
            Some(cell) => cell.try_lock().is_err(),
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_key_serializes() {
        let mutex = Arc::new(DocMutex::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let m1 = mutex.clone();
        let o1 = order.clone();
        let t1 = thread::spawn(move || {
            m1.with_lock("doc-a", || {
                thread::sleep(Duration::from_millis(30));
                o1.lock().unwrap().push(1);
            });
        });
        thread::sleep(Duration::from_millis(5));
        mutex.with_lock("doc-a", || order.lock().unwrap().push(2));
        t1.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn different_keys_do_not_block() {
        let mutex = Arc::new(DocMutex::new());
        let m2 = mutex.clone();
        let t = thread::spawn(move || {
            m2.with_lock("doc-b", || thread::sleep(Duration::from_millis(20)));
        });
        mutex.with_lock("doc-a", || {});
        t.join().unwrap();
    }

    #[test]
    fn map_entry_is_evicted_after_unlock() {
        let mutex = DocMutex::new();
        mutex.with_lock("doc-a", || {});
        assert!(!mutex.locks.lock().unwrap().contains_key("doc-a"));
    }
}
