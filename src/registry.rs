use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use hyper::HeaderMap;
use hyper::StatusCode;
use tokio::sync::MutexGuard;
use tokio::sync::watch;

/// One in-flight upstream download. While an entry exists in the registry,
/// exactly one writer appends to `tmp_path`; any number of tailing readers
/// may hold open descriptors on it.
#[derive(Clone, Debug)]
pub(crate) struct DownloadHandle {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) tmp_path: PathBuf,
    pub(crate) done: watch::Receiver<bool>,
}

/// Writer side of a handle's completion signal. Fired exactly once, strictly
/// after the temporary file has been flushed and closed, so a tailer that
/// observes it can read the remaining bytes to a true EOF.
#[derive(Debug)]
pub(crate) struct DoneSignal(watch::Sender<bool>);

impl DoneSignal {
    pub(crate) fn signal(self) {
        /* receivers may all be gone already */
        let _ = self.0.send(true);
    }
}

pub(crate) fn done_channel() -> (DoneSignal, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (DoneSignal(tx), rx)
}

pub(crate) type RegistryGuard<'a> = MutexGuard<'a, HashMap<PathBuf, DownloadHandle>>;

/// Map of cache key to in-flight download, guarded by a single mutex.
///
/// The engine holds the lock from lookup through upstream header exchange,
/// temp-file creation and registration; that window is what guarantees a
/// single upstream request per cache key. No body bytes flow under the lock.
#[derive(Clone, Debug)]
pub(crate) struct Registry {
    inner: Arc<tokio::sync::Mutex<HashMap<PathBuf, DownloadHandle>>>,
}

impl Registry {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    pub(crate) async fn lock(&self) -> RegistryGuard<'_> {
        self.inner.lock().await
    }

    pub(crate) async fn unregister(&self, key: &Path) {
        let was_present = self.inner.lock().await.remove(key);
        debug_assert!(was_present.is_some());
    }
}

pub(crate) fn register(guard: &mut RegistryGuard<'_>, key: PathBuf, handle: DownloadHandle) {
    let previous = guard.insert(key, handle);
    debug_assert!(previous.is_none(), "download already in flight for key");
}
