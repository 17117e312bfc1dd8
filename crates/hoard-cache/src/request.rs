//! I/O request model shared between the dispatcher and its backends

use hoard_core::ChunkId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::CacheResult;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Byte range of a chunk to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub offset: u64,
    pub size: u64,
}

impl ReadOptions {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// The whole chunk
    pub fn whole() -> Self {
        Self::new(0, u64::MAX)
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::whole()
    }
}

/// A read of one chunk, owned jointly by the dispatcher and the backend serving it
#[derive(Debug)]
pub struct IoRequest {
    id: u64,
    chunk_id: ChunkId,
    options: ReadOptions,
    priority: AtomicI32,
    cancelled: AtomicBool,
    result: Mutex<Option<CacheResult<Vec<u8>>>>,
}

impl IoRequest {
    pub fn new(chunk_id: ChunkId, options: ReadOptions) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            chunk_id,
            options,
            priority: AtomicI32::new(0),
            cancelled: AtomicBool::new(false),
            result: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn chunk_id(&self) -> &ChunkId {
        &self.chunk_id
    }

    pub fn options(&self) -> ReadOptions {
        self.options
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn complete(&self, result: CacheResult<Vec<u8>>) {
        *self.result.lock() = Some(result);
    }

    pub fn is_completed(&self) -> bool {
        self.result.lock().is_some()
    }

    /// Take the decoded bytes or the failure, once
    pub fn take_result(&self) -> Option<CacheResult<Vec<u8>>> {
        self.result.lock().take()
    }
}

/// Runtime facilities a backend gets from the dispatcher
#[derive(Clone)]
pub struct BackendContext {
    runtime: Handle,
    wake_up: Arc<dyn Fn() + Send + Sync>,
}

impl BackendContext {
    pub fn new(runtime: Handle, wake_up: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            runtime,
            wake_up: Arc::new(wake_up),
        }
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Tell the dispatcher that completed requests are waiting
    pub fn wake_up_dispatcher(&self) {
        (self.wake_up)();
    }
}

impl fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendContext").finish_non_exhaustive()
    }
}

/// A source of chunk reads behind the I/O dispatcher
pub trait IoBackend: Send + Sync {
    fn initialize(&self, context: BackendContext);

    fn shutdown(&self);

    /// Claim what this backend can serve; the rest is returned unresolved
    fn resolve_io_requests(&self, requests: Vec<Arc<IoRequest>>) -> Vec<Arc<IoRequest>>;

    /// Drain requests completed since the last call
    fn completed_io_requests(&self) -> Vec<Arc<IoRequest>>;

    fn cancel_io_request(&self, request: &Arc<IoRequest>);

    fn update_priority_for_io_request(&self, request: &Arc<IoRequest>);

    fn does_chunk_exist(&self, chunk_id: &ChunkId) -> bool;

    /// Raw size of a chunk, `None` when unknown
    fn size_for_chunk(&self, chunk_id: &ChunkId) -> Option<u64>;
}
