//! Serving chunk reads to the I/O dispatcher

use dashmap::DashMap;
use hoard_core::error::HoardError;
use hoard_core::utils::utc_now_micros;
use hoard_core::ChunkId;
use parking_lot::{Mutex, RwLock};
use std::io;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};

use super::InstallCache;
use crate::cas::{BlockReader, CasLocation};
use crate::encoding::{chunk_range, ChunkDecoder, DecodingParams, OffsetAndLength};
use crate::provider::ChunkInfo;
use crate::request::{BackendContext, IoBackend, IoRequest};
use crate::CacheResult;

/// Everything needed to finish one claimed request
struct ChunkRead {
    request: Arc<IoRequest>,
    info: ChunkInfo,
    location: CasLocation,
    range: OffsetAndLength,
    /// Raw bytes to produce
    size: u64,
}

impl ChunkRead {
    fn block_offset(&self) -> u64 {
        u64::from(self.location.block_offset) + self.range.offset
    }

    fn read(&self, reader: &BlockReader) -> CacheResult<Vec<u8>> {
        if self.request.is_cancelled() {
            return Err(HoardError::Cancelled);
        }
        reader.read_at(self.block_offset(), self.range.length as usize)
    }
}

/// Completion side of request handling, shared with the read tasks
pub(crate) struct RequestQueue {
    context: RwLock<Option<BackendContext>>,
    decoder: Arc<dyn ChunkDecoder>,
    in_flight: DashMap<u64, AbortHandle>,
    completed: Mutex<Vec<Arc<IoRequest>>>,
}

impl RequestQueue {
    pub(crate) fn new(decoder: Arc<dyn ChunkDecoder>) -> Self {
        Self {
            context: RwLock::new(None),
            decoder,
            in_flight: DashMap::new(),
            completed: Mutex::new(Vec::new()),
        }
    }

    fn context(&self) -> Option<BackendContext> {
        self.context.read().clone()
    }

    /// Decode the encoded bytes into the request and hand it back to the dispatcher
    fn complete(&self, read: ChunkRead, encoded: CacheResult<Vec<u8>>) {
        let ChunkRead {
            request,
            info,
            range,
            size,
            ..
        } = read;
        self.in_flight.remove(&request.id());

        let result = if request.is_cancelled() {
            Err(HoardError::Cancelled)
        } else {
            encoded.and_then(|encoded| {
                if encoded.is_empty() {
                    return Err(HoardError::ChunkRange {
                        reason: "empty read".to_string(),
                    });
                }

                let params = DecodingParams {
                    compression: info.compression,
                    encryption_key: info.encryption_key.as_ref(),
                    block_size: info.block_size,
                    total_raw_size: info.raw_size,
                    raw_offset: request.options().offset,
                    encoded_offset: range.offset,
                    encoded_block_sizes: &info.blocks,
                };
                let mut raw = vec![0u8; size as usize];
                self.decoder.decode(&params, &encoded, &mut raw)?;
                Ok(raw)
            })
        };

        match &result {
            Ok(_) => {}
            Err(HoardError::Cancelled) => debug!("Request for chunk {} was cancelled", request.chunk_id()),
            Err(e) if e.is_miss() => warn!("Chunk {} vanished from the install cache: {}", request.chunk_id(), e),
            Err(e) => error!("Failed to read chunk {}: {}", request.chunk_id(), e),
        }

        request.complete(result);
        self.completed.lock().push(request);

        if let Some(context) = self.context() {
            context.wake_up_dispatcher();
        }
    }
}

impl InstallCache {
    /// Claim a request if its chunk is cached.
    ///
    /// Returns false to decline, leaving the request to another backend.
    fn resolve(&self, request: &Arc<IoRequest>) -> bool {
        let Some(context) = self.requests.context() else {
            warn!("Install cache is not initialized, declining request {}", request.id());
            return false;
        };

        let Some(info) = self.content.installed_chunk_info(request.chunk_id()) else {
            return false;
        };

        let Some(lookup) = self.cas.find_chunk(&info.hash) else {
            return false;
        };

        let options = request.options();
        if options.offset > info.raw_size {
            debug!(
                "Read offset {} is past the end of chunk {}",
                options.offset,
                request.chunk_id()
            );
            return false;
        }
        let size = options.size.min(info.raw_size - options.offset);

        let range = match chunk_range(
            info.raw_size,
            info.block_size,
            &info.blocks,
            options.offset,
            size,
            info.is_encrypted(),
        ) {
            Ok(range) => range,
            Err(e) => {
                error!("Failed to get chunk range: {}", e);
                return false;
            }
        };

        let block_id = lookup.location.block_id;
        self.cas.track_access(block_id, utc_now_micros());

        let read = ChunkRead {
            request: request.clone(),
            info,
            location: lookup.location,
            range,
            size,
        };

        // The block still being appended to is read through a fresh handle
        if lookup.in_current_block || self.config.force_sync_io {
            let cas = self.cas.clone();
            let queue = self.requests.clone();
            context.runtime().spawn_blocking(move || {
                let encoded = cas.open_read(block_id).and_then(|reader| read.read(&reader));
                queue.complete(read, encoded);
            });
            return true;
        }

        let reader = match self.cas.open_async_read(block_id) {
            Ok(reader) => reader,
            Err(e) => {
                error!(
                    "Failed to open CAS block '{}' for async reading: {}",
                    self.cas.block_path(block_id),
                    e
                );
                return false;
            }
        };

        let offset = read.block_offset();
        let length = read.range.length as usize;
        let read_task = context.runtime().spawn(async move {
            tokio::task::spawn_blocking(move || reader.read_at(offset, length)).await
        });
        self.requests
            .in_flight
            .insert(request.id(), read_task.abort_handle());

        let queue = self.requests.clone();
        context.runtime().spawn(async move {
            let encoded = match read_task.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) | Err(e) if e.is_cancelled() => Err(HoardError::Cancelled),
                Ok(Err(e)) | Err(e) => Err(HoardError::io(
                    "CAS block read task failed",
                    io::Error::new(io::ErrorKind::Other, e.to_string()),
                )),
            };
            queue.complete(read, encoded);
        });

        true
    }
}

impl IoBackend for InstallCache {
    fn initialize(&self, context: BackendContext) {
        *self.requests.context.write() = Some(context);
    }

    fn shutdown(&self) {
        if let Err(e) = InstallCache::shutdown(self) {
            error!("Failed to journal CAS block access times: {}", e);
        }
    }

    fn resolve_io_requests(&self, requests: Vec<Arc<IoRequest>>) -> Vec<Arc<IoRequest>> {
        requests
            .into_iter()
            .filter(|request| !self.resolve(request))
            .collect()
    }

    fn completed_io_requests(&self) -> Vec<Arc<IoRequest>> {
        std::mem::take(&mut *self.requests.completed.lock())
    }

    fn cancel_io_request(&self, request: &Arc<IoRequest>) {
        request.cancel();
        if let Some((_, read)) = self.requests.in_flight.remove(&request.id()) {
            read.abort();
        }
    }

    fn update_priority_for_io_request(&self, _request: &Arc<IoRequest>) {}

    fn does_chunk_exist(&self, chunk_id: &ChunkId) -> bool {
        self.size_for_chunk(chunk_id).is_some()
    }

    fn size_for_chunk(&self, chunk_id: &ChunkId) -> Option<u64> {
        self.content
            .installed_chunk_info(chunk_id)
            .map(|info| info.raw_size)
    }
}
