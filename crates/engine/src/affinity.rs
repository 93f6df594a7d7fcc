// ENC - Edit-and-Continue Engine
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Dedicated worker thread for thread-bound native symbol readers.
//!
//! Native readers must be created, used and released on one thread. The
//! [`ReaderWorker`] owns that thread; everything else talks to it through a
//! channel and gets answers back on oneshot channels. Readers never leave
//! the worker, so they need not be `Send`.

use std::{
    cell::Cell,
    collections::HashMap,
    fmt, io,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::provider::{MethodDebugInfo, NativeReaderFactory, NativeSymbolReader, SymbolError};

thread_local! {
    static ON_READER_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Errors talking to the reader worker.
#[derive(Debug, Error)]
pub enum AffinityError {
    /// The worker thread could not be started.
    #[error("failed to spawn symbol reader worker: {0}")]
    Spawn(#[source] io::Error),

    /// The worker thread is gone.
    #[error("symbol reader worker has shut down")]
    WorkerGone,
}

/// Witness that the current code runs on the reader worker.
///
/// Only the worker can build one, and it is neither `Send` nor `Sync`.
pub struct ReaderContext {
    _thread_bound: PhantomData<*const ()>,
}

impl ReaderContext {
    fn new() -> Self {
        Self { _thread_bound: PhantomData }
    }
}

impl fmt::Debug for ReaderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReaderContext")
    }
}

/// Readers living on the worker, keyed by slot.
#[derive(Default)]
struct ReaderTable {
    readers: HashMap<u64, Box<dyn NativeSymbolReader>>,
}

/// Work item sent to the reader worker
type Work = Box<dyn FnOnce(&mut ReaderTable, &ReaderContext) + Send>;

/// Handle to the reader worker thread.
///
/// The thread exits once the worker and every [`NativeReaderHandle`] have
/// been dropped.
pub struct ReaderWorker {
    tx: mpsc::UnboundedSender<Work>,
    next_slot: AtomicU64,
    name: String,
}

impl fmt::Debug for ReaderWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderWorker").field("name", &self.name).finish_non_exhaustive()
    }
}

impl ReaderWorker {
    /// Start the worker thread.
    pub fn spawn(name: impl Into<String>) -> Result<Arc<Self>, AffinityError> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Work>();

        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                ON_READER_WORKER.with(|flag| flag.set(true));
                let cx = ReaderContext::new();
                let mut table = ReaderTable::default();

                info!("Symbol reader worker started");
                while let Some(work) = rx.blocking_recv() {
                    work(&mut table, &cx);
                }

                // Release leftovers here, on the thread that created them.
                let leftover = table.readers.len();
                drop(table);
                info!(leftover, "Symbol reader worker shutting down");
            })
            .map_err(AffinityError::Spawn)?;

        Ok(Arc::new(Self { tx, next_slot: AtomicU64::new(0), name }))
    }

    /// Whether the calling thread is a reader worker.
    pub fn is_current_thread() -> bool {
        ON_READER_WORKER.with(Cell::get)
    }

    /// Run `f` on the worker and wait for its result.
    pub async fn run<R, F>(&self, f: F) -> Result<R, AffinityError>
    where
        R: Send + 'static,
        F: FnOnce(&ReaderContext) -> R + Send + 'static,
    {
        let (rsp, rx) = oneshot::channel();
        self.send(Box::new(move |_, cx| {
            // Ignore if the caller stopped waiting.
            let _ = rsp.send(f(cx));
        }))?;
        rx.await.map_err(|_| AffinityError::WorkerGone)
    }

    /// Build a native reader on the worker and keep it there.
    pub async fn install(
        self: &Arc<Self>,
        factory: NativeReaderFactory,
    ) -> Result<NativeReaderHandle, SymbolError> {
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed);
        // Owns the slot from here on. If this future is dropped at any await,
        // its release job is queued behind the install job.
        let handle = NativeReaderHandle { worker: Arc::clone(self), slot };
        let (rsp, rx) = oneshot::channel();

        self.send(Box::new(move |table, cx| {
            let outcome = factory(cx).map(|reader| {
                table.readers.insert(slot, reader);
            });
            let _ = rsp.send(outcome);
        }))?;

        rx.await.map_err(|_| AffinityError::WorkerGone)??;
        debug!(slot, "Installed native symbol reader");
        Ok(handle)
    }

    fn send(&self, work: Work) -> Result<(), AffinityError> {
        self.tx.send(work).map_err(|_| AffinityError::WorkerGone)
    }
}

/// Owner of one native reader living on the worker.
///
/// Dropping the handle releases the reader on the worker thread.
#[derive(Debug)]
pub struct NativeReaderHandle {
    worker: Arc<ReaderWorker>,
    slot: u64,
}

impl NativeReaderHandle {
    /// Query the debug info of a method.
    ///
    /// The request is queued immediately; the returned future only waits for
    /// the answer.
    pub fn method_debug_info(
        &self,
        method_token: u32,
    ) -> impl std::future::Future<Output = Result<Option<MethodDebugInfo>, SymbolError>> + Send + 'static
    {
        let slot = self.slot;
        let (rsp, rx) = oneshot::channel();
        let queued = self.worker.send(Box::new(move |table, cx| {
            let outcome = match table.readers.get_mut(&slot) {
                Some(reader) => reader.method_debug_info(cx, method_token),
                None => Err(SymbolError::Released),
            };
            let _ = rsp.send(outcome);
        }));

        async move {
            queued?;
            rx.await.map_err(|_| SymbolError::from(AffinityError::WorkerGone))?
        }
    }
}

impl Drop for NativeReaderHandle {
    fn drop(&mut self) {
        let slot = self.slot;
        let released = self.worker.send(Box::new(move |table, _| {
            if table.readers.remove(&slot).is_some() {
                debug!(slot, "Released native symbol reader");
            }
        }));
        if released.is_err() {
            warn!(slot, "Symbol reader worker gone before reader release");
        }
    }
}
