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

//! Synchronous entry into the async engine.
//!
//! Host callbacks are synchronous and must not pump the host's message loop
//! while waiting, since the debugger may re-enter the engine from it. The
//! bridge blocks the calling thread on the future and rejects any nested
//! wait on the same thread.

use std::{cell::Cell, future::Future, marker::PhantomData};

use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};

thread_local! {
    static WAITING: Cell<bool> = const { Cell::new(false) };
}

/// Errors raised by [`wait_without_dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The thread is already blocked in the bridge.
    #[error("re-entrant synchronous wait on the same thread")]
    Reentrant,

    /// Blocking would stall the only thread of a current-thread runtime.
    #[error("cannot block inside a current-thread runtime")]
    CurrentThreadRuntime,
}

/// Marks the current thread as waiting until dropped, panics included.
struct WaitScope {
    _thread_bound: PhantomData<*const ()>,
}

impl WaitScope {
    fn enter() -> Result<Self, BridgeError> {
        if WAITING.with(|waiting| waiting.replace(true)) {
            return Err(BridgeError::Reentrant);
        }
        Ok(Self { _thread_bound: PhantomData })
    }
}

impl Drop for WaitScope {
    fn drop(&mut self) {
        WAITING.with(|waiting| waiting.set(false));
    }
}

/// Whether the current thread is blocked in [`wait_without_dispatch`].
pub fn is_waiting() -> bool {
    WAITING.with(Cell::get)
}

/// Block the current thread until `future` completes.
///
/// Inside a multi-thread tokio runtime the worker is handed off first so
/// other tasks keep running.
pub fn wait_without_dispatch<F: Future>(future: F) -> Result<F::Output, BridgeError> {
    let _scope = WaitScope::enter()?;

    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            Err(BridgeError::CurrentThreadRuntime)
        }
        Ok(_) => Ok(tokio::task::block_in_place(|| futures::executor::block_on(future))),
        Err(_) => Ok(futures::executor::block_on(future)),
    }
}
