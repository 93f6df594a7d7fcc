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

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use enc_common::ModuleId;
use thiserror::Error;

use crate::affinity::{AffinityError, ReaderContext};

/// Errors raised while reading symbols.
#[derive(Debug, Error)]
pub enum SymbolError {
    /// The reader was released with its module.
    #[error("symbol reader has been released")]
    Released,

    /// The reader failed to produce the requested information.
    #[error("symbol read failed: {0}")]
    Read(String),

    /// The reader worker is unavailable.
    #[error(transparent)]
    Affinity(#[from] AffinityError),
}

/// Errors raised by a [`ModuleMetadataProvider`].
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The module is loaded but its metadata cannot be read.
    #[error("metadata not available: {0}")]
    Unavailable(String),
}

/// Per-method debug information the emitter needs to map locals across generations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodDebugInfo {
    /// Names of local slots in slot order.
    pub local_slots: Vec<String>,
    /// Lambda ordinals declared in the method.
    pub lambda_ordinals: Vec<i32>,
    /// Closure ordinals declared in the method.
    pub closure_ordinals: Vec<i32>,
}

/// Symbols in the portable format: plain data, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct PortableSymbols {
    methods: HashMap<u32, MethodDebugInfo>,
}

impl PortableSymbols {
    /// Empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the debug info of a method.
    pub fn insert(&mut self, method_token: u32, info: MethodDebugInfo) {
        self.methods.insert(method_token, info);
    }

    /// Debug info of a method, if the symbols describe it.
    pub fn method_debug_info(&self, method_token: u32) -> Option<&MethodDebugInfo> {
        self.methods.get(&method_token)
    }
}

/// A symbol reader in the native format.
///
/// Native readers are bound to the thread that created them. They are built
/// and queried on the reader worker only, which the [`ReaderContext`]
/// argument witnesses. Hosts must not touch the underlying reader from any
/// other thread (in particular their UI thread) while the engine owns it.
pub trait NativeSymbolReader {
    /// Debug info of a method, if the symbols describe it.
    fn method_debug_info(
        &mut self,
        cx: &ReaderContext,
        method_token: u32,
    ) -> Result<Option<MethodDebugInfo>, SymbolError>;
}

/// Builds a native reader on the reader worker.
pub type NativeReaderFactory =
    Box<dyn FnOnce(&ReaderContext) -> Result<Box<dyn NativeSymbolReader>, SymbolError> + Send>;

/// Where a module's symbols come from.
pub enum SymbolSource {
    /// The module has no symbols.
    None,
    /// Portable symbols.
    Portable(Arc<PortableSymbols>),
    /// A native reader that must live on the reader worker.
    Native(NativeReaderFactory),
}

impl fmt::Debug for SymbolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Portable(symbols) => f.debug_tuple("Portable").field(symbols).finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// Read-only view of a loaded module's metadata.
///
/// The bytes are owned by the provider; the view goes dead once the
/// provider releases them on module unload.
#[derive(Debug, Clone)]
pub struct MetadataSnapshot {
    bytes: Weak<[u8]>,
}

impl MetadataSnapshot {
    /// View over bytes owned by the provider.
    pub fn new(owner: &Arc<[u8]>) -> Self {
        Self { bytes: Arc::downgrade(owner) }
    }

    /// Whether the provider still holds the bytes.
    pub fn is_alive(&self) -> bool {
        self.bytes.strong_count() > 0
    }

    /// The metadata bytes, or `None` once released.
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.bytes.upgrade()
    }
}

/// What the provider knows about a loaded module.
#[derive(Debug)]
pub struct BaselineModuleInfo {
    /// Metadata of the loaded image.
    pub metadata: MetadataSnapshot,
    /// Symbols of the loaded image.
    pub symbols: SymbolSource,
}

/// Invoked once when the debuggee unloads a module.
pub type UnloadCallback = Box<dyn FnOnce() + Send>;

/// Runtime-provided access to loaded module metadata.
pub trait ModuleMetadataProvider: Send + Sync {
    /// Metadata and symbols of a loaded module; `Ok(None)` if it is not loaded.
    fn try_get_baseline_module_info(
        &self,
        module: ModuleId,
    ) -> Result<Option<BaselineModuleInfo>, MetadataError>;

    /// Register `callback` to run when `module` unloads.
    fn on_module_unloaded(&self, module: ModuleId, callback: UnloadCallback);
}
