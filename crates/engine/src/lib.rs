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

// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
// SPDX-License-Identifier: AGPL-3.0
//! ENC Engine - Edit-and-continue core
//!
//! This crate coordinates applying source edits to a suspended program:
//! it tracks which projects are running or suspended, caches the metadata
//! and symbols of loaded modules, collects the statements each thread is
//! stopped at, and drives the analyze, emit and commit cycle of every delta.
//!
//! The debugger, compiler and runtime are external collaborators described
//! by the traits in [`provider`].

/// Dedicated worker thread for thread-bound native symbol readers
pub mod affinity;
pub use affinity::*;

/// Single-flight cache of module metadata and symbols
pub mod baseline;
pub use baseline::*;

/// Blocking bridge from synchronous host call-ins to async internals
pub mod bridge;
pub use bridge::*;

/// Engine configuration
pub mod config;
pub use config::*;

/// Analyze, emit and commit of deltas per module
pub mod coordinator;
pub use coordinator::*;

/// In-memory diagnostics store
pub mod diagnostics;
pub use diagnostics::*;

/// Status-code facade for the host debugger
pub mod host;
pub use host::*;

/// Accumulated non-remappable regions
pub mod ledger;
pub use ledger::*;

/// Collaborator contracts
pub mod provider;
pub use provider::*;

/// Debug session state machine and edit sessions
pub mod session;
pub use session::*;

/// Active statement collection
pub mod tracker;
pub use tracker::*;
