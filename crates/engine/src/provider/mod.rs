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

//! Contracts of the collaborators the engine drives but does not implement.
//!
//! - [`Workspace`] and [`ModuleIdentityReader`] describe the projects being debugged
//! - [`Debuggee`] enumerates suspended threads and resolves instructions to source
//! - [`ModuleMetadataProvider`] hands out metadata snapshots and symbol readers
//! - [`EditSessionAnalyzer`] and [`DeltaEmitter`] classify changes and produce deltas
//! - [`UpdateSink`], [`DiagnosticSink`] and [`FaultReporter`] receive the results

mod analysis;
pub use analysis::*;

mod debuggee;
pub use debuggee::*;

mod host;
pub use host::*;

mod metadata;
pub use metadata::*;

mod workspace;
pub use workspace::*;
