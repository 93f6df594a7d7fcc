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
//! ENC Common - Shared functionality for ENC components
//!
//! This crate provides the value types exchanged between the edit-and-continue
//! engine and its collaborators (module identities, source spans, active
//! statements, non-remappable regions, deltas and diagnostics), together with
//! logging setup and runtime-gated assertion macros.

/// Common types used throughout the ENC ecosystem
pub mod types;

/// Environment variable names recognised by ENC components
pub mod env;
/// Logging setup and utilities for consistent logging across ENC components
pub mod logging;
/// Path-based conditional assertion macros
#[macro_use]
pub mod macros;

pub use logging::*;
pub use types::*;
