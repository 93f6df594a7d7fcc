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

//! Environment variable name constants for ENC configuration.
//!
//! - [`ENC_ASSERT`] - Controls selective runtime assertion macros
//! - [`ENC_CONFIG`] - Overrides the engine configuration file location

/// Environment variable for controlling selective runtime assertions.
///
/// # Syntax
///
/// - `ENC_ASSERT=*` or `ENC_ASSERT=all` - Enable all assertions
/// - `ENC_ASSERT=enc_engine` - Enable assertions in the `enc_engine` crate and submodules
/// - `ENC_ASSERT=enc_engine::tracker,enc_common::types` - Multiple targets (comma-separated)
///
/// When not set or empty, all assertions are **disabled**.
///
/// See [`crate::macros`] for the assertion macros that use this variable.
pub const ENC_ASSERT: &str = "ENC_ASSERT";

/// Environment variable pointing at a TOML engine configuration file.
///
/// When unset, the engine looks for `enc/config.toml` under the platform
/// configuration directory and falls back to built-in defaults.
pub const ENC_CONFIG: &str = "ENC_CONFIG";
