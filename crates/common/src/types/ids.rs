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

use std::{fmt, str::FromStr};

use derive_more::{Display, From};
use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};

/// Module version identifier (MVID): a 16-byte GUID that distinguishes one
/// compiled module from every other build of it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub [u8; 16]);

impl ModuleId {
    /// Create a module id from its raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The raw GUID bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = hex::encode(self.0);
        write!(f, "{}-{}-{}-{}-{}", &h[0..8], &h[8..12], &h[12..16], &h[16..20], &h[20..32])
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({self})")
    }
}

impl FromStr for ModuleId {
    type Err = Error;

    /// Parses `aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee`, optionally wrapped in
    /// braces, or the 32 hex digits without separators.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);
        let digits: String = inner.chars().filter(|c| *c != '-').collect();
        if digits.len() != 32 {
            bail!("Invalid module id, expected 32 hex digits: {s}");
        }

        let mut bytes = [0u8; 16];
        hex::decode_to_slice(&digits, &mut bytes).map_err(|e| eyre!("Invalid module id: {e}"))?;
        Ok(Self(bytes))
    }
}

/// Host-assigned identifier of a participating project.
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("project#{_0}")]
pub struct ProjectId(pub u32);

/// Identifier of one debug session (Run → Design lifetime).
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("debug-session#{_0}")]
pub struct DebugSessionId(pub u64);

/// Identifier of one edit session (one break-state period).
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("edit-session#{_0}")]
pub struct EditSessionId(pub u64);

/// Operating-system thread identity reported by the debuggee.
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("thread#{_0}")]
pub struct ThreadId(pub u64);

/// Debuggee process identity.
#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("process#{_0}")]
pub struct ProcessId(pub u32);

/// A specific version of a method body within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId {
    /// Module that defines the method.
    pub module: ModuleId,
    /// Metadata token of the method definition (`0x06xxxxxx`).
    pub token: u32,
    /// Edit generation of the method body; version 1 is the originally compiled body.
    pub version: u32,
}

impl MethodId {
    /// Create a new method id.
    pub fn new(module: ModuleId, token: u32, version: u32) -> Self {
        Self { module, token, version }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:08x}v{}", self.module, self.token, self.version)
    }
}

/// Identifies a suspended instruction: a method version plus an IL offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstructionId {
    /// Method version containing the instruction.
    pub method: MethodId,
    /// IL offset of the instruction within the method body.
    pub il_offset: u32,
}

impl InstructionId {
    /// Create a new instruction id.
    pub fn new(method: MethodId, il_offset: u32) -> Self {
        Self { method, il_offset }
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+IL_{:04x}", self.method, self.il_offset)
    }
}
