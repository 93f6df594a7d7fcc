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

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{LinePositionSpan, MethodId};

/// A span of an older method body that moved by a constant number of lines in
/// the current generation instead of receiving a fresh instruction mapping.
///
/// `span` is expressed in the older generation's coordinates and the span now
/// sits at `span + line_delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonRemappableRegion {
    /// Span in the older generation.
    pub span: LinePositionSpan,
    /// Signed line offset applied by the edit.
    pub line_delta: i32,
    /// Exception handler regions stay tracked so handler ranges can be remapped.
    pub is_exception_region: bool,
}

impl NonRemappableRegion {
    /// Create a new region.
    pub fn new(span: LinePositionSpan, line_delta: i32, is_exception_region: bool) -> Self {
        Self { span, line_delta, is_exception_region }
    }

    /// The span as it appears in the current generation.
    pub fn current_span(&self) -> LinePositionSpan {
        self.span.add_line_delta(self.line_delta)
    }

    /// Debugger-facing exception range for this region, or `None` for
    /// non-exception regions.
    ///
    /// A region whose shifted lines or inverse delta overflow `i32` cannot be
    /// published; it is logged and skipped.
    pub fn exception_region_update(&self, method: MethodId) -> Option<ExceptionRegionUpdate> {
        if !self.is_exception_region {
            return None;
        }

        let shifted = |line: i32| line.checked_add(self.line_delta);
        match (shifted(self.span.start.line), shifted(self.span.end.line), self.line_delta.checked_neg())
        {
            (Some(start_line), Some(end_line), Some(delta)) => {
                Some(ExceptionRegionUpdate { method, start_line, end_line, delta })
            }
            _ => {
                warn!(
                    %method,
                    span = ?self.span,
                    line_delta = self.line_delta,
                    "Exception region out of range, skipped"
                );
                None
            }
        }
    }
}

/// Exception handler range pushed to the debuggee after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExceptionRegionUpdate {
    /// Method owning the handler.
    pub method: MethodId,
    /// First line of the handler in the new generation.
    pub start_line: i32,
    /// Last line of the handler in the new generation.
    pub end_line: i32,
    /// Line delta converting a new line back to the old one.
    pub delta: i32,
}
