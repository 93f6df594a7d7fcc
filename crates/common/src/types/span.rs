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

use std::fmt;

use serde::{Deserialize, Serialize};

/// A zero-based (line, character) position in a source document.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LinePosition {
    /// Zero-based line number.
    pub line: i32,
    /// Zero-based character offset within the line.
    pub character: i32,
}

impl LinePosition {
    /// Create a new position.
    pub const fn new(line: i32, character: i32) -> Self {
        Self { line, character }
    }
}

/// A source range expressed in line positions. `end` is exclusive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LinePositionSpan {
    /// Start of the span.
    pub start: LinePosition,
    /// End of the span.
    pub end: LinePosition,
}

impl LinePositionSpan {
    /// Create a span from `(start_line, start_char)` to `(end_line, end_char)`.
    pub const fn new(start_line: i32, start_char: i32, end_line: i32, end_char: i32) -> Self {
        Self {
            start: LinePosition::new(start_line, start_char),
            end: LinePosition::new(end_line, end_char),
        }
    }

    /// The same span moved by `delta` lines, saturating at the `i32` bounds.
    /// Characters are unchanged.
    pub fn add_line_delta(&self, delta: i32) -> Self {
        Self {
            start: LinePosition::new(self.start.line.saturating_add(delta), self.start.character),
            end: LinePosition::new(self.end.line.saturating_add(delta), self.end.character),
        }
    }

    /// Whether `line` lies within the span's line range (inclusive on both ends).
    pub fn contains_line(&self, line: i32) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}

impl fmt::Display for LinePositionSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.start.line, self.start.character, self.end.line, self.end.character
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_line_delta_keeps_characters() {
        let span = LinePositionSpan::new(10, 0, 10, 5);
        let moved = span.add_line_delta(2);
        assert_eq!(moved, LinePositionSpan::new(12, 0, 12, 5));
        assert_eq!(moved.add_line_delta(-2), span);
    }

    #[test]
    fn test_contains_line() {
        let span = LinePositionSpan::new(3, 4, 6, 1);
        assert!(span.contains_line(3));
        assert!(span.contains_line(6));
        assert!(!span.contains_line(2));
        assert!(!span.contains_line(7));
        assert_eq!(span.to_string(), "(3,4)-(6,1)");
    }
}
