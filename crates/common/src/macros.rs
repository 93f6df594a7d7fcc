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

//! Path-based conditional assertion macros for ENC
//!
//! Assertions that are too expensive or too strict for production builds can be
//! switched on per module through the `ENC_ASSERT` environment variable, the same
//! way `RUST_LOG` selects log targets.
//!
//! - `ENC_ASSERT=*` or `ENC_ASSERT=all` enables everything
//! - `ENC_ASSERT=enc_engine` enables the crate and all of its submodules
//! - `ENC_ASSERT=enc_engine::tracker,enc_engine::ledger` enables several targets
//!
//! When the variable is unset or empty every assertion is a no-op.
//!
//! ```ignore
//! use enc_common::{enc_assert, enc_assert_eq};
//!
//! fn merge(flags_a: u8, flags_b: u8) {
//!     enc_assert_eq!(flags_a, flags_b, "frames disagree on flags");
//! }
//! ```

use once_cell::sync::Lazy;
use std::env;

use crate::env::ENC_ASSERT;

/// Assertion targets parsed once from `ENC_ASSERT`.
static ASSERTION_TARGETS: Lazy<Vec<String>> = Lazy::new(|| match env::var(ENC_ASSERT) {
    Ok(val) => parse_targets(&val),
    Err(_) => Vec::new(),
});

fn parse_targets(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn matches_targets(targets: &[String], module_path: &str) -> bool {
    targets
        .iter()
        .any(|target| target == "*" || target == "all" || module_path.starts_with(target.as_str()))
}

/// Check if assertions are enabled for the given module path.
///
/// Returns `true` when `ENC_ASSERT` contains a wildcard or a prefix of
/// `module_path`.
pub fn is_assertion_enabled(module_path: &str) -> bool {
    matches_targets(&ASSERTION_TARGETS, module_path)
}

/// Marks the enabled-assertion branch as unlikely.
#[cold]
#[inline(never)]
pub fn cold_path() {}

/// Assert a condition only when enabled via `ENC_ASSERT`.
#[macro_export]
macro_rules! enc_assert {
    ($($arg:tt)*) => {
        if $crate::macros::is_assertion_enabled(module_path!()) {
            $crate::macros::cold_path();
            assert!($($arg)*);
        }
    };
}

/// Assert two expressions are equal only when enabled via `ENC_ASSERT`.
#[macro_export]
macro_rules! enc_assert_eq {
    ($($arg:tt)*) => {
        if $crate::macros::is_assertion_enabled(module_path!()) {
            $crate::macros::cold_path();
            assert_eq!($($arg)*);
        }
    };
}

/// Assert two expressions differ only when enabled via `ENC_ASSERT`.
#[macro_export]
macro_rules! enc_assert_ne {
    ($($arg:tt)*) => {
        if $crate::macros::is_assertion_enabled(module_path!()) {
            $crate::macros::cold_path();
            assert_ne!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets_skips_blanks() {
        let targets = parse_targets(" enc_engine , ,enc_common::types,");
        assert_eq!(targets, vec!["enc_engine".to_string(), "enc_common::types".to_string()]);
        assert!(parse_targets("").is_empty());
    }

    #[test]
    fn test_wildcards_match_everything() {
        assert!(matches_targets(&["*".to_string()], "enc_engine::ledger"));
        assert!(matches_targets(&["all".to_string()], "enc_common"));
        assert!(!matches_targets(&[], "enc_common"));
    }

    #[test]
    fn test_prefix_matching() {
        let targets = vec!["enc_engine::tracker".to_string(), "enc_common::types".to_string()];
        assert!(matches_targets(&targets, "enc_engine::tracker"));
        assert!(matches_targets(&targets, "enc_common::types::region"));
        assert!(!matches_targets(&targets, "enc_engine::ledger"));
        assert!(!matches_targets(&targets, "enc_common"));
    }

    #[test]
    fn test_macros_accept_all_syntax_variations() {
        enc_assert!(1 + 1 == 2);
        enc_assert!(true, "formatted {}", "message");
        enc_assert_eq!(3, 3);
        enc_assert_eq!(4, 4, "message");
        enc_assert_ne!(1, 2);
        enc_assert_ne!(5, 6, "formatted {}", "message");
    }
}
