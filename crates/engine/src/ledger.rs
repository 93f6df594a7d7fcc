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

use std::collections::BTreeMap;

use enc_common::{MethodId, NonRemappableRegion};

/// Regions of old method versions that the runtime cannot remap, accumulated
/// across the edit sessions of one debug session.
///
/// Regions of a method keep the order in which they were committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NonRemappableRegionLedger {
    regions: BTreeMap<MethodId, Vec<NonRemappableRegion>>,
}

impl NonRemappableRegionLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the regions committed by one generation.
    pub fn merge(&mut self, generation: impl IntoIterator<Item = (MethodId, NonRemappableRegion)>) {
        for (method, region) in generation {
            self.regions.entry(method).or_default().push(region);
        }
    }

    /// Regions recorded for `method`, oldest first.
    pub fn regions(&self, method: &MethodId) -> &[NonRemappableRegion] {
        self.regions.get(method).map(Vec::as_slice).unwrap_or_default()
    }

    /// Exception handler regions recorded for `method`.
    pub fn exception_regions<'a>(
        &'a self,
        method: &MethodId,
    ) -> impl Iterator<Item = &'a NonRemappableRegion> + 'a {
        self.regions(method).iter().filter(|region| region.is_exception_region)
    }

    /// Whether an active statement of `method` at `line` may be remapped.
    ///
    /// Exception regions stay remappable; they only track handler ranges.
    pub fn is_remappable(&self, method: &MethodId, line: i32) -> bool {
        !self
            .regions(method)
            .iter()
            .any(|region| !region.is_exception_region && region.span.contains_line(line))
    }

    /// Methods with at least one region.
    pub fn methods(&self) -> impl Iterator<Item = &MethodId> {
        self.regions.keys()
    }

    /// Total number of regions.
    pub fn len(&self) -> usize {
        self.regions.values().map(Vec::len).sum()
    }

    /// Whether the ledger holds no region.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.regions.clear();
    }
}
