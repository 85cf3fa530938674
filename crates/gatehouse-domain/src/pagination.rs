//! Page selection for list operations.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 25;
pub const MAX_PER_PAGE: u32 = 100;

/// One-based page selection. Out-of-range values are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub per_page: u32,
    pub page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            page: 1,
        }
    }
}

impl PageRequest {
    /// `per_page` into `1..=MAX_PER_PAGE`, `page` to at least 1.
    pub fn clamped(self) -> Self {
        Self {
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
            page: self.page.max(1),
        }
    }

    /// Rows to skip.
    pub fn offset(self) -> usize {
        let Self { per_page, page } = self.clamped();
        (page as usize - 1) * per_page as usize
    }

    /// Rows to take.
    pub fn limit(self) -> usize {
        self.clamped().per_page as usize
    }
}
