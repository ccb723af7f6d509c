//! # Listing Queries
//!
//! Paging and filter parameters for list endpoints, and the [`Listing`]
//! envelope returned by them.

use crate::primitives::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded window into an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Page {
    /// Build a page from optional request parameters.
    ///
    /// A missing or zero `limit` falls back to `DEFAULT_PAGE_SIZE`;
    /// anything above `MAX_PAGE_SIZE` is clamped.
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        let limit = match limit {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(n) => n.min(MAX_PAGE_SIZE),
        };
        Self {
            limit,
            offset: offset.unwrap_or(0),
        }
    }

    /// Cut this page out of an already ordered result set.
    pub fn apply<T>(self, items: Vec<T>) -> Listing<T> {
        let total = items.len();
        let items = items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect();
        Listing {
            items,
            total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// One page of a list result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    /// Number of rows matching the filter, across all pages.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

// =============================================================================
// FILTERS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementFilter {
    /// Case-insensitive exact match.
    pub category: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryFilter {
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    pub visitor_id: Option<Uuid>,
}
