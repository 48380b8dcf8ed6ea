//! API handlers.

pub mod accounts;
pub mod admin;
pub mod chats;
pub mod credits;
pub mod health;
pub mod subscriptions;
pub mod token;

use serde::Deserialize;

/// Maximum page size for list endpoints.
pub const MAX_PAGE_SIZE: usize = 100;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of items to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl PageQuery {
    /// The clamped page size.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.min(MAX_PAGE_SIZE)
    }

    /// Fetch one more than requested to determine `has_more`, then trim.
    pub(crate) fn paginate<T, E>(
        &self,
        fetch: impl FnOnce(usize, usize) -> Result<Vec<T>, E>,
    ) -> Result<(Vec<T>, bool), E> {
        let limit = self.limit();
        let mut items = fetch(limit + 1, self.offset)?;
        let has_more = items.len() > limit;
        items.truncate(limit);
        Ok((items, has_more))
    }
}
