use roleguard_core::{AppError, AppResult};
use roleguard_domain::RoleBoundResource;
use serde::Serialize;

use crate::{QueryStage, ResourcePipeline, ResourceStore};

/// Largest page size a caller may request.
pub const MAX_PER_PAGE: usize = 100;

/// Page size used when the caller does not pick one.
pub const DEFAULT_PER_PAGE: usize = 20;

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    per_page: usize,
}

impl PageRequest {
    /// Creates a validated page request.
    pub fn new(page: usize, per_page: usize) -> AppResult<Self> {
        if page == 0 {
            return Err(AppError::Validation("page must be at least 1".to_owned()));
        }
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(AppError::Validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }

        Ok(Self { page, per_page })
    }

    /// Returns the one-based page number.
    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    /// Returns the page size.
    #[must_use]
    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// Number of matched resources before this page.
    #[must_use]
    pub fn skip(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// One-based page number.
    pub page: usize,
    /// Requested page size.
    pub per_page: usize,
    /// Matched items across all pages.
    pub total: u64,
    /// Number of pages needed for `total` items.
    pub total_pages: u64,
}

/// Runs a composed pipeline as one page.
///
/// The total is counted over the pipeline without sort and paging stages;
/// skip/limit are appended after every caller stage so filtered-out
/// resources never shift page boundaries.
pub async fn paginate(
    store: &dyn ResourceStore,
    pipeline: ResourcePipeline,
    request: PageRequest,
) -> AppResult<Page<RoleBoundResource>> {
    pipeline.validate()?;
    if pipeline
        .stages()
        .iter()
        .any(|stage| matches!(stage, QueryStage::Skip(_) | QueryStage::Limit(_)))
    {
        return Err(AppError::Validation(
            "paginated pipelines must not carry their own skip/limit".to_owned(),
        ));
    }

    let total = store.count_pipeline(&pipeline.counting()).await?;
    let items = store
        .run_pipeline(&pipeline.page(request.skip(), request.per_page()))
        .await?;

    let per_page = u64::try_from(request.per_page())
        .map_err(|error| AppError::Internal(format!("invalid page size: {error}")))?;

    Ok(Page {
        items,
        page: request.page(),
        per_page: request.per_page(),
        total,
        total_pages: total.div_ceil(per_page),
    })
}

#[cfg(test)]
mod tests {
    use super::PageRequest;

    #[test]
    fn page_request_rejects_zero_page() {
        assert!(PageRequest::new(0, 10).is_err());
    }

    #[test]
    fn page_request_rejects_oversized_pages() {
        assert!(PageRequest::new(1, 101).is_err());
        assert!(PageRequest::new(1, 0).is_err());
    }

    #[test]
    fn skip_counts_previous_pages() {
        let request = PageRequest::new(3, 25).unwrap_or_default();
        assert_eq!(request.skip(), 50);
    }
}
