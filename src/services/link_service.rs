//! # Link Service
//!
//! Request-path operations: shortening, resolving a code for a redirect and
//! reading click totals.

use std::sync::Arc;

use tracing::{debug, instrument};
use validator::Validate;

use super::LinkAllocator;
use crate::{
    database::{ClickStore, LinkStore},
    error::{AppError, Result},
    models::{ClickEvent, CreateLinkRequest, Link, LinkStats, VisitorInfo},
    utils,
    workers::ClickPipeline,
};

// =====================================
// Link Service
// =====================================
#[derive(Clone)]
pub struct LinkService {
    allocator: LinkAllocator,
    links: Arc<dyn LinkStore>,
    clicks: Arc<dyn ClickStore>,
    pipeline: Arc<ClickPipeline>,
}

impl std::fmt::Debug for LinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkService")
            .field("allocator", &self.allocator)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl LinkService {
    /// Service over the given allocator, stores and click pipeline.
    #[must_use]
    pub fn new(
        allocator: LinkAllocator,
        links: Arc<dyn LinkStore>,
        clicks: Arc<dyn ClickStore>,
        pipeline: Arc<ClickPipeline>,
    ) -> Self {
        Self {
            allocator,
            links,
            clicks,
            pipeline,
        }
    }

    /// Validates the request and allocates a new link.
    ///
    /// # Errors
    /// - `Validation`: not an absolute http(s) URL, or longer than 2048 characters
    /// - anything [`LinkAllocator::create_link`] reports
    #[instrument(skip(self), fields(url = %request.long_url))]
    pub async fn create_link(&self, request: CreateLinkRequest) -> Result<Link> {
        request.validate()?;

        if !utils::is_valid_url(&request.long_url) {
            return Err(AppError::Validation(
                "URL must be an absolute http or https URL".to_string(),
            ));
        }

        self.allocator.create_link(&request.long_url).await
    }

    /// Looks up `short_code` for a redirect and records the click in the
    /// background.
    ///
    /// The click is fire-and-forget: a full queue drops it and the redirect
    /// still succeeds.
    ///
    /// # Errors
    /// - `NotFound`: no link has this code
    /// - `Store`: the lookup failed
    #[instrument(skip(self, visitor))]
    pub async fn resolve(&self, short_code: &str, visitor: VisitorInfo) -> Result<Link> {
        let link = self.find(short_code).await?;

        let outcome = self.pipeline.submit(ClickEvent::now(link.id, visitor));
        debug!(link_id = link.id, enqueued = outcome.is_enqueued(), "Redirecting");

        Ok(link)
    }

    /// The link behind `short_code` with its persisted click count.
    ///
    /// Clicks still queued are not counted.
    ///
    /// # Errors
    /// - `NotFound`: no link has this code
    /// - `Store`: a store read failed
    #[instrument(skip(self))]
    pub async fn link_stats(&self, short_code: &str) -> Result<LinkStats> {
        let link = self.find(short_code).await?;
        let total_clicks = self.clicks.count_by_link_id(link.id).await?;

        Ok(LinkStats { link, total_clicks })
    }

    async fn find(&self, short_code: &str) -> Result<Link> {
        self.links
            .find_by_short_code(short_code)
            .await?
            .ok_or_else(|| AppError::link_not_found(short_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryClickStore, MemoryLinkStore};
    use std::time::Duration;

    struct Fixture {
        service: LinkService,
        clicks: Arc<MemoryClickStore>,
        pipeline: Arc<ClickPipeline>,
    }

    fn fixture(capacity: usize) -> Fixture {
        let links = Arc::new(MemoryLinkStore::new());
        let clicks = Arc::new(MemoryClickStore::new());
        let pipeline = Arc::new(ClickPipeline::new(clicks.clone(), capacity).unwrap());
        let service = LinkService::new(
            LinkAllocator::new(links.clone()),
            links,
            clicks.clone(),
            pipeline.clone(),
        );
        Fixture {
            service,
            clicks,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_urls() {
        let f = fixture(8);

        for url in ["not a url", "ftp://example.com/file", ""] {
            let err = f
                .service
                .create_link(CreateLinkRequest::new(url))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{url}: {err}");
        }

        let too_long = format!("https://example.com/{}", "a".repeat(2048));
        let err = f
            .service
            .create_link(CreateLinkRequest::new(too_long))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_resolve_unknown_code_is_not_found() {
        let f = fixture(8);
        let err = f
            .service
            .resolve("nope42", VisitorInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(f.pipeline.stats().accepted, 0);
    }

    #[tokio::test]
    async fn test_resolve_enqueues_click_without_workers() {
        let f = fixture(8);
        let link = f
            .service
            .create_link(CreateLinkRequest::new("https://example.com/page"))
            .await
            .unwrap();

        let resolved = f
            .service
            .resolve(&link.short_code, VisitorInfo::new("curl/8.0", "10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(resolved, link);
        assert_eq!(f.pipeline.queued(), 1);
        assert!(f.clicks.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_succeeds_when_queue_is_full() {
        let f = fixture(1);
        let link = f
            .service
            .create_link(CreateLinkRequest::new("https://example.com"))
            .await
            .unwrap();

        for _ in 0..3 {
            f.service
                .resolve(&link.short_code, VisitorInfo::default())
                .await
                .unwrap();
        }

        let stats = f.pipeline.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.dropped, 2);
    }

    #[tokio::test]
    async fn test_stats_count_persisted_clicks() {
        let f = fixture(16);
        f.pipeline.start_workers(2).unwrap();

        let link = f
            .service
            .create_link(CreateLinkRequest::new("https://example.com"))
            .await
            .unwrap();

        for _ in 0..5 {
            f.service
                .resolve(&link.short_code, VisitorInfo::new("test", "127.0.0.1"))
                .await
                .unwrap();
        }

        let report = f.pipeline.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report.aborted, 0);

        let stats = f.service.link_stats(&link.short_code).await.unwrap();
        assert_eq!(stats.total_clicks, 5);
        assert_eq!(stats.link.id, link.id);
        assert_eq!(f.clicks.len(), 5);
    }
}
