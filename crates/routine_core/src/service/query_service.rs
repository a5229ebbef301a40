//! Occurrence query use-case service.
//!
//! # Invariants
//! - Ranges are half-open `[from, to)` and must not be empty.
//! - Page requests are normalized against `PaginationConfig` before they
//!   reach the repository.

use crate::config::PaginationConfig;
use crate::model::participant::ParticipantKey;
use crate::model::routine::Routine;
use crate::repo::routine_repo::{Page, PageRequest, PageWindow, RoutineRepository, UpcomingQuery};
use crate::service::context::ServiceEnv;
use crate::service::routine_service::RoutineServiceError;
use log::debug;

/// Read-only listing service.
pub struct QueryService<R: RoutineRepository> {
    repo: R,
    env: ServiceEnv,
}

impl<R: RoutineRepository> QueryService<R> {
    pub fn new(repo: R, env: ServiceEnv) -> Self {
        Self { repo, env }
    }

    /// Lists routines whose next occurrence falls inside the query range.
    pub fn find_upcoming(&self, query: &UpcomingQuery) -> Result<Page<Routine>, RoutineServiceError> {
        if query.from >= query.to {
            return Err(RoutineServiceError::InvalidRange {
                from: query.from,
                to: query.to,
            });
        }
        let window = page_window(&self.env.config.pagination, query.page);
        let page = self.repo.find_upcoming(query, window)?;
        debug!(
            "event=routine_find_upcoming module=service status=ok status_filter={} page={} items={} total={}",
            query.status,
            page.page,
            page.items.len(),
            page.total_items
        );
        Ok(page)
    }

    /// Lists routines one participant belongs to, soonest first; routines
    /// without a next occurrence come last.
    pub fn find_for_participant(
        &self,
        key: ParticipantKey,
        page: PageRequest,
    ) -> Result<Page<Routine>, RoutineServiceError> {
        let window = page_window(&self.env.config.pagination, page);
        Ok(self.repo.find_for_participant(key, window)?)
    }
}

/// Clamps a caller page request to the configured policy.
pub fn page_window(config: &PaginationConfig, request: PageRequest) -> PageWindow {
    let page_size = request
        .page_size
        .unwrap_or(config.default_page_size)
        .clamp(1, config.max_page_size.max(1));
    PageWindow {
        page: request.page.max(1),
        page_size,
    }
}

#[cfg(test)]
mod tests {
    use super::page_window;
    use crate::config::PaginationConfig;
    use crate::repo::routine_repo::{PageRequest, PageWindow};

    #[test]
    fn page_window_applies_defaults_and_bounds() {
        let config = PaginationConfig::default();
        assert_eq!(
            page_window(&config, PageRequest::default()),
            PageWindow {
                page: 1,
                page_size: 20
            }
        );
        assert_eq!(
            page_window(&config, PageRequest::new(0, 1000)),
            PageWindow {
                page: 1,
                page_size: 100
            }
        );
        assert_eq!(page_window(&config, PageRequest::new(3, 0)).page_size, 1);
    }
}
