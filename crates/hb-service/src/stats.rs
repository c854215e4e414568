//! Stats and heartbeat queries as seen by a requester.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use hb_core::interval::local_midnight_to_utc;
use hb_core::{
    Filters, Interval, RangeSpec, StorageError, SummaryError, User, UserId, apply_sharing,
    check_share_window,
};
use thiserror::Error;

use crate::cache::blocking;
use crate::service::SummaryService;
use crate::view::{HeartbeatsResult, StatsViewModel};

/// User reference resolved to the requesting principal.
pub const CURRENT_USER: &str = "current";

/// Errors returned by [`SummaryService::get_stats`].
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("user not found")]
    NotFound,

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("requested time range too broad")]
    Forbidden,

    #[error("internal server error")]
    Internal,
}

/// Errors returned by [`SummaryService::get_heartbeats`].
#[derive(Debug, Error)]
pub enum HeartbeatsError {
    #[error("bad date: {0}")]
    BadDate(String),

    #[error("user not found")]
    NotFound,

    #[error("not allowed to read another user's heartbeats")]
    Forbidden,

    #[error("internal server error")]
    Internal,
}

/// A stats request.
#[derive(Debug, Clone, Default)]
pub struct StatsQuery {
    /// User ID, or `current` for the principal.
    pub user: String,
    /// The authenticated requester, if any.
    pub principal: Option<UserId>,
    /// Range token; the configured default when absent.
    pub range: Option<String>,
    pub filters: Filters,
    pub recompute: bool,
}

impl StatsQuery {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn principal(mut self, principal: UserId) -> Self {
        self.principal = Some(principal);
        self
    }

    #[must_use]
    pub fn range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    #[must_use]
    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub const fn recompute(mut self, recompute: bool) -> Self {
        self.recompute = recompute;
        self
    }
}

impl SummaryService {
    /// Stats for a user over a range, redacted for the requester.
    pub async fn get_stats(&self, query: &StatsQuery) -> Result<StatsViewModel, StatsError> {
        self.get_stats_at(query, Utc::now()).await
    }

    /// Like [`get_stats`](Self::get_stats), resolving relative ranges against `now`.
    pub async fn get_stats_at(
        &self,
        query: &StatsQuery,
        now: DateTime<Utc>,
    ) -> Result<StatsViewModel, StatsError> {
        let owner = self
            .resolve_user(&query.user, query.principal.as_ref())
            .await
            .map_err(|err| internal("load user", &err))?
            .ok_or(StatsError::NotFound)?;

        let spec = match &query.range {
            Some(token) => token.parse::<RangeSpec>().map_err(range_error)?,
            None => self.config.default_range,
        };
        let first = if spec.needs_first_heartbeat() {
            let heartbeats = Arc::clone(&self.heartbeats);
            let owner_id = owner.id.clone();
            blocking(move || heartbeats.first_by_user(&owner_id))
                .await
                .map_err(|err| internal("load first heartbeat", &err))?
        } else {
            None
        };
        let interval = spec
            .resolve_at(owner.timezone, now, first)
            .map_err(range_error)?;

        check_share_window(interval.from, query.principal.as_ref(), &owner, now).map_err(
            |err| {
                tracing::debug!(user = %owner.id, error = %err, "stats request rejected");
                StatsError::Forbidden
            },
        )?;

        let summary = self
            .cache
            .get_or_build(&owner, interval, &query.filters, query.recompute)
            .await
            .map_err(|err| internal("build summary", &err))?;
        let summary = apply_sharing(summary, query.principal.as_ref(), &owner);

        tracing::debug!(
            user = %owner.id,
            range = %spec,
            total_ms = summary.total_ms,
            "served stats"
        );
        Ok(StatsViewModel::new(
            &summary,
            &owner,
            &spec.to_string(),
            &query.filters,
        ))
    }

    /// The owner's heartbeats on one local day (`YYYY-MM-DD`).
    pub async fn get_heartbeats(
        &self,
        user: &str,
        principal: Option<&UserId>,
        date: &str,
    ) -> Result<HeartbeatsResult, HeartbeatsError> {
        let owner = self
            .resolve_user(user, principal)
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "failed to load user");
                HeartbeatsError::Internal
            })?
            .ok_or(HeartbeatsError::NotFound)?;
        if principal != Some(&owner.id) {
            return Err(HeartbeatsError::Forbidden);
        }

        let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| HeartbeatsError::BadDate(date.to_string()))?;
        let interval = Interval {
            from: local_midnight_to_utc(day, owner.timezone),
            to: local_midnight_to_utc(day + Duration::days(1), owner.timezone),
        };

        let heartbeats = Arc::clone(&self.heartbeats);
        let owner_id = owner.id.clone();
        let found = blocking(move || heartbeats.all_within(&owner_id, interval.from, interval.to))
            .await
            .map_err(|err| {
                tracing::error!(user = %owner.id, error = %err, "failed to retrieve heartbeats");
                HeartbeatsError::Internal
            })?;
        Ok(HeartbeatsResult::new(&found, interval, &owner))
    }

    /// Looks up `user`, resolving `current` to the principal.
    async fn resolve_user(
        &self,
        user: &str,
        principal: Option<&UserId>,
    ) -> Result<Option<User>, StorageError> {
        let id = match principal {
            Some(principal) if user == CURRENT_USER => principal.clone(),
            _ => match UserId::new(user) {
                Ok(id) => id,
                Err(_) => return Ok(None),
            },
        };
        self.user(&id).await
    }
}

fn range_error(err: SummaryError) -> StatsError {
    match err {
        SummaryError::InvalidRange(message) => StatsError::InvalidRange(message),
        other => StatsError::InvalidRange(other.to_string()),
    }
}

fn internal(action: &str, err: &StorageError) -> StatsError {
    tracing::error!(error = %err, "failed to {action}");
    StatsError::Internal
}
