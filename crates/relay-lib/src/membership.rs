// ============================
// relay-lib/src/membership.rs
// ============================
//! Project-membership resolution.
//!
//! The relay reads membership facts from the tracker's relational store at
//! connection time only; membership is not re-synced during a connection's
//! lifetime, so removal from a project takes effect on reconnect.

use crate::error::RelayError;
use async_trait::async_trait;
use bugtrail_common::ProjectId;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Read-only source of project-membership facts.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Distinct project identifiers the subject is a registered member of.
    /// An empty result is not an error.
    async fn projects_for(&self, subject_id: &str) -> Result<Vec<ProjectId>, RelayError>;
}

/// Membership store backed by the tracker's Postgres database.
pub struct PgMembershipStore {
    pool: PgPool,
}

impl PgMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small read-only pool. One query per connection setup, so the
    /// pool stays tiny.
    pub async fn connect(database_url: &str) -> Result<Self, RelayError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn projects_for(&self, subject_id: &str) -> Result<Vec<ProjectId>, RelayError> {
        // project_id is cast to text so the relay stays agnostic to the
        // tracker's key type (serial today).
        let projects = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT project_id::text FROM project_members WHERE user_id = $1",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(projects)
    }
}
