//! Repository for the `candidates` table.

use depgraph_core::models::Candidate;
use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::tables;

pub struct CandidateRepository {
    pool: PgPool,
}

impl CandidateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert the candidate row for one requirement, overwriting both
    /// parallel arrays on conflict.
    pub async fn upsert_candidate(&self, candidate: &Candidate) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.upsert_candidate_conn(&mut tx, candidate).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_candidate_conn(
        &self,
        conn: &mut PgConnection,
        candidate: &Candidate,
    ) -> Result<()> {
        let sql = format!(
            "insert into {} (requirement_id, candidate_versions, candidate_version_ids) \
             values ($1, $2, $3) \
             on conflict (requirement_id) do update set \
                candidate_versions = excluded.candidate_versions, \
                candidate_version_ids = excluded.candidate_version_ids",
            tables::CANDIDATES
        );

        sqlx::query(&sql)
            .bind(candidate.requirement_id)
            .bind(&candidate.candidate_versions)
            .bind(&candidate.candidate_version_ids)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
