//! Repository for the `requirements` table.

use depgraph_core::config::ShardConfig;
use depgraph_core::models::Requirement;
use futures::{Stream, TryStreamExt};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::batch;
use crate::error::Result;
use crate::tables;

const REQUIREMENT_PARAMS: usize = 7;

/// Deterministic partition of requirements by a digest of their
/// `distribution_id`, so parallel reprocessors never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashModFilter {
    pub hash_alg: String,
    pub mod_base: i32,
    pub mod_filter: i32,
}

impl From<&ShardConfig> for HashModFilter {
    fn from(config: &ShardConfig) -> Self {
        Self {
            hash_alg: config.hash_alg.clone(),
            mod_base: config.mod_base,
            mod_filter: config.mod_filter,
        }
    }
}

/// Filters for streaming scans over requirements. Filters on package name,
/// version, or distribution state reach through the foreign-key joins.
#[derive(Debug, Clone, Default)]
pub struct RequirementFilter {
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub dist_package_type: Option<String>,
    pub dist_processed: Option<bool>,
    pub dependency_name: Option<String>,
    pub dependency_extras_arr_is_null: Option<bool>,
    pub hashmod: Option<HashModFilter>,
}

pub struct RequirementRepository {
    pool: PgPool,
    iter_batch_size: i64,
}

impl RequirementRepository {
    pub fn new(pool: PgPool, iter_batch_size: i64) -> Self {
        Self {
            pool,
            iter_batch_size,
        }
    }

    /// Insert requirement rows with server-generated identifiers,
    /// `on conflict do nothing`.
    pub async fn insert_requirements(&self, requirements: &[Requirement]) -> Result<()> {
        if requirements.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        self.insert_requirements_conn(&mut tx, requirements).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_requirements_conn(
        &self,
        conn: &mut PgConnection,
        requirements: &[Requirement],
    ) -> Result<()> {
        for chunk in requirements.chunks(batch::max_rows(REQUIREMENT_PARAMS)) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "insert into {} \
                 (requirement_id, distribution_id, extras, dependency_name, \
                  dependency_extras, version_constraint, dependency_extras_arr, parsable) ",
                tables::REQUIREMENTS
            ));
            builder.push_values(chunk, |mut row, requirement| {
                row.push("gen_random_uuid()");
                row.push_bind(requirement.distribution_id);
                row.push_bind(&requirement.extras);
                row.push_bind(&requirement.dependency_name);
                row.push_bind(&requirement.dependency_extras);
                row.push_bind(&requirement.version_constraint);
                row.push_bind(&requirement.dependency_extras_arr);
                row.push_bind(requirement.parsable);
            });
            builder.push(" on conflict do nothing ");
            builder.build().execute(&mut *conn).await?;
        }

        Ok(())
    }

    /// Remove a distribution's entire requirement set in one statement, so
    /// `process_distribution` can rewrite it atomically.
    pub async fn delete_requirements_of(&self, distribution_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.delete_requirements_of_conn(&mut tx, distribution_id)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_requirements_of_conn(
        &self,
        conn: &mut PgConnection,
        distribution_id: Uuid,
    ) -> Result<()> {
        let sql = format!(
            "delete from {} where distribution_id = $1",
            tables::REQUIREMENTS
        );
        sqlx::query(&sql)
            .bind(distribution_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Rewrite the derived extras fields of one requirement.
    ///
    /// Rows carrying their identifier are addressed by it; identifierless
    /// rows (from legacy message payloads) are addressed by natural key and
    /// assigned a fresh identifier on the way.
    pub async fn update_requirement(&self, requirement: &Requirement) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.update_requirement_conn(&mut tx, requirement).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn update_requirement_conn(
        &self,
        conn: &mut PgConnection,
        requirement: &Requirement,
    ) -> Result<()> {
        if let Some(requirement_id) = requirement.requirement_id {
            let sql = format!(
                "update {} set dependency_extras_arr = $1 where requirement_id = $2",
                tables::REQUIREMENTS
            );
            sqlx::query(&sql)
                .bind(&requirement.dependency_extras_arr)
                .bind(requirement_id)
                .execute(&mut *conn)
                .await?;
        } else {
            let sql = format!(
                "update {} set \
                    requirement_id = gen_random_uuid(), \
                    dependency_extras_arr = $1, \
                    extras = $2 \
                 where distribution_id = $3 \
                   and (extras = $2 or ($2 = '' and extras is null)) \
                   and dependency_name = $4 \
                   and dependency_extras = $5",
                tables::REQUIREMENTS
            );
            sqlx::query(&sql)
                .bind(&requirement.dependency_extras_arr)
                .bind(requirement.extras.as_deref().unwrap_or(""))
                .bind(requirement.distribution_id)
                .bind(&requirement.dependency_name)
                .bind(&requirement.dependency_extras)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Stream requirements matching the filter, keyset-paginated by
    /// `requirement_id`.
    pub fn stream_requirements(
        &self,
        filter: RequirementFilter,
    ) -> impl Stream<Item = Result<Requirement>> + 'static {
        let pool = self.pool.clone();
        let limit = self.iter_batch_size;
        let sql = requirements_select_sql();

        futures::stream::try_unfold(None::<Uuid>, move |cursor| {
            let pool = pool.clone();
            let sql = sql.clone();
            let filter = filter.clone();
            async move {
                let hashmod = filter.hashmod.as_ref();
                let rows = sqlx::query(&sql)
                    .bind(&filter.package_name)
                    .bind(&filter.package_version)
                    .bind(&filter.dist_package_type)
                    .bind(filter.dist_processed)
                    .bind(&filter.dependency_name)
                    .bind(filter.dependency_extras_arr_is_null)
                    .bind(hashmod.map(|h| h.hash_alg.clone()))
                    .bind(hashmod.map_or(1, |h| h.mod_base))
                    .bind(hashmod.map_or(0, |h| h.mod_filter))
                    .bind(cursor)
                    .bind(limit)
                    .fetch_all(&pool)
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }

                let mut page = Vec::with_capacity(rows.len());
                for row in &rows {
                    page.push(requirement_from_row(row)?);
                }
                let next = page.last().and_then(|requirement| requirement.requirement_id);
                Ok::<_, crate::error::StoreError>(Some((page, next)))
            }
        })
        .map_ok(|page| futures::stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
    }
}

/// The one select statement behind `stream_requirements`. The hashmod
/// predicate partitions on the first digest byte of the row's
/// `distribution_id`, entirely in SQL, so sharding stays stable across
/// processes without pulling rows.
fn requirements_select_sql() -> String {
    format!(
        "select req.requirement_id, req.distribution_id, req.extras, req.dependency_name, \
                req.dependency_extras, req.version_constraint, req.dependency_extras_arr, \
                req.parsable \
         from {requirements} req \
         left join {distributions} dist on dist.distribution_id = req.distribution_id \
         left join {versions} ver on ver.version_id = dist.version_id \
         where ($1::text is null or ver.package_name = $1) \
           and ($2::text is null or ver.package_version = $2) \
           and ($3::text is null or dist.package_type = $3) \
           and ($4::bool is null or dist.processed = $4) \
           and ($5::text is null or req.dependency_name = $5) \
           and ($6::bool is null or \
                (case when $6 then req.dependency_extras_arr is null \
                      else req.dependency_extras_arr is not null end)) \
           and ($7::text is null or \
                mod(get_byte({schema}.digest(req.distribution_id::text, $7::text), 0), $8) = $9) \
           and ($10::uuid is null or req.requirement_id > $10) \
         order by req.requirement_id \
         limit $11",
        requirements = tables::REQUIREMENTS,
        distributions = tables::DISTRIBUTIONS,
        versions = tables::VERSIONS,
        schema = depgraph_core::SCHEMA,
    )
}

fn requirement_from_row(row: &PgRow) -> Result<Requirement> {
    Ok(Requirement {
        requirement_id: row.try_get("requirement_id")?,
        distribution_id: row.try_get("distribution_id")?,
        extras: row.try_get("extras")?,
        dependency_name: row.try_get("dependency_name")?,
        dependency_extras: row.try_get("dependency_extras")?,
        version_constraint: row.try_get("version_constraint")?,
        dependency_extras_arr: row.try_get("dependency_extras_arr")?,
        parsable: row.try_get::<Option<bool>, _>("parsable")?.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_partitions_by_distribution_id_digest() {
        let sql = requirements_select_sql();
        assert!(sql.contains(
            "mod(get_byte(pypi_packages.digest(req.distribution_id::text, $7::text), 0), $8) = $9"
        ));
    }

    #[test]
    fn test_select_joins_before_filtering_joined_columns() {
        let sql = requirements_select_sql();
        let join_pos = sql.find("left join pypi_packages.distributions").unwrap();
        let filter_pos = sql.find("dist.package_type = $3").unwrap();
        assert!(join_pos < filter_pos);
        assert!(sql.contains("left join pypi_packages.versions"));
    }

    #[test]
    fn test_hashmod_filter_from_shard_config() {
        let config = ShardConfig {
            hash_alg: "md5".into(),
            mod_base: 2,
            mod_filter: 1,
        };
        let filter = HashModFilter::from(&config);
        assert_eq!(filter.hash_alg, "md5");
        assert_eq!(filter.mod_base, 2);
        assert_eq!(filter.mod_filter, 1);
    }
}
