//! Repository for the `distributions` table.

use depgraph_core::models::Distribution;
use futures::{Stream, TryStreamExt};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::batch;
use crate::error::{Result, StoreError};
use crate::tables;

const DISTRIBUTION_PARAMS: usize = 8;

const SELECT_COLUMNS: &str = "distribution_id, version_id, package_type, python_version, \
     requires_python, upload_time, yanked, package_filename, package_url, \
     processed, metadata_file_size";

/// Filters for streaming scans over distributions.
#[derive(Debug, Clone, Default)]
pub struct DistributionFilter {
    pub processed: Option<bool>,
    pub package_name: Option<String>,
    pub only_bdist_wheel: bool,
}

pub struct DistributionRepository {
    pool: PgPool,
    iter_batch_size: i64,
}

impl DistributionRepository {
    pub fn new(pool: PgPool, iter_batch_size: i64) -> Self {
        Self {
            pool,
            iter_batch_size,
        }
    }

    /// Insert-only: a distribution row is never overwritten from enumeration.
    /// With `return_inserted`, the newly inserted rows come back with their
    /// generated `distribution_id`s for downstream publishing.
    pub async fn insert_distributions(
        &self,
        distributions: &[Distribution],
        return_inserted: bool,
    ) -> Result<Vec<Distribution>> {
        if distributions.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let inserted = self
            .insert_distributions_conn(&mut tx, distributions, return_inserted)
            .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn insert_distributions_conn(
        &self,
        conn: &mut PgConnection,
        distributions: &[Distribution],
        return_inserted: bool,
    ) -> Result<Vec<Distribution>> {
        let mut inserted = Vec::new();

        for chunk in distributions.chunks(batch::max_rows(DISTRIBUTION_PARAMS)) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "insert into {} \
                 (version_id, package_type, python_version, requires_python, \
                  upload_time, yanked, package_filename, package_url) ",
                tables::DISTRIBUTIONS
            ));
            builder.push_values(chunk, |mut row, distribution| {
                row.push_bind(distribution.version_id);
                row.push_bind(&distribution.package_type);
                row.push_bind(&distribution.python_version);
                row.push_bind(&distribution.requires_python);
                row.push_bind(distribution.upload_time);
                row.push_bind(distribution.yanked);
                row.push_bind(&distribution.package_filename);
                row.push_bind(&distribution.package_url);
            });
            builder.push(" on conflict do nothing ");

            if return_inserted {
                builder.push(format!(" returning {SELECT_COLUMNS} "));
                let rows = builder.build().fetch_all(&mut *conn).await?;
                for row in &rows {
                    inserted.push(distribution_from_row(row)?);
                }
            } else {
                builder.build().execute(&mut *conn).await?;
            }
        }

        Ok(inserted)
    }

    /// The only mutation a distribution sees: flipping `processed` and
    /// recording the metadata size. A `None` size preserves the stored value.
    pub async fn update_distributions(&self, distributions: &[Distribution]) -> Result<()> {
        if distributions.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        self.update_distributions_conn(&mut tx, distributions).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn update_distributions_conn(
        &self,
        conn: &mut PgConnection,
        distributions: &[Distribution],
    ) -> Result<()> {
        let sql = format!(
            "update {} set \
                processed = $1, \
                metadata_file_size = coalesce($2, metadata_file_size) \
             where distribution_id = $3",
            tables::DISTRIBUTIONS
        );

        for distribution in distributions {
            let distribution_id = distribution.distribution_id.ok_or(StoreError::MissingId {
                entity: "distribution",
            })?;
            sqlx::query(&sql)
                .bind(distribution.processed)
                .bind(distribution.metadata_file_size)
                .bind(distribution_id)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Stream distributions matching the filter, keyset-paginated by
    /// `distribution_id`.
    pub fn stream_distributions(
        &self,
        filter: DistributionFilter,
    ) -> impl Stream<Item = Result<Distribution>> + 'static {
        let pool = self.pool.clone();
        let limit = self.iter_batch_size;
        let sql = format!(
            "select vd.distribution_id, vd.version_id, vd.package_type, vd.python_version, \
                    vd.requires_python, vd.upload_time, vd.yanked, vd.package_filename, \
                    vd.package_url, vd.processed, vd.metadata_file_size \
             from {} vd \
             left join {} kv on kv.version_id = vd.version_id \
             where ($1::bool is null or vd.processed = $1) \
               and ($2::text is null or kv.package_name = $2) \
               and (not $3 or vd.package_type = 'bdist_wheel') \
               and ($4::uuid is null or vd.distribution_id > $4) \
             order by vd.distribution_id \
             limit $5",
            tables::DISTRIBUTIONS,
            tables::VERSIONS
        );

        futures::stream::try_unfold(None::<Uuid>, move |cursor| {
            let pool = pool.clone();
            let sql = sql.clone();
            let filter = filter.clone();
            async move {
                let rows = sqlx::query(&sql)
                    .bind(filter.processed)
                    .bind(&filter.package_name)
                    .bind(filter.only_bdist_wheel)
                    .bind(cursor)
                    .bind(limit)
                    .fetch_all(&pool)
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }

                let mut page = Vec::with_capacity(rows.len());
                for row in &rows {
                    page.push(distribution_from_row(row)?);
                }
                let next = page.last().and_then(|distribution| distribution.distribution_id);
                Ok::<_, StoreError>(Some((page, next)))
            }
        })
        .map_ok(|page| futures::stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
    }
}

fn distribution_from_row(row: &PgRow) -> Result<Distribution> {
    Ok(Distribution {
        distribution_id: row.try_get("distribution_id")?,
        version_id: row.try_get("version_id")?,
        package_type: row.try_get("package_type")?,
        python_version: row.try_get("python_version")?,
        requires_python: row.try_get("requires_python")?,
        upload_time: row.try_get("upload_time")?,
        yanked: row.try_get("yanked")?,
        package_filename: row.try_get("package_filename")?,
        package_url: row.try_get("package_url")?,
        processed: row.try_get("processed")?,
        metadata_file_size: row.try_get("metadata_file_size")?,
    })
}
