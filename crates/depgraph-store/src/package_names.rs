//! Repository for the `package_names` table.

use chrono::{DateTime, Utc};
use depgraph_core::canonicalize_name;
use depgraph_core::models::PackageName;
use futures::{Stream, TryStreamExt};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use crate::batch;
use crate::error::Result;
use crate::tables;

/// Parameters per row when inserting full records.
const RECORD_PARAMS: usize = 3;
/// Parameters per row when inserting bare names.
const NAME_PARAMS: usize = 1;

const SELECT_COLUMNS: &str = "package_name, date_discovered, date_last_checked";

pub struct PackageNameRepository {
    pool: PgPool,
    iter_batch_size: i64,
}

impl PackageNameRepository {
    pub fn new(pool: PgPool, iter_batch_size: i64) -> Self {
        Self {
            pool,
            iter_batch_size,
        }
    }

    /// Insert bare names, canonicalized, `on conflict do nothing`. With
    /// `return_inserted`, returns the subset that was actually new so the
    /// caller can feed it back to the broker.
    pub async fn insert_names(
        &self,
        names: &[String],
        return_inserted: bool,
    ) -> Result<Vec<PackageName>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let inserted = self.insert_names_conn(&mut tx, names, return_inserted).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn insert_names_conn(
        &self,
        conn: &mut PgConnection,
        names: &[String],
        return_inserted: bool,
    ) -> Result<Vec<PackageName>> {
        let mut inserted = Vec::new();

        for chunk in names.chunks(batch::max_rows(NAME_PARAMS)) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "insert into {} (package_name) ",
                tables::PACKAGE_NAMES
            ));
            builder.push_values(chunk, |mut row, name| {
                row.push_bind(canonicalize_name(name));
            });
            builder.push(" on conflict do nothing ");

            if return_inserted {
                builder.push(format!(" returning {SELECT_COLUMNS} "));
                let rows = builder.build().fetch_all(&mut *conn).await?;
                for row in &rows {
                    inserted.push(package_name_from_row(row)?);
                }
            } else {
                builder.build().execute(&mut *conn).await?;
            }
        }

        Ok(inserted)
    }

    /// Insert full records, preserving a caller-supplied `date_discovered`
    /// and defaulting it to now otherwise.
    pub async fn insert_records(
        &self,
        records: &[PackageName],
        return_inserted: bool,
    ) -> Result<Vec<PackageName>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let inserted = self
            .insert_records_conn(&mut tx, records, return_inserted)
            .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn insert_records_conn(
        &self,
        conn: &mut PgConnection,
        records: &[PackageName],
        return_inserted: bool,
    ) -> Result<Vec<PackageName>> {
        let mut inserted = Vec::new();
        let now = Utc::now();

        for chunk in records.chunks(batch::max_rows(RECORD_PARAMS)) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "insert into {} (package_name, date_discovered, date_last_checked) ",
                tables::PACKAGE_NAMES
            ));
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(canonicalize_name(&record.package_name));
                row.push_bind(record.date_discovered.unwrap_or(now));
                row.push_bind(record.date_last_checked);
            });
            builder.push(" on conflict do nothing ");

            if return_inserted {
                builder.push(format!(" returning {SELECT_COLUMNS} "));
                let rows = builder.build().fetch_all(&mut *conn).await?;
                for row in &rows {
                    inserted.push(package_name_from_row(row)?);
                }
            } else {
                builder.build().execute(&mut *conn).await?;
            }
        }

        Ok(inserted)
    }

    /// Look up one record by canonicalized name.
    pub async fn get(&self, package_name: &str) -> Result<Option<PackageName>> {
        let name = canonicalize_name(package_name);
        let sql = format!(
            "select {SELECT_COLUMNS} from {} where package_name = $1",
            tables::PACKAGE_NAMES
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(package_name_from_row).transpose()
    }

    /// Touch `date_last_checked` on each record. Nothing else is updatable.
    pub async fn touch(&self, records: &[PackageName]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        self.touch_conn(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn touch_conn(&self, conn: &mut PgConnection, records: &[PackageName]) -> Result<()> {
        let sql = format!(
            "update {} set date_last_checked = $1 where package_name = $2",
            tables::PACKAGE_NAMES
        );
        for record in records {
            sqlx::query(&sql)
                .bind(record.date_last_checked)
                .bind(&record.package_name)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Stream every name, optionally restricted to records whose last check
    /// predates `checked_before` (never-checked records always qualify).
    pub fn stream_names(
        &self,
        checked_before: Option<DateTime<Utc>>,
    ) -> impl Stream<Item = Result<PackageName>> + 'static {
        let pool = self.pool.clone();
        let limit = self.iter_batch_size;
        let sql = format!(
            "select {SELECT_COLUMNS} from {} \
             where ($1::timestamptz is null or date_last_checked is null or date_last_checked < $1) \
               and ($2::text is null or package_name > $2) \
             order by package_name \
             limit $3",
            tables::PACKAGE_NAMES
        );

        futures::stream::try_unfold(None::<String>, move |cursor| {
            let pool = pool.clone();
            let sql = sql.clone();
            async move {
                let rows = sqlx::query(&sql)
                    .bind(checked_before)
                    .bind(&cursor)
                    .bind(limit)
                    .fetch_all(&pool)
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }

                let mut page = Vec::with_capacity(rows.len());
                for row in &rows {
                    page.push(package_name_from_row(row)?);
                }
                let next = page.last().map(|record| record.package_name.clone());
                Ok::<_, crate::error::StoreError>(Some((page, next)))
            }
        })
        .map_ok(|page| futures::stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
    }

    /// Make every dependency name referenced by a requirement a crawl target.
    pub async fn propagate_dependency_names(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.propagate_dependency_names_conn(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn propagate_dependency_names_conn(&self, conn: &mut PgConnection) -> Result<()> {
        let sql = format!(
            "insert into {} (package_name) \
             select distinct dependency_name from {} \
             on conflict do nothing",
            tables::PACKAGE_NAMES,
            tables::REQUIREMENTS
        );
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }
}

fn package_name_from_row(row: &PgRow) -> Result<PackageName> {
    Ok(PackageName {
        package_name: row.try_get("package_name")?,
        date_discovered: row.try_get("date_discovered")?,
        date_last_checked: row.try_get("date_last_checked")?,
    })
}
