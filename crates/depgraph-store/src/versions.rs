//! Repository for the `versions` table.

use chrono::Utc;
use depgraph_core::models::Version;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use crate::batch;
use crate::error::{Result, StoreError};
use crate::tables;

const VERSION_PARAMS: usize = 13;

const SELECT_COLUMNS: &str = "version_id, package_name, package_version, date_discovered, \
     epoch, package_release, pre_0, pre_1, post, dev, \"local\", \
     is_prerelease, is_postrelease, is_devrelease";

pub struct VersionRepository {
    pool: PgPool,
}

impl VersionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert version records keyed on (`package_name`, `package_version`).
    ///
    /// The parsed fields are overwritten on conflict; `date_discovered` keeps
    /// its original value. `version_id` is never written by this path.
    pub async fn insert_versions(&self, versions: &[Version]) -> Result<()> {
        if versions.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        self.insert_versions_conn(&mut tx, versions).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_versions_conn(
        &self,
        conn: &mut PgConnection,
        versions: &[Version],
    ) -> Result<()> {
        let now = Utc::now();

        for chunk in versions.chunks(batch::max_rows(VERSION_PARAMS)) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "insert into {} \
                 (package_name, package_version, date_discovered, \
                  epoch, package_release, pre_0, pre_1, post, dev, \"local\", \
                  is_prerelease, is_postrelease, is_devrelease) ",
                tables::VERSIONS
            ));
            builder.push_values(chunk, |mut row, version| {
                row.push_bind(&version.package_name);
                row.push_bind(&version.package_version);
                row.push_bind(version.date_discovered.unwrap_or(now));
                row.push_bind(version.epoch);
                row.push_bind(&version.package_release);
                row.push_bind(&version.pre_0);
                row.push_bind(version.pre_1);
                row.push_bind(version.post);
                row.push_bind(version.dev);
                row.push_bind(&version.local);
                row.push_bind(version.is_prerelease);
                row.push_bind(version.is_postrelease);
                row.push_bind(version.is_devrelease);
            });
            builder.push(
                " on conflict (package_name, package_version) do update set \
                   epoch = excluded.epoch, \
                   package_release = excluded.package_release, \
                   pre_0 = excluded.pre_0, \
                   pre_1 = excluded.pre_1, \
                   post = excluded.post, \
                   dev = excluded.dev, \
                   \"local\" = excluded.\"local\", \
                   is_prerelease = excluded.is_prerelease, \
                   is_postrelease = excluded.is_postrelease, \
                   is_devrelease = excluded.is_devrelease",
            );
            builder.build().execute(&mut *conn).await?;
        }

        Ok(())
    }

    /// Rewrite every field of one version row by `version_id`.
    pub async fn update_version(&self, version: &Version) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.update_version_conn(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn update_version_conn(
        &self,
        conn: &mut PgConnection,
        version: &Version,
    ) -> Result<()> {
        let version_id = version
            .version_id
            .ok_or(StoreError::MissingId { entity: "version" })?;

        let sql = format!(
            "update {} set \
                package_name = $1, \
                package_version = $2, \
                date_discovered = $3, \
                epoch = $4, \
                package_release = $5, \
                pre_0 = $6, \
                pre_1 = $7, \
                post = $8, \
                dev = $9, \
                \"local\" = $10, \
                is_prerelease = $11, \
                is_postrelease = $12, \
                is_devrelease = $13 \
             where version_id = $14",
            tables::VERSIONS
        );

        sqlx::query(&sql)
            .bind(&version.package_name)
            .bind(&version.package_version)
            .bind(version.date_discovered)
            .bind(version.epoch)
            .bind(&version.package_release)
            .bind(&version.pre_0)
            .bind(version.pre_1)
            .bind(version.post)
            .bind(version.dev)
            .bind(&version.local)
            .bind(version.is_prerelease)
            .bind(version.is_postrelease)
            .bind(version.is_devrelease)
            .bind(version_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Every version row matching the optional exact-match filters. Neither
    /// filter canonicalizes or parses its value.
    pub async fn list_versions(
        &self,
        package_name: Option<&str>,
        package_version: Option<&str>,
    ) -> Result<Vec<Version>> {
        let mut conn = self.pool.acquire().await?;
        self.list_versions_conn(&mut conn, package_name, package_version)
            .await
    }

    pub async fn list_versions_conn(
        &self,
        conn: &mut PgConnection,
        package_name: Option<&str>,
        package_version: Option<&str>,
    ) -> Result<Vec<Version>> {
        let sql = format!(
            "select {SELECT_COLUMNS} from {} \
             where ($1::text is null or package_name = $1) \
               and ($2::text is null or package_version = $2)",
            tables::VERSIONS
        );

        let rows = sqlx::query(&sql)
            .bind(package_name)
            .bind(package_version)
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(version_from_row).collect()
    }
}

fn version_from_row(row: &PgRow) -> Result<Version> {
    Ok(Version {
        version_id: row.try_get("version_id")?,
        package_name: row.try_get("package_name")?,
        package_version: row.try_get("package_version")?,
        date_discovered: row.try_get("date_discovered")?,
        epoch: row.try_get("epoch")?,
        package_release: row.try_get("package_release")?,
        pre_0: row.try_get("pre_0")?,
        pre_1: row.try_get("pre_1")?,
        post: row.try_get("post")?,
        dev: row.try_get("dev")?,
        local: row.try_get("local")?,
        is_prerelease: row.try_get("is_prerelease")?,
        is_postrelease: row.try_get("is_postrelease")?,
        is_devrelease: row.try_get("is_devrelease")?,
    })
}
