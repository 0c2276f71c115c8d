//! Repository for the CDC event log and its per-table offsets.

use depgraph_core::models::{CdcOperation, EventLogEntry};
use futures::{Stream, TryStreamExt};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use crate::error::{Result, StoreError};
use crate::tables;

pub struct CdcRepository {
    pool: PgPool,
    iter_batch_size: i64,
}

struct EventLogCursor {
    started: bool,
    last_event_id: Option<i64>,
    /// High-water mark of the page already yielded, written back to the
    /// offsets table at the start of the next step so events are only
    /// checkpointed after the caller has seen (and published) them.
    pending_offset: Option<i64>,
}

impl CdcRepository {
    pub fn new(pool: PgPool, iter_batch_size: i64) -> Self {
        Self {
            pool,
            iter_batch_size,
        }
    }

    /// The stored offset for the event log, if any.
    pub async fn get_offset(&self) -> Result<Option<i64>> {
        let sql = format!(
            "select event_id from {} where \"table\" = $1",
            tables::CDC_OFFSETS
        );
        let row = sqlx::query(&sql)
            .bind(tables::CDC_EVENT_LOG_TABLE)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get("event_id"))
            .transpose()
            .map_err(Into::into)
    }

    /// Record the high-water mark for a table. Offsets only move forward in
    /// practice because the iterator always scans ascending from the stored
    /// value.
    pub async fn upsert_offset(&self, table_name: &str, event_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.upsert_offset_conn(&mut tx, table_name, event_id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_offset_conn(
        &self,
        conn: &mut PgConnection,
        table_name: &str,
        event_id: i64,
    ) -> Result<()> {
        let sql = format!(
            "insert into {} (\"table\", event_id) values ($1, $2) \
             on conflict (\"table\") do update set event_id = excluded.event_id",
            tables::CDC_OFFSETS
        );
        sqlx::query(&sql)
            .bind(table_name)
            .bind(event_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Stream event-log entries after the stored offset, ascending by
    /// `event_id` in fixed-size batches.
    ///
    /// With `auto_upsert_offset`, the offset advances to a batch's last
    /// event only after the whole batch has been yielded, keeping the
    /// publish-then-checkpoint at-least-once ordering.
    pub fn stream_event_log(
        &self,
        from_beginning: bool,
        auto_upsert_offset: bool,
    ) -> impl Stream<Item = Result<EventLogEntry>> + 'static {
        let pool = self.pool.clone();
        let limit = self.iter_batch_size;

        let offset_sql = format!(
            "select event_id from {} where \"table\" = $1",
            tables::CDC_OFFSETS
        );
        let page_sql = format!(
            "select event_id, operation, \"schema\", \"table\", before, after, \"timestamp\" \
             from {} \
             where ($1::bigint is null or event_id > $1) \
             order by event_id asc \
             limit $2",
            tables::CDC_EVENT_LOG
        );
        let upsert_sql = format!(
            "insert into {} (\"table\", event_id) values ($1, $2) \
             on conflict (\"table\") do update set event_id = excluded.event_id",
            tables::CDC_OFFSETS
        );

        let cursor = EventLogCursor {
            started: false,
            last_event_id: None,
            pending_offset: None,
        };

        futures::stream::try_unfold(cursor, move |mut cursor| {
            let pool = pool.clone();
            let offset_sql = offset_sql.clone();
            let page_sql = page_sql.clone();
            let upsert_sql = upsert_sql.clone();
            async move {
                if !cursor.started {
                    cursor.started = true;
                    if !from_beginning {
                        cursor.last_event_id = sqlx::query(&offset_sql)
                            .bind(tables::CDC_EVENT_LOG_TABLE)
                            .fetch_optional(&pool)
                            .await?
                            .map(|row| row.try_get("event_id"))
                            .transpose()?;
                    }
                }

                if let Some(offset) = cursor.pending_offset.take()
                    && auto_upsert_offset
                {
                    sqlx::query(&upsert_sql)
                        .bind(tables::CDC_EVENT_LOG_TABLE)
                        .bind(offset)
                        .execute(&pool)
                        .await?;
                }

                let rows = sqlx::query(&page_sql)
                    .bind(cursor.last_event_id)
                    .bind(limit)
                    .fetch_all(&pool)
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }

                let mut page = Vec::with_capacity(rows.len());
                for row in &rows {
                    page.push(event_from_row(row)?);
                }
                let max_event_id = page.iter().map(|event| event.event_id).max();
                cursor.last_event_id = max_event_id;
                cursor.pending_offset = max_event_id;
                Ok::<_, StoreError>(Some((page, cursor)))
            }
        })
        .map_ok(|page| futures::stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
    }
}

fn event_from_row(row: &PgRow) -> Result<EventLogEntry> {
    let operation: String = row.try_get("operation")?;
    let operation = match operation.as_str() {
        "INSERT" => CdcOperation::Insert,
        "UPDATE" => CdcOperation::Update,
        "DELETE" => CdcOperation::Delete,
        _ => return Err(StoreError::UnknownCdcOperation { value: operation }),
    };

    Ok(EventLogEntry {
        event_id: row.try_get("event_id")?,
        operation,
        schema: row.try_get("schema")?,
        table: row.try_get("table")?,
        before: row.try_get("before")?,
        after: row.try_get("after")?,
        timestamp: row.try_get("timestamp")?,
    })
}
