//! Per-job reads and writes. Every setter is an upsert so the first write creates the row.

use anyhow::Result;
use sqlx::Row;

use super::db::{unix_timestamp, StateDb};
use super::types::{DownloadStatus, JobStateRecord};

fn to_u64(v: i64) -> u64 {
    v.max(0) as u64
}

fn to_i64(v: u64) -> i64 {
    v.min(i64::MAX as u64) as i64
}

impl StateDb {
    /// Upsert one integer column. `column` is always a compile-time constant from this module.
    async fn upsert_int(&self, name: &str, column: &'static str, value: i64) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO job_state (name, {column}, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                {column} = excluded.{column},
                updated_at = excluded.updated_at
            "#
        );
        sqlx::query(&sql)
            .bind(name)
            .bind(value)
            .bind(unix_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Load the full record for `name`; a job never written loads as the default record.
    pub async fn load(&self, name: &str) -> Result<JobStateRecord> {
        let row = sqlx::query(
            r#"
            SELECT should_pause, bytes_read, total_bytes, completion_shown, status, last_error
            FROM job_state
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(JobStateRecord::default());
        };

        let should_pause: i64 = row.get("should_pause");
        let bytes_read: i64 = row.get("bytes_read");
        let total_bytes: i64 = row.get("total_bytes");
        let completion_shown: i64 = row.get("completion_shown");
        let status: Option<String> = row.get("status");
        let last_error: Option<String> = row.get("last_error");

        Ok(JobStateRecord {
            should_pause: should_pause != 0,
            bytes_read: to_u64(bytes_read),
            total_bytes: to_u64(total_bytes),
            completion_shown: completion_shown != 0,
            status: status.as_deref().map(DownloadStatus::from_str),
            last_error,
        })
    }

    pub async fn get_bytes_read(&self, name: &str) -> Result<u64> {
        Ok(self.load(name).await?.bytes_read)
    }

    /// Checkpoint the aggregate bytes read. Last writer wins.
    pub async fn set_bytes_read(&self, name: &str, bytes: u64) -> Result<()> {
        self.upsert_int(name, "bytes_read", to_i64(bytes)).await
    }

    /// Cached total size; 0 means unknown.
    pub async fn get_total_bytes(&self, name: &str) -> Result<u64> {
        Ok(self.load(name).await?.total_bytes)
    }

    pub async fn set_total_bytes(&self, name: &str, bytes: u64) -> Result<()> {
        self.upsert_int(name, "total_bytes", to_i64(bytes)).await
    }

    pub async fn should_pause(&self, name: &str) -> Result<bool> {
        Ok(self.load(name).await?.should_pause)
    }

    pub async fn set_should_pause(&self, name: &str, pause: bool) -> Result<()> {
        self.upsert_int(name, "should_pause", pause as i64).await
    }

    pub async fn has_completion_been_shown(&self, name: &str) -> Result<bool> {
        Ok(self.load(name).await?.completion_shown)
    }

    pub async fn set_completion_shown(&self, name: &str, shown: bool) -> Result<()> {
        self.upsert_int(name, "completion_shown", shown as i64).await
    }

    pub async fn get_status(&self, name: &str) -> Result<Option<DownloadStatus>> {
        Ok(self.load(name).await?.status)
    }

    /// Record the lifecycle status. `error` is stored alongside (None clears it).
    pub async fn set_status(
        &self,
        name: &str,
        status: DownloadStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_state (name, status, last_error, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
                status = excluded.status,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(status.as_str())
        .bind(error)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set or clear the last error text without touching the status.
    pub async fn set_last_error(&self, name: &str, error: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_state (name, last_error, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(error)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reset pause flag, bytes read, cached total and last error.
    ///
    /// The completion-shown flag and status are left alone; the controller owns both.
    pub async fn clear_state(&self, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_state
            SET should_pause = 0,
                bytes_read = 0,
                total_bytes = 0,
                last_error = NULL,
                updated_at = ?1
            WHERE name = ?2
            "#,
        )
        .bind(unix_timestamp())
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
