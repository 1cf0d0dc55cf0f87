use anyhow::Context;
use sqlx::Connection;

// Advisory locks are scoped to the Postgres session. The lock lives on a
// connection detached from the pool, so dropping a `RunLock` without calling
// `release` ends the session and frees the lock with it.
const PERFORMANCE_RUN_LOCK_KEY: i64 = 0x4944_4541_5252_4B; // "IDEARRK"

pub struct RunLock {
    conn: sqlx::PgConnection,
}

pub async fn try_acquire_performance_lock(pool: &sqlx::PgPool) -> anyhow::Result<Option<RunLock>> {
    let mut conn = pool
        .acquire()
        .await
        .context("acquire connection for run lock failed")?
        .detach();

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(PERFORMANCE_RUN_LOCK_KEY)
        .fetch_one(&mut conn)
        .await
        .with_context(|| {
            format!("failed to acquire advisory lock (key={PERFORMANCE_RUN_LOCK_KEY})")
        })?;

    Ok(acquired.0.then_some(RunLock { conn }))
}

impl RunLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(PERFORMANCE_RUN_LOCK_KEY)
            .execute(&mut self.conn)
            .await
            .with_context(|| {
                format!("failed to release advisory lock (key={PERFORMANCE_RUN_LOCK_KEY})")
            })?;
        self.conn
            .close()
            .await
            .context("close run lock connection failed")?;
        Ok(())
    }
}
