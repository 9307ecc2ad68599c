use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Open the SQLite pool and bootstrap the schema (idempotent).
///
/// In-memory databases get a single-connection pool: every pool connection
/// would otherwise see its own empty database.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::raw_sql(include_str!("schema.sql")).execute(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_bootstrap_is_idempotent() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        // Re-running the schema against a live database must not fail.
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(&pool)
            .await
            .unwrap();
    }
}
