use sqlx::PgPool;

/// Runs the SQL processors defined next to each entity against a pool.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
