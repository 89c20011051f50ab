//! Database transaction utilities
//!
//! Read-modify-write of a record's location column runs inside one
//! transaction so the row lock taken by `SELECT ... FOR UPDATE` is held until
//! the update commits.

use std::future::Future;
use std::pin::Pin;

use sqlx::{PgPool, Postgres, Transaction};

/// Boxed future borrowing the transaction for `'c`.
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = T> + Send + 'c>>;

/// Execute a closure within a database transaction
///
/// Commits when the closure returns `Ok`, rolls back otherwise. A failed
/// rollback is logged and the closure's error is returned.
///
/// # Example
///
/// ```ignore
/// use artiroute_db::with_transaction;
///
/// async fn example(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
///     with_transaction(pool, |tx| Box::pin(async move {
///         sqlx::query("UPDATE models SET storage_server = '[]' WHERE id = 1")
///             .execute(&mut **tx)
///             .await?;
///         Ok::<_, sqlx::Error>(())
///     }))
///     .await
/// }
/// ```
pub async fn with_transaction<F, R, E>(pool: &PgPool, f: F) -> Result<R, E>
where
    F: for<'c> FnOnce(&'c mut Transaction<'static, Postgres>) -> TxFuture<'c, Result<R, E>>,
    E: From<sqlx::Error>,
{
    let mut tx = pool.begin().await?;

    match f(&mut tx).await {
        Ok(result) => {
            tx.commit().await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Failed to rollback database transaction");
            }
            Err(e)
        }
    }
}
