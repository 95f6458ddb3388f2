//! # shield-db
//!
//! Backing store for cybershield.
//!
//! This crate provides:
//! - A lazily connecting pool
//! - The public key registry (`user_keys`), one key per identity
//! - Encrypted message persistence (`messages`)
//! - In-memory repositories with failure injection
//!
//! ## Example
//!
//! ```rust,ignore
//! use shield_db::{Database, KeyRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/cybershield").await?;
//!     let bob = "bob@example.com".parse()?;
//!     let key = db.keys.fetch_public_key(&bob).await?;
//!     println!("bob has a key: {}", key.is_some());
//!     Ok(())
//! }
//! ```

pub mod keys;
pub mod memory;
pub mod messages;
pub mod pool;
pub mod test_fixtures;

// Re-export core types
pub use shield_core::*;

pub use keys::{PgKeyRepository, UserKeyRow};
pub use memory::{FailureInjector, InMemoryKeyRepository, InMemoryMessageRepository};
pub use messages::{MessageRow, PgMessageRepository};
pub use pool::{connect_pool, log_pool_metrics, open_pool, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Public key registry.
    pub keys: PgKeyRepository,
    /// Encrypted message store.
    pub messages: PgMessageRepository,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            keys: PgKeyRepository::new(pool.clone()),
            messages: PgMessageRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect now, failing if the store does not answer.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = connect_pool(url, &PoolConfig::default()).await?;
        Ok(Self::new(pool))
    }

    /// Open without connecting; queries dial the store on demand.
    pub fn open(url: &str, config: &PoolConfig) -> Result<Self> {
        Ok(Self::new(open_pool(url, config)?))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
