//! SQLite adapter for the durable job mirror.

pub mod connection;
pub mod job_store;
pub mod migrations;
pub mod retry;

pub use connection::{
    create_pool, create_pool_from_config, create_test_pool, ConnectionError, PoolConfig,
};
pub use job_store::SqliteJobStore;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use retry::RetryProfile;
