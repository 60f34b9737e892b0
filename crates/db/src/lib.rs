pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use repositories::{
    InMemoryLedgerRepository, InMemoryTenantRepository, LedgerRepository, RepositoryError,
    SqlLedgerRepository, SqlTenantRepository, TenantRepository,
};
pub use service::LedgerService;
