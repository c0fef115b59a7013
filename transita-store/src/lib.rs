pub mod app_config;
pub mod database;
pub mod events;
pub mod memory_repo;
pub mod pg_repo;

pub use database::DbClient;
pub use events::BookingFeed;
pub use memory_repo::MemoryStore;
pub use pg_repo::PgStore;
