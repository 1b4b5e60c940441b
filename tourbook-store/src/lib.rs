pub mod app_config;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
pub mod events;
pub mod redis_repo;

pub use app_config::{BusinessRules, Config};
pub use booking_repo::PgReservationRepository;
pub use catalog_repo::PgTourCatalog;
pub use database::DbClient;
pub use events::KafkaEventPublisher;
pub use redis_repo::RedisSessionStore;
