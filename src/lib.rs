pub mod clock;
pub mod config;
pub mod engine;
pub mod model;
pub mod observability;
pub mod repository;
pub mod scheduler;
pub mod store;
