pub mod config_store;
pub mod connection;
pub mod entity;
pub mod repository;

pub use config_store::ConfigStore;
pub use connection::establish_connection;
