pub mod db;
pub mod entity;
pub mod error;
pub mod gallery;
pub mod logging;
pub mod media_lake;
pub mod model;
pub mod repo;
pub mod schema;
pub mod server;
pub mod storage;
