pub mod config;
pub mod repositories;
pub mod storage;
pub mod worker_pool;
