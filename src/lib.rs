pub mod api;
pub mod bookkeeper;
pub mod config;
pub mod error;
pub mod seed;
pub mod storage;
