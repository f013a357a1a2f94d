pub mod core {
    pub mod config;
    pub mod error;
    pub mod routes;
    pub mod state;
    pub mod tracing_init;
}

pub mod cache;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod storage;
pub mod stores;
pub mod utils;
