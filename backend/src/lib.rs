pub mod config;
pub mod history;
pub mod inference;
pub mod pipeline;
pub mod routes;
pub mod storage;
