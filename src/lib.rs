// src/lib.rs

//! jobwatch: incremental job-listing ingestion with deduplication.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
