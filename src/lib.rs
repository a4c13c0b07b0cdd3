pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod promo;
pub mod repository;
pub mod services;
pub mod store;
pub mod utils;
