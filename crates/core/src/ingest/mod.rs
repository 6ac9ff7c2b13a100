pub mod adapter;
pub mod cache;
pub mod provider;
pub mod query;
pub mod types;
