pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod feed;
pub mod logging;
pub mod pipeline;
pub mod reference;
pub mod store;
pub mod types;
