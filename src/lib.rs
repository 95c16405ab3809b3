pub mod aggregate;
pub mod config;
pub mod enrich;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod points;
pub mod regions;
pub mod state;
pub mod stats;
