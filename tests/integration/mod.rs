//! Integration tests for heyman

mod cache_store;
mod config_layers;
mod pipeline_flow;
mod providers;
mod test_utils;
