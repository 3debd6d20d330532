//! Integration tests with mock HTTP server

pub mod mock_server;

mod cache_scenarios;
mod gateway;
