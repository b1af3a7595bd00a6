pub mod bridge;
pub mod commands;
pub mod config;
pub mod consumer;
pub mod diagnosis;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod repair;
pub mod services;
pub mod utils;
