pub mod cli;
pub mod client;
pub mod cluster;
pub mod config;
pub mod context;
pub mod library;
pub mod poll;
pub mod reconcile;
