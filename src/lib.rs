// Library root for aios: the daemon, its execution engine and the client.

pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod history;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod runner;
pub mod security;
pub mod suggest;
pub mod telemetry;
pub mod translate;
