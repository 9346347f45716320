// Library exports for the warden watcher supervisor

pub mod cli;
pub mod config;
pub mod error;
pub mod logs;
pub mod process;
