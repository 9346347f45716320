// Logs module - Output capture and routing for watcher processes

pub mod format;
pub mod router;

pub use format::compile_date_format;
pub use router::{LogRouter, LogSinks};
