pub mod log;

pub use log::{FilterOptions, LogEntry, LogFilter};
