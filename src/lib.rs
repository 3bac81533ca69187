pub mod audio;
pub mod broker;
pub mod captions;
pub mod config;
pub mod lang;
pub mod media;
pub mod session;
pub mod speech;
pub mod stt;
pub mod terminal_restore;
pub mod translate;
pub mod ui;

mod logging;
mod telemetry;

pub use logging::{
    init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use telemetry::init_tracing;
