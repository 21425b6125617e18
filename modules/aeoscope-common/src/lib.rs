pub mod config;
pub mod error;
pub mod progress;
pub mod types;

pub use config::Config;
pub use error::AeoscopeError;
pub use progress::{NoopProgress, ProgressEvent, ProgressSink};
pub use types::*;
