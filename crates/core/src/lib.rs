pub mod annotate;
pub mod config;
pub mod document;
pub mod error;
pub mod progress;

pub use annotate::{annotate, parse};
pub use config::{Config, PreprocessingConfig};
pub use document::*;
pub use error::*;
pub use progress::{ProgressSink, report, report_diagnostic};
