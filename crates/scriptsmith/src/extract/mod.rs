//! Uploaded project archives: validation, expansion and framework detection.

pub mod archive;
pub mod framework;
pub mod project;

pub use archive::ArchiveExtractor;
pub use framework::{detect_framework, Framework};
pub use project::{ExtractedProject, ProjectTree};
