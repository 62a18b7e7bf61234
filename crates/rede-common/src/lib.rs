//! REDE Common Library
//!
//! Shared types, logging, and error handling for the REDE workspace.
//!
//! This crate provides the pieces every workspace member needs:
//!
//! - **Error Handling**: the pipeline error taxonomy and result type
//! - **Logging**: tracing subscriber setup (console/file, text/JSON)
//! - **Types**: jurisdiction codes and disposition policies
//!
//! # Example
//!
//! ```no_run
//! use rede_common::{PipelineError, Result};
//! use rede_common::types::JurisdictionCode;
//!
//! fn parse_code(raw: &str) -> Result<JurisdictionCode> {
//!     JurisdictionCode::new(raw)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PipelineError, Result};
