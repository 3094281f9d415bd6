//! Core utilities for qlbind.
//!
//! This crate provides foundational types shared by the parser, the runtime
//! and the HTTP layer:
//! - `span`: Source location tracking
//! - `position`: Byte offset to line/column mapping
//! - `diagnostics`: Error reporting

pub mod diagnostics;
pub mod position;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticReport, DiagnosticSeverity, Label};
pub use position::{LineIndex, Location};
pub use span::Span;
