//! Converts an HTML string into a paginated PDF with headless Chromium.
//!
//! The browser sits behind the [`browser::Engine`] trait so the pipeline in
//! [`pdf::generate`] can be driven by any renderer.

pub mod browser;
pub mod cli;
pub mod pdf;
pub mod request;
