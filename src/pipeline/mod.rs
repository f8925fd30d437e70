//! Pipeline stages for act analysis.
//!
//! Each submodule implements one step. Only [`client`] does model I/O, so
//! the parsers and the assembler are tested without a network.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ client ──▶ parse ──▶ assemble
//! (URL/path) (pdfium)   (model)   (coerce)  (report)
//! ```
//!
//! 1. [`input`]    — read a local file or download a URL into memory
//! 2. [`extract`]  — pull the page text layer; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`client`]   — render the per-task prompt and call the model
//! 4. [`parse`]    — turn raw answers into summary, sections, rule checks
//! 5. [`assemble`] — merge task results into a report that always has the
//!    same shape

pub mod assemble;
pub mod client;
pub mod extract;
pub mod input;
pub mod parse;
