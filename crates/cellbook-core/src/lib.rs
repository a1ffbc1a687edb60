//! Core abstractions for the notebook execution session client.
//!
//! This crate provides the fundamental building blocks:
//! - `Notebook` / `Cell` - The document model
//! - `ExecutionOutcome` - Typed cell execution results
//! - `DocumentStore` - Snapshot-based in-memory document state
//! - `NotebookStorage` - Persistence trait

pub mod notebook;
pub mod outcome;
pub mod store;
pub mod traits;

pub use notebook::{Cell, CellId, CellKind, Language, Notebook, NotebookId};
pub use outcome::ExecutionOutcome;
pub use store::DocumentStore;
pub use traits::{NotebookPatch, NotebookStorage, StorageError};
