//! Notebook persistence implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "memory")]
pub use memory::MemoryNotebookStorage;

#[cfg(feature = "http")]
pub use http::HttpNotebookStorage;
