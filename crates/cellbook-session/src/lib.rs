//! Execution coordination and notebook persistence.
//!
//! Provides:
//! - `ExecutionCoordinator` - Correlate execution requests with results
//! - `ExecutionBackend` - Request/response execution (feature: http)
//! - Storage implementations (memory, http)

pub mod backend;
pub mod coordinator;
pub mod storage;

pub use backend::{BackendError, ExecutionBackend, ExecutionResult};
#[cfg(feature = "http")]
pub use backend::HttpExecutionBackend;
pub use coordinator::{
    CoordinatorConfig, CoordinatorError, ExecutionCoordinator, ExecutionRequest, RequestId,
};
