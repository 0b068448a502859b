//! Waypoint LLM - Backend Capability Contract
//!
//! This crate defines what the routing layer needs from a computation backend:
//! - Backend: the capability contract (complete, stream, embed, health, capabilities)
//! - Completion: request, response and streaming chunk types
//! - Task: the closed set of task categories a request can be routed by
//! - Registry: name-based backend resolution
//! - Error: the runtime error taxonomy shared by every layer
//! - Mock: a scripted backend for tests and dry runs
//!
//! Concrete network clients for specific providers live outside this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod completion;
pub mod error;
pub mod message;
pub mod mock;
pub mod registry;
pub mod task;

pub use backend::{Backend, BackendCapabilities, ChunkStream};
pub use completion::{CompletionRequest, CompletionResponse, StreamChunk, TokenUsage};
pub use error::{Error, ErrorKind, Result};
pub use message::{Message, MessageRole};
pub use mock::{Script, ScriptedBackend};
pub use registry::{BackendRegistry, InMemoryBackendRegistry};
pub use task::TaskCategory;
