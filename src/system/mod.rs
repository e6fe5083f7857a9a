//! # System Interaction Layer
//!
//! Capabilities the core consumes but does not own, plus the one piece of thread plumbing
//! the credential lifecycle needs.
//!
//! ## Modules
//!
//! - **`blob`**: An opaque key/value byte store (`load`, `write`, `exists`) and a
//!   directory-backed implementation with atomic writes.
//! - **`secrets`**: The secret store capability (`read`, `write`) keyed by composite
//!   `<name>:<datacenter>` names, with in-memory and blob-backed implementations.
//! - **`affinity`**: Runs blocking, UI-affine work (interactive login) on a dedicated
//!   thread and hands the result back to async callers through a one-shot channel.

pub mod affinity;
pub mod blob;
pub mod secrets;
