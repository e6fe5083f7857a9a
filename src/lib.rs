//! Operations tooling for a hosted service estate: the app model, secret-backed
//! configuration rendering and per-tenant sign-in with a cached token store.

pub mod auth;
pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
