// src/core/mod.rs

pub mod config_model;
pub mod dynamic;
pub mod interpolator;
pub mod paths;
pub mod resolver;
pub mod session;
pub mod template_source;
