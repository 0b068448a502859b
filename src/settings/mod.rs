//! Settings for the waypoint binary
//!
//! - `config`: Top-level configuration document
//! - `loader`: Layered loading from embedded defaults, files and environment
//! - `backends`: Scripted stand-ins for the backends a config references

mod backends;
mod config;
mod loader;

pub use backends::ScriptedBackends;
pub use config::AppConfig;
pub use loader::load_config;
