//! Configuration types for zrpc.
//!
//! Settings come from `.zrpc/config.yaml` (with `${VAR}` expansion) and are
//! then overridden by `ZRPC_*` environment variables.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;
