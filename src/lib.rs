//! Bounded-concurrency parallel map over tokio tasks
//!
//! # Features
//! - Fixed lane count, round-robin assignment, bounded per-lane queues
//! - Output in input order regardless of completion order
//! - Fail-fast on the first transform error or panic
//! - Cooperative cancellation and deadlines via `ExecutionScope`
//! - Every lane joined before an invocation returns

pub mod errors;
pub mod handle;
mod lane;
pub mod mapper;
pub mod model;
pub mod scope;
pub mod util;

pub use errors::{ConfigError, LookupError, MapError};
pub use handle::MapHandle;
pub use mapper::{par_map, Config, Mapper};
pub use scope::{ExecutionScope, StopReason};
pub use util::{enum_to_value, map_to_vec, map_to_vec_with, value_to_enum};
