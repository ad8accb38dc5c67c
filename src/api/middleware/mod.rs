//! API 中间件

pub mod trace_id;

pub use trace_id::trace_id_middleware;
