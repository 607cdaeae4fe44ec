//! HTTP 中间件

pub mod access_log;

pub use access_log::access_log;
