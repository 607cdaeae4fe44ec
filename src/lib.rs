pub mod cli;
pub mod config;
pub mod error;
pub mod http;  // HTTP 推送入口
pub mod logging;
pub mod metrics;
pub mod push;
pub mod server;

pub use config::PushConfig;
pub use error::{Result, ServerError};
pub use push::{
    Dispatcher, DispatcherConfig, IngressResult, Notification, Platform, PushOutcome,
    PushPayload, StatusReporter,
};
pub use server::PushServer;
