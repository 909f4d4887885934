//! 外部AI任务服务客户端
//!
//! 提交任务、轮询状态直至终态，以及以后台任务方式监控外部任务。

pub mod client;
pub mod http;
pub mod status;
pub mod transport;

pub use client::{panic_message, ExternalJobClient};
pub use http::HttpJobTransport;
pub use status::{normalize_status, RemoteStatus};
pub use transport::JobTransport;
