//! # AI任务编排测试工具
//!
//! - **内存仓储**：与 SQLite 实现语义一致的任务、分类体系、记录仓储
//! - **FakeRemote**：可注入失败、保持运行、钩子回调的外部服务替身
//! - **构建器**：任务、分类体系、记录的测试数据
//!
//! ```toml
//! [dev-dependencies]
//! aijob-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;
pub mod remote;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
pub use remote::*;
