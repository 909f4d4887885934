//! # AI任务编排调度层
//!
//! - **协调器**：跨四种任务的单飞队列，按最早 started_at 调度
//! - **批量标注执行器**：分批提交、按批持久化进度、批次级重试
//! - **看门狗**：把长时间处于处理中的批量任务重置为待处理
//! - **适配器**：学习、分类体系同步与外部训练任务的提交与后台监控
//! - **取消**：写入取消状态并中止后台监控

pub mod adapters;
pub mod batch_runner;
pub mod cancel;
pub mod coordinator;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod run_state;
pub mod watchdog;

pub use adapters::{AdapterContext, KindAdapter, PayloadBuilder};
pub use batch_runner::{BulkLabelingRunner, TriggerOutcome};
pub use cancel::{CancelOutcome, JobCanceller};
pub use coordinator::{JobStarter, QueueCoordinator, QueueSnapshot};
pub use monitor::MonitorRegistry;
pub use orchestrator::{Orchestrator, OrchestratorStatus};
pub use run_state::{RunGuard, RunStateSnapshot};
pub use watchdog::{StuckJobWatchdog, WatchdogConfig};
