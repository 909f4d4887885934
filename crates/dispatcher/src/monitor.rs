//! 后台监控任务登记表
//!
//! 每个处于外部执行中的任务最多对应一个监控任务。登记表持有 `JoinHandle`，
//! 因此取消任务时可以中止轮询，关闭进程时可以等待所有监控结束。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct MonitorRegistry {
    monitors: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记监控任务；同一任务已有监控时中止旧的
    pub fn register(&self, job_id: i64, handle: JoinHandle<()>) {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors.retain(|_, h| !h.is_finished());
        if let Some(previous) = monitors.insert(job_id, handle) {
            warn!("任务 {} 已有监控在运行，旧监控将被中止", job_id);
            previous.abort();
        }
    }

    pub fn spawn<F>(&self, job_id: i64, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.register(job_id, tokio::spawn(future));
    }

    /// 中止任务的监控，返回是否存在未结束的监控
    pub fn cancel(&self, job_id: i64) -> bool {
        let handle = self
            .monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&job_id);
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                debug!("已中止任务 {} 的监控", job_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_monitoring(&self, job_id: i64) -> bool {
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .is_some_and(|h| !h.is_finished())
    }

    pub fn active_count(&self) -> usize {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors.retain(|_, h| !h.is_finished());
        monitors.len()
    }

    /// 等待所有监控结束，超时后中止剩余的监控，返回被中止的数量
    pub async fn drain(&self, timeout: Duration) -> usize {
        let handles: Vec<(i64, JoinHandle<()>)> = self
            .monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        if handles.is_empty() {
            return 0;
        }

        info!("等待 {} 个外部任务监控结束", handles.len());
        let aborts: Vec<_> = handles.iter().map(|(id, h)| (*id, h.abort_handle())).collect();
        let joined = futures::future::join_all(handles.into_iter().map(|(_, h)| h));

        if tokio::time::timeout(timeout, joined).await.is_ok() {
            return 0;
        }

        let mut aborted = 0;
        for (job_id, abort) in aborts {
            if !abort.is_finished() {
                warn!("任务 {} 的监控未在 {:?} 内结束，强制中止", job_id, timeout);
                abort.abort();
                aborted += 1;
            }
        }
        aborted
    }
}
