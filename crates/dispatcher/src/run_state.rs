//! 批量标注执行循环的运行状态机
//!
//! `Idle → Running`，运行时长超过阈值后视为失效（Stale），此时新的触发可以覆盖。
//! 每次进入 `Running` 都会分配新的代号，被覆盖的旧循环在下一个检查点发现代号不符后退出。

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running { since: DateTime<Utc>, generation: u64 },
}

/// 尝试获取运行权的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Acquired { generation: u64 },
    Busy { since: DateTime<Utc> },
    /// 覆盖了失效的运行锁
    Overrode {
        generation: u64,
        previous_since: DateTime<Utc>,
    },
}

/// 对外展示的运行状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStateSnapshot {
    Idle,
    Running { since: DateTime<Utc>, generation: u64 },
    Stale { since: DateTime<Utc>, generation: u64 },
}

pub struct RunGuard {
    state: Mutex<RunState>,
    next_generation: Mutex<u64>,
    stale_after: Duration,
}

impl RunGuard {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            next_generation: Mutex::new(1),
            stale_after,
        }
    }

    fn is_stale(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(since);
        age.to_std().map(|age| age > self.stale_after).unwrap_or(false)
    }

    fn allocate_generation(&self) -> u64 {
        let mut next = self.next_generation.lock().unwrap_or_else(|e| e.into_inner());
        let generation = *next;
        *next += 1;
        generation
    }

    pub fn try_acquire(&self, now: DateTime<Utc>) -> Acquire {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            RunState::Idle => {
                let generation = self.allocate_generation();
                *state = RunState::Running {
                    since: now,
                    generation,
                };
                Acquire::Acquired { generation }
            }
            RunState::Running { since, .. } if self.is_stale(since, now) => {
                let generation = self.allocate_generation();
                *state = RunState::Running {
                    since: now,
                    generation,
                };
                Acquire::Overrode {
                    generation,
                    previous_since: since,
                }
            }
            RunState::Running { since, .. } => Acquire::Busy { since },
        }
    }

    /// 给定代号是否仍持有运行权
    pub fn is_current(&self, generation: u64) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            RunState::Running { generation: g, .. } if g == generation
        )
    }

    /// 释放运行权；代号已被覆盖时不做修改
    pub fn release(&self, generation: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            RunState::Running { generation: g, .. } if g == generation => {
                *state = RunState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> RunStateSnapshot {
        match self.state() {
            RunState::Idle => RunStateSnapshot::Idle,
            RunState::Running { since, generation } if self.is_stale(since, now) => {
                RunStateSnapshot::Stale { since, generation }
            }
            RunState::Running { since, generation } => {
                RunStateSnapshot::Running { since, generation }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> RunGuard {
        RunGuard::new(Duration::from_secs(3_600))
    }

    #[test]
    fn second_acquire_is_busy_while_fresh() {
        let guard = guard();
        let now = Utc::now();
        assert_eq!(guard.try_acquire(now), Acquire::Acquired { generation: 1 });
        assert_eq!(
            guard.try_acquire(now + chrono::Duration::minutes(5)),
            Acquire::Busy { since: now }
        );
        assert!(guard.is_current(1));
    }

    #[test]
    fn stale_lock_is_overridden_with_new_generation() {
        let guard = guard();
        let start = Utc::now();
        guard.try_acquire(start);

        let later = start + chrono::Duration::hours(2);
        assert!(matches!(
            guard.snapshot(later),
            RunStateSnapshot::Stale { generation: 1, .. }
        ));
        assert_eq!(
            guard.try_acquire(later),
            Acquire::Overrode {
                generation: 2,
                previous_since: start
            }
        );
        assert!(!guard.is_current(1));
        assert!(guard.is_current(2));
    }

    #[test]
    fn superseded_generation_cannot_release() {
        let guard = guard();
        let start = Utc::now();
        guard.try_acquire(start);
        guard.try_acquire(start + chrono::Duration::hours(2));

        assert!(!guard.release(1));
        assert!(guard.is_current(2));
        assert!(guard.release(2));
        assert_eq!(guard.state(), RunState::Idle);
    }

    #[test]
    fn release_returns_to_idle_and_allows_reacquire() {
        let guard = guard();
        let now = Utc::now();
        guard.try_acquire(now);
        assert!(guard.release(1));
        assert_eq!(guard.snapshot(now), RunStateSnapshot::Idle);
        assert_eq!(guard.try_acquire(now), Acquire::Acquired { generation: 2 });
    }
}
