/// 归一化后的外部任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Success,
    Failure,
    Running,
}

/// 忽略大小写归一化外部状态字符串，无法识别的值视为仍在运行
pub fn normalize_status(raw: &str) -> RemoteStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "success" | "succeeded" | "completed" | "complete" | "done" | "finished" => {
            RemoteStatus::Success
        }
        "failure" | "failed" | "error" | "errored" | "cancelled" | "canceled" | "aborted" => {
            RemoteStatus::Failure
        }
        _ => RemoteStatus::Running,
    }
}
