// job_tracker/src/ws_client/registry.rs

//! 订阅登记表：调用方当前关心的任务 ID 集合。
//!
//! 每次 (重新) 建立连接后，表中的全部条目都会重新发送给服务端。重放顺序不作保证。

use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    jobs: HashSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记任务，返回该任务此前是否未登记。
    pub fn add(&mut self, job_id: &str) -> bool {
        self.jobs.insert(job_id.to_string())
    }

    /// 移除任务，返回该任务此前是否已登记。
    pub fn remove(&mut self, job_id: &str) -> bool {
        self.jobs.remove(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains(job_id)
    }

    /// 需要在新连接上重放的全部任务。
    pub fn replay(&self) -> impl Iterator<Item = &str> + '_ {
        self.jobs.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    /// 排序后的快照，便于展示与断言。
    pub fn snapshot(&self) -> Vec<String> {
        let mut jobs: Vec<String> = self.jobs.iter().cloned().collect();
        jobs.sort();
        jobs
    }
}
