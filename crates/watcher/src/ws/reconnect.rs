/// 重连策略与可取消的延迟任务

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 固定间隔重连策略
///
/// 每次关闭后计数加一，超过上限即放弃，不做指数退避
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(5000),
        }
    }
}

/// 重连决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// 延迟 `delay` 后发起第 `attempt` 次重连
    Retry { attempt: u32, delay: Duration },

    /// 重连次数耗尽
    GiveUp { attempts: u32 },
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 根据递增后的重连计数做出决策
    pub fn decide(&self, reconnect_count: u32) -> ReconnectDecision {
        if reconnect_count > self.max_attempts {
            ReconnectDecision::GiveUp {
                attempts: reconnect_count - 1,
            }
        } else {
            ReconnectDecision::Retry {
                attempt: reconnect_count,
                delay: self.delay,
            }
        }
    }
}

/// 延迟执行的任务，cancel 或 drop 时中止
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// 在 `delay` 之后执行 `task`
    pub fn schedule<F>(delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        Self { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_decide() {
        let policy = ReconnectPolicy::new(5, Duration::from_millis(5000));

        for count in 1..=5 {
            assert_eq!(
                policy.decide(count),
                ReconnectDecision::Retry {
                    attempt: count,
                    delay: Duration::from_millis(5000),
                }
            );
        }
        assert_eq!(policy.decide(6), ReconnectDecision::GiveUp { attempts: 5 });
    }

    #[test]
    fn test_zero_budget_gives_up_immediately() {
        let policy = ReconnectPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.decide(1), ReconnectDecision::GiveUp { attempts: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let task = ScheduledTask::schedule(Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_prevent_firing() {
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        let task = ScheduledTask::schedule(Duration::from_secs(1), async move {
            flag.store(true, Ordering::SeqCst);
        });
        task.cancel();

        let flag = fired.clone();
        drop(ScheduledTask::schedule(Duration::from_secs(1), async move {
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
