//! 엔티티에 자기 잡 큐를 붙여주는 트레이트
//!
//! Room, Player 같은 엔티티가 [`JobSerializer`] 를 구현하면 자기 상태를 바꾸는 작업을
//! 모두 자기 큐로 보내게 되어, 락 없이도 한 번에 하나씩 순서대로 실행됩니다.

use std::sync::Arc;
use std::time::Duration;

use crate::job::job::Job;
use crate::job::queue::JobQueue;

pub trait JobSerializer: Send + Sync + Sized + 'static {
    fn job_queue(&self) -> &Arc<JobQueue>;

    /// 클로저를 자기 큐에 추가
    fn push_job<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.job_queue().push(Job::new(callback));
    }

    /// 자기 자신을 인자로 받는 작업을 추가 (실행될 때까지 엔티티를 살려 둠)
    fn push_method<F>(self: &Arc<Self>, method: F)
    where
        F: FnOnce(&Self) + Send + 'static,
    {
        let owner = self.clone();
        self.job_queue().push(Job::new(move || method(&owner)));
    }

    /// `delay` 뒤에 클로저를 자기 큐에 추가
    ///
    /// 클로저가 엔티티의 `Arc` 를 잡고 있으면 엔티티가 그만큼 오래 살아남습니다.
    fn schedule_job<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.job_queue().schedule(delay, Job::new(callback));
    }

    /// `delay` 뒤에 자기 자신에 대한 작업을 실행
    ///
    /// 엔티티는 약한 참조로만 잡히므로, 그 전에 사라지면 작업도 실행되지 않습니다.
    fn schedule_method<F>(self: &Arc<Self>, delay: Duration, method: F)
    where
        F: FnOnce(&Self) + Send + 'static,
    {
        let owner = Arc::downgrade(self);
        self.job_queue().schedule(
            delay,
            Job::new(move || {
                if let Some(owner) = owner.upgrade() {
                    method(&owner);
                }
            }),
        );
    }
}
