//! 잡: 정확히 한 번 실행되는 지연 호출

use std::fmt;

/// 지연 실행 단위
pub struct Job {
    callback: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// 실행 (소비되므로 두 번 실행될 수 없음)
    pub fn execute(self) {
        (self.callback)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Job")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_execute_runs_callback() {
        let counter = Arc::new(AtomicUsize::new(0));
        let clone = counter.clone();
        let job = Job::new(move || {
            clone.fetch_add(1, Ordering::SeqCst);
        });
        job.execute();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_job_never_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let clone = counter.clone();
        drop(Job::new(move || {
            clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&counter), 1);
    }
}
