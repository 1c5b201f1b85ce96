//! 워커 스레드 관리자
//!
//! 이름 있는 OS 스레드를 실행하고, 본문에서 발생한 panic 을 스레드 경계에서
//! 잡아 로그로 남긴 뒤 스레드를 정상 종료시킵니다.

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use tracing::{error, info};

use crate::error::{CoreError, CoreResult};
use crate::thread::context::ThreadContext;

/// 워커 스레드 관리자
#[derive(Default)]
pub struct ThreadManager {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 워커 스레드를 실행합니다.
    pub fn launch<F>(&self, name: impl Into<String>, body: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                ThreadContext::init();
                if let Err(payload) = catch_unwind(AssertUnwindSafe(body)) {
                    error!(
                        "워커 스레드 '{}' 비정상 종료: {}",
                        thread_name,
                        panic_message(payload.as_ref())
                    );
                }
                ThreadContext::destroy();
            })
            .map_err(|e| CoreError::io("thread spawn", e))?;

        self.handles.lock().push(handle);
        Ok(())
    }

    /// 실행 중인 스레드 수
    pub fn thread_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// 모든 스레드가 끝날 때까지 기다립니다.
    pub fn join(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        let count = handles.len();
        for handle in handles {
            // 본문 panic 은 이미 catch_unwind 에서 처리됨
            let _ = handle.join();
        }
        if count > 0 {
            info!("워커 스레드 {}개 종료", count);
        }
    }
}

/// panic payload 를 사람이 읽을 수 있는 문자열로 변환
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "알 수 없는 panic".to_string()
    }
}
