//! 로깅 초기화
//!
//! `tracing_subscriber` 기반 fmt 구독자를 설치합니다.
//! `RUST_LOG` 환경변수가 있으면 설정된 레벨보다 우선합니다.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// 로깅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 기본 로그 레벨 (기본값: "info")
    pub level: String,
    /// 스레드 이름 출력 여부 (기본값: true)
    pub with_thread_names: bool,
    /// 타겟(모듈 경로) 출력 여부 (기본값: false)
    pub with_target: bool,
    /// ANSI 색상 사용 여부 (기본값: true)
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_thread_names: true,
            with_target: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// 디버그 레벨 설정
    pub fn debug() -> Self {
        Self {
            level: "debug".to_string(),
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// 전역 tracing 구독자를 설치합니다.
///
/// 이미 설치되어 있으면 아무 일도 하지 않고 `false` 를 반환합니다.
pub fn init_logging(config: &LoggingConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_thread_names(config.with_thread_names)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.with_thread_names);
    }

    #[test]
    fn test_second_init_is_noop() {
        let config = LoggingConfig::debug();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
