//! 서버 코어 에러 관리
//!
//! 네트워크/잡/메모리 계층에서 발생하는 복구 가능한 에러를 정의합니다.
//! 내부 상태가 손상된 상황(락 타임아웃, 데드락, 버퍼 오버플로우 등)은
//! 에러로 반환하지 않고 [`fatal`] 로 즉시 중단합니다.

use thiserror::Error;
use tracing::{error, info, warn};

/// 서버 코어 공통 에러
///
/// OS 레벨 실패는 경계(소켓 유틸리티)에서 한 번만 변환되며,
/// 상위 계층은 로그 후 계속 진행하거나(정상 운영 중) 시작을 중단합니다(초기화 중).
#[derive(Error, Debug)]
pub enum CoreError {
    /// 소켓/IO 실패 (OS 에러 코드 보존)
    #[error("IO 에러 [{context}]: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// 디스패처 등록 실패
    #[error("디스패처 등록 실패: {0}")]
    Registration(String),

    /// 잘못된 주소
    #[error("잘못된 주소: {0}")]
    InvalidAddress(String),

    /// 설정 검증 실패
    #[error("설정 오류: {0}")]
    InvalidConfig(String),

    /// 연결되지 않은 세션에 대한 요청
    #[error("세션 {0} 이(가) 연결 상태가 아닙니다")]
    SessionNotConnected(u64),

    /// 패킷 페이로드 해석 실패
    #[error("패킷 디코딩 실패 [id: {id}]: {message}")]
    PacketDecode { id: u16, message: String },

    /// 헤더의 16비트 크기 필드나 SendChunk 에 담을 수 없는 패킷
    #[error("패킷이 너무 큽니다 [id: {id}]: {size} 바이트")]
    PacketTooLarge { id: u16, size: usize },

    /// 이미 종료된 컴포넌트
    #[error("이미 종료됨: {0}")]
    ShutDown(&'static str),
}

/// 코어 결과 타입
pub type CoreResult<T> = Result<T, CoreError>;

/// 에러 심각도
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl CoreError {
    /// `std::io::Error` 에 컨텍스트를 붙여 변환합니다.
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        CoreError::Io { context, source }
    }

    /// OS 에러 코드를 반환합니다. OS 에러가 아니면 -1.
    pub fn os_error_code(&self) -> i32 {
        match self {
            CoreError::Io { source, .. } => source.raw_os_error().unwrap_or(-1),
            _ => -1,
        }
    }

    /// 에러의 심각도를 반환합니다.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CoreError::InvalidConfig(_) | CoreError::ShutDown(_) => ErrorSeverity::Critical,
            CoreError::Registration(_) | CoreError::Io { .. } => ErrorSeverity::High,
            CoreError::InvalidAddress(_)
            | CoreError::PacketDecode { .. }
            | CoreError::PacketTooLarge { .. } => ErrorSeverity::Medium,
            CoreError::SessionNotConnected(_) => ErrorSeverity::Low,
        }
    }

    /// 심각도에 맞는 레벨로 에러를 로깅합니다.
    pub fn log(&self, context: &str) {
        match self.severity() {
            ErrorSeverity::Critical => error!("[CRITICAL] {} - {}", context, self),
            ErrorSeverity::High => error!("[HIGH] {} - {}", context, self),
            ErrorSeverity::Medium => warn!("[MEDIUM] {} - {}", context, self),
            ErrorSeverity::Low => info!("[LOW] {} - {}", context, self),
        }
    }
}

/// 복구 불가능한 내부 상태 손상을 보고하고 즉시 중단합니다.
///
/// 릴리즈 프로필은 `panic = "abort"` 이므로 프로세스가 종료됩니다.
#[cold]
#[track_caller]
pub fn fatal(reason: &str) -> ! {
    error!("[FATAL] {}", reason);
    panic!("[FATAL] {}", reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_code_preserved() {
        let err = CoreError::io(
            "connect",
            std::io::Error::from_raw_os_error(111),
        );
        assert_eq!(err.os_error_code(), 111);
        assert_eq!(err.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_non_os_error_code() {
        let err = CoreError::InvalidAddress("nope".to_string());
        assert_eq!(err.os_error_code(), -1);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
    }

    #[test]
    fn test_display_contains_context() {
        let err = CoreError::PacketDecode {
            id: 7,
            message: "too short".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("7"));
        assert!(text.contains("too short"));
    }

    #[test]
    #[should_panic(expected = "[FATAL] broken invariant")]
    fn test_fatal_panics() {
        fatal("broken invariant");
    }
}
