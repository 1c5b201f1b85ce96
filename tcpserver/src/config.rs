//! TCP 서버 환경 설정 모듈
//!
//! .env 파일과 환경변수에서 값을 읽어 엔진 설정([`EngineConfig`])으로 변환합니다.

use anyhow::Result;
use servercore::config::EngineConfig;
use servercore::network::NetAddress;
use servercore::UnknownPacketPolicy;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// TCP 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    /// TCP 서버 호스트 주소
    pub host: String,
    /// TCP 서버 포트 번호
    pub port: u16,
    /// Dispatch 워커 스레드 수
    pub io_workers: usize,
    /// 잡 워커 스레드 수
    pub job_workers: usize,
    /// 최대 동시 접속 수
    pub max_sessions: usize,
    /// 방 하나의 최대 인원
    pub max_room_players: usize,
    /// 방 상태 점검 주기
    pub room_tick: Duration,
    /// 알 수 없는 패킷을 받으면 연결 해제
    pub strict_packets: bool,
    /// 기본 로그 레벨
    pub log_level: String,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            io_workers: 4,
            job_workers: 4,
            max_sessions: 1000,
            max_room_players: 100,
            room_tick: Duration::from_secs(5),
            strict_packets: false,
            log_level: "info".to_string(),
        }
    }
}

impl TcpServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 상위 디렉토리 / 현재 디렉토리의 .env 파일
    /// 2. 시스템 환경변수
    /// 3. 기본값
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let defaults = Self::default();
        let config = Self {
            host: std::env::var("tcp_host").unwrap_or(defaults.host),
            port: env_or("tcp_port", defaults.port),
            io_workers: env_or("tcp_io_workers", defaults.io_workers),
            job_workers: env_or("tcp_job_workers", defaults.job_workers),
            max_sessions: env_or("tcp_max_sessions", defaults.max_sessions),
            max_room_players: env_or("tcp_max_room_players", defaults.max_room_players),
            room_tick: Duration::from_millis(env_or(
                "tcp_room_tick_ms",
                defaults.room_tick.as_millis() as u64,
            )),
            strict_packets: env_or("tcp_strict_packets", defaults.strict_packets),
            log_level: std::env::var("log_level").unwrap_or(defaults.log_level),
        };

        info!("TCP 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// TCP 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> Result<NetAddress> {
        Ok(NetAddress::from_host_port(&self.host, self.port)?)
    }

    /// 엔진 설정으로 변환합니다.
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::default();
        engine.dispatcher.io_worker_count = self.io_workers;
        engine.job.job_worker_count = self.job_workers;
        engine.network.max_session_count = self.max_sessions;
        engine.packet.unknown_packet_policy = if self.strict_packets {
            UnknownPacketPolicy::Disconnect
        } else {
            UnknownPacketPolicy::Ignore
        };
        engine
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = ["../.env", ".env"];

        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                return;
            }
        }
        warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
    }
}

/// 환경변수를 파싱하고, 없거나 잘못된 값이면 기본값을 씁니다.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("환경변수 {} 값이 잘못되었습니다: {:?}, 기본값 사용", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &TcpServerConfig) -> Result<()> {
    if config.host.is_empty() {
        anyhow::bail!("TCP 호스트 주소가 비어있습니다");
    }
    if config.io_workers == 0 || config.job_workers == 0 {
        anyhow::bail!(
            "워커 스레드 수는 0 일 수 없습니다 (io: {}, job: {})",
            config.io_workers,
            config.job_workers
        );
    }
    if config.max_sessions == 0 {
        anyhow::bail!("최대 접속 수는 0 일 수 없습니다");
    }
    if config.max_room_players == 0 {
        anyhow::bail!("방 최대 인원은 0 일 수 없습니다");
    }
    if config.room_tick.is_zero() {
        anyhow::bail!("방 점검 주기는 0 일 수 없습니다");
    }
    config.bind_address()?;
    config.engine_config().validate()?;
    Ok(())
}
