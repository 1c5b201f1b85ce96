//! 채팅 방 TCP 서버 진입점
//!
//! 환경변수:
//! - tcp_host / tcp_port: 바인딩 주소 (기본값: 127.0.0.1:4000)
//! - tcp_io_workers / tcp_job_workers: 워커 스레드 수 (기본값: 4)
//! - tcp_max_sessions: 최대 동시 접속 수 (기본값: 1000)
//! - tcp_max_room_players: 방 최대 인원 (기본값: 100)
//! - tcp_room_tick_ms: 방 점검 주기 (기본값: 5000)
//! - tcp_strict_packets: 알 수 없는 패킷 수신 시 연결 해제 (기본값: false)
//! - log_level: 기본 로그 레벨 (RUST_LOG 가 있으면 무시)

use anyhow::{Context, Result};
use servercore::{init_logging, LoggingConfig};
use tcpserver::{validate_config, ChatServer, TcpServerConfig};
use tracing::info;

fn main() -> Result<()> {
    // .env 로드 과정도 로그에 남기기 위해 먼저 기본 레벨로 초기화
    let level = std::env::var("log_level").unwrap_or_else(|_| "info".to_string());
    init_logging(&LoggingConfig {
        level,
        ..LoggingConfig::default()
    });

    let config = TcpServerConfig::from_env()?;
    validate_config(&config)?;

    info!("=== 채팅 서버 설정 ===");
    info!("바인딩: {}:{}", config.host, config.port);
    info!("I/O 워커: {}, 잡 워커: {}", config.io_workers, config.job_workers);
    info!("최대 접속: {}, 방 최대 인원: {}", config.max_sessions, config.max_room_players);
    info!("======================");

    let server = ChatServer::new(&config)?;
    server.start()?;

    // 엔진 런타임에서 종료 시그널 대기
    server
        .context()
        .dispatcher()
        .runtime_handle()
        .block_on(tokio::signal::ctrl_c())
        .context("종료 시그널 대기 실패")?;
    info!("종료 시그널 수신, 서버를 중지합니다...");

    let stats = server.stats();
    info!(
        "접속 통계: accepted {}, connected {}, disconnected {}",
        stats.accepted, stats.connected, stats.disconnected
    );
    server.stop();
    Ok(())
}
