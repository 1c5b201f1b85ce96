//! 엔진 설정
//!
//! 네트워크, 디스패처, 잡, 락, 메모리, 패킷 설정을 묶은 [`EngineConfig`] 를 제공합니다.
//! 환경변수 로딩은 애플리케이션 계층의 몫이며, 여기서는 기본값과 검증만 담당합니다.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::network::packet::PACKET_HEADER_SIZE;

/// 알 수 없는 패킷 ID 처리 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnknownPacketPolicy {
    /// 로그 후 패킷만 버림 (세션 유지)
    #[default]
    Ignore,
    /// 세션 연결 해제
    Disconnect,
}

/// 네트워크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// 미리 걸어둘 비동기 accept 슬롯 수
    pub accept_slots: usize,
    /// 수신 버퍼 단위 크기 (실제 용량은 10배)
    pub recv_buffer_size: usize,
    /// 최대 세션 수 (ClientService 는 이 수만큼 접속)
    pub max_session_count: usize,
    /// listen backlog
    pub backlog: i32,
    /// TCP_NODELAY
    pub tcp_nodelay: bool,
    /// SO_LINGER (None 이면 OS 기본값)
    pub linger: Option<Duration>,
    /// SO_SNDBUF (None 이면 OS 기본값)
    pub send_buffer_size: Option<usize>,
    /// SO_RCVBUF (None 이면 OS 기본값)
    pub recv_os_buffer_size: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            accept_slots: 4,
            recv_buffer_size: 0x10000, // 64KB
            max_session_count: 1000,
            backlog: 1024,
            tcp_nodelay: true,
            linger: None,
            send_buffer_size: None,
            recv_os_buffer_size: None,
        }
    }
}

/// I/O 디스패처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Dispatch 를 돌리는 I/O 워커 스레드 수
    pub io_worker_count: usize,
    /// 비동기 I/O 를 진행시키는 tokio 런타임 스레드 수
    pub io_driver_threads: usize,
    /// Dispatch 1회 대기 시간
    pub dispatch_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            io_worker_count: num_cpus::get().clamp(2, 8),
            io_driver_threads: 2,
            dispatch_timeout: Duration::from_millis(10),
        }
    }
}

/// 잡 시스템 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// 잡 큐를 flush 하는 워커 스레드 수
    pub job_worker_count: usize,
    /// 한 워커가 하나의 큐를 독점할 수 있는 최대 시간
    pub flush_time_slice: Duration,
    /// 타이머 스레드 최대 대기 시간
    pub timer_max_wait: Duration,
    /// 워커가 hot queue 를 기다리는 시간
    pub worker_wait: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            job_worker_count: num_cpus::get().clamp(2, 8),
            flush_time_slice: Duration::from_millis(64),
            timer_max_wait: Duration::from_millis(100),
            worker_wait: Duration::from_millis(10),
        }
    }
}

/// 락 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// 획득 타임아웃 (초과 시 프로세스 중단)
    pub acquire_timeout: Duration,
    /// 양보 전 최대 스핀 횟수
    pub max_spin_count: u32,
    /// 락 순서 그래프 기반 데드락 감지 활성화
    pub deadlock_detection: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(10),
            max_spin_count: 5000,
            deadlock_detection: cfg!(debug_assertions),
        }
    }
}

/// 메모리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// SendChunk 크기
    pub send_chunk_size: usize,
    /// 풀에 보관할 최대 SendChunk 수
    pub send_chunk_pool_capacity: usize,
    /// 크기별 풀에 보관할 최대 블록 수
    pub max_blocks_per_class: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            send_chunk_size: 6000 * 10,
            send_chunk_pool_capacity: 256,
            max_blocks_per_class: 1024,
        }
    }
}

/// 패킷 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketConfig {
    pub unknown_packet_policy: UnknownPacketPolicy,
}

/// 엔진 전체 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub network: NetworkConfig,
    pub dispatcher: DispatcherConfig,
    pub job: JobConfig,
    pub lock: LockConfig,
    pub memory: MemoryConfig,
    pub packet: PacketConfig,
}

impl EngineConfig {
    /// 설정값을 검증합니다.
    pub fn validate(&self) -> CoreResult<()> {
        if self.dispatcher.io_worker_count == 0 {
            return Err(CoreError::InvalidConfig("I/O 워커 수는 0 일 수 없습니다".into()));
        }
        if self.dispatcher.io_driver_threads == 0 {
            return Err(CoreError::InvalidConfig("I/O 드라이버 스레드 수는 0 일 수 없습니다".into()));
        }
        if self.job.job_worker_count == 0 {
            return Err(CoreError::InvalidConfig("잡 워커 수는 0 일 수 없습니다".into()));
        }
        if self.network.accept_slots == 0 {
            return Err(CoreError::InvalidConfig("accept 슬롯 수는 0 일 수 없습니다".into()));
        }
        if self.network.recv_buffer_size < PACKET_HEADER_SIZE {
            return Err(CoreError::InvalidConfig(format!(
                "수신 버퍼 크기가 너무 작습니다: {}",
                self.network.recv_buffer_size
            )));
        }
        if self.memory.send_chunk_size < PACKET_HEADER_SIZE {
            return Err(CoreError::InvalidConfig(format!(
                "SendChunk 크기가 너무 작습니다: {}",
                self.memory.send_chunk_size
            )));
        }
        if self.lock.acquire_timeout.is_zero() {
            return Err(CoreError::InvalidConfig("락 타임아웃은 0 일 수 없습니다".into()));
        }
        Ok(())
    }
}
