//! 채팅 방
//!
//! 방 상태는 방 자신의 잡 큐에서만 바뀝니다. 입장/퇴장/채팅 요청은 모두
//! `push_method` 로 큐에 넣어지고, 워커 하나가 순서대로 실행합니다.

use parking_lot::Mutex;
use servercore::network::{make_send_buffer, PacketPayload, Session};
use servercore::{AppContext, JobQueue, JobSerializer, SendBufferManager};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::protocol::{ChatNotify, EnterRoomResponse, JsonPacket, PlayerJoined, PlayerLeft};

/// 방 안의 플레이어
struct Player {
    name: String,
    session: Arc<Session>,
}

pub struct Room {
    id: u32,
    queue: Arc<JobQueue>,
    send_buffers: Arc<SendBufferManager>,
    max_players: usize,
    // 잡 안에서만 잠그므로 경합하지 않음
    players: Mutex<HashMap<u64, Player>>,
    player_count: AtomicUsize,
}

impl JobSerializer for Room {
    fn job_queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }
}

impl Room {
    pub fn new(id: u32, context: &AppContext, max_players: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            queue: context.create_job_queue(),
            send_buffers: context.send_buffers().clone(),
            max_players,
            players: Mutex::new(HashMap::new()),
            player_count: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Acquire)
    }

    /// 입장 처리 (잡 안에서 실행)
    pub fn enter(&self, session: Arc<Session>, name: String) {
        let player_id = session.session_id();
        let mut players = self.players.lock();

        let rejection = if players.contains_key(&player_id) {
            Some("이미 입장한 세션입니다")
        } else if players.len() >= self.max_players {
            Some("방이 가득 찼습니다")
        } else if name.trim().is_empty() {
            Some("이름이 비어 있습니다")
        } else {
            None
        };

        if let Some(reason) = rejection {
            debug!("방 {} 입장 거부: 세션 {} ({})", self.id, player_id, reason);
            self.send_to(
                &session,
                &EnterRoomResponse {
                    success: false,
                    player_id,
                    players: Vec::new(),
                    reason: Some(reason.to_string()),
                },
            );
            return;
        }

        let existing: Vec<String> = players.values().map(|p| p.name.clone()).collect();
        self.send_to(
            &session,
            &EnterRoomResponse {
                success: true,
                player_id,
                players: existing,
                reason: None,
            },
        );

        let joined = PlayerJoined {
            player_id,
            name: name.clone(),
        };
        Self::broadcast_to(&self.send_buffers, players.values(), &joined);

        players.insert(player_id, Player { name, session });
        self.player_count.store(players.len(), Ordering::Release);
        info!("방 {} 입장: 플레이어 {} (현재 {}명)", self.id, player_id, players.len());
    }

    /// 퇴장 처리 (잡 안에서 실행). 방에 없던 세션이면 무시합니다.
    pub fn leave(&self, player_id: u64) {
        let mut players = self.players.lock();
        let Some(player) = players.remove(&player_id) else {
            return;
        };
        self.player_count.store(players.len(), Ordering::Release);

        let left = PlayerLeft {
            player_id,
            name: player.name,
        };
        Self::broadcast_to(&self.send_buffers, players.values(), &left);
        info!("방 {} 퇴장: 플레이어 {} (현재 {}명)", self.id, player_id, players.len());
    }

    /// 채팅 (잡 안에서 실행). 방에 있는 모두에게, 보낸 사람 포함.
    pub fn chat(&self, player_id: u64, message: String) {
        let players = self.players.lock();
        let Some(sender) = players.get(&player_id) else {
            debug!("방 {} 에 없는 세션 {} 의 채팅 무시", self.id, player_id);
            return;
        };

        let notify = ChatNotify {
            player_id,
            name: sender.name.clone(),
            message,
        };
        Self::broadcast_to(&self.send_buffers, players.values(), &notify);
    }

    /// 끊어진 세션을 정리하고 `interval` 뒤에 다시 점검합니다.
    ///
    /// 방이 사라지면 예약된 점검도 같이 사라집니다.
    pub fn start_tick(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        self.schedule_method(interval, move |room| {
            room.remove_stale_players();
            if let Some(room) = weak.upgrade() {
                room.start_tick(interval);
            }
        });
    }

    fn remove_stale_players(&self) {
        let stale: Vec<u64> = self
            .players
            .lock()
            .iter()
            .filter(|(_, player)| !player.session.is_connected())
            .map(|(&id, _)| id)
            .collect();
        for player_id in stale {
            warn!("방 {} 에서 끊어진 플레이어 {} 정리", self.id, player_id);
            self.leave(player_id);
        }
    }

    fn send_to<P: JsonPacket + PacketPayload>(&self, session: &Session, payload: &P) {
        match make_send_buffer(&self.send_buffers, P::ID, payload) {
            Ok(buffer) => {
                // 끊어진 세션이면 실패해도 무방
                let _ = session.send(buffer);
            }
            Err(e) => e.log("방 패킷 생성"),
        }
    }

    fn broadcast_to<'a, P: JsonPacket + PacketPayload>(
        send_buffers: &SendBufferManager,
        players: impl Iterator<Item = &'a Player>,
        payload: &P,
    ) {
        let buffer = match make_send_buffer(send_buffers, P::ID, payload) {
            Ok(buffer) => buffer,
            Err(e) => return e.log("방 브로드캐스트 패킷 생성"),
        };
        for player in players {
            let _ = player.session.send(buffer.clone());
        }
    }
}
