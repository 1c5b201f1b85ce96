//! 채팅 서버 프로토콜 정의
//!
//! 패킷 본문은 JSON 입니다. 헤더(크기/ID)는 엔진의 패킷 프레이밍을 그대로 사용합니다.
//!
//! ```text
//! [size: u16][id: u16][JSON 본문]
//! ```
//!
//! `C_` 는 클라이언트 → 서버, `S_` 는 서버 → 클라이언트 방향입니다.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use servercore::network::{PacketHeader, PacketPayload, PACKET_HEADER_SIZE};
use servercore::{CoreError, CoreResult};

pub const C_ENTER_ROOM: u16 = 1;
pub const S_ENTER_ROOM: u16 = 2;
pub const S_PLAYER_JOINED: u16 = 3;
pub const C_CHAT: u16 = 4;
pub const S_CHAT: u16 = 5;
pub const C_LEAVE_ROOM: u16 = 6;
pub const S_PLAYER_LEFT: u16 = 7;
pub const C_HEARTBEAT: u16 = 8;
pub const S_HEARTBEAT: u16 = 9;

/// 패킷 ID 가 정해진 JSON 페이로드
pub trait JsonPacket: Serialize + DeserializeOwned {
    const ID: u16;
}

/// JsonPacket 마다 PacketPayload 를 구현하는 매크로
macro_rules! json_packet {
    ($($ty:ty => $id:expr),* $(,)?) => {
        $(
            impl JsonPacket for $ty {
                const ID: u16 = $id;
            }

            impl PacketPayload for $ty {
                fn encode(&self) -> CoreResult<Vec<u8>> {
                    serde_json::to_vec(self).map_err(|e| CoreError::PacketDecode {
                        id: $id,
                        message: e.to_string(),
                    })
                }

                fn decode(body: &[u8]) -> CoreResult<Self> {
                    serde_json::from_slice(body).map_err(|e| CoreError::PacketDecode {
                        id: $id,
                        message: e.to_string(),
                    })
                }
            }
        )*
    };
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnterRoomRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnterRoomResponse {
    pub success: bool,
    pub player_id: u64,
    /// 이미 방에 있던 플레이어 이름
    pub players: Vec<String>,
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerJoined {
    pub player_id: u64,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatNotify {
    pub player_id: u64,
    pub name: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LeaveRoomRequest {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerLeft {
    pub player_id: u64,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HeartbeatRequest {
    pub client_time: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HeartbeatResponse {
    pub client_time: u64,
    pub server_time_ms: u64,
}

json_packet! {
    EnterRoomRequest => C_ENTER_ROOM,
    EnterRoomResponse => S_ENTER_ROOM,
    PlayerJoined => S_PLAYER_JOINED,
    ChatRequest => C_CHAT,
    ChatNotify => S_CHAT,
    LeaveRoomRequest => C_LEAVE_ROOM,
    PlayerLeft => S_PLAYER_LEFT,
    HeartbeatRequest => C_HEARTBEAT,
    HeartbeatResponse => S_HEARTBEAT,
}

/// 헤더를 붙인 와이어 바이트 (클라이언트 / 테스트용)
pub fn to_wire<P: JsonPacket + PacketPayload>(payload: &P) -> CoreResult<Vec<u8>> {
    let body = payload.encode()?;
    let size = PACKET_HEADER_SIZE + body.len();
    if size > u16::MAX as usize {
        return Err(CoreError::PacketTooLarge { id: P::ID, size });
    }

    let mut wire = Vec::with_capacity(size);
    wire.extend_from_slice(&(size as u16).to_le_bytes());
    wire.extend_from_slice(&P::ID.to_le_bytes());
    wire.extend_from_slice(&body);
    Ok(wire)
}

/// 와이어 바이트 하나에서 페이로드를 꺼냅니다.
pub fn from_wire<P: JsonPacket + PacketPayload>(wire: &[u8]) -> CoreResult<P> {
    match PacketHeader::peek(wire) {
        Some(header) if header.id == P::ID && header.size as usize == wire.len() => {
            P::decode(&wire[PACKET_HEADER_SIZE..])
        }
        Some(header) => Err(CoreError::PacketDecode {
            id: header.id,
            message: format!("기대한 패킷 {} 가 아닙니다 (크기 {})", P::ID, header.size),
        }),
        None => Err(CoreError::PacketDecode {
            id: P::ID,
            message: "헤더가 잘렸습니다".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_header_matches_payload() {
        let wire = to_wire(&ChatRequest {
            message: "안녕".into(),
        })
        .unwrap();
        let header = PacketHeader::peek(&wire).unwrap();
        assert_eq!(header.id, C_CHAT);
        assert_eq!(header.size as usize, wire.len());

        let decoded: ChatRequest = from_wire(&wire).unwrap();
        assert_eq!(decoded.message, "안녕");
    }

    #[test]
    fn test_wrong_id_rejected() {
        let wire = to_wire(&LeaveRoomRequest {}).unwrap();
        let err = from_wire::<ChatRequest>(&wire).unwrap_err();
        assert!(matches!(err, CoreError::PacketDecode { id: C_LEAVE_ROOM, .. }));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let err = EnterRoomRequest::decode(b"{not json").unwrap_err();
        assert!(matches!(err, CoreError::PacketDecode { id: C_ENTER_ROOM, .. }));
    }
}
