//! 채팅 서버 통합 테스트
//!
//! 입장 → 채팅 → 하트비트 → 퇴장 흐름을 실제 TCP 연결로 검증합니다.

use servercore::network::PacketPayload;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tcpserver::protocol::{
    from_wire, to_wire, ChatNotify, ChatRequest, EnterRoomRequest, EnterRoomResponse,
    HeartbeatRequest, HeartbeatResponse, JsonPacket, LeaveRoomRequest, PlayerJoined, PlayerLeft,
};
use tcpserver::{ChatServer, TcpServerConfig};

fn start_server(max_room_players: usize) -> (ChatServer, std::net::SocketAddr) {
    let config = TcpServerConfig {
        port: 0,
        io_workers: 2,
        job_workers: 2,
        max_room_players,
        room_tick: Duration::from_millis(50),
        ..TcpServerConfig::default()
    };
    let server = ChatServer::new(&config).unwrap();
    let address = server.start().unwrap();
    (server, address.socket_addr())
}

fn connect(address: std::net::SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(address).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

fn send<P: JsonPacket + PacketPayload>(stream: &mut TcpStream, payload: &P) {
    stream.write_all(&to_wire(payload).unwrap()).unwrap();
}

fn expect<P: JsonPacket + PacketPayload>(stream: &mut TcpStream) -> P {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let size = u16::from_le_bytes([header[0], header[1]]) as usize;
    let id = u16::from_le_bytes([header[2], header[3]]);
    assert_eq!(id, P::ID, "예상하지 못한 패킷");

    let mut wire = header.to_vec();
    wire.resize(size, 0);
    stream.read_exact(&mut wire[4..]).unwrap();
    from_wire(&wire).unwrap()
}

fn enter(stream: &mut TcpStream, name: &str) -> EnterRoomResponse {
    send(stream, &EnterRoomRequest { name: name.into() });
    expect(stream)
}

fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn test_chat_room_flow() {
    let (server, address) = start_server(10);

    let mut alice = connect(address);
    let entered = enter(&mut alice, "alice");
    assert!(entered.success);
    assert!(entered.players.is_empty());

    let mut bob = connect(address);
    let entered = enter(&mut bob, "bob");
    assert!(entered.success);
    assert_eq!(entered.players, vec!["alice".to_string()]);

    let joined: PlayerJoined = expect(&mut alice);
    assert_eq!(joined.name, "bob");
    assert_eq!(joined.player_id, entered.player_id);

    send(&mut alice, &ChatRequest { message: "hi".into() });
    for client in [&mut alice, &mut bob] {
        let chat: ChatNotify = expect(client);
        assert_eq!(chat.name, "alice");
        assert_eq!(chat.message, "hi");
    }

    send(&mut bob, &HeartbeatRequest { client_time: 42 });
    let beat: HeartbeatResponse = expect(&mut bob);
    assert_eq!(beat.client_time, 42);
    assert!(beat.server_time_ms > 0);

    assert_eq!(server.room().player_count(), 2);
    drop(bob);

    let left: PlayerLeft = expect(&mut alice);
    assert_eq!(left.name, "bob");
    assert!(wait_until(|| server.room().player_count() == 1));

    send(&mut alice, &LeaveRoomRequest {});
    assert!(wait_until(|| server.room().player_count() == 0));

    server.stop();
}

#[test]
fn test_full_room_rejects_entry() {
    let (server, address) = start_server(1);

    let mut first = connect(address);
    assert!(enter(&mut first, "first").success);

    let mut second = connect(address);
    let rejected = enter(&mut second, "second");
    assert!(!rejected.success);
    assert!(rejected.reason.is_some());
    assert_eq!(server.room().player_count(), 1);

    server.stop();
}

#[test]
fn test_unknown_packet_keeps_session_alive() {
    let (server, address) = start_server(10);
    let mut client = connect(address);

    // 입장 전 채팅은 무시되고, 알 수 없는 ID 도 연결을 끊지 않음
    send(&mut client, &ChatRequest { message: "early".into() });
    client.write_all(&[6, 0, 0xEE, 0x03, 0, 0]).unwrap();

    send(&mut client, &HeartbeatRequest { client_time: 7 });
    let beat: HeartbeatResponse = expect(&mut client);
    assert_eq!(beat.client_time, 7);
    assert_eq!(server.stats().current_sessions, 1);

    server.stop();
}
