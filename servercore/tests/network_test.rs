//! 루프백 네트워크 통합 테스트
//!
//! accept → 수신 프레이밍 → 에코 송신 → 연결 해제 흐름을 실제 소켓으로 검증합니다.

use parking_lot::Mutex;
use servercore::config::EngineConfig;
use servercore::network::{
    ClientService, NetAddress, Packet, PacketHandlerMap, PacketSession, PacketSessionHandler,
    ServerService, Session, SessionFactory, SessionHandler,
};
use servercore::{AppContext, SendBufferManager, UnknownPacketPolicy};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Events {
    connected: AtomicUsize,
    packets: AtomicUsize,
    sent_bytes: AtomicUsize,
    sent_calls: AtomicUsize,
    causes: Mutex<Vec<String>>,
}

struct EchoHandler {
    send_buffers: Arc<SendBufferManager>,
    events: Arc<Events>,
}

impl PacketSessionHandler for EchoHandler {
    fn on_connected(&self, _session: &Arc<Session>) {
        self.events.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnected(&self, _session: &Arc<Session>, cause: &str) {
        self.events.causes.lock().push(cause.to_string());
    }

    fn on_recv_packet(&self, session: &Arc<Session>, packet: Packet<'_>) {
        self.events.packets.fetch_add(1, Ordering::SeqCst);
        let _ = session.send(self.send_buffers.copy_from(packet.data));
    }

    fn on_sent(&self, _session: &Arc<Session>, num_bytes: usize) {
        self.events.sent_bytes.fetch_add(num_bytes, Ordering::SeqCst);
        self.events.sent_calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config(max_sessions: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.dispatcher.io_worker_count = 2;
    config.job.job_worker_count = 1;
    config.network.accept_slots = 2;
    config.network.recv_buffer_size = 1024;
    config.network.max_session_count = max_sessions;
    config
}

fn start_context(config: EngineConfig) -> Arc<AppContext> {
    let context = AppContext::new(config).unwrap();
    context.start_workers().unwrap();
    context
}

fn echo_factory(context: &AppContext, events: &Arc<Events>) -> SessionFactory {
    let send_buffers = context.send_buffers().clone();
    let events = events.clone();
    Arc::new(move || -> Box<dyn SessionHandler> {
        Box::new(PacketSession::new(EchoHandler {
            send_buffers: send_buffers.clone(),
            events: events.clone(),
        }))
    })
}

fn loopback() -> NetAddress {
    NetAddress::parse("127.0.0.1:0").unwrap()
}

fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while !predicate() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

fn packet(id: u16, size: usize, fill: u8) -> Vec<u8> {
    let mut data = vec![fill; size];
    data[0..2].copy_from_slice(&(size as u16).to_le_bytes());
    data[2..4].copy_from_slice(&id.to_le_bytes());
    data
}

fn connect(address: NetAddress) -> TcpStream {
    let stream = TcpStream::connect(address.socket_addr()).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

/// 상대가 연결을 끊었는지 (FIN 또는 RST)
fn assert_closed_by_peer(stream: &mut TcpStream) {
    let mut byte = [0u8; 1];
    match stream.read(&mut byte) {
        Ok(0) => {}
        Ok(n) => panic!("닫혀야 할 연결에서 {n} 바이트 수신"),
        Err(e) => assert!(
            !matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
            "연결이 닫히지 않음: {e}"
        ),
    }
}

#[test]
fn test_echo_with_partial_packets() {
    let context = start_context(test_config(16));
    let events = Arc::new(Events::default());
    let server = ServerService::new(&context, loopback(), echo_factory(&context, &events));
    let address = server.start().unwrap();

    let mut client = connect(address);
    let mut stream = packet(1, 20, 0x11);
    stream.extend(packet(2, 20, 0x22));
    let third = packet(3, 20, 0x33);
    stream.extend(&third[..10]);

    // 17/17/16 으로 쪼개 보내도 완성된 두 패킷만 처리되어야 함
    for chunk in [&stream[..17], &stream[17..34], &stream[34..]] {
        client.write_all(chunk).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }

    let mut echoed = vec![0u8; 40];
    client.read_exact(&mut echoed).unwrap();
    assert_eq!(echoed, stream[..40]);
    assert_eq!(events.packets.load(Ordering::SeqCst), 2);

    client.write_all(&third[10..]).unwrap();
    let mut last = vec![0u8; 20];
    client.read_exact(&mut last).unwrap();
    assert_eq!(last, third);
    assert!(wait_until(|| events.sent_bytes.load(Ordering::SeqCst) == 60));

    let service = server.service().clone();
    assert_eq!(service.current_session_count(), 1);
    drop(client);

    assert!(wait_until(|| service.current_session_count() == 0));
    assert_eq!(*events.causes.lock(), vec!["원격 종료".to_string()]);

    let stats = service.stats();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.connected, 1);
    assert_eq!(stats.disconnected, 1);

    server.close();
    context.shutdown();
}

#[test]
fn test_concurrent_sends_arrive_in_order_and_coalesce() {
    const SENDERS: u16 = 8;
    const SENDS_PER_THREAD: u32 = 1000;
    const PACKET_SIZE: usize = 8;

    let context = start_context(test_config(4));
    let events = Arc::new(Events::default());
    let server = ServerService::new(&context, loopback(), echo_factory(&context, &events));
    let address = server.start().unwrap();

    let mut client = connect(address);
    assert!(wait_until(|| server.service().current_session_count() == 1));
    let session = server.service().sessions().remove(0);

    // 패킷 = [size][id = 보낸 스레드][seq: u32]
    let start = Arc::new(std::sync::Barrier::new(SENDERS as usize));
    let senders: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let session = session.clone();
            let send_buffers = context.send_buffers().clone();
            let start = start.clone();
            std::thread::spawn(move || {
                start.wait();
                for seq in 0..SENDS_PER_THREAD {
                    let mut data = packet(sender, PACKET_SIZE, 0);
                    data[4..8].copy_from_slice(&seq.to_le_bytes());
                    session.send(send_buffers.copy_from(&data)).unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let total_sends = SENDERS as usize * SENDS_PER_THREAD as usize;
    let mut received = vec![0u8; total_sends * PACKET_SIZE];
    client.read_exact(&mut received).unwrap();

    let mut next_seq = vec![0u32; SENDERS as usize];
    for chunk in received.chunks_exact(PACKET_SIZE) {
        assert_eq!(u16::from_le_bytes([chunk[0], chunk[1]]) as usize, PACKET_SIZE);
        let sender = u16::from_le_bytes([chunk[2], chunk[3]]) as usize;
        let seq = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
        assert_eq!(seq, next_seq[sender], "스레드 {sender} 순서 어긋남");
        next_seq[sender] += 1;
    }
    assert!(next_seq.iter().all(|&n| n == SENDS_PER_THREAD));

    assert!(wait_until(|| {
        events.sent_bytes.load(Ordering::SeqCst) == total_sends * PACKET_SIZE
    }));
    // 진행 중에 쌓인 버퍼는 다음 쓰기로 묶여 나감
    let writes = events.sent_calls.load(Ordering::SeqCst);
    assert!(writes < total_sends, "쓰기 {writes}회 / 송신 {total_sends}회");

    server.close();
    context.shutdown();
}

#[test]
fn test_server_close_disconnects_sessions() {
    let context = start_context(test_config(16));
    let events = Arc::new(Events::default());
    let server = ServerService::new(&context, loopback(), echo_factory(&context, &events));
    let address = server.start().unwrap();

    let mut client = connect(address);
    assert!(wait_until(|| server.service().current_session_count() == 1));

    server.close();
    assert_closed_by_peer(&mut client);
    assert!(wait_until(|| server.service().current_session_count() == 0));
    assert_eq!(*events.causes.lock(), vec!["서버 종료".to_string()]);

    context.shutdown();
}

#[test]
fn test_broadcast_reaches_every_session() {
    let context = start_context(test_config(16));
    let events = Arc::new(Events::default());
    let server = ServerService::new(&context, loopback(), echo_factory(&context, &events));
    let address = server.start().unwrap();

    let mut clients: Vec<TcpStream> = (0..3).map(|_| connect(address)).collect();
    assert!(wait_until(|| server.service().current_session_count() == 3));

    let notice = context.send_buffers().copy_from(&packet(9, 12, 0x7F));
    assert_eq!(server.service().broadcast(&notice), 3);

    for client in clients.iter_mut() {
        let mut received = vec![0u8; 12];
        client.read_exact(&mut received).unwrap();
        assert_eq!(received, packet(9, 12, 0x7F));
    }

    server.close();
    context.shutdown();
}

#[test]
fn test_connections_over_max_are_rejected() {
    let context = start_context(test_config(1));
    let events = Arc::new(Events::default());
    let server = ServerService::new(&context, loopback(), echo_factory(&context, &events));
    let address = server.start().unwrap();

    let _first = connect(address);
    assert!(wait_until(|| server.service().current_session_count() == 1));

    let mut second = connect(address);
    assert_closed_by_peer(&mut second);
    assert_eq!(server.service().current_session_count(), 1);
    assert_eq!(events.connected.load(Ordering::SeqCst), 1);

    server.close();
    context.shutdown();
}

#[test]
fn test_client_service_connects_max_sessions() {
    let context = start_context(test_config(3));
    let server_events = Arc::new(Events::default());
    let server = ServerService::new(&context, loopback(), echo_factory(&context, &server_events));
    let address = server.start().unwrap();

    let client_events = Arc::new(Events::default());
    let client = ClientService::new(&context, address, echo_factory(&context, &client_events));
    let sessions = client.start().unwrap();
    assert_eq!(sessions.len(), 3);

    assert!(wait_until(|| client_events.connected.load(Ordering::SeqCst) == 3));
    assert!(wait_until(|| server.service().current_session_count() == 3));
    assert!(sessions.iter().all(|s| s.is_connected()));
    assert!(sessions.iter().all(|s| s.remote_address() == Some(address)));

    client.close();
    assert!(wait_until(|| server.service().current_session_count() == 0));
    assert!(wait_until(|| client.service().current_session_count() == 0));

    server.close();
    context.shutdown();
}

#[test]
fn test_connect_failure_is_reported() {
    let context = start_context(test_config(1));
    // 바인딩 후 바로 닫아 아무도 listen 하지 않는 포트를 얻음
    let unused = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        NetAddress::from(listener.local_addr().unwrap())
    };

    let events = Arc::new(Events::default());
    let client = ClientService::new(&context, unused, echo_factory(&context, &events));
    let sessions = client.start().unwrap();

    assert!(wait_until(|| client.service().stats().connect_failed == 1));
    assert!(wait_until(|| events.causes.lock().len() == 1));
    assert!(events.causes.lock()[0].starts_with("연결 실패"));
    assert!(!sessions[0].is_connected());
    assert_eq!(events.connected.load(Ordering::SeqCst), 0);

    context.shutdown();
}

#[test]
fn test_unknown_packet_disconnects_under_strict_policy() {
    struct Strict {
        handlers: PacketHandlerMap,
    }

    impl PacketSessionHandler for Strict {
        fn on_recv_packet(&self, session: &Arc<Session>, packet: Packet<'_>) {
            self.handlers.handle_packet(session, packet);
        }
    }

    let context = start_context(test_config(4));
    let factory: SessionFactory = Arc::new(|| -> Box<dyn SessionHandler> {
        let mut handlers = PacketHandlerMap::new(UnknownPacketPolicy::Disconnect);
        handlers.register_raw(1, |_, _| Ok(()));
        Box::new(PacketSession::new(Strict { handlers }))
    });
    let server = ServerService::new(&context, loopback(), factory);
    let address = server.start().unwrap();

    let mut client = connect(address);
    client.write_all(&packet(1, 8, 0)).unwrap();
    assert!(wait_until(|| server.service().current_session_count() == 1));

    client.write_all(&packet(77, 8, 0)).unwrap();
    assert_closed_by_peer(&mut client);
    assert!(wait_until(|| server.service().current_session_count() == 0));

    server.close();
    context.shutdown();
}

#[test]
fn test_corrupted_header_disconnects() {
    let context = start_context(test_config(4));
    let events = Arc::new(Events::default());
    let server = ServerService::new(&context, loopback(), echo_factory(&context, &events));
    let address = server.start().unwrap();

    let mut client = connect(address);
    // size 필드가 헤더보다 작음
    client.write_all(&[2, 0, 1, 0]).unwrap();
    assert_closed_by_peer(&mut client);
    assert!(wait_until(|| events.causes.lock().len() == 1));
    assert_eq!(events.packets.load(Ordering::SeqCst), 0);

    server.close();
    context.shutdown();
}
