//! Sessions over in-memory transports: handshake, concurrent senders and
//! windowed flow control

use ldaprepl_core::protocol::*;
use ldaprepl_core::session::{FrameCodec, ReceiveWindow, SendWindow, SessionReader, SessionWriter};
use ldaprepl_core::{CsnGenerator, ReplicationConfig, ServerState, SharedServerState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const FRAME_LIMIT: usize = 64 * 1024;

fn modify(csn: ldaprepl_core::Csn, n: usize) -> ReplicationMessage {
    ModifyMsg::new(
        csn,
        format!("uid=user{},ou=People,dc=example,dc=com", n),
        format!("uuid-{}", n),
        Vec::new(),
    )
    .into()
}

#[tokio::test]
async fn test_handshake_negotiates_lowest_version() {
    let codec = FrameCodec::new(FRAME_LIMIT);
    let (mut ds_io, mut rs_io) = tokio::io::duplex(FRAME_LIMIT);

    let config = ReplicationConfig::new(16, "dc=example,dc=com").with_window_size(50);
    let generator = CsnGenerator::new(16);
    let mut state = ServerState::new();
    state.update(generator.new_csn().unwrap());
    let start = config.server_start_msg(state.clone(), 1248);

    // Start messages travel before the version is known
    let payload = start.encode(config.max_protocol_version).unwrap();
    codec.write(&mut ds_io, &payload).await.unwrap();

    let received = codec.read(&mut rs_io).await.unwrap().unwrap();
    let ReplicationMessage::ServerStart(remote) =
        ReplicationMessage::decode_any(&received, ProtocolVersion::V4).unwrap()
    else {
        panic!("expected a server start");
    };
    assert_eq!(remote.server_id, 16);
    assert_eq!(remote.receive_window_size, 50);
    assert_eq!(remote.server_state, state);
    assert_eq!(remote.protocol_version, ProtocolVersion::CURRENT);

    let rs_max = ProtocolVersion::V4;
    let version = ProtocolVersion::negotiate(rs_max, remote.protocol_version);
    assert_eq!(version, ProtocolVersion::V4);

    let reply = ReplServerStartMsg::new(
        25,
        "rs.example.com:8989",
        "dc=example,dc=com",
        100,
        ServerState::new(),
        1248,
        false,
        1,
        5000,
    );
    codec.write(&mut rs_io, &reply.encode(rs_max).unwrap()).await.unwrap();
    let received = codec.read(&mut ds_io).await.unwrap().unwrap();
    let ReplicationMessage::ReplServerStart(reply) =
        ReplicationMessage::decode_any(&received, ProtocolVersion::CURRENT).unwrap()
    else {
        panic!("expected a replication server start");
    };
    assert_eq!(
        ProtocolVersion::negotiate(config.max_protocol_version, reply.protocol_version),
        version
    );

    // From here on both sides speak the negotiated version
    let (ds_writer, _ds_task) = SessionWriter::spawn(ds_io, version, codec, 8);
    let mut rs_reader = SessionReader::new(rs_io, version, codec);
    ds_writer
        .send(&config.start_session_msg(ServerStatus::Normal).into())
        .await
        .unwrap();
    let msg = rs_reader.next_message().await.unwrap().unwrap();
    assert_eq!(msg.message_type(version), MessageType::StartSession);
}

#[tokio::test]
async fn test_concurrent_senders_keep_per_sender_order() {
    const SENDERS: u16 = 4;
    const PER_SENDER: usize = 25;

    let codec = FrameCodec::new(FRAME_LIMIT);
    let (a, b) = tokio::io::duplex(4096);
    let (writer, task) = SessionWriter::spawn(a, ProtocolVersion::CURRENT, codec, 4);

    let mut handles = Vec::new();
    for replica in 1..=SENDERS {
        let writer = writer.clone();
        handles.push(tokio::spawn(async move {
            let generator = CsnGenerator::new(replica);
            for n in 0..PER_SENDER {
                writer.send(&modify(generator.new_csn().unwrap(), n)).await.unwrap();
            }
        }));
    }
    drop(writer);

    let reader_task = tokio::spawn(async move {
        let mut reader = SessionReader::new(b, ProtocolVersion::CURRENT, codec);
        let state = SharedServerState::new();
        let mut last_seen = HashMap::new();
        while let Some(msg) = reader.next_message().await.unwrap() {
            let ReplicationMessage::Update(update) = msg else {
                panic!("expected an update");
            };
            let csn = update.csn();
            if let Some(prev) = last_seen.insert(csn.replica_id(), csn) {
                assert!(prev < csn, "{} arrived after {}", csn, prev);
            }
            assert!(state.update(csn));
        }
        (reader.received(), state.snapshot())
    });

    for handle in handles {
        handle.await.unwrap();
    }
    task.await.unwrap().unwrap();
    let (received, state) = reader_task.await.unwrap();
    assert_eq!(received, u64::from(SENDERS) * PER_SENDER as u64);
    assert_eq!(state.len(), usize::from(SENDERS));
}

#[tokio::test]
async fn test_window_credits_flow_back() {
    const WINDOW: i32 = 10;
    const UPDATES: usize = 45;

    let codec = FrameCodec::new(FRAME_LIMIT);
    let version = ProtocolVersion::CURRENT;
    let (ds_io, rs_io) = tokio::io::duplex(4096);
    let (ds_read, ds_write) = tokio::io::split(ds_io);
    let (rs_read, rs_write) = tokio::io::split(rs_io);

    let (ds_writer, ds_task) = SessionWriter::spawn(ds_write, version, codec, 8);
    let (rs_writer, rs_task) = SessionWriter::spawn(rs_write, version, codec, 8);
    let send_window = Arc::new(SendWindow::new(WINDOW));

    // Inbound side of the directory server: window messages refill credits
    let credit_task = {
        let send_window = send_window.clone();
        tokio::spawn(async move {
            let mut reader = SessionReader::new(ds_read, version, codec);
            let mut windows = 0;
            while let Some(msg) = reader.next_message().await.unwrap() {
                if let ReplicationMessage::Window(window) = msg {
                    send_window.grant(&window);
                    windows += 1;
                }
            }
            windows
        })
    };

    // Replication server: consume updates, return credits
    let rs = tokio::spawn(async move {
        let mut reader = SessionReader::new(rs_read, version, codec);
        let window = ReceiveWindow::new(WINDOW);
        let mut applied = 0;
        while let Some(msg) = reader.next_message().await.unwrap() {
            if msg.is_update() {
                applied += 1;
                if let Some(credit) = window.consume() {
                    rs_writer.send(&credit.into()).await.unwrap();
                }
            }
        }
        drop(rs_writer);
        applied
    });

    let generator = CsnGenerator::new(7);
    for n in 0..UPDATES {
        tokio::time::timeout(Duration::from_secs(5), send_window.acquire())
            .await
            .expect("window never refilled")
            .unwrap();
        ds_writer.send(&modify(generator.new_csn().unwrap(), n)).await.unwrap();
    }
    drop(ds_writer);
    ds_task.await.unwrap().unwrap();

    assert_eq!(rs.await.unwrap(), UPDATES);
    rs_task.await.unwrap().unwrap();
    let windows = credit_task.await.unwrap();
    assert_eq!(windows, UPDATES / (WINDOW as usize / 2));
}

#[test]
fn test_window_probe_returns_pending_credits() {
    let window = ReceiveWindow::new(10);
    assert!(window.consume().is_none());
    assert!(window.consume().is_none());
    let probe: ReplicationMessage = WindowProbeMsg.into();
    assert_eq!(probe.message_type(ProtocolVersion::CURRENT), MessageType::WindowProbe);
    assert_eq!(window.on_window_probe().num_ack(), 2);
    assert_eq!(window.on_window_probe().num_ack(), 0);
}

#[tokio::test]
async fn test_corrupted_frame_is_an_error() {
    let codec = FrameCodec::new(FRAME_LIMIT);
    let (mut a, b) = tokio::io::duplex(1024);
    let mut frame = codec.encode(&WindowMsg::new(5).encode(ProtocolVersion::V4).unwrap()).unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    tokio::io::AsyncWriteExt::write_all(&mut a, &frame).await.unwrap();
    drop(a);

    let mut reader = SessionReader::new(b, ProtocolVersion::V4, codec);
    assert!(reader.next_message().await.is_err());
    assert_eq!(reader.received(), 0);
}
