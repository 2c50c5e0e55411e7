//! End-to-end transport tests against local listeners.

use facemark_core::{quantize, Descriptor};
use facemark_link::{
    connect, send_frame, ClientState, FrameReader, FramedClient, LinkConfig, LinkError,
    PAYLOAD_LEN,
};
use std::io::Read;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

fn local_config(port: u16) -> LinkConfig {
    LinkConfig {
        host: "127.0.0.1".into(),
        port,
        max_retries: 3,
        connect_timeout_ms: 500,
        retry_delay_ms: 20,
        write_pacing_ms: 0,
    }
}

/// A port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn delivers_all_ones_descriptor_as_exact_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let board = thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        let mut bytes = Vec::new();
        sock.read_to_end(&mut bytes).unwrap();
        bytes
    });

    let payload = quantize(&Descriptor::splat(1.0)).to_bytes();
    let mut conn = connect(&local_config(port)).unwrap();
    send_frame(&mut conn, &payload).unwrap();
    conn.close();

    let mut expected = b"START".to_vec();
    expected.extend_from_slice(&[0x7f; 128]);
    expected.extend_from_slice(b"ENDD");
    assert_eq!(board.join().unwrap(), expected);
}

#[test]
fn paced_frame_is_reassembled_by_reader() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let board = thread::spawn(move || {
        let (sock, _) = listener.accept().unwrap();
        let mut reader = FrameReader::new(sock);
        let first = reader.read_frame().unwrap();
        let after = reader.read_frame().unwrap();
        (first, after)
    });

    let payload: [u8; PAYLOAD_LEN] = std::array::from_fn(|i| (i as u8).wrapping_mul(3));
    let mut client = FramedClient::new(LinkConfig {
        write_pacing_ms: 5,
        ..local_config(port)
    });
    client.deliver(&payload).unwrap();
    assert_eq!(client.state(), ClientState::Closed);

    let (first, after) = board.join().unwrap();
    assert_eq!(first, Some(payload));
    // Session closed after one frame.
    assert_eq!(after, None);
}

#[test]
fn connect_gives_up_after_max_retries() {
    let config = local_config(closed_port());
    let start = Instant::now();
    let err = connect(&config).err().expect("nothing is listening");
    let elapsed = start.elapsed();

    match err {
        LinkError::ConnectFailure { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other}"),
    }
    // Two sleeps between three attempts.
    assert!(elapsed >= Duration::from_millis(40), "elapsed {elapsed:?}");
    assert!(
        elapsed < config.worst_case_connect() + Duration::from_secs(1),
        "elapsed {elapsed:?}"
    );
}

#[test]
fn single_attempt_to_unreachable_host_fails_without_retry() {
    let config = LinkConfig {
        host: "10.255.255.1".into(),
        port: 8887,
        max_retries: 1,
        connect_timeout_ms: 300,
        retry_delay_ms: 5_000,
        write_pacing_ms: 0,
    };
    let start = Instant::now();
    let mut client = FramedClient::new(config);
    let result = client.deliver(&[0u8; PAYLOAD_LEN]);

    assert!(matches!(
        result,
        Err(LinkError::ConnectFailure { attempts: 1, .. })
    ));
    assert_eq!(client.state(), ClientState::Failed);
    // No retry delay after the only attempt.
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
fn connect_succeeds_once_board_comes_up() {
    let port = closed_port();
    let addr = format!("127.0.0.1:{port}");
    let board = thread::spawn(move || {
        // Come up after the first attempt has been refused.
        thread::sleep(Duration::from_millis(100));
        let listener = TcpListener::bind(addr).unwrap();
        let (sock, _) = listener.accept().unwrap();
        FrameReader::new(sock).read_frame().unwrap()
    });

    let mut client = FramedClient::new(LinkConfig {
        max_retries: 10,
        retry_delay_ms: 50,
        ..local_config(port)
    });
    client.deliver(&[9u8; PAYLOAD_LEN]).unwrap();
    assert_eq!(board.join().unwrap(), Some([9u8; PAYLOAD_LEN]));
}

#[test]
fn concurrent_events_use_independent_connections() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let board = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..4 {
            let (sock, _) = listener.accept().unwrap();
            seen.push(FrameReader::new(sock).read_frame().unwrap().unwrap()[0]);
        }
        seen.sort_unstable();
        seen
    });

    let senders: Vec<_> = (0..4u8)
        .map(|i| {
            thread::spawn(move || {
                FramedClient::new(local_config(port))
                    .deliver(&[i; PAYLOAD_LEN])
                    .unwrap()
            })
        })
        .collect();
    for s in senders {
        s.join().unwrap();
    }

    assert_eq!(board.join().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn board_hanging_up_mid_frame_is_a_send_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let board = thread::spawn(move || {
        let (sock, _) = listener.accept().unwrap();
        drop(sock);
    });

    // Pacing leaves time for the reset to arrive before the later writes.
    let mut client = FramedClient::new(LinkConfig {
        write_pacing_ms: 200,
        ..local_config(port)
    });
    let result = client.deliver(&[1u8; PAYLOAD_LEN]);
    board.join().unwrap();

    assert!(
        matches!(result, Err(LinkError::SendFailure { .. })),
        "got {result:?}"
    );
    assert_eq!(client.state(), ClientState::Failed);
}
