//! Tests for round-robin handoff of accepted sockets

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use docserve::server::dispatch::{DispatchError, Dispatcher, Handoff};
use tokio::sync::mpsc;

/// Returns a connected (client, server-side) socket pair.
fn socket_pair(listener: &TcpListener) -> (TcpStream, TcpStream, SocketAddr) {
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, peer) = listener.accept().unwrap();
    (client, server, peer)
}

fn channels(count: usize, depth: usize) -> (Vec<mpsc::Sender<Handoff>>, Vec<mpsc::Receiver<Handoff>>) {
    (0..count).map(|_| mpsc::channel(depth)).unzip()
}

#[test]
fn test_round_robin_assignment() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (senders, mut receivers) = channels(3, 16);
    let dispatcher = Dispatcher::new(senders);

    let mut clients = Vec::new();
    for k in 0..7 {
        let (client, server, peer) = socket_pair(&listener);
        clients.push(client);

        let worker = dispatcher.dispatch(server, peer).unwrap();
        assert_eq!(worker, k % 3);
    }

    let received: Vec<usize> = receivers
        .iter_mut()
        .map(|rx| {
            let mut count = 0;
            while let Ok(message) = rx.try_recv() {
                assert!(matches!(message, Handoff::Accepted { .. }));
                count += 1;
            }
            count
        })
        .collect();
    assert_eq!(received, vec![3, 2, 2]);
}

#[test]
fn test_handoff_preserves_peer_address() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (senders, mut receivers) = channels(1, 4);
    let dispatcher = Dispatcher::new(senders);

    let (client, server, peer) = socket_pair(&listener);
    dispatcher.dispatch(server, peer).unwrap();

    match receivers[0].try_recv().unwrap() {
        Handoff::Accepted { peer: received, .. } => {
            assert_eq!(received, client.local_addr().unwrap());
        }
        Handoff::Shutdown => panic!("unexpected sentinel"),
    }
}

#[test]
fn test_full_channel_sheds_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (senders, _receivers) = channels(1, 1);
    let dispatcher = Dispatcher::new(senders);

    let (_first_client, first, first_peer) = socket_pair(&listener);
    assert_eq!(dispatcher.dispatch(first, first_peer), Ok(0));

    let (mut shed_client, second, second_peer) = socket_pair(&listener);
    assert_eq!(
        dispatcher.dispatch(second, second_peer),
        Err(DispatchError::Full { worker: 0 })
    );

    // The listener closed the shed socket: the client sees end of stream.
    shed_client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(shed_client.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_closed_channel_sheds_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (senders, receivers) = channels(2, 4);
    drop(receivers);
    let dispatcher = Dispatcher::new(senders);

    let (_client, server, peer) = socket_pair(&listener);
    assert_eq!(
        dispatcher.dispatch(server, peer),
        Err(DispatchError::Closed { worker: 0 })
    );
}

#[test]
fn test_shedding_still_advances_round_robin() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (senders, _receivers) = channels(2, 1);
    let dispatcher = Dispatcher::new(senders);

    let mut clients = Vec::new();
    let mut results = Vec::new();
    for _ in 0..4 {
        let (client, server, peer) = socket_pair(&listener);
        clients.push(client);
        results.push(dispatcher.dispatch(server, peer));
    }

    assert_eq!(
        results,
        vec![
            Ok(0),
            Ok(1),
            Err(DispatchError::Full { worker: 0 }),
            Err(DispatchError::Full { worker: 1 }),
        ]
    );
}

#[test]
fn test_no_workers() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let dispatcher = Dispatcher::new(Vec::new());

    let (_client, server, peer) = socket_pair(&listener);
    assert!(dispatcher.dispatch(server, peer).is_err());
}
