//! Loopback accept/receive/send scenarios driving a full event loop.

mod common;

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;
use std::time::Duration;

use proactor_net::{Buffer, LoopEvent, Proactor, SocketKind, Status};

const TICK: Duration = Duration::from_millis(25);

/// Stops the loop if a test scenario wedges instead of hanging the suite.
fn install_tick_guard(p: &mut Proactor, max_ticks: u32) {
    let mut ticks = 0;
    p.set_event_callback(move |p, event, _status| {
        if event == LoopEvent::Tick {
            ticks += 1;
            if ticks > max_ticks {
                p.stop();
            }
        }
    });
}

#[test]
fn accept_fires_once_with_usable_handle() {
    common::init_logging();
    let mut p = Proactor::new(TICK).expect("proactor");
    install_tick_guard(&mut p, 200);

    let listener = p
        .open(SocketKind::TcpListener, "127.0.0.1", 0)
        .expect("listener");
    let port = p.local_addr(listener).expect("local").port();

    let accepted = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&accepted);
    p.set_accept_callback(listener, move |p, _listener, result| {
        sink.borrow_mut().push(result.expect("accept ok"));
        p.stop();
    })
    .expect("set accept");

    let _client = p
        .open(SocketKind::TcpClient, "127.0.0.1", port)
        .expect("client");
    assert_eq!(p.run(), Status::Ok);

    let accepted = accepted.borrow();
    assert_eq!(accepted.len(), 1, "accept callback fired exactly once");
    assert!(p.local_addr(accepted[0]).is_ok());
    assert!(p.remote_addr(accepted[0]).is_ok());
    assert_eq!(p.socket_count(), 3);
}

#[test]
fn tcp_round_trip_preserves_bytes_in_order() {
    common::init_logging();
    const MSG: &[u8] = b"the quick brown fox jumps over the lazy dog";

    let mut p = Proactor::new(TICK).expect("proactor");
    install_tick_guard(&mut p, 400);

    let listener = p
        .open(SocketKind::TcpListener, "127.0.0.1", 0)
        .expect("listener");
    let port = p.local_addr(listener).expect("local").port();

    // Server side: echo every chunk back, re-arming after each flush.
    p.set_accept_callback(listener, |p, _listener, result| {
        let server = result.expect("accept ok");
        p.set_receive_callback(server, |p, server, _from, data, status| {
            if status == Status::Ok {
                p.start_send(server, data).expect("echo send");
            }
        })
        .expect("server receive cb");
        p.set_sent_callback(server, |p, server, _data, status| {
            if status == Status::Ok {
                let _ = p.start_receive(server, Buffer::with_capacity(1024));
            }
        })
        .expect("server sent cb");
        p.start_receive(server, Buffer::with_capacity(1024))
            .expect("server receive");
    })
    .expect("set accept");

    let client = p
        .open(SocketKind::TcpClient, "127.0.0.1", port)
        .expect("client");

    // Client side: accumulate echoed bytes until the message is complete;
    // the stream may deliver it in any number of chunks.
    let got = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&got);
    p.set_receive_callback(client, move |p, client, _from, data, status| {
        assert_eq!(status, Status::Ok);
        sink.borrow_mut().extend_from_slice(data.as_slice());
        if sink.borrow().len() >= MSG.len() {
            p.stop();
        } else {
            p.start_receive(client, Buffer::with_capacity(1024))
                .expect("client re-arm");
        }
    })
    .expect("client receive cb");

    p.start_receive(client, Buffer::with_capacity(1024))
        .expect("client receive");
    p.start_send(client, Buffer::from_vec(MSG.to_vec()))
        .expect("client send");

    assert_eq!(p.run(), Status::Ok);
    assert_eq!(got.borrow().as_slice(), MSG);
}

#[test]
fn large_send_to_slow_reader_completes_once() {
    common::init_logging();
    const TOTAL: usize = 4 << 20;

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("peer listener");
    let port = listener.local_addr().expect("peer local").port();
    let reader = std::thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("peer accept");
        let mut total = 0usize;
        let mut buf = [0u8; 4096];
        loop {
            // Drain slowly so the sender hits partial writes.
            std::thread::sleep(Duration::from_micros(200));
            match conn.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) => panic!("peer read failed: {err}"),
            }
        }
        total
    });

    let mut p = Proactor::new(TICK).expect("proactor");
    install_tick_guard(&mut p, 2000);

    let client = p
        .open(SocketKind::TcpClient, "127.0.0.1", port)
        .expect("client");

    let completions = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&completions);
    p.set_sent_callback(client, move |p, client, data, status| {
        sink.borrow_mut().push((data.len(), status));
        p.close(client).expect("close after send");
        p.stop();
    })
    .expect("sent cb");

    p.start_send(client, Buffer::from_vec(vec![0xA5; TOTAL]))
        .expect("start send");
    assert_eq!(p.run(), Status::Ok);

    let total = reader.join().expect("reader join");
    assert_eq!(total, TOTAL, "every byte reached the peer");
    assert_eq!(
        completions.borrow().as_slice(),
        &[(TOTAL, Status::Ok)],
        "send-complete fired exactly once, accounting for every byte"
    );
}

#[test]
fn udp_reply_goes_to_learned_remote() {
    common::init_logging();
    let mut p = Proactor::new(TICK).expect("proactor");
    install_tick_guard(&mut p, 400);

    let udp = p.open(SocketKind::Udp, "127.0.0.1", 0).expect("udp");
    let engine_addr = p.local_addr(udp).expect("local");

    let peer = std::thread::spawn(move || {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("peer bind");
        socket
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("peer timeout");
        socket.send_to(b"ping", engine_addr).expect("peer send");

        let mut buf = [0u8; 64];
        let (n, from) = socket.recv_from(&mut buf).expect("peer recv");
        (buf[..n].to_vec(), from)
    });

    p.set_receive_callback(udp, |p, udp, from, data, status| {
        assert_eq!(status, Status::Ok);
        assert!(from.is_some(), "datagram source is reported");
        assert_eq!(data.as_slice(), b"ping");
        // The remote was learned from this receive; reply to it.
        p.start_send(udp, Buffer::from_vec(b"pong".to_vec()))
            .expect("reply");
    })
    .expect("receive cb");
    p.set_sent_callback(udp, |p, _udp, _data, status| {
        assert_eq!(status, Status::Ok);
        p.stop();
    })
    .expect("sent cb");
    p.start_receive(udp, Buffer::with_capacity(64))
        .expect("start receive");

    assert_eq!(p.run(), Status::Ok);

    let (reply, from) = peer.join().expect("peer join");
    assert_eq!(reply, b"pong");
    assert_eq!(from, engine_addr);
}
