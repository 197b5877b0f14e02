//! Open/close/wake/stop/tick/teardown scenarios.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use proactor_net::{Buffer, LoopEvent, Proactor, ProactorHandle, SocketKind, Status};

const TICK: Duration = Duration::from_millis(25);

#[test]
fn peer_close_fires_close_callback_exactly_once() {
    common::init_logging();
    let mut p = Proactor::new(TICK).expect("proactor");

    let mut guard_ticks = 0;
    p.set_event_callback(move |p, event, _status| {
        if event == LoopEvent::Tick {
            guard_ticks += 1;
            if guard_ticks > 200 {
                p.stop();
            }
        }
    });

    let listener = p
        .open(SocketKind::TcpListener, "127.0.0.1", 0)
        .expect("listener");
    let port = p.local_addr(listener).expect("local").port();

    let client = p
        .open(SocketKind::TcpClient, "127.0.0.1", port)
        .expect("client");
    let client_cell = Rc::new(RefCell::new(Some(client)));

    let closes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&closes);
    let to_close = Rc::clone(&client_cell);
    p.set_accept_callback(listener, move |p, _listener, result| {
        let server = result.expect("accept ok");
        let sink = Rc::clone(&sink);
        p.set_close_callback(server, move |p, _server, status| {
            sink.borrow_mut().push(status);
            p.stop();
        })
        .expect("close cb");
        p.start_receive(server, Buffer::with_capacity(64))
            .expect("arm receive");

        // Drop our side of the connection; the server's next read sees
        // the peer's close as a zero-length read.
        if let Some(client) = to_close.borrow_mut().take() {
            p.close(client).expect("close client");
        }
    })
    .expect("accept cb");

    assert_eq!(p.run(), Status::Ok);
    assert_eq!(closes.borrow().as_slice(), &[Status::Terminate]);
}

#[test]
fn wake_never_hangs_and_coalesces() {
    common::init_logging();
    // Long tick: only wakes can bring the loop back early.
    let mut p = Proactor::new(Duration::from_secs(5)).expect("proactor");
    let handle = p.handle();

    let wakes = Rc::new(RefCell::new(0u32));
    let sink = Rc::clone(&wakes);
    p.set_event_callback(move |_p, event, _status| {
        if event == LoopEvent::Wake {
            *sink.borrow_mut() += 1;
        }
    });

    let waker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        for _ in 0..5 {
            handle.wake();
        }
        std::thread::sleep(Duration::from_millis(100));
        handle.stop();
    });

    let start = Instant::now();
    assert_eq!(p.run(), Status::Ok);
    waker.join().expect("waker join");

    assert!(
        start.elapsed() < Duration::from_secs(4),
        "wake and stop must interrupt the wait, not ride out the tick"
    );
    let wakes = *wakes.borrow();
    assert!(wakes >= 1, "at least one wake event delivered");
    assert!(wakes <= 6, "queued wakes coalesce rather than replay");
}

#[test]
fn ticks_fire_for_engine_and_sockets() {
    common::init_logging();
    let mut p = Proactor::new(Duration::from_millis(10)).expect("proactor");

    let udp = p.open(SocketKind::Udp, "127.0.0.1", 0).expect("udp");
    let socket_ticks = Rc::new(RefCell::new(0u32));
    let sink = Rc::clone(&socket_ticks);
    p.set_tick_callback(udp, move |_p, _udp| {
        *sink.borrow_mut() += 1;
    })
    .expect("tick cb");

    let mut engine_ticks = 0u32;
    p.set_event_callback(move |p, event, _status| {
        if event == LoopEvent::Tick {
            engine_ticks += 1;
            if engine_ticks >= 5 {
                p.stop();
            }
        }
    });

    assert_eq!(p.run(), Status::Ok);
    assert!(*socket_ticks.borrow() >= 5);
}

#[test]
fn run_and_stop_events_bracket_the_loop() {
    common::init_logging();
    let mut p = Proactor::new(TICK).expect("proactor");

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    p.set_event_callback(move |p, event, _status| {
        sink.borrow_mut().push(event);
        if event == LoopEvent::Tick {
            p.stop();
        }
    });

    assert_eq!(p.run(), Status::Ok);
    let events = events.borrow();
    assert_eq!(events.first(), Some(&LoopEvent::Run));
    assert_eq!(events.last(), Some(&LoopEvent::Stop));
    assert!(events.contains(&LoopEvent::Tick));
}

#[test]
fn dispose_terminates_every_live_socket() {
    common::init_logging();
    let mut p = Proactor::new(TICK).expect("proactor");

    let closes = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..3 {
        let udp = p.open(SocketKind::Udp, "127.0.0.1", 0).expect("udp");
        let sink = Rc::clone(&closes);
        p.set_close_callback(udp, move |_p, _udp, status| {
            sink.borrow_mut().push(status);
        })
        .expect("close cb");
    }

    let loop_events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&loop_events);
    p.set_event_callback(move |_p, event, _status| {
        sink.borrow_mut().push(event);
    });

    p.dispose();

    assert_eq!(
        closes.borrow().as_slice(),
        &[Status::Terminate, Status::Terminate, Status::Terminate]
    );
    assert_eq!(loop_events.borrow().as_slice(), &[LoopEvent::Dispose]);
}

#[test]
fn busy_receive_rejection_leaves_first_armed() {
    common::init_logging();
    let mut p = Proactor::new(TICK).expect("proactor");

    let mut guard_ticks = 0;
    p.set_event_callback(move |p, event, _status| {
        if event == LoopEvent::Tick {
            guard_ticks += 1;
            if guard_ticks > 200 {
                p.stop();
            }
        }
    });

    let udp = p.open(SocketKind::Udp, "127.0.0.1", 0).expect("udp");
    let engine_addr = p.local_addr(udp).expect("local");

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    p.set_receive_callback(udp, move |p, _udp, _from, data, status| {
        assert_eq!(status, Status::Ok);
        sink.borrow_mut().push(data.as_slice().to_vec());
        p.stop();
    })
    .expect("receive cb");

    p.start_receive(udp, Buffer::with_capacity(64))
        .expect("first receive");
    // The rejection must not disturb the receive already armed.
    assert_eq!(
        p.start_receive(udp, Buffer::with_capacity(64)),
        Err(Status::Busy)
    );

    let peer = std::thread::spawn(move || {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("peer bind");
        socket.send_to(b"still here", engine_addr).expect("peer send");
    });

    assert_eq!(p.run(), Status::Ok);
    peer.join().expect("peer join");

    assert_eq!(received.borrow().as_slice(), &[b"still here".to_vec()]);
}

#[test]
fn handle_is_usable_from_another_thread() {
    common::init_logging();
    // The proactor itself stays on its thread; only the handle crosses.
    let (tx, rx) = mpsc::channel::<ProactorHandle>();

    let loop_thread = std::thread::spawn(move || {
        let mut p = Proactor::new(TICK).expect("proactor");
        tx.send(p.handle()).expect("send handle");
        p.run()
    });

    let handle = rx.recv().expect("handle");
    std::thread::sleep(Duration::from_millis(60));
    handle.stop();

    assert_eq!(loop_thread.join().expect("join"), Status::Ok);
}

#[test]
fn close_callback_fires_with_ok_on_requested_close() {
    common::init_logging();
    let mut p = Proactor::new(TICK).expect("proactor");
    let udp = p.open(SocketKind::Udp, "127.0.0.1", 0).expect("udp");

    let closes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&closes);
    p.set_close_callback(udp, move |_p, _udp, status| {
        sink.borrow_mut().push(status);
    })
    .expect("close cb");

    p.close(udp).expect("close");
    assert_eq!(closes.borrow().as_slice(), &[Status::Ok]);
    assert_eq!(p.socket_count(), 0);

    // The handle is stale now; a second close finds nothing.
    assert_eq!(p.close(udp), Err(Status::NotFound));
    assert_eq!(closes.borrow().len(), 1);
}
