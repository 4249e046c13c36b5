//! # End-to-End Sessions
//!
//! A simulator process and an external client, each on its own thread, talk
//! through real sockets: once directly and once through the multiplexer.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cosim_bridge::config::{BridgeConfig, MuxConfig};
use cosim_bridge::scheduler::{RunSummary, Termination};
use cosim_bridge::scheduler::payload::decode_i32s;
use cosim_bridge::session::{ClientSession, Multiplexer, Peer, Session, SessionError};
use cosim_bridge::sim::{BumpController, FirmwareSimulator};
use cosim_bridge::Scheduler;
use pretty_assertions::assert_eq;

use crate::common::harness::{config_in, init_tracing, socket_dir};

fn bump(value: i32) -> Vec<u8> {
    let mut data = value.to_le_bytes().to_vec();
    data.resize(8, 0);
    data
}

/// Runs the bump controller behind `session` until the client finishes.
fn run_simulator(config: &BridgeConfig, session: Session) -> RunSummary {
    let firmware = Box::new(BumpController::new(&config.firmware, &config.device));
    let sim = FirmwareSimulator::from_config(&config.device, &config.firmware, firmware);
    let mut scheduler = Scheduler::new(
        session.name().to_string(),
        sim,
        session.into_connection(),
        config.scheduler.clone(),
    );
    scheduler.run().unwrap()
}

/// Plays the external runtime: bump on the second of three steps.
fn drive(client: &mut ClientSession) -> Vec<Vec<i32>> {
    client.init(10).unwrap();
    [0, 1, 0]
        .into_iter()
        .map(|b| decode_i32s(&client.exchange(&bump(b)).unwrap().unwrap()).unwrap())
        .collect()
}

fn connect_direct_with_retry(dir: &Path, name: &str) -> ClientSession {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match ClientSession::connect_direct(dir, name) {
            Ok(client) => return client,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
            Err(e) => panic!("simulator never came up: {e}"),
        }
    }
}

#[test]
fn test_direct_session_runs_bump_controller() {
    init_tracing();
    let dir = socket_dir();
    let config = config_in(&dir);

    let server_config = config.clone();
    let server = thread::spawn(move || {
        let session = Session::listen(&server_config.session.socket_dir, "gem5-0").unwrap();
        assert!(matches!(session.peer(), Peer::Direct(_)));
        run_simulator(&server_config, session)
    });

    let mut client = connect_direct_with_retry(dir.path(), "gem5-0");
    assert_eq!(client.server(), "gem5-0");
    let replies = drive(&mut client);
    client.finish().unwrap();

    assert_eq!(replies, vec![vec![0, 0], vec![10, 10], vec![-10, -10]]);
    let summary = server.join().unwrap();
    assert_eq!(summary.session, "gem5-0");
    assert_eq!(summary.termination, Termination::PeerDone);
    assert_eq!(summary.stats.exchanges, 3);
    assert_eq!(summary.stats.result_responses, 2);
}

#[test]
fn test_routed_sessions_pair_through_multiplexer() {
    init_tracing();
    let dir = socket_dir();
    let mut config = config_in(&dir);
    config.mux = MuxConfig {
        poll_interval_ms: 2,
        ..MuxConfig::default()
    };

    let mut mux = Multiplexer::from_config(&config).unwrap();
    let mux_path = mux.path().to_path_buf();
    let mux_thread = thread::spawn(move || {
        let summary = mux.serve(&AtomicBool::new(false)).unwrap();
        mux.join_relays();
        summary
    });

    let servers: Vec<_> = ["gem5-0", "gem5-1"]
        .into_iter()
        .map(|name| {
            let config = config.clone();
            let path = mux_path.clone();
            thread::spawn(move || {
                let session = Session::register(&path, name).unwrap();
                run_simulator(&config, session)
            })
        })
        .collect();

    let mut client1 = ClientSession::connect(&mux_path, "R1").unwrap();
    let mut client0 = ClientSession::connect(&mux_path, "R0").unwrap();
    assert_eq!(client0.server(), "gem5-0");
    assert_eq!(client1.server(), "gem5-1");

    let expected = vec![vec![0, 0], vec![10, 10], vec![-10, -10]];
    assert_eq!(drive(&mut client0), expected);
    assert_eq!(drive(&mut client1), expected);
    client0.finish().unwrap();
    client1.finish().unwrap();

    for server in servers {
        let summary = server.join().unwrap();
        assert_eq!(summary.termination, Termination::PeerDone);
    }
    let summary = mux_thread.join().unwrap();
    assert_eq!(summary.pairings.len(), 2);
    assert!(summary.errors.is_empty());
}

#[test]
fn test_silent_registrant_does_not_stall_pairing() {
    init_tracing();
    let dir = socket_dir();
    let mut config = config_in(&dir);
    config.mux = MuxConfig {
        routes: [("R0".to_string(), "gem5-0".to_string())].into(),
        registration_timeout_ms: 3_000,
        poll_interval_ms: 2,
    };

    let mut mux = Multiplexer::from_config(&config).unwrap();
    let mux_path = mux.path().to_path_buf();
    let mux_thread = thread::spawn(move || {
        let summary = mux.serve(&AtomicBool::new(false)).unwrap();
        mux.join_relays();
        summary
    });

    let silent = std::os::unix::net::UnixStream::connect(&mux_path).unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let server_path = mux_path.clone();
    let server = thread::spawn(move || Session::register(&server_path, "gem5-0").unwrap());
    let client = ClientSession::connect(&mux_path, "R0").unwrap();
    let session = server.join().unwrap();
    let waited = started.elapsed();

    assert_eq!(client.server(), "gem5-0");
    assert!(waited < Duration::from_millis(1_500), "pairing took {waited:?}");

    drop(client);
    drop(session);
    let summary = mux_thread.join().unwrap();
    assert_eq!(summary.pairings.len(), 1);
    drop(silent);
}

#[test]
fn test_unrouted_server_is_rejected() {
    let dir = socket_dir();
    let config = config_in(&dir);

    let mut mux = Multiplexer::from_config(&config).unwrap();
    let mux_path = mux.path().to_path_buf();
    let shutdown = Arc::new(AtomicBool::new(false));
    let mux_shutdown = Arc::clone(&shutdown);
    let mux_thread = thread::spawn(move || mux.serve(&mux_shutdown).unwrap());

    match Session::register(&mux_path, "gem5-9") {
        Err(SessionError::Rejected(reason)) => assert!(reason.contains("gem5-9")),
        other => panic!("expected a rejection, got {other:?}"),
    }

    shutdown.store(true, Ordering::Release);
    let summary = mux_thread.join().unwrap();
    assert!(summary.pairings.is_empty());
    assert_eq!(summary.errors.len(), 1);
}

#[test]
fn test_simulator_exit_reaches_client() {
    let dir = socket_dir();
    let mut config = config_in(&dir);
    config.firmware.shutdown_after = Some(1);

    let server_config = config.clone();
    let server = thread::spawn(move || {
        let session = Session::listen(&server_config.session.socket_dir, "gem5-0").unwrap();
        run_simulator(&server_config, session)
    });

    let mut client = connect_direct_with_retry(dir.path(), "gem5-0");
    client.init(10).unwrap();
    assert_eq!(client.exchange(&bump(0)).unwrap(), Some(vec![0; 8]));
    assert_eq!(client.exchange(&bump(0)).unwrap(), None);

    let summary = server.join().unwrap();
    assert_eq!(summary.termination, Termination::FirmwareExit { code: 0 });
}
