//! End-to-end engine runs over the in-memory link.

use squall_engine::{
    run_probe, run_responder, run_worker, EngineConfig, Endpoint, Mode, PacketIo, Pipeline,
    ProbeConfig, ProbeError, ReliableSender, Shutdown, Task, TaskOutcome,
};
use squall_engine::worker::WorkerConfig;
use squall_test_support::{LossGenerator, SimLink};
use squall_wire::WireProto;

fn small_endpoint() -> Endpoint {
    Endpoint {
        pkt_size: 200,
        ..Endpoint::default()
    }
}

fn tight_engine() -> EngineConfig {
    EngineConfig {
        window: 16,
        rto_cycles: 100,
        ..EngineConfig::default()
    }
}

#[test]
fn clean_transfer_completes_and_credits_every_byte() {
    let (mut a, mut b) = SimLink::pair();
    b.enable_reflect(LossGenerator::none());

    let ep = small_endpoint();
    let task = Task::new(0, vec![0xab; 10_000]);
    let mut sender = ReliableSender::new(tight_engine()).unwrap();
    let (outcome, progress) = sender.run(&mut a, &ep, &task, &Shutdown::new());

    assert_eq!(outcome, TaskOutcome::Completed);
    assert_eq!(progress.acked_bytes, 10_000);
    assert_eq!(progress.sent_bytes, 10_000);
    assert_eq!(progress.retransmits, 0);
}

#[test]
fn data_loss_is_recovered_by_retransmission() {
    let (mut a, mut b) = SimLink::pair();
    b.enable_reflect(LossGenerator::none());
    a.set_send_loss(LossGenerator::specific([3, 17, 40]));

    let ep = small_endpoint();
    let task = Task::new(0, vec![0x5a; 20_000]);
    let mut sender = ReliableSender::new(tight_engine()).unwrap();
    let (outcome, progress) = sender.run(&mut a, &ep, &task, &Shutdown::new());

    assert_eq!(outcome, TaskOutcome::Completed);
    assert_eq!(progress.acked_bytes, 20_000);
    assert!(progress.retransmits >= 3);
    assert_eq!(a.dropped(), 3);
}

#[test]
fn frontier_holds_until_missing_packet_is_retransmitted() {
    let (mut a, mut b) = SimLink::pair();
    // the third data frame's ack never comes back the first time
    b.enable_reflect(LossGenerator::specific([2]));

    let ep = small_endpoint();
    // exactly 10 packets of 146 payload bytes
    let task = Task::new(0, vec![9; 1460]);
    let mut sender = ReliableSender::new(EngineConfig {
        window: 4,
        rto_cycles: 100,
        ..EngineConfig::default()
    })
    .unwrap();

    // before the timeout: everything else is acked eagerly, but the
    // frontier parks below the missing sequence and nothing retransmits
    let mut progress = squall_engine::Progress::default();
    for _ in 0..50 {
        sender.poll(&mut a, &ep, &task, &mut progress);
    }
    assert_eq!(progress.retransmits, 0);
    assert_eq!(sender.window().last_acked(), 1);
    // frontier parked at 1 caps in-flight at the window: 6 packets out
    assert_eq!(progress.sent_bytes, 6 * 146);
    assert!(progress.acked_bytes < 1460);

    // past the timeout: one retransmission closes the gap
    for _ in 0..300 {
        sender.poll(&mut a, &ep, &task, &mut progress);
        if progress.acked_bytes == 1460 {
            break;
        }
    }
    assert!(progress.retransmits >= 1);
    assert_eq!(progress.acked_bytes, 1460);
    assert!(sender.window().is_drained());
}

#[test]
fn ack_loss_is_recovered_by_retransmission() {
    let (mut a, mut b) = SimLink::pair();
    b.enable_reflect(LossGenerator::specific([5, 6]));

    let ep = small_endpoint();
    let task = Task::new(0, vec![0x11; 15_000]);
    let mut sender = ReliableSender::new(tight_engine()).unwrap();
    let (outcome, progress) = sender.run(&mut a, &ep, &task, &Shutdown::new());

    assert_eq!(outcome, TaskOutcome::Completed);
    assert_eq!(progress.acked_bytes, 15_000);
    assert!(progress.retransmits >= 2);
}

#[test]
fn blast_streams_every_byte_without_acks() {
    let (mut a, mut b) = SimLink::pair();
    let ep = Endpoint {
        proto: WireProto::Udp,
        ..small_endpoint()
    };
    // 200-byte frames carry 158 payload bytes each
    let task = Task::new(0, vec![0x3c; 15_800]);
    let progress = squall_engine::run_blast(&mut a, &ep, &task);

    assert_eq!(progress.sent_bytes, 15_800);
    assert_eq!(progress.sent_pkts, 100);
    let mut got = Vec::new();
    let mut frames = 0;
    loop {
        let n = b.recv_burst(64, &mut got);
        if n == 0 {
            break;
        }
        frames += n;
        b.free_burst(&mut got);
    }
    assert_eq!(frames, 100);
}

#[test]
fn interrupted_transfer_reports_partial_progress() {
    // no reflector: acks never arrive, shutdown already latched
    let (mut a, _b) = SimLink::pair();
    let shutdown = Shutdown::new();
    shutdown.request();

    let ep = small_endpoint();
    let task = Task::new(0, vec![0; 5_000]);
    let mut sender = ReliableSender::new(tight_engine()).unwrap();
    let (outcome, progress) = sender.run(&mut a, &ep, &task, &shutdown);

    assert_eq!(outcome, TaskOutcome::Interrupted);
    assert!(progress.acked_bytes < 5_000);
}

#[test]
fn probe_retries_recover_isolated_timeouts() {
    let (mut a, mut b) = SimLink::pair();
    b.enable_reflect(LossGenerator::specific([2, 7]));

    let ep = small_endpoint();
    let cfg = ProbeConfig {
        num_probes: 10,
        rto_cycles: 50,
        max_retry: 3,
        rx_burst: 4,
    };
    let report = run_probe(&mut a, &ep, &cfg).unwrap();
    assert_eq!(report.len(), 10);
    assert!(report.min_us() <= report.max_us());
    let cuts = report.percentiles_us();
    for pair in cuts.windows(2) {
        assert!(pair[0].1 <= pair[1].1);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rtt.txt");
    report.write_samples(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 10);
}

#[test]
fn exhausted_retries_abort_with_partial_samples() {
    let (mut a, mut b) = SimLink::pair();
    // probes 0..=4 pass, then the link goes dark
    b.enable_reflect(LossGenerator::specific([5, 6, 7]));

    let ep = small_endpoint();
    let cfg = ProbeConfig {
        num_probes: 10,
        rto_cycles: 50,
        max_retry: 3,
        rx_burst: 4,
    };
    match run_probe(&mut a, &ep, &cfg) {
        Err(ProbeError::Unreachable { retries, report }) => {
            assert_eq!(retries, 3);
            assert_eq!(report.len(), 5);
            // the partial report still persists what it has
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("rtt.txt");
            report.write_samples(&path).unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            assert_eq!(text.lines().count(), 5);
        }
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[test]
fn latency_worker_persists_partial_samples_when_unreachable() {
    let (mut a, mut b) = SimLink::pair();
    b.enable_reflect(LossGenerator::specific([5, 6, 7]));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rtt.txt");
    let ep = Endpoint {
        mode: Mode::Latency,
        ..small_endpoint()
    };
    let cfg = WorkerConfig {
        probe: ProbeConfig {
            num_probes: 10,
            rto_cycles: 50,
            max_retry: 3,
            rx_burst: 4,
        },
        rtt_path: Some(path.clone()),
        ..WorkerConfig::default()
    };
    let (_pipeline, mut queues) = Pipeline::new(1, 16).unwrap();
    run_worker(&mut a, &ep, queues.remove(0), &cfg, &Shutdown::new());

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 5);
}

#[test]
fn non_designated_worker_declines_probing() {
    let (mut a, _b) = SimLink::pair();
    let ep = Endpoint {
        id: 3,
        ..small_endpoint()
    };
    match run_probe(&mut a, &ep, &ProbeConfig::default()) {
        Err(ProbeError::NotDesignated(3)) => {}
        other => panic!("expected decline, got {other:?}"),
    }
}

#[test]
fn responder_reflects_data_frames_back_to_sender() {
    let (mut a, mut b) = SimLink::pair();
    let shutdown = Shutdown::new();
    let responder_stop = shutdown.clone();
    let handle = std::thread::spawn(move || {
        run_responder(&mut b, &responder_stop);
    });

    let ep = small_endpoint();
    let mut batch = Vec::new();
    for seq in 0..8u32 {
        let mut buf = a.alloc().unwrap();
        squall_wire::encode_data(&ep.addr, WireProto::Tcp, seq, &[0x7f; 64], &mut buf);
        batch.push(buf);
    }
    squall_engine::send_all(&mut a, &mut batch);

    let mut acked = Vec::new();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while acked.len() < 8 && std::time::Instant::now() < deadline {
        let mut got = Vec::new();
        a.recv_burst(16, &mut got);
        for frame in &got {
            let parsed = squall_wire::parse(frame).unwrap();
            // addressing swapped back toward us, payload stripped
            assert_eq!(frame.len(), 54);
            if let Some(seq) = parsed.transport.sequence() {
                acked.push(seq);
            }
        }
        a.free_burst(&mut got);
    }
    shutdown.request();
    handle.join().unwrap();

    acked.sort_unstable();
    assert_eq!(acked, (0..8).collect::<Vec<_>>());
}

#[test]
fn full_pipeline_drives_tasks_through_a_worker() {
    let (mut a, mut b) = SimLink::pair();
    b.enable_reflect(LossGenerator::periodic(20));

    let (pipeline, mut queues) = Pipeline::new(1, 16).unwrap();
    let shutdown = Shutdown::new();
    let worker_stop = shutdown.clone();
    let ep = small_endpoint();
    let cfg = WorkerConfig {
        engine: tight_engine(),
        ..WorkerConfig::default()
    };
    let worker_ep = ep.clone();
    let worker_queues = queues.remove(0);
    let handle = std::thread::spawn(move || {
        run_worker(&mut a, &worker_ep, worker_queues, &cfg, &worker_stop);
    });

    for id in 0..5u64 {
        pipeline.enqueue(Task::new(id, vec![id as u8; 4_000])).unwrap();
    }
    let mut done = Vec::new();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(30);
    while done.len() < 5 && std::time::Instant::now() < deadline {
        while let Some(task) = pipeline.dequeue_completion() {
            done.push(task.id);
        }
        std::thread::yield_now();
    }
    shutdown.request();
    handle.join().unwrap();

    done.sort_unstable();
    assert_eq!(done, vec![0, 1, 2, 3, 4]);
    assert_eq!(pipeline.credits(), 15);
}
