//! UDP 遥测集成测试
//!
//! 使用真实 socket，测试串行执行。

use csi_driver::{
    ByteOrder, DetectorConfig, DriverError, MotionDetector, REGISTER_PAYLOAD, SampleEncoding,
    TelemetryCodec, TelemetryConfig,
};
use csi_protocol::{Bandwidth, CsiRecord, HEADER_LEN, Samples};
use csi_source::MockCsiSource;
use serial_test::serial;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn record(rx: u16) -> CsiRecord {
    CsiRecord::new(Bandwidth::Bw20, rx, vec![3; 64], vec![4; 64]).unwrap()
}

fn client_socket() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket
}

fn loopback(addr: SocketAddr) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], addr.port()))
}

fn register(detector: &MotionDetector, client: &UdpSocket, server: SocketAddr) {
    client.send_to(REGISTER_PAYLOAD, loopback(server)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        detector.udp_clients().len() == 1
    }));
}

#[test]
#[serial]
fn test_register_and_stream_amplitude_frames() {
    let mock = Arc::new(MockCsiSource::new());
    mock.set_repeat(Some(vec![record(0), record(1)]));
    let detector = MotionDetector::new(DetectorConfig::default(), mock.clone()).unwrap();

    let server = detector.start_udp_server(0).unwrap();
    let client = client_socket();
    register(&detector, &client, server);
    assert_eq!(
        detector.udp_clients()[0].addr(),
        client.local_addr().unwrap()
    );
    assert_eq!(detector.metrics().registrations, 1);

    detector.start_monitoring("wlan0", 20).unwrap();

    let codec = TelemetryCodec::new(SampleEncoding::Amplitude, ByteOrder::Network);
    let mut buf = [0u8; 4096];
    let mut antennas = Vec::new();
    for _ in 0..2 {
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let frame = codec.decode(&buf[..len]).unwrap();

        // 每帧一个包，64 - 2 - 1 个子载波
        assert_eq!(frame.packet_count, 1);
        assert_eq!(frame.total_sample_count(), 61);
        assert_eq!(len, HEADER_LEN + 61 * 8);
        match &frame.samples {
            Samples::Amplitude(values) => assert!(values.iter().all(|&v| v == 5.0)),
            other => panic!("unexpected samples: {other:?}"),
        }
        antennas.push(frame.antenna_index);
    }
    antennas.sort_unstable();
    assert_eq!(antennas, vec![0, 1]);

    detector.stop_monitoring().unwrap();
    detector.stop_udp_server();
    assert!(detector.udp_clients().is_empty());
    assert!(detector.metrics().frames_sent >= 2);
}

#[test]
#[serial]
fn test_iq_little_endian_frames() {
    let mock = Arc::new(MockCsiSource::new());
    mock.set_repeat(Some(vec![record(2)]));
    let config = DetectorConfig {
        telemetry: TelemetryConfig {
            encoding: SampleEncoding::Iq,
            byte_order: ByteOrder::Little,
            ..Default::default()
        },
        ..Default::default()
    };
    let detector = MotionDetector::new(config, mock).unwrap();

    let server = detector.start_udp_server(0).unwrap();
    let client = client_socket();
    register(&detector, &client, server);
    detector.start_monitoring("wlan0", 20).unwrap();

    let mut buf = [0u8; 4096];
    let (len, _) = client.recv_from(&mut buf).unwrap();
    let frame = TelemetryCodec::new(SampleEncoding::Iq, ByteOrder::Little)
        .decode(&buf[..len])
        .unwrap();

    // 61 个值 → 30 个 I/Q 对，最后一个值被丢弃
    assert_eq!(frame.antenna_index, 2);
    assert_eq!(frame.total_sample_count(), 30);
    assert_eq!(len, HEADER_LEN + 30 * 16);

    detector.stop_monitoring().unwrap();
    detector.stop_udp_server();
}

#[test]
#[serial]
fn test_start_twice_fails() {
    let detector =
        MotionDetector::new(DetectorConfig::default(), Arc::new(MockCsiSource::new())).unwrap();

    let addr = detector.start_udp_server(0).unwrap();
    let err = detector.start_udp_server(0).unwrap_err();
    assert!(matches!(err, DriverError::AlreadyRunning));
    assert_eq!(err.status_code(), -114);
    assert_eq!(detector.udp_server_addr(), Some(addr));

    detector.stop_udp_server();
    assert!(!detector.is_udp_server_running());

    // 停止后可立即在同一端口重新启动
    let again = detector.start_udp_server(addr.port()).unwrap();
    assert_eq!(again.port(), addr.port());
    detector.stop_udp_server();
}

#[test]
#[serial]
fn test_stop_server_is_prompt_and_idempotent() {
    let detector =
        MotionDetector::new(DetectorConfig::default(), Arc::new(MockCsiSource::new())).unwrap();
    detector.start_udp_server(0).unwrap();

    let start = Instant::now();
    detector.stop_udp_server();
    assert!(start.elapsed() < Duration::from_secs(1));

    detector.stop_udp_server();
    assert!(!detector.is_udp_server_running());
}

#[test]
#[serial]
fn test_send_failure_does_not_stop_loop() {
    let mock = Arc::new(MockCsiSource::new());
    mock.set_repeat(Some(vec![record(0)]));
    let detector = MotionDetector::new(DetectorConfig::default(), mock.clone()).unwrap();

    let server = detector.start_udp_server(0).unwrap();
    let client = client_socket();
    register(&detector, &client, server);

    // 广播地址未开启 SO_BROADCAST，发送必然失败
    detector.add_udp_client("255.255.255.255", 9).unwrap();
    detector.start_monitoring("wlan0", 10).unwrap();

    let mut buf = [0u8; 4096];
    for _ in 0..3 {
        client.recv_from(&mut buf).unwrap();
    }
    assert!(detector.is_monitoring());
    assert!(mock.dump_calls() >= 3);
    assert!(detector.metrics().send_errors >= 1);

    detector.stop_monitoring().unwrap();
    detector.stop_udp_server();
}

#[test]
#[serial]
fn test_non_register_payload_ignored() {
    let detector =
        MotionDetector::new(DetectorConfig::default(), Arc::new(MockCsiSource::new())).unwrap();
    let server = detector.start_udp_server(0).unwrap();

    let client = client_socket();
    client.send_to(b"hello", loopback(server)).unwrap();
    client.send_to(REGISTER_PAYLOAD, loopback(server)).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        detector.udp_clients().len() == 1
    }));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(detector.udp_clients().len(), 1);

    detector.stop_udp_server();
}
