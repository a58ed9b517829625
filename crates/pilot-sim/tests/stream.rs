use pilot_proto::ControlVector;
use pilot_sim::StreamingController;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

fn sink() -> UdpSocket {
    let s = UdpSocket::bind("127.0.0.1:0").unwrap();
    s.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    s
}

/// Drains packets for `window` and returns them decoded.
fn collect(sock: &UdpSocket, window: Duration) -> Vec<ControlVector> {
    let mut buf = [0u8; 256];
    let mut out = Vec::new();
    let end = Instant::now() + window;
    while Instant::now() < end {
        if let Ok(n) = sock.recv(&mut buf) {
            let text = std::str::from_utf8(&buf[..n]).unwrap();
            out.push(ControlVector::from_packet(text).unwrap());
        }
    }
    out
}

/// Packets received in one second once the loop has settled.
fn packets_in_a_second(ctl: &StreamingController, sock: &UdpSocket) -> usize {
    // skip the initial packet and loop start-up
    std::thread::sleep(Duration::from_millis(100));
    let _ = collect(sock, Duration::from_millis(10));
    let got = collect(sock, Duration::from_secs(1)).len();
    assert!(ctl.stats().packets_sent as usize >= got);
    got
}

#[test]
fn holds_configured_rate_over_a_second() {
    for rate in [20.0f32, 30.0, 50.0] {
        let sock = sink();
        let ctl = StreamingController::new(sock.local_addr().unwrap(), rate);
        ctl.connect().unwrap();
        let got = packets_in_a_second(&ctl, &sock);
        ctl.disconnect();

        let expected = rate as usize;
        let band = (expected * 8 / 10)..=(expected + 2);
        assert!(band.contains(&got), "{} Hz: received {} packets, expected {:?}", rate, got, band);
    }
}

#[test]
fn abandoned_loop_stays_stopped_after_reconnect() {
    let sock = sink();
    let ctl = StreamingController::new(sock.local_addr().unwrap(), 20.0).with_join_timeout(Duration::ZERO);
    ctl.connect().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    // the loop is mid-sleep, so the zero wait gives up on it
    ctl.disconnect();
    assert!(!ctl.is_running());

    ctl.connect().unwrap();
    assert!(ctl.is_running());
    let got = packets_in_a_second(&ctl, &sock);
    ctl.disconnect();
    assert!(got <= 22, "two loops transmitting: {} packets at 20 Hz", got);
}

#[test]
fn out_of_range_vector_is_clamped_on_the_wire() {
    let sock = sink();
    let ctl = StreamingController::new(sock.local_addr().unwrap(), 50.0);
    ctl.set_control(ControlVector { roll: 7.5, pitch: -3.0, yaw: 0.25, throttle: -4.0 });
    ctl.connect().unwrap();
    let packets = collect(&sock, Duration::from_millis(200));
    ctl.disconnect();

    assert!(!packets.is_empty());
    for p in packets {
        assert_eq!(p, ControlVector { roll: 2.0, pitch: -2.0, yaw: 0.25, throttle: -1.0 });
    }
}

#[test]
fn latest_vector_supersedes_within_a_period() {
    let sock = sink();
    let ctl = StreamingController::new(sock.local_addr().unwrap(), 50.0);
    ctl.connect().unwrap();
    ctl.set_throttle(0.6);
    std::thread::sleep(Duration::from_millis(60));
    let packets = collect(&sock, Duration::from_millis(200));
    ctl.disconnect();
    assert_eq!(packets.last().map(|p| p.throttle), Some(0.6));
}

#[test]
fn connect_twice_is_refused_and_disconnect_stops_the_loop() {
    let sock = sink();
    let ctl = StreamingController::new(sock.local_addr().unwrap(), 20.0);
    ctl.connect().unwrap();
    assert!(ctl.connect().is_err());
    ctl.disconnect();
    assert!(!ctl.is_running());

    let before = ctl.stats().packets_sent;
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(ctl.stats().packets_sent, before);
}
