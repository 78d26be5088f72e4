use crate::arq::{
    Arq, ArqCommand, ArqError, Compound, CumulativeAck, CumulativeAckConfig, FrameType, Reception,
};
use crate::config::{ConfigError, Params};
use crate::sim::{SimTime, Simulator};

use super::support::{EngineWorld, data, noop_route, route};

fn config(window_size: usize) -> CumulativeAckConfig {
    CumulativeAckConfig {
        window_size,
        resend_timeout: SimTime::from_secs(1),
    }
}

fn engine(name: &str, window_size: usize) -> CumulativeAck {
    CumulativeAck::new(name, config(window_size), noop_route())
}

fn rr(nr: u64) -> Compound {
    Compound::control(ArqCommand {
        frame: FrameType::Rr,
        ns: nr,
        nr,
        ..ArqCommand::default()
    })
}

/// 发送 `n` 个帧并取出它们的线上副本。
fn send(sim: &mut Simulator, tx: &mut CumulativeAck, first_id: u8, n: u8) -> Vec<Compound> {
    (first_id..first_id + n)
        .map(|id| {
            tx.process_outgoing(sim, data(id)).expect("outgoing");
            tx.get_data(sim).expect("data")
        })
        .collect()
}

#[test]
fn out_of_order_arrivals_are_delivered_in_order() {
    let mut sim = Simulator::default();
    let mut tx = engine("tx", 8);
    let mut rx = engine("rx", 8);

    let frames = send(&mut sim, &mut tx, 0, 4);
    assert_eq!(frames.iter().map(|f| f.arq.ns).collect::<Vec<_>>(), [0, 1, 2, 3]);

    for i in [3, 1, 2] {
        assert_eq!(
            rx.process_incoming(&mut sim, frames[i].clone()).expect("incoming"),
            Reception::Buffered
        );
        assert!(!rx.has_ack());
    }
    let reception = rx.process_incoming(&mut sim, frames[0].clone()).expect("incoming");
    let delivered: Vec<u8> = reception.delivered().iter().map(|c| c.payload()[0]).collect();
    assert_eq!(delivered, [0, 1, 2, 3]);
    assert_eq!(rx.nr(), 4);

    let ack = rx.get_ack(&mut sim).expect("rr");
    assert_eq!(ack.arq.nr, 4);
    assert_eq!(
        tx.process_incoming(&mut sim, ack).expect("rr"),
        Reception::Acked { released: 4 }
    );
    assert!(tx.is_idle());
    assert!(sim.is_empty());
    assert_eq!(tx.stats().successes, 4);
    assert_eq!(rx.stats().buffered, 3);
    assert_eq!(rx.stats().delivered, 4);
}

#[test]
fn send_window_is_half_the_sequence_space() {
    let mut sim = Simulator::default();
    let mut tx = engine("tx", 4);
    let mut rx = engine("rx", 4);

    for round in 0..10u8 {
        let frames = send(&mut sim, &mut tx, round * 2, 2);
        assert!(!tx.has_capacity());
        assert!(tx.in_flight() <= tx.send_window());
        assert!(matches!(
            tx.process_outgoing(&mut sim, data(255)),
            Err(ArqError::CapacityExceeded { .. })
        ));

        for f in frames {
            rx.process_incoming(&mut sim, f).expect("incoming");
        }
        let ack = rx.get_ack(&mut sim).expect("rr");
        tx.process_incoming(&mut sim, ack).expect("rr");
        assert!(tx.has_capacity());
        assert_eq!(tx.in_flight(), 0);
    }
    assert_eq!(rx.stats().delivered, 20);
    assert_eq!(tx.ns(), 20 % 4);
}

#[test]
fn stale_and_implausible_rrs() {
    let mut sim = Simulator::default();
    let mut tx = engine("tx", 8);

    // 没有未确认的帧
    assert_eq!(tx.process_incoming(&mut sim, rr(0)).expect("rr"), Reception::StaleAck);

    send(&mut sim, &mut tx, 0, 4);
    tx.process_incoming(&mut sim, rr(4)).expect("rr");
    send(&mut sim, &mut tx, 4, 2);
    assert_eq!(tx.ns_ack(), 4);
    assert_eq!(tx.ns(), 6);

    // NR == NSack：重复的旧确认
    assert_eq!(tx.process_incoming(&mut sim, rr(4)).expect("rr"), Reception::StaleAck);
    // 落在窗口之前
    assert_eq!(tx.process_incoming(&mut sim, rr(2)).expect("rr"), Reception::StaleAck);
    assert_eq!(tx.stats().stale_acks, 3);

    // 可信范围内却超过了 NS
    assert!(matches!(
        tx.process_incoming(&mut sim, rr(7)),
        Err(ArqError::ProtocolViolation { .. })
    ));
    assert_eq!(tx.in_flight(), 2);
}

#[test]
fn partial_rr_releases_prefix_and_cancels_its_timers() {
    let mut sim = Simulator::default();
    let mut tx = engine("tx", 8);

    send(&mut sim, &mut tx, 0, 3);
    assert!((0..3).all(|slot| tx.has_timeout_set(&sim, slot)));

    assert_eq!(
        tx.process_incoming(&mut sim, rr(2)).expect("rr"),
        Reception::Acked { released: 2 }
    );
    assert!(!tx.has_timeout_set(&sim, 0));
    assert!(!tx.has_timeout_set(&sim, 1));
    assert!(tx.has_timeout_set(&sim, 2));
    assert_eq!(tx.in_flight(), 1);
    assert_eq!(sim.size(), 1);
}

#[test]
fn each_slot_times_out_independently() {
    let mut sim = Simulator::default();
    let mut world = EngineWorld::new(CumulativeAck::new("tx", config(8), route::<CumulativeAck>()));

    world
        .engine
        .process_outgoing(&mut sim, data(0))
        .expect("outgoing");
    world.engine.get_data(&mut sim).expect("data");
    sim.run_until(SimTime::from_millis(300), &mut world);
    world
        .engine
        .process_outgoing(&mut sim, data(1))
        .expect("outgoing");
    world.engine.get_data(&mut sim).expect("data");

    sim.run(&mut world);
    assert_eq!(
        world.fired,
        [(SimTime::from_secs(1), 0), (SimTime::from_millis(1300), 1)]
    );

    let first = world.engine.get_data(&mut sim).expect("retransmission");
    let second = world.engine.get_data(&mut sim).expect("retransmission");
    assert_eq!((first.arq.ns, first.arq.tx_count), (0, 2));
    assert_eq!((second.arq.ns, second.arq.tx_count), (1, 2));
    assert!(!world.engine.has_data());
    assert_eq!(world.engine.stats().failures, 2);
    assert_eq!(world.engine.stats().retransmissions, 2);
}

#[test]
fn old_frame_triggers_rr_with_current_nr() {
    let mut sim = Simulator::default();
    let mut tx = engine("tx", 8);
    let mut rx = engine("rx", 8);

    let frames = send(&mut sim, &mut tx, 0, 2);
    for f in &frames {
        rx.process_incoming(&mut sim, f.clone()).expect("incoming");
    }
    rx.get_ack(&mut sim).expect("rr");

    // 对端没收到 RR，重传了第一帧
    assert_eq!(
        rx.process_incoming(&mut sim, frames[0].clone()).expect("incoming"),
        Reception::Duplicate
    );
    let ack = rx.get_ack(&mut sim).expect("rr");
    assert_eq!(ack.arq.nr, 2);
    assert_eq!(rx.stats().delivered, 2);
}

#[test]
fn buffered_duplicate_is_reported() {
    let mut sim = Simulator::default();
    let mut tx = engine("tx", 8);
    let mut rx = engine("rx", 8);

    let frames = send(&mut sim, &mut tx, 0, 3);
    rx.process_incoming(&mut sim, frames[2].clone()).expect("incoming");
    assert_eq!(
        rx.process_incoming(&mut sim, frames[2].clone()).expect("incoming"),
        Reception::Duplicate
    );
}

#[test]
fn window_size_must_be_even_and_at_least_four() {
    let ok = Params::new().with("windowSize", 8).with("resendTimeout", 0.1);
    assert_eq!(
        CumulativeAckConfig::from_source(&ok).expect("config"),
        CumulativeAckConfig {
            window_size: 8,
            resend_timeout: SimTime::from_millis(100),
        }
    );

    for bad in [2, 5, 0] {
        let p = Params::new().with("windowSize", bad).with("resendTimeout", 0.1);
        assert!(matches!(
            CumulativeAckConfig::from_source(&p),
            Err(ConfigError::Invalid { .. })
        ));
    }
    let missing = Params::new().with("windowSize", 8);
    assert!(matches!(
        CumulativeAckConfig::from_source(&missing),
        Err(ConfigError::Missing(key)) if key == "resendTimeout"
    ));
}
