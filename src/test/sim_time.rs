use crate::sim::SimTime;

#[test]
fn sim_time_unit_conversions() {
    assert_eq!(SimTime::from_micros(1), SimTime(1_000));
    assert_eq!(SimTime::from_millis(1), SimTime(1_000_000));
    assert_eq!(SimTime::from_secs(1), SimTime(1_000_000_000));
}

#[test]
fn sim_time_unit_conversions_saturate_on_overflow() {
    assert_eq!(SimTime::from_micros(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime::from_millis(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime::from_secs(u64::MAX), SimTime(u64::MAX));
}

#[test]
fn float_seconds_reject_negative_and_non_finite_values() {
    assert_eq!(SimTime::from_secs_f64(1.0), Some(SimTime::from_secs(1)));
    assert_eq!(SimTime::from_secs_f64(0.5), Some(SimTime::from_millis(500)));
    assert_eq!(SimTime::from_secs_f64(0.0), Some(SimTime::ZERO));
    assert_eq!(SimTime::from_secs_f64(-0.001), None);
    assert_eq!(SimTime::from_secs_f64(f64::NAN), None);
    assert_eq!(SimTime::from_secs_f64(f64::INFINITY), None);
    assert_eq!(SimTime::from_secs_f64(1e30), Some(SimTime::MAX));
}

#[test]
fn display_uses_seconds() {
    assert_eq!(SimTime::from_millis(1500).to_string(), "1.500000000s");
    assert_eq!(SimTime::from_secs(2).as_secs_f64(), 2.0);
}
