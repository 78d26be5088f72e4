use crate::sim::{Event, EventState, SimError, SimTime, Simulator, World};
use std::any::Any;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct DummyWorld {
    ticks: usize,
}

impl World for DummyWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_tick(&mut self, _sim: &mut Simulator) {
        self.ticks = self.ticks.saturating_add(1);
    }
}

type Log = Arc<Mutex<Vec<u32>>>;

struct Push {
    id: u32,
    log: Log,
}

impl Event for Push {
    fn execute(self: Box<Self>, _sim: &mut Simulator, _world: &mut dyn World) {
        let Push { id, log } = *self;
        log.lock().expect("log lock").push(id);
    }
}

struct PushThenScheduleNow {
    id: u32,
    next_id: u32,
    log: Log,
}

impl Event for PushThenScheduleNow {
    fn execute(self: Box<Self>, sim: &mut Simulator, _world: &mut dyn World) {
        let PushThenScheduleNow { id, next_id, log } = *self;
        log.lock().expect("log lock").push(id);
        sim.schedule_now(Push { id: next_id, log });
    }
}

struct PushThenQueueCommand {
    id: u32,
    command_id: u32,
    log: Log,
}

impl Event for PushThenQueueCommand {
    fn execute(self: Box<Self>, sim: &mut Simulator, _world: &mut dyn World) {
        let PushThenQueueCommand { id, command_id, log } = *self;
        log.lock().expect("log lock").push(id);
        sim.queue_command(Push { id: command_id, log });
    }
}

struct PushThenStop {
    id: u32,
    log: Log,
}

impl Event for PushThenStop {
    fn execute(self: Box<Self>, sim: &mut Simulator, _world: &mut dyn World) {
        let PushThenStop { id, log } = *self;
        log.lock().expect("log lock").push(id);
        sim.stop();
    }
}

fn push(id: u32, log: &Log) -> Push {
    Push {
        id,
        log: Arc::clone(log),
    }
}

fn logged(log: &Log) -> Vec<u32> {
    log.lock().expect("log lock").clone()
}

#[test]
fn scheduled_events_order_by_time_then_seq() {
    let log = Log::default();

    let mut sim = Simulator::default();
    sim.schedule_at(SimTime(10), push(1, &log)).expect("schedule");
    sim.schedule_at(SimTime(5), push(2, &log)).expect("schedule");
    sim.schedule_at(SimTime(10), push(3, &log)).expect("schedule");

    let mut world = DummyWorld::default();
    sim.run(&mut world);

    assert_eq!(logged(&log), [2, 1, 3]);
    assert_eq!(world.ticks, 3);
    assert_eq!(sim.now(), SimTime(10));
    assert_eq!(sim.events_processed(), 3);
}

#[test]
fn event_scheduled_at_same_time_inside_event_runs_after_current_event() {
    let log = Log::default();

    let mut sim = Simulator::default();
    sim.schedule_at(
        SimTime::ZERO,
        PushThenScheduleNow {
            id: 1,
            next_id: 2,
            log: Arc::clone(&log),
        },
    )
    .expect("schedule");
    sim.schedule_at(SimTime::ZERO, push(3, &log)).expect("schedule");

    let mut world = DummyWorld::default();
    sim.run(&mut world);

    assert_eq!(logged(&log), [1, 3, 2]);
    assert_eq!(world.ticks, 3);
    assert_eq!(sim.now(), SimTime::ZERO);
}

#[test]
fn scheduling_in_the_past_is_rejected() {
    let log = Log::default();
    let mut sim = Simulator::default();
    let mut world = DummyWorld::default();

    sim.run_until(SimTime(100), &mut world);
    let err = sim.schedule_at(SimTime(99), push(1, &log)).unwrap_err();
    assert_eq!(
        err,
        SimError::InvalidTime {
            at: SimTime(99),
            now: SimTime(100)
        }
    );
    assert!(sim.is_empty());

    // 恰好等于当前时间是允许的
    sim.schedule_at(SimTime(100), push(2, &log)).expect("schedule at now");
    sim.run(&mut world);
    assert_eq!(logged(&log), [2]);
}

#[test]
fn delay_scheduling_is_relative_to_now() {
    let log = Log::default();
    let mut sim = Simulator::default();
    let mut world = DummyWorld::default();

    sim.run_until(SimTime(40), &mut world);
    sim.schedule_delay(SimTime(10), push(1, &log));
    sim.run(&mut world);

    assert_eq!(logged(&log), [1]);
    assert_eq!(sim.now(), SimTime(50));
}

#[test]
fn closures_are_events() {
    let log = Log::default();
    let mut sim = Simulator::default();
    let inner = Arc::clone(&log);
    sim.schedule_delay(SimTime(3), move |sim: &mut Simulator, _world: &mut dyn World| {
        inner.lock().expect("log lock").push(sim.now().as_nanos() as u32);
    });

    sim.run(&mut DummyWorld::default());
    assert_eq!(logged(&log), [3]);
}

#[test]
fn cancelled_event_never_runs_and_cancel_is_idempotent() {
    let log = Log::default();
    let mut sim = Simulator::default();

    let a = sim.schedule_at(SimTime(1), push(1, &log)).expect("schedule");
    let b = sim.schedule_at(SimTime(2), push(2, &log)).expect("schedule");
    assert_eq!(sim.size(), 2);
    assert!(sim.is_pending(a));

    sim.cancel(a);
    sim.cancel(a);
    assert!(!sim.is_pending(a));
    assert_eq!(sim.size(), 1);

    sim.run(&mut DummyWorld::default());
    assert_eq!(logged(&log), [2]);

    // 已执行事件的句柄：取消是空操作
    sim.cancel(b);
    assert!(sim.is_empty());
}

#[test]
fn event_state_follows_the_event_lifecycle() {
    let log = Log::default();
    let mut sim = Simulator::default();

    let a = sim.schedule_at(SimTime(1), push(1, &log)).expect("schedule");
    let b = sim.schedule_at(SimTime(2), push(2, &log)).expect("schedule");
    let c = sim.schedule_at(SimTime(3), push(3, &log)).expect("schedule");
    assert_eq!(sim.state(a), EventState::Pending);

    sim.cancel(b);
    assert_eq!(sim.state(b), EventState::Cancelled);

    sim.run_until(SimTime(2), &mut DummyWorld::default());
    assert_eq!(sim.state(a), EventState::Executed);
    assert_eq!(sim.state(b), EventState::Cancelled);
    assert_eq!(sim.state(c), EventState::Pending);

    // 执行后再取消不改变状态
    sim.cancel(a);
    assert_eq!(sim.state(a), EventState::Executed);

    sim.reset();
    assert_eq!(sim.state(c), EventState::Cancelled);
    assert_eq!(logged(&log), [1]);
}

#[test]
fn many_cancellations_keep_order_of_survivors() {
    let log = Log::default();
    let mut sim = Simulator::default();

    let handles: Vec<_> = (0..200u32)
        .map(|i| sim.schedule_at(SimTime(u64::from(i % 7)), push(i, &log)).expect("schedule"))
        .collect();
    for (i, h) in handles.iter().enumerate() {
        if i % 3 != 0 {
            sim.cancel(*h);
        }
    }

    sim.run(&mut DummyWorld::default());

    let mut expected: Vec<u32> = (0..200u32).filter(|i| i % 3 == 0).collect();
    expected.sort_by_key(|i| (i % 7, *i));
    assert_eq!(logged(&log), expected);
}

#[test]
fn run_until_skips_events_after_until_and_advances_time() {
    let log = Log::default();

    let mut sim = Simulator::default();
    sim.schedule_at(SimTime::ZERO, push(1, &log)).expect("schedule");
    sim.schedule_at(SimTime(10), push(2, &log)).expect("schedule");

    let mut world = DummyWorld::default();
    sim.run_until(SimTime(5), &mut world);

    assert_eq!(logged(&log), [1]);
    assert_eq!(world.ticks, 1);
    assert_eq!(sim.now(), SimTime(5));

    sim.run(&mut world);
    assert_eq!(logged(&log), [1, 2]);
    assert_eq!(world.ticks, 2);
    assert_eq!(sim.now(), SimTime(10));
}

#[test]
fn run_until_executes_events_scheduled_exactly_at_until() {
    let log = Log::default();

    let mut sim = Simulator::default();
    sim.schedule_at(SimTime(5), push(1, &log)).expect("schedule");

    let mut world = DummyWorld::default();
    sim.run_until(SimTime(5), &mut world);

    assert_eq!(logged(&log), [1]);
    assert_eq!(world.ticks, 1);
    assert_eq!(sim.now(), SimTime(5));
}

#[test]
fn run_until_advances_time_even_if_there_are_no_events() {
    let mut sim = Simulator::default();
    let mut world = DummyWorld::default();

    sim.run_until(SimTime(7), &mut world);
    assert_eq!(sim.now(), SimTime(7));
    assert_eq!(world.ticks, 0);
}

#[test]
fn commands_run_fifo_before_the_next_timed_event() {
    let log = Log::default();
    let mut sim = Simulator::default();

    sim.schedule_at(SimTime(1), push(10, &log)).expect("schedule");
    sim.queue_command(push(1, &log));
    sim.queue_command(push(2, &log));
    assert_eq!(sim.pending_commands(), 2);

    let mut world = DummyWorld::default();
    assert!(sim.process_one_event(&mut world));
    assert_eq!(logged(&log), [1, 2, 10]);
    assert_eq!(sim.pending_commands(), 0);
    // 命令不计入 on_tick
    assert_eq!(world.ticks, 1);
}

#[test]
fn command_queued_by_event_runs_before_later_event_at_same_time() {
    let log = Log::default();
    let mut sim = Simulator::default();

    sim.schedule_at(
        SimTime(4),
        PushThenQueueCommand {
            id: 1,
            command_id: 2,
            log: Arc::clone(&log),
        },
    )
    .expect("schedule");
    sim.schedule_at(SimTime(4), push(3, &log)).expect("schedule");

    sim.run(&mut DummyWorld::default());
    assert_eq!(logged(&log), [1, 2, 3]);
}

#[test]
fn dequeued_command_does_not_run() {
    let log = Log::default();
    let mut sim = Simulator::default();

    let a = sim.queue_command(push(1, &log));
    sim.queue_command(push(2, &log));
    sim.dequeue_command(a);
    sim.dequeue_command(a);

    sim.run(&mut DummyWorld::default());
    assert_eq!(logged(&log), [2]);
}

#[test]
fn stop_at_halts_run_and_keeps_later_events() {
    let log = Log::default();
    let mut sim = Simulator::default();

    sim.schedule_at(SimTime(1), push(1, &log)).expect("schedule");
    sim.schedule_at(SimTime(5), push(5, &log)).expect("schedule");
    sim.stop_at(SimTime(3)).expect("stop_at");
    assert_eq!(sim.size(), 2);

    let mut world = DummyWorld::default();
    sim.run(&mut world);
    assert_eq!(logged(&log), [1]);
    assert_eq!(sim.now(), SimTime(3));
    assert_eq!(sim.size(), 1);

    sim.run(&mut world);
    assert_eq!(logged(&log), [1, 5]);
}

#[test]
fn cancelled_stop_point_is_ignored() {
    let log = Log::default();
    let mut sim = Simulator::default();

    sim.schedule_at(SimTime(5), push(5, &log)).expect("schedule");
    let stop = sim.stop_at(SimTime(3)).expect("stop_at");
    sim.cancel(stop);

    sim.run(&mut DummyWorld::default());
    assert_eq!(logged(&log), [5]);
}

#[test]
fn stop_finishes_current_instant_but_does_not_advance() {
    let log = Log::default();
    let mut sim = Simulator::default();

    sim.schedule_at(
        SimTime(2),
        PushThenStop {
            id: 1,
            log: Arc::clone(&log),
        },
    )
    .expect("schedule");
    sim.schedule_at(SimTime(2), push(2, &log)).expect("schedule");
    sim.schedule_at(SimTime(9), push(9, &log)).expect("schedule");

    let mut world = DummyWorld::default();
    sim.run(&mut world);
    assert_eq!(logged(&log), [1, 2]);
    assert_eq!(sim.now(), SimTime(2));

    // 停止请求已被消费，再次 run 会继续
    sim.run(&mut world);
    assert_eq!(logged(&log), [1, 2, 9]);
}

#[test]
fn reset_clears_everything_and_old_handles_are_inert() {
    let log = Log::default();
    let mut sim = Simulator::default();
    let mut world = DummyWorld::default();

    sim.schedule_at(SimTime(1), push(1, &log)).expect("schedule");
    let old = sim.schedule_at(SimTime(2), push(2, &log)).expect("schedule");
    sim.queue_command(push(3, &log));
    sim.run_until(SimTime(1), &mut world);
    assert_eq!(logged(&log), [3, 1]);

    sim.reset();
    assert_eq!(sim.now(), SimTime::ZERO);
    assert!(sim.is_empty());
    assert_eq!(sim.events_processed(), 0);

    // reset 之后新事件可能复用序号，旧句柄不能取消它
    let fresh = sim.schedule_at(SimTime(1), push(4, &log)).expect("schedule");
    assert!(!sim.is_pending(old));
    sim.cancel(old);
    assert!(sim.is_pending(fresh));

    sim.run(&mut world);
    assert_eq!(logged(&log), [3, 1, 4]);
}

#[test]
fn process_one_event_reports_empty_queue() {
    let mut sim = Simulator::default();
    let mut world = DummyWorld::default();
    assert!(!sim.process_one_event(&mut world));

    sim.schedule_now(|_: &mut Simulator, _: &mut dyn World| {});
    assert!(sim.process_one_event(&mut world));
    assert!(!sim.process_one_event(&mut world));
}

#[test]
fn event_may_cancel_another_pending_event() {
    let log = Log::default();
    let mut sim = Simulator::default();

    let later = sim.schedule_at(SimTime(2), push(2, &log)).expect("schedule");
    let inner = Arc::clone(&log);
    sim.schedule_at(SimTime(1), move |sim: &mut Simulator, _: &mut dyn World| {
        inner.lock().expect("log lock").push(1);
        sim.cancel(later);
    })
    .expect("schedule");
    sim.schedule_at(SimTime(3), push(3, &log)).expect("schedule");

    sim.run(&mut DummyWorld::default());
    assert_eq!(logged(&log), [1, 3]);
    assert_eq!(sim.state(later), EventState::Cancelled);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "reset() called while an event is being dispatched")]
fn reset_inside_an_event_panics() {
    let mut sim = Simulator::default();
    sim.schedule_now(|sim: &mut Simulator, _: &mut dyn World| sim.reset());
    sim.run(&mut DummyWorld::default());
}

#[test]
fn cancellation_records_expire_with_their_deadline() {
    let log = Log::default();
    let mut sim = Simulator::default();
    let mut world = DummyWorld::default();

    // 每一步都重设一个 10ns 之后的定时事件，旧的被取消
    let mut timer = sim.schedule_delay(SimTime(10), push(0, &log));
    for step in 0..20_000u64 {
        sim.cancel(timer);
        timer = sim.schedule_delay(SimTime(10), push(0, &log));
        sim.run_until(SimTime(step + 1), &mut world);
        assert!(sim.retained_cancellations() <= 11);
    }
    assert!(logged(&log).is_empty());
    assert_eq!(sim.size(), 1);
    assert_eq!(sim.state(timer), EventState::Pending);

    sim.cancel(timer);
    assert_eq!(sim.state(timer), EventState::Cancelled);
    sim.run_until(sim.now().saturating_add(SimTime(9)), &mut world);
    assert_eq!(sim.state(timer), EventState::Cancelled);
    sim.run_until(sim.now().saturating_add(SimTime(1)), &mut world);
    assert_eq!(sim.retained_cancellations(), 0);
    assert!(sim.is_empty());
}
