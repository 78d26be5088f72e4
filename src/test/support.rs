//! 测试公用：把单个 ARQ 引擎放进 world，超时事件回调到该引擎。

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::arq::{Arq, Compound};
use crate::sim::{Event, SimTime, Simulator, World};
use crate::timer::{TimeoutRoute, TimerKey};

pub(crate) struct EngineWorld<A> {
    pub engine: A,
    pub fired: Vec<(SimTime, TimerKey)>,
}

impl<A: Arq + 'static> EngineWorld<A> {
    pub fn new(engine: A) -> Self {
        Self {
            engine,
            fired: Vec::new(),
        }
    }
}

impl<A: Arq + 'static> World for EngineWorld<A> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Fire<A> {
    key: TimerKey,
    _engine: PhantomData<fn() -> A>,
}

impl<A: Arq + 'static> Event for Fire<A> {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let w = world
            .as_any_mut()
            .downcast_mut::<EngineWorld<A>>()
            .expect("world must be EngineWorld");
        w.fired.push((sim.now(), self.key));
        w.engine.on_timeout(sim, self.key).expect("on_timeout");
    }
}

/// 超时事件路由到 `EngineWorld<A>` 中的引擎。
pub(crate) fn route<A: Arq + 'static>() -> TimeoutRoute {
    Arc::new(|key: TimerKey| {
        Box::new(Fire::<A> {
            key,
            _engine: PhantomData,
        }) as Box<dyn Event>
    })
}

/// 触发时什么也不做的路由（手动调用 `on_timeout` 的测试用）。
pub(crate) fn noop_route() -> TimeoutRoute {
    Arc::new(|_: TimerKey| Box::new(|_: &mut Simulator, _: &mut dyn World| {}) as Box<dyn Event>)
}

pub(crate) fn data(id: u8) -> Compound {
    Compound::new(vec![id])
}
