//! Input event channel.
//!
//! One bounded queue per CPU. Producers never block: a full queue drops the
//! event and bumps that CPU's lost counter. The single consumer takes events
//! from all queues with no ordering across CPUs, FIFO within one.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Select, Sender, TrySendError};
use fpsxdp_common::{InputEvent, MAX_CPUS};

use crate::counters::PerCpuCounters;

pub fn input_channel(depth: usize) -> (InputSender, InputReceiver) {
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..MAX_CPUS).map(|_| channel::bounded(depth.max(1))).unzip();
    let lost = Arc::new(PerCpuCounters::new());
    (
        InputSender {
            queues: senders.into(),
            lost: lost.clone(),
        },
        InputReceiver {
            queues: receivers.into(),
            lost,
            reported_lost: [0; MAX_CPUS],
            next: 0,
        },
    )
}

#[derive(Clone)]
pub struct InputSender {
    queues: Arc<[Sender<InputEvent>]>,
    lost: Arc<PerCpuCounters>,
}

impl InputSender {
    /// Enqueues on `cpu`'s queue. Returns false if the event was lost.
    #[inline]
    pub fn push(&self, cpu: u32, event: InputEvent) -> bool {
        match self.queues[cpu as usize % MAX_CPUS].try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.lost.increment(cpu);
                false
            }
        }
    }

    pub fn lost(&self, cpu: u32) -> u64 {
        self.lost.get(cpu)
    }
}

pub struct InputReceiver {
    queues: Box<[Receiver<InputEvent>]>,
    lost: Arc<PerCpuCounters>,
    reported_lost: [u64; MAX_CPUS],
    next: usize,
}

impl InputReceiver {
    /// Blocks until any CPU's queue yields an event or `timeout` passes.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(u32, InputEvent)> {
        let mut select = Select::new();
        for queue in self.queues.iter() {
            select.recv(queue);
        }
        let op = select.select_timeout(timeout).ok()?;
        let cpu = op.index();
        op.recv(&self.queues[cpu]).ok().map(|event| (cpu as u32, event))
    }

    /// Takes up to `max` ready events, one CPU at a time in rotation.
    pub fn drain(&mut self, max: usize, mut f: impl FnMut(u32, InputEvent)) -> usize {
        let mut taken = 0;
        let mut idle = 0;
        while taken < max && idle < MAX_CPUS {
            let cpu = self.next;
            self.next = (self.next + 1) % MAX_CPUS;
            match self.queues[cpu].try_recv() {
                Ok(event) => {
                    f(cpu as u32, event);
                    taken += 1;
                    idle = 0;
                }
                Err(_) => idle += 1,
            }
        }
        taken
    }

    /// Losses per CPU since the previous call, like a perf buffer's lost callback.
    pub fn take_lost(&mut self) -> impl Iterator<Item = (u32, u64)> + '_ {
        let current = self.lost.values();
        self.reported_lost
            .iter_mut()
            .zip(current)
            .enumerate()
            .filter_map(|(cpu, (reported, now))| {
                let delta = now - *reported;
                *reported = now;
                (delta > 0).then_some((cpu as u32, delta))
            })
    }

    pub fn pending(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }
}
