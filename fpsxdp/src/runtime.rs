//! The control-plane runtime.
//!
//! One reader task per online CPU pulls input events out of that CPU's perf
//! buffer and forwards them over a channel to a single loop, which owns the
//! updater and the stats aggregator. All writes to player state therefore
//! come from one place.

use anyhow::{anyhow, Context, Result};
use aya::maps::perf::{AsyncPerfEventArray, AsyncPerfEventArrayBuffer};
use aya::maps::MapData;
use aya::util::online_cpus;
use bytes::BytesMut;
use fpsxdp_common::{InputEvent, INPUT_EVENT_SIZE, MAP_INPUT_EVENTS};
use fpsxdp_core::{EngineConfig, StatsAggregator, StatsReport, Updater};
use tokio::signal::unix::SignalKind;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::{select, signal};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::loader::Datapath;
use crate::maps::KernelMaps;
use crate::telemetry::PerfMetrics;

/// Records taken from a perf buffer per wakeup.
const READ_BATCH: usize = 16;
const CHANNEL_DEPTH: usize = 8192;

enum ReaderMessage {
    Input { cpu: u32, event: InputEvent },
    Lost { cpu: u32, count: u64 },
}

pub struct Runtime {
    datapath: Datapath,
    maps: KernelMaps,
    events: AsyncPerfEventArray<MapData>,
    config: Config,
    engine: EngineConfig,
    metrics: PerfMetrics,
}

impl Runtime {
    pub fn init(config: Config) -> Result<Self> {
        info!("starting fpsxdp on {}", config.interface);
        let engine = config.engine()?;
        let mut datapath = Datapath::attach(&config)?;

        let ebpf = datapath.ebpf_mut();
        let maps = KernelMaps::open(ebpf)?;
        let events = ebpf
            .take_map(MAP_INPUT_EVENTS)
            .with_context(|| format!("map {MAP_INPUT_EVENTS} not found in object"))?;
        let events = AsyncPerfEventArray::try_from(events)?;
        info!("shared maps open, pinned under {}", config.pin_path.display());

        Ok(Self {
            datapath,
            maps,
            events,
            config,
            engine,
            metrics: PerfMetrics::new(),
        })
    }

    pub async fn run(mut self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_DEPTH);
        let mut readers = JoinSet::new();

        let cpus = online_cpus().map_err(|(msg, err)| anyhow!("{msg}: {err}"))?;
        for cpu in cpus {
            let buffer = self
                .events
                .open(cpu, Some(self.config.perf_pages))
                .with_context(|| format!("failed to open perf buffer for cpu {cpu}"))?;
            readers.spawn(read_inputs(cpu, buffer, tx.clone(), self.metrics.clone()));
        }
        drop(tx);
        info!("reading input events on {} cpus", readers.len());

        let mut updater = Updater::new(self.maps, self.engine.player_shard_capacity);
        let mut aggregator = StatsAggregator::new(self.engine.stats_interval);
        let mut ticker = tokio::time::interval(self.engine.stats_interval);
        let mut terminate = signal::unix::signal(SignalKind::terminate())?;
        let mut hangup = signal::unix::signal(SignalKind::hangup())?;

        let result = loop {
            select! {
                Some(message) = rx.recv() => match message {
                    ReaderMessage::Input { cpu, event } => {
                        if let Err(err) = updater.apply(cpu, &event) {
                            warn!("failed to apply input from cpu {cpu}: {err}");
                        }
                    }
                    ReaderMessage::Lost { cpu, count } => updater.record_lost(cpu, count),
                },
                _ = ticker.tick() => {
                    let tally = updater.tally();
                    match aggregator.tick(&tally, updater.sink_mut()) {
                        Ok(report) if self.config.stats_json => log_json(&report),
                        Ok(report) => info!(
                            "{report} | sessions: {} | {}",
                            updater.sink().session_count(),
                            self.metrics.summary()
                        ),
                        Err(err) => break Err(anyhow::Error::new(err).context("stats publish failed")),
                    }
                }
                Some(joined) = readers.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!("input reader stopped: {err:#}"),
                    Err(err) => error!("input reader panicked: {err}"),
                },
                _ = signal::ctrl_c() => break Ok(()),
                _ = terminate.recv() => break Ok(()),
                _ = hangup.recv() => break Ok(()),
            }
        };

        info!("shutting down");
        readers.abort_all();
        self.datapath.detach()?;
        result
    }
}

async fn read_inputs(
    cpu: u32,
    mut buffer: AsyncPerfEventArrayBuffer<MapData>,
    tx: mpsc::Sender<ReaderMessage>,
    metrics: PerfMetrics,
) -> Result<()> {
    let mut records: Vec<BytesMut> = (0..READ_BATCH)
        .map(|_| BytesMut::with_capacity(INPUT_EVENT_SIZE))
        .collect();

    loop {
        let events = buffer
            .read_events(&mut records)
            .await
            .with_context(|| format!("perf read failed on cpu {cpu}"))?;
        metrics.record_read(events.read, events.lost);

        if events.lost > 0 {
            debug!("perf buffer on cpu {cpu} lost {} events", events.lost);
            let message = ReaderMessage::Lost {
                cpu,
                count: events.lost as u64,
            };
            if tx.send(message).await.is_err() {
                return Ok(());
            }
        }

        for record in records.iter().take(events.read) {
            let Some(event) = InputEvent::from_record(record) else {
                metrics.record_undecodable();
                continue;
            };
            if tx.send(ReaderMessage::Input { cpu, event }).await.is_err() {
                return Ok(());
            }
        }
    }
}

fn log_json(report: &StatsReport) {
    match serde_json::to_string(report) {
        Ok(line) => info!(target: "fpsxdp::stats", "{line}"),
        Err(err) => warn!("failed to encode stats report: {err}"),
    }
}
