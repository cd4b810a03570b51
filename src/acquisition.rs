//! The paced polling loop that drives a logging session.
//!
//! Each tick reads all four channels, decodes them, and appends a row only
//! if every channel produced a sample. The buffer is rewritten to disk once
//! the save interval has elapsed, and one last time when the session ends.

use chrono::Local;
use futures::future::join_all;
use log::{debug, error, info, trace, warn};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::buffer::{SampleBuffer, SampleRow};
use crate::channel::Channel;
use crate::config::AcquisitionConfig;
use crate::decoder::decode;
use crate::error::{AcquisitionError, ChannelReadError, PersistenceError};
use crate::persistence::CsvWriter;
use crate::source::ChannelSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Stopped,
    Fatal,
}

/// Counters collected over one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub ticks: u64,
    pub rows: u64,
    pub dropped_ticks: u64,
    pub overruns: u64,
    pub saves: u64,
    pub failed_saves: u64,
    pub final_save_ok: bool,
    /// `Stopped` or `Fatal` once the session has ended.
    pub exit_state: SessionState,
}

enum TickOutcome {
    Row(SampleRow),
    Dropped,
    ConnectionLost(Channel),
}

pub struct Acquisition<S> {
    source: S,
    config: AcquisitionConfig,
    writer: CsvWriter,
    buffer: SampleBuffer,
    state: SessionState,
    report: SessionReport,
}

impl<S> Acquisition<S> {
    pub fn new(source: S, config: AcquisitionConfig) -> Self {
        let writer =
            CsvWriter::new(config.output_path.clone()).with_timestamps(config.timestamp_column);
        Self {
            source,
            config,
            writer,
            buffer: SampleBuffer::new(),
            state: SessionState::Idle,
            report: SessionReport::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

}

impl<S: ChannelSource> Acquisition<S> {
    /// Poll the source until `cancel` fires or the device goes away.
    ///
    /// Cancellation is observed between ticks and during the pacing wait,
    /// never halfway through a row. Either way the buffer is saved once more
    /// before returning. Only a lost connection is reported as an error; the
    /// counters are available from [`Acquisition::report`] in both cases.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<SessionReport, AcquisitionError> {
        if self.state != SessionState::Idle {
            return Err(AcquisitionError::NotIdle(self.state));
        }
        self.state = SessionState::Running;
        info!(
            "Acquisition started: period {:?}, save every {:?}, output {}",
            self.config.sampling_period,
            self.config.save_interval,
            self.writer.destination().display()
        );

        let mut tick: u64 = 0;
        let mut next_save_at = Instant::now() + self.config.save_interval;
        let mut last_saved: Option<Instant> = None;
        let mut last_tick_start: Option<Instant> = None;
        let mut lost = None;

        while !cancel.is_cancelled() {
            let tick_start = Instant::now();
            if let Some(prev) = last_tick_start {
                trace!("P: {:.3} s", (tick_start - prev).as_secs_f64());
            }
            last_tick_start = Some(tick_start);
            self.report.ticks += 1;

            match self.acquire_row(tick).await {
                TickOutcome::Row(row) => {
                    self.buffer.append(row);
                    self.report.rows += 1;
                }
                TickOutcome::Dropped => self.report.dropped_ticks += 1,
                TickOutcome::ConnectionLost(channel) => {
                    error!("tick {tick}: connection lost while reading channel {channel}");
                    lost = Some(AcquisitionError::ConnectionLost { tick, channel });
                    break;
                }
            }

            // A failed save waits for the next interval like a successful one.
            if Instant::now() >= next_save_at {
                match self.save().await {
                    Ok(()) => last_saved = Some(Instant::now()),
                    Err(err) => match last_saved {
                        Some(at) => warn!(
                            "save failed, retrying next interval (last saved {:?} ago): {err}",
                            at.elapsed()
                        ),
                        None => warn!("save failed, retrying next interval: {err}"),
                    },
                }
                next_save_at = Instant::now() + self.config.save_interval;
            }

            let deadline = tick_start + self.config.sampling_period;
            let now = Instant::now();
            if now > deadline {
                self.report.overruns += 1;
                debug!("tick {tick} overran its period by {:?}", now - deadline);
            }
            tick += 1;

            tokio::select! {
                _ = time::sleep_until(deadline) => {}
                _ = cancel.cancelled() => {}
            }
        }

        self.report.final_save_ok = match self.save().await {
            Ok(()) => true,
            Err(err) => {
                error!("final save failed: {err}");
                false
            }
        };

        match lost {
            Some(err) => {
                self.state = SessionState::Fatal;
                self.report.exit_state = self.state;
                Err(err)
            }
            None => {
                self.state = SessionState::Stopped;
                self.report.exit_state = self.state;
                info!(
                    "Acquisition stopped after {} ticks, {} rows",
                    self.report.ticks, self.report.rows
                );
                Ok(self.report.clone())
            }
        }
    }

    async fn acquire_row(&self, tick: u64) -> TickOutcome {
        let captured_at = Local::now();
        let reads = join_all(Channel::ALL.map(|channel| self.source.read_channel(channel))).await;

        let mut values = [0u32; 4];
        let mut complete = true;
        let mut read_failure = None;

        for (channel, read) in Channel::ALL.into_iter().zip(reads) {
            let raw = match read {
                Ok(raw) => raw,
                Err(ChannelReadError::Disconnected) => return TickOutcome::ConnectionLost(channel),
                Err(err) => {
                    warn!("tick {tick}: channel {channel} read failed: {err}");
                    if read_failure.is_none() {
                        read_failure = Some(channel);
                    }
                    complete = false;
                    continue;
                }
            };
            match decode(&raw) {
                Ok(value) => values[channel.index()] = value,
                Err(err) => {
                    warn!("tick {tick}: channel {channel} decode failed: {err}");
                    complete = false;
                }
            }
        }

        if let Some(channel) = read_failure {
            if !self.source.is_connected().await {
                return TickOutcome::ConnectionLost(channel);
            }
        }
        if !complete {
            return TickOutcome::Dropped;
        }
        TickOutcome::Row(SampleRow::new(tick, captured_at, values))
    }

    async fn save(&mut self) -> Result<(), PersistenceError> {
        match self.writer.save(self.buffer.snapshot()).await {
            Ok(()) => {
                self.report.saves += 1;
                info!(
                    "Data saved to {} ({} rows)",
                    self.writer.destination().display(),
                    self.buffer.len()
                );
                Ok(())
            }
            Err(err) => {
                self.report.failed_saves += 1;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    /// Serves `ticks` ticks of readings, then cancels the session.
    struct MockSource {
        reads: [AtomicU64; 4],
        ticks: u64,
        cancel: CancellationToken,
        read_delay: Duration,
        connected: bool,
        script: fn(Channel, u64) -> Result<Vec<u8>, ChannelReadError>,
    }

    impl MockSource {
        fn new(ticks: u64, cancel: &CancellationToken) -> Self {
            Self {
                reads: Default::default(),
                ticks,
                cancel: cancel.clone(),
                read_delay: Duration::ZERO,
                connected: true,
                script: |_, n| Ok(vec![0, 0, n as u8]),
            }
        }
    }

    impl ChannelSource for MockSource {
        async fn read_channel(&self, channel: Channel) -> Result<Vec<u8>, ChannelReadError> {
            let n = self.reads[channel.index()].fetch_add(1, Ordering::SeqCst);
            if channel == Channel::A && n + 1 >= self.ticks {
                self.cancel.cancel();
            }
            if !self.read_delay.is_zero() {
                time::sleep(self.read_delay).await;
            }
            (self.script)(channel, n)
        }

        async fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn scratch_config(period: Duration) -> (AcquisitionConfig, PathBuf) {
        let dir = std::env::temp_dir().join(format!("ble_logger_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = AcquisitionConfig {
            sampling_period: period,
            output_path: dir.join("out.csv"),
            ..AcquisitionConfig::default()
        };
        (config, dir)
    }

    #[tokio::test]
    async fn test_stops_on_cancel_and_saves() {
        let cancel = CancellationToken::new();
        let (config, dir) = scratch_config(Duration::ZERO);
        let path = config.output_path.clone();
        let mut acquisition = Acquisition::new(MockSource::new(5, &cancel), config);
        assert_eq!(acquisition.state(), SessionState::Idle);

        let report = acquisition.run(cancel).await.unwrap();

        assert_eq!(acquisition.state(), SessionState::Stopped);
        assert_eq!(report.exit_state, SessionState::Stopped);
        assert_eq!(report.ticks, 5);
        assert_eq!(report.rows, 5);
        assert_eq!(report.dropped_ticks, 0);
        assert!(report.final_save_ok);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 6);
        assert_eq!(contents.lines().last(), Some("4,4,4,4"));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let cancel = CancellationToken::new();
        let (config, dir) = scratch_config(Duration::ZERO);
        let mut acquisition = Acquisition::new(MockSource::new(1, &cancel), config);

        acquisition.run(cancel.clone()).await.unwrap();
        let err = acquisition.run(cancel).await.unwrap_err();
        assert_eq!(err, AcquisitionError::NotIdle(SessionState::Stopped));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_is_fatal_but_flushes() {
        let cancel = CancellationToken::new();
        let (config, dir) = scratch_config(Duration::ZERO);
        let path = config.output_path.clone();
        let mut source = MockSource::new(100, &cancel);
        source.script = |channel, n| {
            if channel == Channel::B && n == 7 {
                Err(ChannelReadError::Disconnected)
            } else {
                Ok(vec![0, 0, 1])
            }
        };
        let mut acquisition = Acquisition::new(source, config);

        let err = acquisition.run(cancel).await.unwrap_err();

        assert_eq!(
            err,
            AcquisitionError::ConnectionLost {
                tick: 7,
                channel: Channel::B
            }
        );
        assert_eq!(acquisition.state(), SessionState::Fatal);
        assert_eq!(acquisition.report().exit_state, SessionState::Fatal);
        assert_eq!(acquisition.buffer().len(), 7);
        assert!(acquisition.report().final_save_ok);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 8);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_read_failure_with_link_down_is_fatal() {
        let cancel = CancellationToken::new();
        let (config, dir) = scratch_config(Duration::ZERO);
        let mut source = MockSource::new(100, &cancel);
        source.connected = false;
        source.script = |channel, n| {
            if channel == Channel::D && n == 2 {
                Err(ChannelReadError::Timeout)
            } else {
                Ok(vec![0, 0, 1])
            }
        };
        let mut acquisition = Acquisition::new(source, config);

        let err = acquisition.run(cancel).await.unwrap_err();

        assert_eq!(
            err,
            AcquisitionError::ConnectionLost {
                tick: 2,
                channel: Channel::D
            }
        );
        assert_eq!(acquisition.buffer().len(), 2);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_malformed_reading_drops_tick() {
        let cancel = CancellationToken::new();
        let (config, dir) = scratch_config(Duration::ZERO);
        let mut source = MockSource::new(6, &cancel);
        source.script = |channel, n| {
            if channel == Channel::B && n == 3 {
                Ok(vec![0, 1])
            } else {
                Ok(vec![0, 0, n as u8])
            }
        };
        let mut acquisition = Acquisition::new(source, config);

        let report = acquisition.run(cancel).await.unwrap();

        assert_eq!(report.rows, 5);
        assert_eq!(report.dropped_ticks, 1);
        let ticks: Vec<u64> = acquisition.buffer().snapshot().iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![0, 1, 2, 4, 5]);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pacing_wait() {
        let cancel = CancellationToken::new();
        let (config, dir) = scratch_config(Duration::from_secs(3600));
        let mut acquisition = Acquisition::new(MockSource::new(1, &cancel), config);

        let report = time::timeout(Duration::from_secs(5), acquisition.run(cancel))
            .await
            .expect("pacing wait should end on cancel")
            .unwrap();

        assert_eq!(report.ticks, 1);
        assert_eq!(report.overruns, 0);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_overruns_are_counted_not_fatal() {
        let cancel = CancellationToken::new();
        let (config, dir) = scratch_config(Duration::from_millis(1));
        let mut source = MockSource::new(3, &cancel);
        source.read_delay = Duration::from_millis(5);
        let mut acquisition = Acquisition::new(source, config);

        let report = acquisition.run(cancel).await.unwrap();

        assert_eq!(report.ticks, 3);
        assert_eq!(report.rows, 3);
        assert_eq!(report.overruns, 3);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_periodic_saves() {
        let cancel = CancellationToken::new();
        let (mut config, dir) = scratch_config(Duration::ZERO);
        config.save_interval = Duration::ZERO;
        let mut acquisition = Acquisition::new(MockSource::new(4, &cancel), config);

        let report = acquisition.run(cancel).await.unwrap();

        // one per tick plus the final save
        assert_eq!(report.saves, 5);
        assert_eq!(report.failed_saves, 0);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_saves_wait_for_next_interval() {
        let cancel = CancellationToken::new();
        let (mut config, dir) = scratch_config(Duration::from_millis(2));
        config.output_path = dir.join("missing").join("out.csv");
        config.save_interval = Duration::from_millis(50);
        let mut acquisition = Acquisition::new(MockSource::new(150, &cancel), config);

        let started = std::time::Instant::now();
        let report = acquisition.run(cancel).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.ticks, 150);
        assert_eq!(report.saves, 0);
        // scheduled attempts plus the final one
        let allowed = elapsed.as_millis() as u64 / 50 + 2;
        assert!(
            report.failed_saves <= allowed,
            "{} failed saves in {:?}",
            report.failed_saves,
            elapsed
        );
        assert!(report.failed_saves >= 2);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
