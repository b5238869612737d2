// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Periodic metrics sampling during capture.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rewind_trace::{TraceError, TraceFile, Track};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One row of named measurements, stored as JSON in the metrics track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Measurement name to value.
    pub values: BTreeMap<String, f64>,
}

impl MetricSample {
    /// Adds a measurement, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_owned(), value);
        self
    }

    /// Serializes the sample as a metrics record body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a metrics record body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Something the sampler can poll.
pub trait MetricsSource: Send + 'static {
    /// Takes one sample.
    fn sample(&mut self) -> MetricSample;
}

impl<F> MetricsSource for F
where
    F: FnMut() -> MetricSample + Send + 'static,
{
    fn sample(&mut self) -> MetricSample {
        self()
    }
}

/// A background thread writing samples into the metrics track.
///
/// Write failures are logged and the last one is kept for
/// [`stop`](Self::stop); the thread exits once the trace is closed.
#[derive(Debug)]
pub struct MetricsSampler {
    stop: Arc<AtomicBool>,
    written: Arc<AtomicUsize>,
    last_error: Arc<Mutex<Option<TraceError>>>,
    handle: Option<JoinHandle<()>>,
}

impl MetricsSampler {
    /// Starts sampling `source` every `interval`.
    ///
    /// Record times are `time_offset` plus the seconds elapsed since this
    /// call, so pass the session-relative time at which the sampler starts.
    pub fn spawn(
        trace: Arc<TraceFile>,
        layer: u32,
        interval: Duration,
        time_offset: f64,
        mut source: impl MetricsSource,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let written = Arc::new(AtomicUsize::new(0));
        let last_error = Arc::new(Mutex::new(None));

        let handle = {
            let stop = Arc::clone(&stop);
            let written = Arc::clone(&written);
            let last_error = Arc::clone(&last_error);
            let started = Instant::now();
            thread::Builder::new()
                .name("rewind-metrics".into())
                .spawn(move || {
                    debug!(?interval, "metrics sampler running");
                    while !stop.load(Ordering::Acquire) {
                        let time = time_offset + started.elapsed().as_secs_f64();
                        let result = source
                            .sample()
                            .to_bytes()
                            .map_err(TraceError::from)
                            .and_then(|bytes| trace.write(Track::Metrics, layer, time, &bytes));
                        match result {
                            Ok(()) => {
                                written.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(TraceError::Closed) => break,
                            Err(err) => {
                                warn!(%err, "metrics sample not written");
                                *last_error.lock() = Some(err);
                            }
                        }
                        thread::park_timeout(interval);
                    }
                    debug!("metrics sampler stopped");
                })?
        };

        Ok(Self {
            stop,
            written,
            last_error,
            handle: Some(handle),
        })
    }

    /// Returns how many samples have been written.
    #[must_use]
    pub fn samples_written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Stops and joins the thread, returning the last write error if any.
    pub fn stop(mut self) -> Option<TraceError> {
        self.shutdown();
        self.last_error.lock().take()
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("metrics sampler panicked");
            }
        }
    }
}

impl Drop for MetricsSampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_trace::ReadOutcome;

    #[test]
    fn samples_land_in_the_metrics_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.rply");
        let trace = Arc::new(TraceFile::create(&path).unwrap());
        let layer = trace.add_layer().unwrap();

        let mut n = 0.0;
        let sampler = MetricsSampler::spawn(Arc::clone(&trace), layer, Duration::from_millis(1), 5.0, move || {
            n += 1.0;
            MetricSample::default().with("frame", n)
        })
        .unwrap();
        while sampler.samples_written() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(sampler.stop().is_none());
        trace.close().unwrap();

        let trace = TraceFile::open(&path).unwrap();
        let ReadOutcome::Record { time, bytes } = trace.read(Track::Metrics, 0, f64::MAX).unwrap() else {
            panic!("no metrics recorded");
        };
        assert!(time >= 5.0);
        assert_eq!(MetricSample::from_bytes(&bytes).unwrap().values["frame"], 1.0);
    }

    #[test]
    fn closed_trace_ends_the_thread() {
        let dir = tempfile::tempdir().unwrap();
        let trace = Arc::new(TraceFile::create(dir.path().join("closed.rply")).unwrap());
        trace.add_layer().unwrap();
        trace.close().unwrap();

        let sampler =
            MetricsSampler::spawn(trace, 0, Duration::from_millis(1), 0.0, MetricSample::default).unwrap();
        assert!(sampler.stop().is_none());
    }
}
