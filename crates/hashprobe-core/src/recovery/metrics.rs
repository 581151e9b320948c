/// Discovery instrumentation
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Envelope {
    unique_files: HashSet<u64>,
    first_start: Option<Instant>,
    last_end: Option<Instant>,
}

/// Counters shared by all workers
#[derive(Debug, Default)]
pub struct Metrics {
    decompress_nanos: AtomicU64,
    parse_nanos: AtomicU64,
    files_parsed: AtomicU64,
    bytes_inflated: AtomicU64,
    decompress_failures: AtomicU64,
    parse_fallbacks: AtomicU64,
    envelope: Mutex<Envelope>,
}

/// Snapshot of [`Metrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    pub decompress_ms: u64,
    pub parse_ms: u64,
    pub files_parsed: u64,
    pub bytes_inflated: u64,
    pub decompress_failures: u64,
    pub parse_fallbacks: u64,
    /// Distinct entries extracted
    pub unique_files: u64,
    /// Earliest decompression start to latest decompression end
    pub wall_clock_ms: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn envelope(&self) -> std::sync::MutexGuard<'_, Envelope> {
        match self.envelope.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Record one successful extraction spanning `started..ended`
    pub fn record_decompression(&self, hash: u64, started: Instant, ended: Instant, bytes: usize) {
        let elapsed = ended.saturating_duration_since(started);
        self.decompress_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.bytes_inflated
            .fetch_add(bytes as u64, Ordering::Relaxed);

        let mut envelope = self.envelope();
        envelope.unique_files.insert(hash);
        envelope.first_start = Some(match envelope.first_start {
            Some(t) if t <= started => t,
            _ => started,
        });
        envelope.last_end = Some(match envelope.last_end {
            Some(t) if t >= ended => t,
            _ => ended,
        });
    }

    pub fn record_decompress_failure(&self) {
        self.decompress_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse(&self, elapsed: Duration) {
        self.parse_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.files_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_fallback(&self) {
        self.parse_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsReport {
        let envelope = self.envelope();
        let wall_clock = match (envelope.first_start, envelope.last_end) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        };
        MetricsReport {
            decompress_ms: self.decompress_nanos.load(Ordering::Relaxed) / 1_000_000,
            parse_ms: self.parse_nanos.load(Ordering::Relaxed) / 1_000_000,
            files_parsed: self.files_parsed.load(Ordering::Relaxed),
            bytes_inflated: self.bytes_inflated.load(Ordering::Relaxed),
            decompress_failures: self.decompress_failures.load(Ordering::Relaxed),
            parse_fallbacks: self.parse_fallbacks.load(Ordering::Relaxed),
            unique_files: envelope.unique_files.len() as u64,
            wall_clock_ms: wall_clock.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_envelope_spans_min_start_to_max_end() {
        let metrics = Metrics::new();
        let base = Instant::now();
        metrics.record_decompression(1, base + Duration::from_millis(10), base + Duration::from_millis(20), 5);
        metrics.record_decompression(2, base, base + Duration::from_millis(15), 5);
        metrics.record_decompression(1, base + Duration::from_millis(30), base + Duration::from_millis(40), 5);

        let report = metrics.report();
        assert_eq!(report.wall_clock_ms, 40);
        assert_eq!(report.unique_files, 2);
        assert_eq!(report.bytes_inflated, 15);
        assert_eq!(report.decompress_ms, 35);
    }

    #[test]
    fn test_concurrent_counters() {
        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_parse(Duration::from_micros(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.report().files_parsed, 400);
    }
}
