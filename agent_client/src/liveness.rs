//! Heartbeat-based liveness tracking.
//!
//! Two exponential moving averages are kept:
//! - round-trip latency, updated on every pong that carries a timestamp;
//! - time since the last pong, sampled on the status cadence.
//!
//! At steady state the time since the last pong hovers around half a ping
//! period, so the reported desync is the distance from that baseline.

use std::fmt;

/// Smoothed heartbeat statistics for one session.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    ping_period_ms: f64,
    latency_alpha: f64,
    desync_alpha: f64,
    last_pong_micros: i64,
    mean_latency_ms: f64,
    mean_time_since_pong_ms: f64,
}

/// Read-only snapshot for status reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessStatus {
    pub entities: usize,
    pub latency_ms: f64,
    pub desync_ms: f64,
}

impl fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entities: {}\t\tLatency: {:.0}ms\t\tDesync: {:.0}ms",
            self.entities, self.latency_ms, self.desync_ms
        )
    }
}

impl LivenessMonitor {
    /// Starts tracking at `now_micros` as if a pong had just arrived.
    pub fn new(now_micros: i64, ping_period_ms: f64, latency_alpha: f64, desync_alpha: f64) -> Self {
        Self {
            ping_period_ms,
            latency_alpha,
            desync_alpha,
            last_pong_micros: now_micros,
            mean_latency_ms: 0.0,
            mean_time_since_pong_ms: 0.5 * ping_period_ms,
        }
    }

    /// Feeds a pong. Returns `false` (and changes nothing) when the pong did
    /// not carry the ping's send time, or carried one that is in the future
    /// or too far in the past to subtract.
    pub fn on_pong(&mut self, now_micros: i64, sent_micros: Option<i64>) -> bool {
        let Some(round_trip) = sent_micros.and_then(|sent| now_micros.checked_sub(sent)) else {
            return false;
        };
        if round_trip < 0 {
            return false;
        }

        let sample_ms = micros_to_ms(round_trip);
        self.last_pong_micros = now_micros;
        self.mean_latency_ms =
            self.mean_latency_ms * (1.0 - self.latency_alpha) + self.latency_alpha * sample_ms;
        true
    }

    /// Samples the time since the last pong into the desync average.
    pub fn sample_desync(&mut self, now_micros: i64) {
        let since_ms = micros_to_ms(now_micros - self.last_pong_micros);
        self.mean_time_since_pong_ms =
            self.mean_time_since_pong_ms * (1.0 - self.desync_alpha) + self.desync_alpha * since_ms;
    }

    pub fn mean_latency_ms(&self) -> f64 {
        self.mean_latency_ms
    }

    pub fn last_pong_micros(&self) -> i64 {
        self.last_pong_micros
    }

    pub fn desync_ms(&self) -> f64 {
        (self.mean_time_since_pong_ms - 0.5 * self.ping_period_ms).abs()
    }

    pub fn status(&self, entities: usize) -> LivenessStatus {
        LivenessStatus {
            entities,
            latency_ms: self.mean_latency_ms,
            desync_ms: self.desync_ms(),
        }
    }
}

fn micros_to_ms(micros: i64) -> f64 {
    0.001 * micros as f64
}
