//! Thread-safe metrics collection system
//!
//! Atomic counters for the MQTT session and command confirmation, plus a
//! bounded window of confirmation round-trip times.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Round-trip samples kept for percentile calculation
const MAX_CONFIRMATION_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and a mutex-guarded sample window
pub struct MetricsCollector {
    // Connection
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    disconnects: AtomicU64,
    manual_reconnects: AtomicU64,
    manual_reconnect_failures: AtomicU64,
    connection_start_time: AtomicU64,

    // Traffic
    messages_received: AtomicU64,
    messages_unhandled: AtomicU64,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    publish_timeouts: AtomicU64,
    subscriptions: AtomicU64,
    subscription_failures: AtomicU64,

    // Commands
    commands_confirmed: AtomicU64,
    commands_ignored: AtomicU64,
    malformed_payloads: AtomicU64,
    encode_failures: AtomicU64,
    confirmation_times: Mutex<Vec<u64>>, // in milliseconds

    // Lifecycle
    uptime_start: AtomicU64,
    state_transitions: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            manual_reconnects: AtomicU64::new(0),
            manual_reconnect_failures: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_unhandled: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            publish_timeouts: AtomicU64::new(0),
            subscriptions: AtomicU64::new(0),
            subscription_failures: AtomicU64::new(0),
            commands_confirmed: AtomicU64::new(0),
            commands_ignored: AtomicU64::new(0),
            malformed_payloads: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            confirmation_times: Mutex::new(Vec::new()),
            uptime_start: AtomicU64::new(current_timestamp()),
            state_transitions: AtomicU64::new(0),
        }
    }

    // MQTT connection metrics
    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_manual_reconnect_succeeded(&self) {
        self.manual_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_manual_reconnect_failed(&self) {
        self.manual_reconnect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn state_transition(&self) {
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
    }

    // Traffic metrics
    pub fn mqtt_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_message_unhandled(&self) {
        self.messages_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_publish_timed_out(&self) {
        self.publish_timeouts.fetch_add(1, Ordering::Relaxed);
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_subscribed(&self) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_subscribe_failed(&self) {
        self.subscription_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Command metrics
    pub fn command_confirmed(&self, round_trip: Duration) {
        self.commands_confirmed.fetch_add(1, Ordering::Relaxed);
        self.record_confirmation_time(round_trip);
    }

    pub fn command_ignored(&self) {
        self.commands_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payload_malformed(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn confirmation_encode_failed(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_confirmation_time(&self, duration: Duration) {
        if let Ok(mut times) = self.confirmation_times.lock() {
            times.push(duration.as_millis() as u64);

            if times.len() > MAX_CONFIRMATION_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.disconnects,
            &self.manual_reconnects,
            &self.manual_reconnect_failures,
            &self.connection_start_time,
            &self.messages_received,
            &self.messages_unhandled,
            &self.messages_published,
            &self.publish_failures,
            &self.publish_timeouts,
            &self.subscriptions,
            &self.subscription_failures,
            &self.commands_confirmed,
            &self.commands_ignored,
            &self.malformed_payloads,
            &self.encode_failures,
            &self.state_transitions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.confirmation_times.lock() {
            times.clear();
        }
    }

    /// Average and percentiles of confirmation round-trips (pure function)
    fn calculate_confirmation_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.confirmation_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if !self.mqtt_connected.load(Ordering::Relaxed) {
            return 0;
        }
        let start_time = self.connection_start_time.load(Ordering::Relaxed);
        if start_time > 0 {
            now.saturating_sub(start_time)
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95, p99) = self.calculate_confirmation_statistics();

        MetricsSnapshot {
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                disconnects: self.disconnects.load(Ordering::Relaxed),
                manual_reconnects: self.manual_reconnects.load(Ordering::Relaxed),
                manual_reconnect_failures: self.manual_reconnect_failures.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
                messages_unhandled: self.messages_unhandled.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                publish_timeouts: self.publish_timeouts.load(Ordering::Relaxed),
                subscriptions: self.subscriptions.load(Ordering::Relaxed),
                subscription_failures: self.subscription_failures.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            commands: CommandMetrics {
                commands_confirmed: self.commands_confirmed.load(Ordering::Relaxed),
                commands_ignored: self.commands_ignored.load(Ordering::Relaxed),
                malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
                encode_failures: self.encode_failures.load(Ordering::Relaxed),
                avg_confirmation_time_ms: avg,
                confirmation_time_p50_ms: p50,
                confirmation_time_p95_ms: p95,
                confirmation_time_p99_ms: p99,
            },
            lifecycle: LifecycleMetrics {
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub mqtt: MqttMetrics,
    pub commands: CommandMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub disconnects: u64,
    pub manual_reconnects: u64,
    pub manual_reconnect_failures: u64,
    pub messages_received: u64,
    pub messages_unhandled: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub publish_timeouts: u64,
    pub subscriptions: u64,
    pub subscription_failures: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct CommandMetrics {
    pub commands_confirmed: u64,
    pub commands_ignored: u64,
    pub malformed_payloads: u64,
    pub encode_failures: u64,
    pub avg_confirmation_time_ms: f64,
    pub confirmation_time_p50_ms: f64,
    pub confirmation_time_p95_ms: f64,
    pub confirmation_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub uptime_seconds: u64,
    pub state_transitions: u64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}
