//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the service instruments and describe them once at construction
//! - Build the semantic attribute set for HTTP measurements
//! - Install the Prometheus exporter backing `GET /metrics`
//!
//! # Metrics
//! - `http_request_duration_seconds` (histogram): latency per route, method, status
//! - `http_response_size_bytes` (histogram): response body size
//! - `http_requests_inflight` (gauge): requests currently being served
//! - `impressions` (counter): flag resolutions by flag key and variant
//!
//! Every series carries an `otel_scope_name` label naming the recorder's scope.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label, Unit,
};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const RESPONSE_SIZE: &str = "http_response_size_bytes";
pub const REQUESTS_INFLIGHT: &str = "http_requests_inflight";
pub const IMPRESSIONS: &str = "impressions";

pub const SCOPE_KEY: &str = "otel_scope_name";
pub const SERVICE_NAME_KEY: &str = "service.name";
pub const HTTP_URL_KEY: &str = "http.url";
pub const HTTP_METHOD_KEY: &str = "http.method";
pub const HTTP_STATUS_CODE_KEY: &str = "http.status_code";
pub const FLAG_KEY_KEY: &str = "feature_flag.key";
pub const FLAG_VARIANT_KEY: &str = "feature_flag.variant";

const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];
const SIZE_BUCKETS: &[f64] = &[
    64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0,
];

/// Kind of a registered instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Histogram,
    Gauge,
    Counter,
}

/// Description of one instrument owned by a [`MetricsRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub name: &'static str,
    pub kind: InstrumentKind,
    pub unit: Unit,
    pub description: &'static str,
}

impl Instrument {
    fn describe(&self) {
        match self.kind {
            InstrumentKind::Histogram => {
                describe_histogram!(self.name, self.unit, self.description)
            }
            InstrumentKind::Gauge => describe_gauge!(self.name, self.unit, self.description),
            InstrumentKind::Counter => describe_counter!(self.name, self.unit, self.description),
        }
    }
}

/// Records HTTP and flag-evaluation measurements.
///
/// All methods take `&self` and forward to the installed `metrics` recorder,
/// so one instance can be shared across every request task without locking.
/// Recordings with identical attributes aggregate into a single series.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    scope: String,
    instruments: [Instrument; 4],
}

impl MetricsRecorder {
    /// Create the recorder and describe its four instruments.
    pub fn new(scope: impl Into<String>) -> Self {
        let instruments = [
            Instrument {
                name: REQUEST_DURATION,
                kind: InstrumentKind::Histogram,
                unit: Unit::Seconds,
                description: "Duration of HTTP requests",
            },
            Instrument {
                name: RESPONSE_SIZE,
                kind: InstrumentKind::Histogram,
                unit: Unit::Bytes,
                description: "Size of HTTP responses",
            },
            Instrument {
                name: REQUESTS_INFLIGHT,
                kind: InstrumentKind::Gauge,
                unit: Unit::Count,
                description: "Number of HTTP requests being served",
            },
            Instrument {
                name: IMPRESSIONS,
                kind: InstrumentKind::Counter,
                unit: Unit::Count,
                description: "Flag resolutions by flag key and variant",
            },
        ];
        for instrument in &instruments {
            instrument.describe();
        }

        Self {
            scope: scope.into(),
            instruments,
        }
    }

    /// Name of the instrumentation scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn instruments(&self) -> &[Instrument; 4] {
        &self.instruments
    }

    /// Attribute set for an HTTP measurement, in fixed order:
    /// service name, target id, method, status code. Values are kept verbatim.
    pub fn http_attributes(service: &str, id: &str, method: &str, code: &str) -> [Label; 4] {
        [
            Label::new(SERVICE_NAME_KEY, service.to_owned()),
            Label::new(HTTP_URL_KEY, id.to_owned()),
            Label::new(HTTP_METHOD_KEY, method.to_owned()),
            Label::new(HTTP_STATUS_CODE_KEY, code.to_owned()),
        ]
    }

    pub fn record_duration(&self, elapsed: Duration, attrs: &[Label]) {
        histogram!(REQUEST_DURATION, self.scoped(attrs)).record(elapsed.as_secs_f64());
    }

    pub fn record_response_size(&self, bytes: u64, attrs: &[Label]) {
        histogram!(RESPONSE_SIZE, self.scoped(attrs)).record(bytes as f64);
    }

    pub fn in_flight_start(&self, attrs: &[Label]) {
        gauge!(REQUESTS_INFLIGHT, self.scoped(attrs)).increment(1.0);
    }

    pub fn in_flight_end(&self, attrs: &[Label]) {
        gauge!(REQUESTS_INFLIGHT, self.scoped(attrs)).decrement(1.0);
    }

    /// Start an in-flight measurement that ends when the guard is dropped.
    pub fn in_flight(&self, attrs: Vec<Label>) -> InFlightGuard<'_> {
        self.in_flight_start(&attrs);
        InFlightGuard {
            recorder: self,
            attrs,
        }
    }

    /// Count one resolution of `flag_key` to `variant`.
    pub fn record_impression(&self, flag_key: &str, variant: &str) {
        let attrs = [
            Label::new(SERVICE_NAME_KEY, self.scope.clone()),
            Label::new(FLAG_KEY_KEY, flag_key.to_owned()),
            Label::new(FLAG_VARIANT_KEY, variant.to_owned()),
        ];
        counter!(IMPRESSIONS, self.scoped(&attrs)).increment(1);
    }

    fn scoped(&self, attrs: &[Label]) -> Vec<Label> {
        let mut labels = Vec::with_capacity(attrs.len() + 1);
        labels.push(Label::new(SCOPE_KEY, self.scope.clone()));
        labels.extend_from_slice(attrs);
        labels
    }
}

/// Ends an in-flight measurement on drop, including on cancellation.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    recorder: &'a MetricsRecorder,
    attrs: Vec<Label>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.recorder.in_flight_end(&self.attrs);
    }
}

/// Exporter builder with the service's histogram buckets.
pub fn exporter_builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)?
        .set_buckets_for_metric(Matcher::Full(RESPONSE_SIZE.to_string()), SIZE_BUCKETS)
}

/// Install the Prometheus recorder globally, once per process.
///
/// Later calls return the handle of the first installation.
pub fn install_exporter() -> Result<PrometheusHandle, BuildError> {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }

    let recorder = exporter_builder()?.build_recorder();
    let handle = HANDLE.get_or_init(move || {
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("A global metrics recorder is already installed; /metrics will stay empty");
        }
        handle
    });
    Ok(handle.clone())
}
