//! Generic resolution dispatcher.
//!
//! One code path serves every typed resolution:
//!
//! ```text
//! new request id → span(request_id, flag_key, context keys)
//!     → resolver(request_id, flag_key, context)
//!     → response.set_result(value, variant, reason)
//!     → impression(flag_key, variant)   exactly once, on every exit path
//!     → Ok | mapped RpcError
//! ```
//!
//! On evaluation failure the response receives the type's zero value, an
//! empty variant and reason `ERROR`; the impression is still counted, with
//! the empty variant.

use uuid::Uuid;

use super::connect::RpcError;
use super::errors::map_error;
use super::messages::{
    ResolveBooleanResponse, ResolveFloatResponse, ResolveIntResponse, ResolveObjectResponse,
    ResolveStringResponse,
};
use crate::eval::{EvaluationContext, ObjectValue, Reason, ResolveResult};
use crate::observability::MetricsRecorder;

/// A typed response that can absorb a resolution outcome.
pub trait ResponseSetter<T> {
    fn set_result(&mut self, value: T, variant: String, reason: Reason) -> Result<(), RpcError>;
}

impl ResponseSetter<bool> for ResolveBooleanResponse {
    fn set_result(&mut self, value: bool, variant: String, reason: Reason) -> Result<(), RpcError> {
        self.value = value;
        self.variant = variant;
        self.reason = reason;
        Ok(())
    }
}

impl ResponseSetter<String> for ResolveStringResponse {
    fn set_result(
        &mut self,
        value: String,
        variant: String,
        reason: Reason,
    ) -> Result<(), RpcError> {
        self.value = value;
        self.variant = variant;
        self.reason = reason;
        Ok(())
    }
}

impl ResponseSetter<i64> for ResolveIntResponse {
    fn set_result(&mut self, value: i64, variant: String, reason: Reason) -> Result<(), RpcError> {
        self.value = value;
        self.variant = variant;
        self.reason = reason;
        Ok(())
    }
}

impl ResponseSetter<f64> for ResolveFloatResponse {
    /// JSON has no representation for NaN or infinities.
    fn set_result(&mut self, value: f64, variant: String, reason: Reason) -> Result<(), RpcError> {
        if !value.is_finite() {
            return Err(RpcError::internal(format!(
                "variant {variant:?} resolved to non-finite value {value}"
            )));
        }
        self.value = value;
        self.variant = variant;
        self.reason = reason;
        Ok(())
    }
}

impl ResponseSetter<ObjectValue> for ResolveObjectResponse {
    fn set_result(
        &mut self,
        value: ObjectValue,
        variant: String,
        reason: Reason,
    ) -> Result<(), RpcError> {
        self.value = value;
        self.variant = variant;
        self.reason = reason;
        Ok(())
    }
}

/// Counts one impression when dropped.
struct Impression<'a> {
    metrics: &'a MetricsRecorder,
    flag_key: &'a str,
    variant: String,
}

impl Drop for Impression<'_> {
    fn drop(&mut self) {
        self.metrics.record_impression(self.flag_key, &self.variant);
    }
}

/// Run one typed resolution and populate `response`.
///
/// An evaluation error takes precedence over a setter error.
pub fn resolve<T, F, R>(
    resolver: F,
    flag_key: &str,
    context: &EvaluationContext,
    response: &mut R,
    metrics: &MetricsRecorder,
) -> Result<(), RpcError>
where
    T: Default,
    F: FnOnce(&str, &str, &EvaluationContext) -> ResolveResult<T>,
    R: ResponseSetter<T>,
{
    let request_id = Uuid::new_v4().to_string();
    let context_keys: Vec<&str> = context.keys().map(String::as_str).collect();
    let span = tracing::debug_span!(
        "resolve",
        request_id = %request_id,
        flag_key = %flag_key,
        context_keys = ?context_keys
    );
    let _entered = span.enter();

    let (value, variant, reason, failure) = match resolver(&request_id, flag_key, context) {
        Ok(resolution) => (resolution.value, resolution.variant, resolution.reason, None),
        Err(err) => {
            tracing::warn!(error = %err, "Returning error response");
            (T::default(), String::new(), Reason::Error, Some(map_error(&err)))
        }
    };

    let _impression = Impression {
        metrics,
        flag_key,
        variant: variant.clone(),
    };

    let populated = response.set_result(value, variant, reason);
    match (failure, populated) {
        (Some(err), _) => Err(err),
        (None, Err(err)) => {
            tracing::error!(error = %err, "Failed to populate response");
            Err(err)
        }
        (None, Ok(())) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvaluationError, Resolution};
    use crate::observability::metrics::{exporter_builder, IMPRESSIONS};
    use crate::service::connect::Code;
    use metrics_exporter_prometheus::PrometheusHandle;

    fn with_recorder<F: FnOnce(&MetricsRecorder)>(f: F) -> PrometheusHandle {
        let recorder = exporter_builder().unwrap().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || f(&MetricsRecorder::new("test")));
        handle
    }

    fn impressions(handle: &PrometheusHandle) -> Vec<String> {
        handle
            .render()
            .lines()
            .filter(|line| line.starts_with(IMPRESSIONS))
            .map(str::to_owned)
            .collect()
    }

    fn ok<T>(value: T) -> ResolveResult<T> {
        Ok(Resolution {
            value,
            variant: "on".into(),
            reason: Reason::Static,
        })
    }

    #[test]
    fn success_populates_response_and_counts_impression() {
        let mut response = ResolveBooleanResponse::default();
        let mut seen_id = String::new();
        let handle = with_recorder(|metrics| {
            let result = resolve(
                |id, key, _| {
                    seen_id = id.to_owned();
                    assert_eq!(key, "banner");
                    ok(true)
                },
                "banner",
                &EvaluationContext::new(),
                &mut response,
                metrics,
            );
            assert!(result.is_ok());
        });

        assert!(Uuid::parse_str(&seen_id).is_ok());
        assert_eq!(
            response,
            ResolveBooleanResponse {
                value: true,
                reason: Reason::Static,
                variant: "on".into()
            }
        );
        let lines = impressions(&handle);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(r#"variant="on""#), "{lines:?}");
        assert!(lines[0].ends_with(" 1"), "{lines:?}");
    }

    #[test]
    fn evaluation_failure_maps_error_and_still_counts() {
        let mut response = ResolveStringResponse::default();
        let handle = with_recorder(|metrics| {
            let err = resolve(
                |_, _, _| Err(EvaluationError::new("FLAG_NOT_FOUND")),
                "missing",
                &EvaluationContext::new(),
                &mut response,
                metrics,
            )
            .unwrap_err();
            assert_eq!(err.code, Code::NotFound);
            assert_eq!(err.message, "FlagdError:, FLAG_NOT_FOUND");
        });

        assert_eq!(response.reason, Reason::Error);
        assert_eq!(response.value, "");
        assert_eq!(response.variant, "");

        let lines = impressions(&handle);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(r#"variant="""#), "{lines:?}");
    }

    #[test]
    fn setter_failure_is_returned_and_counted_once() {
        let mut response = ResolveFloatResponse::default();
        let handle = with_recorder(|metrics| {
            let err = resolve(
                |_, _, _| ok(f64::NAN),
                "ratio",
                &EvaluationContext::new(),
                &mut response,
                metrics,
            )
            .unwrap_err();
            assert_eq!(err.code, Code::Internal);
        });

        let lines = impressions(&handle);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" 1"), "{lines:?}");
    }

    #[test]
    fn each_call_gets_a_fresh_request_id() {
        let mut ids = Vec::new();
        with_recorder(|metrics| {
            for _ in 0..2 {
                let mut response = ResolveIntResponse::default();
                resolve(
                    |id, _, _| {
                        ids.push(id.to_owned());
                        ok(1i64)
                    },
                    "n",
                    &EvaluationContext::new(),
                    &mut response,
                    metrics,
                )
                .unwrap();
            }
        });
        assert_ne!(ids[0], ids[1]);
    }
}
