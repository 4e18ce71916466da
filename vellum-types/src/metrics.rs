//! Metrics hook recorded around every provider request.
//!
//! The toolkit does not ship an exporter; telemetry sinks implement
//! [`RequestMetrics`] and are injected into provider clients.

use std::time::Duration;

/// Outcome of a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request succeeded.
    Success,
    /// The request failed with the named error kind.
    Error(String),
}

/// One observed provider request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSample {
    /// Provider name.
    pub provider: String,
    /// Model the request targeted.
    pub model: String,
    /// Wall-clock latency.
    pub latency: Duration,
    /// Success or error kind.
    pub outcome: RequestOutcome,
    /// Prompt tokens, when known.
    pub prompt_tokens: Option<usize>,
    /// Completion tokens, when known.
    pub completion_tokens: Option<usize>,
    /// Estimated request cost in USD, when the client can price the model.
    pub estimated_cost_usd: Option<f64>,
}

/// Sink for request samples.
pub trait RequestMetrics: Send + Sync {
    /// Record one sample. Called for successes and failures alike.
    fn record(&self, sample: RequestSample);
}

/// Discards all samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl RequestMetrics for NoopMetrics {
    fn record(&self, _sample: RequestSample) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Capture(Mutex<Vec<RequestSample>>);

    impl RequestMetrics for Capture {
        fn record(&self, sample: RequestSample) {
            self.0.lock().unwrap().push(sample);
        }
    }

    #[test]
    fn sink_receives_samples() {
        let capture = Capture(Mutex::new(Vec::new()));
        capture.record(RequestSample {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            latency: Duration::from_millis(120),
            outcome: RequestOutcome::Success,
            prompt_tokens: Some(10),
            completion_tokens: Some(1),
            estimated_cost_usd: None,
        });
        let samples = capture.0.lock().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].outcome, RequestOutcome::Success);
    }
}
