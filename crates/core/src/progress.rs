//! Progress reporting for long-running crawls and batches.

/// Receives progress as a fraction in `[0, 1]` plus a short status line.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, fraction: f32, status: &str);

    /// Non-fatal problems worth showing to whoever watches the run.
    fn diagnostic(&self, message: &str) {
        let _ = message;
    }
}

impl<F> ProgressSink for F
where
    F: Fn(f32, &str) + Send + Sync,
{
    fn progress(&self, fraction: f32, status: &str) {
        self(fraction, status)
    }
}

/// Forward to an optional sink, clamping the fraction.
pub fn report(sink: Option<&dyn ProgressSink>, fraction: f32, status: &str) {
    if let Some(sink) = sink {
        sink.progress(fraction.clamp(0.0, 1.0), status);
    }
}

pub fn report_diagnostic(sink: Option<&dyn ProgressSink>, message: &str) {
    if let Some(sink) = sink {
        sink.diagnostic(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closures_are_sinks_and_fractions_are_clamped() {
        let seen = Mutex::new(Vec::new());
        let sink = |f: f32, s: &str| seen.lock().unwrap().push((f, s.to_string()));

        report(Some(&sink), 1.5, "over");
        report(Some(&sink), -0.2, "under");
        report(None, 0.5, "ignored");
        report_diagnostic(Some(&sink), "closures drop diagnostics");

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![(1.0, "over".to_string()), (0.0, "under".to_string())]);
    }
}
