use std::sync::OnceLock;

static PERF_LOG_ENABLED: OnceLock<bool> = OnceLock::new();

fn env_truthy(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}

fn perf_log_enabled() -> bool {
    *PERF_LOG_ENABLED.get_or_init(|| env_truthy("FSEARCH_PERF_LOG"))
}

/// Hand-rolled timing/diagnostic log, gated behind `FSEARCH_PERF_LOG` the
/// same way this repo's original `perf_log` gates itself — no logging
/// framework, just `eprintln!` with structured `key=value` fields, kept
/// off by default so normal operation is silent.
pub(crate) fn perf_log(message: impl AsRef<str>) {
    if perf_log_enabled() {
        eprintln!("[fsearch] {}", message.as_ref());
    }
}
