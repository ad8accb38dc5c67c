use std::{collections::HashMap, sync::Mutex};

use once_cell::sync::Lazy;

static METRICS: Lazy<Mutex<MetricsState>> = Lazy::new(|| {
    Mutex::new(MetricsState {
        http_total: 0,
        http_errors: 0,
        per_endpoint: HashMap::new(),
        per_endpoint_err: HashMap::new(),
        chain_read_ok: 0,
        chain_read_err: 0,
        chain_write_ok: 0,
        chain_write_err: 0,
    })
});

struct MetricsState {
    http_total: u64,
    http_errors: u64,
    per_endpoint: HashMap<&'static str, u64>,
    per_endpoint_err: HashMap<&'static str, u64>,
    // 链上读写统计（读失败会本地降级，这里是唯一能看到它们的地方）
    chain_read_ok: u64,
    chain_read_err: u64,
    chain_write_ok: u64,
    chain_write_err: u64,
}

fn state() -> std::sync::MutexGuard<'static, MetricsState> {
    match METRICS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

pub fn count_ok(endpoint: &'static str) {
    let mut s = state();
    s.http_total += 1;
    *s.per_endpoint.entry(endpoint).or_insert(0) += 1;
}

pub fn count_err(endpoint: &'static str) {
    let mut s = state();
    s.http_total += 1;
    s.http_errors += 1;
    *s.per_endpoint.entry(endpoint).or_insert(0) += 1;
    *s.per_endpoint_err.entry(endpoint).or_insert(0) += 1;
}

pub fn inc_chain_read_ok() {
    state().chain_read_ok += 1;
}

pub fn inc_chain_read_err() {
    state().chain_read_err += 1;
}

pub fn inc_chain_write_ok() {
    state().chain_write_ok += 1;
}

pub fn inc_chain_write_err() {
    state().chain_write_err += 1;
}

pub fn render_prometheus() -> String {
    let s = state();
    let mut out = String::new();

    out.push_str("# HELP fundcore_requests_total Total requests\n");
    out.push_str("# TYPE fundcore_requests_total counter\n");
    out.push_str(&format!("fundcore_requests_total {}\n", s.http_total));

    out.push_str("# HELP fundcore_errors_total Total error responses\n");
    out.push_str("# TYPE fundcore_errors_total counter\n");
    out.push_str(&format!("fundcore_errors_total {}\n", s.http_errors));

    out.push_str("# HELP fundcore_endpoint_requests_total Requests per endpoint\n");
    out.push_str("# TYPE fundcore_endpoint_requests_total counter\n");
    for (endpoint, count) in &s.per_endpoint {
        out.push_str(&format!(
            "fundcore_endpoint_requests_total{{endpoint=\"{}\"}} {}\n",
            endpoint, count
        ));
    }
    for (endpoint, count) in &s.per_endpoint_err {
        out.push_str(&format!(
            "fundcore_endpoint_errors_total{{endpoint=\"{}\"}} {}\n",
            endpoint, count
        ));
    }

    out.push_str("# HELP fundcore_chain_reads_total Contract read calls\n");
    out.push_str("# TYPE fundcore_chain_reads_total counter\n");
    out.push_str(&format!(
        "fundcore_chain_reads_total{{result=\"ok\"}} {}\n",
        s.chain_read_ok
    ));
    out.push_str(&format!(
        "fundcore_chain_reads_total{{result=\"err\"}} {}\n",
        s.chain_read_err
    ));

    out.push_str("# HELP fundcore_chain_writes_total Contract mutation calls\n");
    out.push_str("# TYPE fundcore_chain_writes_total counter\n");
    out.push_str(&format!(
        "fundcore_chain_writes_total{{result=\"ok\"}} {}\n",
        s.chain_write_ok
    ));
    out.push_str(&format!(
        "fundcore_chain_writes_total{{result=\"err\"}} {}\n",
        s.chain_write_err
    ));

    out
}
