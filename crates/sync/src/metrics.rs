use std::sync::LazyLock;

use prometheus::{
    register_int_counter,
    register_int_gauge,
    IntCounter,
    IntGauge,
};

static FANOUT_WORKERS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "collablite_fanout_workers",
        "Number of live per-object fan-out workers"
    )
    .unwrap()
});

pub fn log_fanout_worker_start() {
    FANOUT_WORKERS.inc();
}

pub fn log_fanout_worker_stop() {
    FANOUT_WORKERS.dec();
}

static CONFIRMATIONS_DROPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_confirmations_dropped_total",
        "Confirmations dropped because a subscriber's outbound queue stayed full past the drop \
         timeout"
    )
    .unwrap()
});

pub fn log_confirmation_dropped() {
    CONFIRMATIONS_DROPPED_TOTAL.inc();
}

static STORE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_store_failures_total",
        "Writes the store rejected; the fan-out proceeds regardless"
    )
    .unwrap()
});

pub fn log_store_failure() {
    STORE_FAILURES_TOTAL.inc();
}

static MUTATIONS_IN_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_mutations_in_total",
        "Mutations accepted from client sessions"
    )
    .unwrap()
});

pub fn log_mutation_in() {
    MUTATIONS_IN_TOTAL.inc();
}

static CONFIRMATIONS_OUT_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_confirmations_out_total",
        "Confirmations relayed toward client streams"
    )
    .unwrap()
});

pub fn log_confirmation_out() {
    CONFIRMATIONS_OUT_TOTAL.inc();
}
