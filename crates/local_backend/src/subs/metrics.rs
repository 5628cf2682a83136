use std::sync::LazyLock;

use prometheus::{
    register_int_counter,
    register_int_gauge,
    IntCounter,
    IntGauge,
};

static ATTACH_WEBSOCKETS_TOTAL: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "collablite_attach_websockets_total",
        "Number of live attach WebSockets"
    )
    .unwrap()
});

pub fn log_attach_websockets_total(delta: i64) {
    ATTACH_WEBSOCKETS_TOTAL.add(delta);
}

static WEBSOCKET_MESSAGES_IN_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_websocket_messages_in_total",
        "Mutation frames received over attach WebSockets"
    )
    .unwrap()
});

pub fn log_websocket_message_in() {
    WEBSOCKET_MESSAGES_IN_TOTAL.inc();
}

static WEBSOCKET_MESSAGES_OUT_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_websocket_messages_out_total",
        "Confirmation frames written to attach WebSockets"
    )
    .unwrap()
});

pub fn log_websocket_message_out() {
    WEBSOCKET_MESSAGES_OUT_TOTAL.inc();
}

static WEBSOCKET_PINGS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_websocket_pings_total",
        "Heartbeat pings sent to clients"
    )
    .unwrap()
});

pub fn log_websocket_ping() {
    WEBSOCKET_PINGS_TOTAL.inc();
}

static WEBSOCKET_CLIENT_TIMEOUTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_websocket_client_timeouts_total",
        "Connections closed because the client stopped responding"
    )
    .unwrap()
});

pub fn log_websocket_client_timeout() {
    WEBSOCKET_CLIENT_TIMEOUTS_TOTAL.inc();
}

static WEBSOCKET_CONNECTION_RESETS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "collablite_websocket_connection_resets_total",
        "Receive-side transport failures on attach WebSockets"
    )
    .unwrap()
});

pub fn log_websocket_connection_reset() {
    WEBSOCKET_CONNECTION_RESETS_TOTAL.inc();
}
