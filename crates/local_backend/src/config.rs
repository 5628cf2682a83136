use std::time::Duration;

use clap::{
    Parser,
    ValueEnum,
};
use sync::RouterOptions;

#[derive(Parser, Clone, Debug)]
#[clap(version)]
pub struct LocalConfig {
    /// File path for the persistent store (a SQLite file or a sled
    /// directory, depending on --store)
    #[clap(long, default_value = "collablite_local.db")]
    pub db_spec: String,

    /// Host interface to bind to
    #[clap(short, long, default_value = "0.0.0.0")]
    pub interface: std::net::Ipv4Addr,

    /// Host port the daemon should bind to
    #[clap(short, long, default_value = "8000")]
    pub port: u16,

    /// Which store backs persisted objects
    #[clap(long, value_enum, default_value_t = StoreDriver::Sqlite)]
    pub store: StoreDriver,

    /// Capacity of each object's inbound mutation queue
    #[clap(long, default_value_t = 10_000)]
    pub inbound_queue_size: usize,

    /// Capacity of each subscriber's outbound confirmation queue
    #[clap(long, default_value_t = 10_000)]
    pub outbound_queue_size: usize,

    /// Milliseconds the fan-out waits on a full subscriber queue before
    /// dropping that confirmation for that subscriber
    #[clap(long, default_value_t = 10)]
    pub fanout_drop_timeout_ms: u64,

    /// Log level: debug, info, warn, error
    #[clap(long, default_value = "info")]
    pub log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreDriver {
    /// Relay only, nothing persisted
    None,
    /// Embedded key/value store (sled)
    Embedded,
    /// SQLite
    Sqlite,
}

impl LocalConfig {
    pub fn http_bind_address(&self) -> ([u8; 4], u16) {
        (self.interface.octets(), self.port)
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            inbound_queue_size: self.inbound_queue_size,
            outbound_queue_size: self.outbound_queue_size,
            fanout_drop_timeout: Duration::from_millis(self.fanout_drop_timeout_ms),
        }
    }
}
