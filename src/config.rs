use std::fmt;
use std::path::PathBuf;

/// Wire transport used to reach the Riemann server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiemannProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for RiemannProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiemannProtocol::Tcp => f.write_str("tcp"),
            RiemannProtocol::Udp => f.write_str("udp"),
        }
    }
}

/// Runtime settings, built once at startup and handed to the constructors
/// that need them.
#[derive(Debug, Clone)]
pub struct Config {
    pub serial_port: String,          // tty the monitor is attached to
    pub serial_baud: u32,             // monitor's configured baud rate
    pub riemann_protocol: RiemannProtocol,
    pub riemann_host: String,
    pub riemann_port: u16,
    pub ttl: f32,                     // seconds an event stays valid in Riemann
    pub event_host: String,           // `host` label on every event
    pub replay: Option<PathBuf>,      // read a captured trace instead of the tty
}

impl Config {
    pub fn riemann_addr(&self) -> String {
        format!("{}:{}", self.riemann_host, self.riemann_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            serial_baud: 19200,
            riemann_protocol: RiemannProtocol::Tcp,
            riemann_host: "riemann".to_string(),
            riemann_port: 5555,
            // the monitor reports about every 10 s; 5 s of slack for delays
            ttl: 15.0,
            event_host: "main electrical panel".to_string(),
            replay: None,
        }
    }
}
