use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use chrono::Utc;
use prost::Message;
use tracing::{debug, info, warn};

use crate::config::RiemannProtocol;
use crate::error::SinkError;
use crate::telemetry::dispatch::{Metric, MetricEvent, MetricSink};

pub type Result<T> = std::result::Result<T, SinkError>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REPLY_BYTES: usize = 16 * 1024 * 1024;

// Subset of Riemann's proto.proto that this client writes and reads.

#[derive(Clone, PartialEq, prost::Message)]
pub struct Attribute {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    #[prost(int64, optional, tag = "1")]
    pub time: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub state: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub service: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub host: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub description: Option<String>,
    #[prost(string, repeated, tag = "7")]
    pub tags: Vec<String>,
    #[prost(float, optional, tag = "8")]
    pub ttl: Option<f32>,
    #[prost(message, repeated, tag = "9")]
    pub attributes: Vec<Attribute>,
    #[prost(sint64, optional, tag = "13")]
    pub metric_sint64: Option<i64>,
    #[prost(double, optional, tag = "14")]
    pub metric_d: Option<f64>,
    #[prost(float, optional, tag = "15")]
    pub metric_f: Option<f32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Msg {
    #[prost(bool, optional, tag = "2")]
    pub ok: Option<bool>,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
    #[prost(message, repeated, tag = "6")]
    pub events: Vec<Event>,
}

impl Event {
    /// Wire form of `event`, stamped with `time` (unix seconds).
    pub fn from_metric(event: &MetricEvent, time: i64) -> Self {
        let (metric_sint64, metric_d) = match event.metric {
            Metric::Int(v) => (Some(v), None),
            Metric::Float(v) => (None, Some(v)),
        };
        Event {
            time: Some(time),
            state: Some("ok".to_string()),
            service: Some(event.service.clone()),
            host: Some(event.host.clone()),
            ttl: Some(event.ttl),
            attributes: event
                .attributes
                .iter()
                .map(|(k, v)| Attribute {
                    key: k.clone(),
                    value: Some(v.clone()),
                })
                .collect(),
            metric_sint64,
            metric_d,
            ..Default::default()
        }
    }
}

enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Client for a Riemann server. TCP sends wait for the server's
/// acknowledgement; UDP sends are fire-and-forget.
pub struct RiemannClient {
    connection: Connection,
    address: String,
}

impl RiemannClient {
    pub fn connect(protocol: RiemannProtocol, address: &str) -> Result<Self> {
        info!("Attempting to connect to riemann at {} over {}", address, protocol);
        let addrs: Vec<SocketAddr> = address.to_socket_addrs()?.collect();

        let connection = match protocol {
            RiemannProtocol::Tcp => Connection::Tcp(connect_tcp(&addrs)?),
            RiemannProtocol::Udp => Connection::Udp(connect_udp(&addrs)?),
        };

        info!("Connected to riemann at {}", address);
        Ok(RiemannClient {
            connection,
            address: address.to_string(),
        })
    }

    pub fn send_msg(&mut self, msg: &Msg) -> Result<()> {
        match &mut self.connection {
            Connection::Tcp(stream) => {
                let len = msg.encoded_len();
                let mut frame = Vec::with_capacity(4 + len);
                frame.extend_from_slice(&(len as u32).to_be_bytes());
                msg.encode(&mut frame)?;
                stream.write_all(&frame)?;
                stream.flush()?;

                let reply = read_reply(stream)?;
                if reply.ok != Some(true) {
                    let reason = reply.error.unwrap_or_else(|| "no reason given".to_string());
                    warn!("Riemann at {} rejected message: {}", self.address, reason);
                    return Err(SinkError::Rejected(reason));
                }
                Ok(())
            }
            Connection::Udp(socket) => {
                socket.send(&msg.encode_to_vec())?;
                Ok(())
            }
        }
    }
}

impl MetricSink for RiemannClient {
    fn send(&mut self, event: &MetricEvent) -> Result<()> {
        debug!("Sending {} to riemann", event);
        let msg = Msg {
            events: vec![Event::from_metric(event, Utc::now().timestamp())],
            ..Default::default()
        };
        self.send_msg(&msg)
    }
}

fn connect_tcp(addrs: &[SocketAddr]) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(no_address(last_err))
}

fn connect_udp(addrs: &[SocketAddr]) -> Result<UdpSocket> {
    let mut last_err = None;
    for addr in addrs {
        let local = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let attempt = UdpSocket::bind(local).and_then(|socket| {
            socket.connect(addr)?;
            Ok(socket)
        });
        match attempt {
            Ok(socket) => return Ok(socket),
            Err(e) => last_err = Some(e),
        }
    }
    Err(no_address(last_err))
}

fn no_address(last_err: Option<std::io::Error>) -> SinkError {
    SinkError::Io(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "address resolved to nothing",
        )
    }))
}

fn read_reply(stream: &mut TcpStream) -> Result<Msg> {
    let mut header = [0_u8; 4];
    stream.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_REPLY_BYTES {
        return Err(SinkError::FrameTooLarge(len));
    }
    let mut body = vec![0_u8; len];
    stream.read_exact(&mut body)?;
    Ok(Msg::decode(body.as_slice())?)
}
