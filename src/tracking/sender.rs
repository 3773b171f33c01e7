//! Live landmark datagram sender
//!
//! Sends one compact JSON object per frame over UDP:
//! `{"0":{"x":..,"y":..,"z":..},"1":{...},...}`, keyed by pose index in
//! detection order. Delivery is best-effort: no acknowledgement, no retry,
//! and send failures never reach the capture loop.

use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::config::SenderConfig;
use crate::error::CaptureError;
use crate::tracking::extractor::RawDetection;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct WirePoint {
    x: f32,
    y: f32,
    z: f32,
}

/// Encode a frame's body landmarks as a compact JSON object.
///
/// Undetected indices are omitted; no body yields `{}`.
pub fn encode_frame(detection: &RawDetection) -> String {
    let mut map: BTreeMap<usize, WirePoint> = BTreeMap::new();
    if let Some(points) = &detection.body {
        for (i, point) in points.iter().enumerate() {
            if let Some(p) = point {
                map.insert(i, WirePoint { x: p.x, y: p.y, z: p.z });
            }
        }
    }
    // usize keys serialize as JSON strings
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}

/// UDP landmark sender
pub struct DatagramSender {
    socket: UdpSocket,
    target: SocketAddr,
    sent: u64,
    failures: u64,
}

impl DatagramSender {
    /// Bind an ephemeral local socket for sending to `config.address:config.port`
    pub fn new(config: &SenderConfig) -> Result<Self, CaptureError> {
        let addr = format!("{}:{}", config.address, config.port);
        let target = addr
            .to_socket_addrs()
            .map_err(|e| CaptureError::SourceUnavailable(format!("Invalid sender address {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| CaptureError::SourceUnavailable(format!("Sender address {} did not resolve", addr)))?;

        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).map_err(|e| {
            CaptureError::SourceUnavailable(format!("Failed to bind sender socket: {}", e))
        })?;

        tracing::info!("Streaming landmarks to udp://{}", target);
        Ok(Self {
            socket,
            target,
            sent: 0,
            failures: 0,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one frame. Errors are logged and counted, never returned.
    pub fn send(&mut self, detection: &RawDetection) {
        let payload = encode_frame(detection);
        match self.socket.send_to(payload.as_bytes(), self.target) {
            Ok(_) => self.sent += 1,
            Err(e) => {
                self.failures += 1;
                tracing::warn!("Sender error: {}", e);
            }
        }
    }

    /// Datagrams handed to the OS
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Datagrams that failed to send
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::landmark::LandmarkPoint;
    use std::time::Duration;

    #[test]
    fn test_encode_keys_are_string_indices() {
        let det = RawDetection {
            body: Some(vec![
                Some(LandmarkPoint::new(0.5, 0.25, -0.125).with_visibility(0.9)),
                None,
                Some(LandmarkPoint::new(1.0, 0.0, 0.0)),
            ]),
            hands: Vec::new(),
        };
        assert_eq!(
            encode_frame(&det),
            r#"{"0":{"x":0.5,"y":0.25,"z":-0.125},"2":{"x":1.0,"y":0.0,"z":0.0}}"#
        );
    }

    #[test]
    fn test_encode_without_body() {
        assert_eq!(encode_frame(&RawDetection::default()), "{}");
    }

    #[test]
    fn test_send_over_loopback() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut sender = DatagramSender::new(&SenderConfig {
            enabled: true,
            address: "127.0.0.1".to_string(),
            port,
        })
        .unwrap();

        let det = RawDetection {
            body: Some(vec![Some(LandmarkPoint::new(0.1, 0.2, 0.3))]),
            hands: Vec::new(),
        };
        sender.send(&det);

        let mut buf = [0u8; 1024];
        let n = receiver.recv(&mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert!((value["0"]["y"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(sender.sent(), 1);
        assert_eq!(sender.failures(), 0);
    }

    #[test]
    fn test_unresolvable_address_is_an_error() {
        let result = DatagramSender::new(&SenderConfig {
            enabled: true,
            address: "not an address".to_string(),
            port: 5052,
        });
        assert!(result.is_err());
    }
}
