//! TUIO 1.1 `/tuio/2Dcur` emission over OSC/UDP.
//!
//! Bundles are built in the order `source`, `alive`, `set*`, `fseq`, matching
//! the profile's message ordering, and split across multiple datagrams if
//! the encoded bundle would exceed the UDP-safe size.

use std::net::UdpSocket;

use log::{error, warn};
use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};

use crate::error::CoreError;
use crate::types::Touch;

/// Maximum datagram size TUIO senders conventionally stay under.
pub const MAX_DATAGRAM_BYTES: usize = 1472;

/// Where a Tracker's TUIO output goes. Abstracted so tests can capture
/// emitted bundles without opening a socket.
pub trait TuioSink {
    fn send(&mut self, payload: &[u8]) -> Result<(), CoreError>;
}

/// Sends TUIO datagrams to a single `(host, port)` target over UDP.
pub struct UdpTuioSink {
    socket: UdpSocket,
    host: String,
    port: u16,
}

impl UdpTuioSink {
    pub fn new(host: &str, port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(UdpTuioSink {
            socket,
            host: host.to_string(),
            port,
        })
    }
}

impl TuioSink for UdpTuioSink {
    fn send(&mut self, payload: &[u8]) -> Result<(), CoreError> {
        self.socket
            .send_to(payload, (self.host.as_str(), self.port))
            .map_err(|e| CoreError::UdpSendFailure {
                host: self.host.clone(),
                port: self.port,
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Captures every payload sent, for assertions in tests.
#[derive(Debug, Default)]
pub struct TestTuioSink {
    pub sent: Vec<Vec<u8>>,
}

impl TuioSink for TestTuioSink {
    fn send(&mut self, payload: &[u8]) -> Result<(), CoreError> {
        self.sent.push(payload.to_vec());
        Ok(())
    }
}

fn source_message(app_name: &str, host: &str) -> OscMessage {
    OscMessage {
        addr: "/tuio/2Dcur".to_string(),
        args: vec![
            OscType::String("source".to_string()),
            OscType::String(format!("{app_name}@{host}")),
        ],
    }
}

fn alive_message(touches: &[Touch]) -> OscMessage {
    let mut args = vec![OscType::String("alive".to_string())];
    args.extend(touches.iter().map(|t| OscType::Int(t.session_id as i32)));
    OscMessage {
        addr: "/tuio/2Dcur".to_string(),
        args,
    }
}

fn set_message(touch: &Touch) -> OscMessage {
    OscMessage {
        addr: "/tuio/2Dcur".to_string(),
        args: vec![
            OscType::String("set".to_string()),
            OscType::Int(touch.session_id as i32),
            OscType::Float(touch.u as f32),
            OscType::Float(touch.v as f32),
            OscType::Float(touch.du as f32),
            OscType::Float(touch.dv as f32),
            OscType::Float(0.0),
        ],
    }
}

fn fseq_message(fseq: i32) -> OscMessage {
    OscMessage {
        addr: "/tuio/2Dcur".to_string(),
        args: vec![OscType::String("fseq".to_string()), OscType::Int(fseq)],
    }
}

/// Build the ordered `/tuio/2Dcur` message list for one frame that fits in a
/// single datagram: `source` (only when `include_source` is set), `alive`,
/// one `set` per confirmed touch, then `fseq`.
fn single_bundle_messages(app_name: &str, host: &str, confirmed: &[Touch], fseq: i32, include_source: bool) -> Vec<OscMessage> {
    let mut messages = Vec::new();
    if include_source {
        messages.push(source_message(app_name, host));
    }
    messages.push(alive_message(confirmed));
    messages.extend(confirmed.iter().map(set_message));
    messages.push(fseq_message(fseq));
    messages
}

fn encode_bundle(messages: Vec<OscMessage>) -> Result<Vec<u8>, CoreError> {
    let bundle = OscBundle {
        timetag: OscTime::try_from(std::time::SystemTime::now()).unwrap_or(OscTime {
            seconds: 0,
            fractional: 0,
        }),
        content: messages.into_iter().map(OscPacket::Message).collect(),
    };
    rosc::encoder::encode(&OscPacket::Bundle(bundle)).map_err(|e| CoreError::UdpSendFailure {
        host: String::new(),
        port: 0,
        reason: format!("OSC encode failed: {e:?}"),
    })
}

/// Encode one frame's touches into one or more datagrams no larger than
/// `MAX_DATAGRAM_BYTES`. If a single frame's `set` messages don't fit in one
/// datagram, the touches are split across multiple bundles: only the first
/// carries `source` (when `include_source`) and `alive`, and only the last
/// carries `fseq`; every bundle carries its own share of `set` messages.
pub fn build_datagrams(
    app_name: &str,
    host: &str,
    touches: &[Touch],
    fseq: i32,
    include_source: bool,
) -> Result<Vec<Vec<u8>>, CoreError> {
    let confirmed: Vec<Touch> = touches.iter().filter(|t| t.confirmed).cloned().collect();

    let whole = single_bundle_messages(app_name, host, &confirmed, fseq, include_source);
    let encoded = encode_bundle(whole)?;
    if encoded.len() <= MAX_DATAGRAM_BYTES || confirmed.is_empty() {
        return Ok(vec![encoded]);
    }

    warn!(
        "tuio frame for fseq {} exceeds {} bytes, splitting across datagrams",
        fseq, MAX_DATAGRAM_BYTES
    );

    let mut chunks: Vec<Vec<Touch>> = vec![Vec::new()];
    for touch in confirmed.iter().cloned() {
        let is_first = chunks.len() == 1;
        let current = chunks.last_mut().unwrap();
        current.push(touch);

        let mut trial = Vec::new();
        if is_first {
            if include_source {
                trial.push(source_message(app_name, host));
            }
            trial.push(alive_message(&confirmed));
        }
        trial.extend(current.iter().map(set_message));

        if encode_bundle(trial)?.len() > MAX_DATAGRAM_BYTES && current.len() > 1 {
            let overflow = current.pop().unwrap();
            chunks.push(vec![overflow]);
        }
    }

    let last_index = chunks.len() - 1;
    let mut datagrams = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut messages = Vec::new();
        if i == 0 {
            if include_source {
                messages.push(source_message(app_name, host));
            }
            messages.push(alive_message(&confirmed));
        }
        messages.extend(chunk.iter().map(set_message));
        if i == last_index {
            messages.push(fseq_message(fseq));
        }
        datagrams.push(encode_bundle(messages)?);
    }
    Ok(datagrams)
}

/// Emit one frame of touches to `sink`. `include_source` should be true on
/// the very first bundle sent to an endpoint and whenever the alive set of
/// session ids has changed since the last bundle sent to it; the caller
/// owns that comparison since it is the one holding per-endpoint state.
pub fn emit_frame(
    sink: &mut dyn TuioSink,
    app_name: &str,
    host: &str,
    touches: &[Touch],
    fseq: i32,
    include_source: bool,
) -> Result<(), CoreError> {
    for datagram in build_datagrams(app_name, host, touches, fseq, include_source)? {
        if let Err(e) = sink.send(&datagram) {
            error!("tuio send failed: {e}");
            return Err(e);
        }
    }
    Ok(())
}

/// Emit a heartbeat frame: `source` (when `include_source`), `alive`, and
/// `fseq` with the currently alive touches but no `set` messages, sent once
/// per `heartbeat_interval_ms` even when nothing changed.
pub fn emit_heartbeat(
    sink: &mut dyn TuioSink,
    app_name: &str,
    host: &str,
    touches: &[Touch],
    fseq: i32,
    include_source: bool,
) -> Result<(), CoreError> {
    let confirmed: Vec<Touch> = touches.iter().filter(|t| t.confirmed).cloned().collect();
    let mut messages = Vec::new();
    if include_source {
        messages.push(source_message(app_name, host));
    }
    messages.push(alive_message(&confirmed));
    messages.push(fseq_message(fseq));
    let encoded = encode_bundle(messages)?;
    sink.send(&encoded)
}

/// Compute whether `source` must be (re-)sent: the alive set of session ids
/// has changed since `last_alive`, or this is the first bundle sent at all.
pub fn alive_set_changed(last_alive: &Option<std::collections::HashSet<u32>>, touches: &[Touch]) -> bool {
    let current: std::collections::HashSet<u32> = touches
        .iter()
        .filter(|t| t.confirmed)
        .map(|t| t.session_id)
        .collect();
    match last_alive {
        Some(previous) => *previous != current,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(session_id: u32, confirmed: bool) -> Touch {
        Touch {
            session_id,
            screen_id: 0,
            u: 0.5,
            v: 0.5,
            last_update_ns: 0,
            age: 3,
            missed: 0,
            du: 0.0,
            dv: 0.0,
            confirmed,
        }
    }

    #[test]
    fn unconfirmed_touches_are_excluded_from_the_frame() {
        let touches = vec![touch(0, false), touch(1, true)];
        let mut sink = TestTuioSink::default();
        emit_frame(&mut sink, "test", "127.0.0.1", &touches, 1, true).unwrap();
        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn empty_touch_list_still_emits_a_bundle() {
        let mut sink = TestTuioSink::default();
        emit_frame(&mut sink, "test", "127.0.0.1", &[], 1, true).unwrap();
        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn heartbeat_carries_no_set_messages() {
        let touches = vec![touch(0, true)];
        let mut sink = TestTuioSink::default();
        emit_heartbeat(&mut sink, "test", "127.0.0.1", &touches, 42, true).unwrap();
        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn source_carries_the_host_suffix() {
        let msg = source_message("lidar-touchd", "192.168.1.5");
        assert!(matches!(
            &msg.args[1],
            OscType::String(s) if s == "lidar-touchd@192.168.1.5"
        ));
    }

    #[test]
    fn source_is_omitted_when_the_alive_set_has_not_changed() {
        let touches = vec![touch(0, true)];
        let mut sink = TestTuioSink::default();
        emit_frame(&mut sink, "test", "127.0.0.1", &touches, 1, false).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&sink.sent[0]).unwrap();
        let messages = flatten(packet);
        assert!(!messages.iter().any(is_source_message));
    }

    #[test]
    fn datagrams_never_exceed_the_safe_size() {
        // 150 simultaneous cursors: enough to force the `set` messages
        // across several datagrams without the single `alive` message
        // (which cannot itself be split) outgrowing the budget.
        let touches: Vec<Touch> = (0..150).map(|i| touch(i, true)).collect();
        let datagrams = build_datagrams("test", "127.0.0.1", &touches, 1, true).unwrap();
        assert!(datagrams.len() > 1);
        for datagram in &datagrams {
            assert!(datagram.len() <= MAX_DATAGRAM_BYTES);
        }
    }

    #[test]
    fn alive_appears_only_in_the_first_datagram_and_fseq_only_in_the_last() {
        let touches: Vec<Touch> = (0..150).map(|i| touch(i, true)).collect();
        let datagrams = build_datagrams("test", "127.0.0.1", &touches, 7, true).unwrap();
        assert!(datagrams.len() > 1);
        for (i, datagram) in datagrams.iter().enumerate() {
            let (_, packet) = rosc::decoder::decode_udp(datagram).unwrap();
            let messages = flatten(packet);
            let has_alive = messages.iter().any(|m| {
                matches!(m.args.first(), Some(OscType::String(s)) if s == "alive")
            });
            let has_fseq = messages.iter().any(|m| {
                matches!(m.args.first(), Some(OscType::String(s)) if s == "fseq")
            });
            assert_eq!(has_alive, i == 0, "alive must appear only in the first datagram");
            assert_eq!(has_fseq, i == datagrams.len() - 1, "fseq must appear only in the last datagram");
        }
    }

    fn is_source_message(m: &OscMessage) -> bool {
        matches!(m.args.first(), Some(OscType::String(s)) if s == "source")
    }

    fn flatten(packet: OscPacket) -> Vec<OscMessage> {
        match packet {
            OscPacket::Message(m) => vec![m],
            OscPacket::Bundle(b) => b.content.into_iter().flat_map(flatten).collect(),
        }
    }
}
