// MQTT 3.1.1 control packets
//
// Only what a QoS 0/1 client needs: the packets it sends are encoded, the
// packets a broker sends are decoded. Decoding is incremental so a
// WebSocket frame may carry a partial packet or several packets.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const UNSUBSCRIBE: u8 = 0xA2;
const UNSUBACK: u8 = 0xB0;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// SUBACK return code for a rejected filter.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

impl QoS {
    fn from_bits(bits: u8) -> Result<Self, Error> {
        match bits {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            other => Err(Error::MqttProtocol(format!("unsupported QoS {other}"))),
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_session: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    /// Present iff `qos` is at least once.
    pub packet_id: Option<u16>,
    pub dup: bool,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck { session_present: bool, return_code: u8 },
    Publish(Publish),
    PubAck { packet_id: u16 },
    Subscribe { packet_id: u16, filters: Vec<(String, QoS)> },
    SubAck { packet_id: u16, return_codes: Vec<u8> },
    Unsubscribe { packet_id: u16, filters: Vec<String> },
    UnsubAck { packet_id: u16 },
    PingReq,
    PingResp,
    Disconnect,
}

// ── Encoding ─────────────────────────────────────────────────────────

impl Packet {
    /// Append the wire form of this packet to `out`.
    pub fn encode(&self, out: &mut BytesMut) -> Result<(), Error> {
        let mut body = BytesMut::new();
        let header = match self {
            Self::Connect(c) => {
                put_bytes(&mut body, PROTOCOL_NAME)?;
                body.put_u8(PROTOCOL_LEVEL);
                body.put_u8(if c.clean_session { 0x02 } else { 0x00 });
                body.put_u16(c.keep_alive);
                put_str(&mut body, &c.client_id)?;
                CONNECT
            }
            Self::ConnAck {
                session_present,
                return_code,
            } => {
                body.put_u8(u8::from(*session_present));
                body.put_u8(*return_code);
                CONNACK
            }
            Self::Publish(p) => {
                put_str(&mut body, &p.topic)?;
                match (p.qos, p.packet_id) {
                    (QoS::AtMostOnce, _) => {}
                    (QoS::AtLeastOnce, Some(id)) => body.put_u16(id),
                    (QoS::AtLeastOnce, None) => {
                        return Err(Error::MqttProtocol(
                            "QoS 1 publish without packet id".into(),
                        ));
                    }
                }
                body.put_slice(&p.payload);
                PUBLISH
                    | (u8::from(p.dup) << 3)
                    | (p.qos.bits() << 1)
                    | u8::from(p.retain)
            }
            Self::PubAck { packet_id } => {
                body.put_u16(*packet_id);
                PUBACK
            }
            Self::Subscribe { packet_id, filters } => {
                body.put_u16(*packet_id);
                for (filter, qos) in filters {
                    put_str(&mut body, filter)?;
                    body.put_u8(qos.bits());
                }
                SUBSCRIBE
            }
            Self::SubAck {
                packet_id,
                return_codes,
            } => {
                body.put_u16(*packet_id);
                body.put_slice(return_codes);
                SUBACK
            }
            Self::Unsubscribe { packet_id, filters } => {
                body.put_u16(*packet_id);
                for filter in filters {
                    put_str(&mut body, filter)?;
                }
                UNSUBSCRIBE
            }
            Self::UnsubAck { packet_id } => {
                body.put_u16(*packet_id);
                UNSUBACK
            }
            Self::PingReq => PINGREQ,
            Self::PingResp => PINGRESP,
            Self::Disconnect => DISCONNECT,
        };

        out.put_u8(header);
        encode_remaining_length(out, body.len())?;
        out.put_slice(&body);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut out = BytesMut::new();
        self.encode(&mut out)?;
        Ok(out.freeze())
    }
}

fn put_bytes(out: &mut BytesMut, bytes: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(bytes.len())
        .map_err(|_| Error::MqttProtocol(format!("field too long ({} bytes)", bytes.len())))?;
    out.put_u16(len);
    out.put_slice(bytes);
    Ok(())
}

fn put_str(out: &mut BytesMut, s: &str) -> Result<(), Error> {
    put_bytes(out, s.as_bytes())
}

fn encode_remaining_length(out: &mut BytesMut, mut len: usize) -> Result<(), Error> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::MqttProtocol(format!("packet too large ({len} bytes)")));
    }
    loop {
        #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.put_u8(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Read the remaining-length varint starting at `buf[1]`.
///
/// Returns `(length, header_size)` or `None` when more bytes are needed.
fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, Error> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, byte) in buf.iter().skip(1).take(4).enumerate() {
        value += usize::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 2)));
        }
        multiplier *= 128;
    }
    if buf.len() >= 5 {
        return Err(Error::MqttProtocol("malformed remaining length".into()));
    }
    Ok(None)
}

/// Take one complete packet off the front of `buf`.
///
/// Returns `Ok(None)` and leaves `buf` untouched when it holds only part of
/// a packet.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Packet>, Error> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let Some((remaining, header_len)) = decode_remaining_length(buf)? else {
        return Ok(None);
    };
    if buf.len() < header_len + remaining {
        return Ok(None);
    }

    buf.advance(header_len);
    let mut body = buf.split_to(remaining).freeze();

    let packet = match first & 0xF0 {
        CONNACK => {
            need(&body, 2, "CONNACK")?;
            let flags = body.get_u8();
            Packet::ConnAck {
                session_present: flags & 0x01 != 0,
                return_code: body.get_u8(),
            }
        }
        PUBLISH => {
            let qos = QoS::from_bits((first >> 1) & 0x03)?;
            let topic = get_str(&mut body)?;
            let packet_id = match qos {
                QoS::AtMostOnce => None,
                QoS::AtLeastOnce => {
                    need(&body, 2, "PUBLISH")?;
                    Some(body.get_u16())
                }
            };
            Packet::Publish(Publish {
                topic,
                payload: body,
                qos,
                packet_id,
                dup: first & 0x08 != 0,
                retain: first & 0x01 != 0,
            })
        }
        PUBACK => {
            need(&body, 2, "PUBACK")?;
            Packet::PubAck {
                packet_id: body.get_u16(),
            }
        }
        SUBACK => {
            need(&body, 3, "SUBACK")?;
            let packet_id = body.get_u16();
            Packet::SubAck {
                packet_id,
                return_codes: body.to_vec(),
            }
        }
        UNSUBACK => {
            need(&body, 2, "UNSUBACK")?;
            Packet::UnsubAck {
                packet_id: body.get_u16(),
            }
        }
        PINGREQ => Packet::PingReq,
        PINGRESP => Packet::PingResp,
        DISCONNECT => Packet::Disconnect,
        other => {
            return Err(Error::MqttProtocol(format!(
                "unexpected packet type 0x{other:02X} from broker"
            )));
        }
    };
    Ok(Some(packet))
}

fn need(body: &Bytes, n: usize, what: &str) -> Result<(), Error> {
    if body.remaining() < n {
        return Err(Error::MqttProtocol(format!("truncated {what} packet")));
    }
    Ok(())
}

fn get_str(body: &mut Bytes) -> Result<String, Error> {
    need(body, 2, "string")?;
    let len = usize::from(body.get_u16());
    need(body, len, "string")?;
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| Error::MqttProtocol(format!("topic is not UTF-8: {e}")))
}

// ── Topic filters ────────────────────────────────────────────────────

/// Whether `topic` matches the subscription `filter` (`+` and `#` wildcards).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
