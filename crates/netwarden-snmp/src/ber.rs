//! Minimal BER codec for SNMPv2c `GetRequest` / `Response` messages.
//!
//! Only definite lengths are supported, which is all an SNMP agent
//! ever sends.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::client::RawValue;

pub const VERSION_2C: i64 = 1;

pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_ID: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;
    pub const IP_ADDRESS: u8 = 0x40;
    pub const COUNTER32: u8 = 0x41;
    pub const GAUGE32: u8 = 0x42;
    pub const TIMETICKS: u8 = 0x43;
    pub const COUNTER64: u8 = 0x46;
    pub const NO_SUCH_OBJECT: u8 = 0x80;
    pub const NO_SUCH_INSTANCE: u8 = 0x81;
    pub const END_OF_MIB_VIEW: u8 = 0x82;
    pub const GET_REQUEST: u8 = 0xA0;
    pub const RESPONSE: u8 = 0xA2;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BerError {
    #[error("invalid object identifier: {0}")]
    InvalidOid(String),

    #[error("truncated message")]
    Truncated,

    #[error("unexpected tag 0x{found:02x} (expected 0x{expected:02x})")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("unsupported length encoding")]
    Length,

    #[error("integer out of range")]
    IntegerRange,

    #[error("unsupported value tag 0x{0:02x}")]
    UnsupportedValue(u8),
}

/// Value slot of a response varbind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Value(RawValue),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

/// Decoded response PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub community: String,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(String, VarValue)>,
}

// ── Encoding ───────────────────────────────────────────────────────

/// Parse a dotted OID (`1.3.6.1.2.1.1.1.0`, leading dot allowed).
pub fn parse_oid(oid: &str) -> Result<Vec<u32>, BerError> {
    let invalid = || BerError::InvalidOid(oid.to_string());
    let arcs = oid
        .trim()
        .trim_start_matches('.')
        .split('.')
        .map(|arc| arc.parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    match arcs.as_slice() {
        [first, second, ..] if *first <= 2 && (*first == 2 || *second < 40) => Ok(arcs),
        _ => Err(invalid()),
    }
}

pub fn encode_get_request(community: &str, request_id: i32, oid: &[u32]) -> Vec<u8> {
    let mut varbind = Vec::new();
    push_tlv(&mut varbind, tag::OBJECT_ID, &encode_oid(oid));
    push_tlv(&mut varbind, tag::NULL, &[]);

    let mut pdu = Vec::new();
    push_tlv(&mut pdu, tag::INTEGER, &encode_integer(i64::from(request_id)));
    push_tlv(&mut pdu, tag::INTEGER, &encode_integer(0));
    push_tlv(&mut pdu, tag::INTEGER, &encode_integer(0));
    push_tlv(&mut pdu, tag::SEQUENCE, &wrap(tag::SEQUENCE, &varbind));

    let mut message = Vec::new();
    push_tlv(&mut message, tag::INTEGER, &encode_integer(VERSION_2C));
    push_tlv(&mut message, tag::OCTET_STRING, community.as_bytes());
    push_tlv(&mut message, tag::GET_REQUEST, &pdu);
    wrap(tag::SEQUENCE, &message)
}

pub(crate) fn wrap(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    push_tlv(&mut out, tag, content);
    out
}

pub(crate) fn push_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    push_length(out, content.len());
    out.extend_from_slice(content);
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

/// Minimal two's-complement encoding.
pub(crate) fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        let redundant = (b == 0x00 && next & 0x80 == 0) || (b == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Unsigned encoding with a leading zero octet when the high bit is set.
pub(crate) fn encode_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(bytes.len() - 1);
    let mut out = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

pub(crate) fn encode_oid(arcs: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    let (first, rest) = match arcs {
        [a, b, rest @ ..] => (u64::from(*a) * 40 + u64::from(*b), rest),
        [a] => (u64::from(*a) * 40, &[][..]),
        [] => return out,
    };
    push_base128(&mut out, first);
    for arc in rest {
        push_base128(&mut out, u64::from(*arc));
    }
    out
}

fn push_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    loop {
        groups[n] = (value & 0x7F) as u8;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

// ── Decoding ───────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, BerError> {
        let b = *self.buf.get(self.pos).ok_or(BerError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn length(&mut self) -> Result<usize, BerError> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }
        let count = usize::from(first & 0x7F);
        if count == 0 || count > 4 {
            return Err(BerError::Length);
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | usize::from(self.byte()?);
        }
        Ok(len)
    }

    fn tlv(&mut self) -> Result<(u8, &'a [u8]), BerError> {
        let tag = self.byte()?;
        let len = self.length()?;
        let end = self.pos.checked_add(len).ok_or(BerError::Truncated)?;
        let content = self.buf.get(self.pos..end).ok_or(BerError::Truncated)?;
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], BerError> {
        let (found, content) = self.tlv()?;
        if found != expected {
            return Err(BerError::UnexpectedTag { expected, found });
        }
        Ok(content)
    }
}

fn decode_integer(content: &[u8]) -> Result<i64, BerError> {
    if content.is_empty() || content.len() > 8 {
        return Err(BerError::IntegerRange);
    }
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for b in content {
        value = (value << 8) | i64::from(*b);
    }
    Ok(value)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, BerError> {
    let skip = content.iter().take_while(|b| **b == 0).count();
    let significant = &content[skip..];
    if content.is_empty() || significant.len() > 8 {
        return Err(BerError::IntegerRange);
    }
    Ok(significant
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn decode_oid(content: &[u8]) -> Result<String, BerError> {
    let mut arcs: Vec<u64> = Vec::new();
    let mut value: u64 = 0;
    for (i, b) in content.iter().enumerate() {
        value = (value << 7) | u64::from(b & 0x7F);
        if b & 0x80 != 0 {
            if i == content.len() - 1 {
                return Err(BerError::Truncated);
            }
            continue;
        }
        if arcs.is_empty() {
            let (first, second) = match value {
                0..=39 => (0, value),
                40..=79 => (1, value - 40),
                _ => (2, value - 80),
            };
            arcs.push(first);
            arcs.push(second);
        } else {
            arcs.push(value);
        }
        value = 0;
    }
    if arcs.is_empty() {
        return Err(BerError::Truncated);
    }
    Ok(arcs
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("."))
}

fn decode_value(tag: u8, content: &[u8]) -> Result<VarValue, BerError> {
    let value = match tag {
        tag::INTEGER => RawValue::Integer(decode_integer(content)?),
        tag::OCTET_STRING => RawValue::Text(String::from_utf8_lossy(content).into_owned()),
        tag::OBJECT_ID => RawValue::ObjectId(decode_oid(content)?),
        tag::IP_ADDRESS => {
            let octets: [u8; 4] = content.try_into().map_err(|_| BerError::Truncated)?;
            RawValue::IpAddress(Ipv4Addr::from(octets))
        }
        tag::COUNTER32 | tag::GAUGE32 | tag::TIMETICKS | tag::COUNTER64 => {
            RawValue::Unsigned(decode_unsigned(content)?)
        }
        tag::NULL => return Ok(VarValue::Null),
        tag::NO_SUCH_OBJECT => return Ok(VarValue::NoSuchObject),
        tag::NO_SUCH_INSTANCE => return Ok(VarValue::NoSuchInstance),
        tag::END_OF_MIB_VIEW => return Ok(VarValue::EndOfMibView),
        other => return Err(BerError::UnsupportedValue(other)),
    };
    Ok(VarValue::Value(value))
}

pub fn decode_response(buf: &[u8]) -> Result<Response, BerError> {
    decode_pdu(buf, tag::RESPONSE)
}

/// Decode a message whose PDU carries `pdu_tag`.
pub(crate) fn decode_pdu(buf: &[u8], pdu_tag: u8) -> Result<Response, BerError> {
    let mut message = Reader::new(Reader::new(buf).expect(tag::SEQUENCE)?);
    let _version = decode_integer(message.expect(tag::INTEGER)?)?;
    let community = String::from_utf8_lossy(message.expect(tag::OCTET_STRING)?).into_owned();

    let mut pdu = Reader::new(message.expect(pdu_tag)?);
    let request_id = decode_integer(pdu.expect(tag::INTEGER)?)?;
    let request_id = i32::try_from(request_id).map_err(|_| BerError::IntegerRange)?;
    let error_status = decode_integer(pdu.expect(tag::INTEGER)?)?;
    let error_index = decode_integer(pdu.expect(tag::INTEGER)?)?;

    let mut list = Reader::new(pdu.expect(tag::SEQUENCE)?);
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut varbind = Reader::new(list.expect(tag::SEQUENCE)?);
        let oid = decode_oid(varbind.expect(tag::OBJECT_ID)?)?;
        let (value_tag, content) = varbind.tlv()?;
        varbinds.push((oid, decode_value(value_tag, content)?));
    }

    Ok(Response {
        community,
        request_id,
        error_status,
        error_index,
        varbinds,
    })
}

/// RFC 3416 error-status names.
pub fn error_status_name(status: i64) -> &'static str {
    match status {
        0 => "noError",
        1 => "tooBig",
        2 => "noSuchName",
        3 => "badValue",
        4 => "readOnly",
        5 => "genErr",
        6 => "noAccess",
        16 => "authorizationError",
        _ => "unknownError",
    }
}

/// Build a response message; used by tests to stand in for an agent.
#[cfg(test)]
pub(crate) fn encode_response(
    community: &str,
    request_id: i32,
    error_status: i64,
    oid: &[u32],
    value_tag: u8,
    value: &[u8],
) -> Vec<u8> {
    let mut varbind = Vec::new();
    push_tlv(&mut varbind, tag::OBJECT_ID, &encode_oid(oid));
    push_tlv(&mut varbind, value_tag, value);

    let mut pdu = Vec::new();
    push_tlv(&mut pdu, tag::INTEGER, &encode_integer(i64::from(request_id)));
    push_tlv(&mut pdu, tag::INTEGER, &encode_integer(error_status));
    push_tlv(&mut pdu, tag::INTEGER, &encode_integer(0));
    push_tlv(&mut pdu, tag::SEQUENCE, &wrap(tag::SEQUENCE, &varbind));

    let mut message = Vec::new();
    push_tlv(&mut message, tag::INTEGER, &encode_integer(VERSION_2C));
    push_tlv(&mut message, tag::OCTET_STRING, community.as_bytes());
    push_tlv(&mut message, tag::RESPONSE, &pdu);
    wrap(tag::SEQUENCE, &message)
}
