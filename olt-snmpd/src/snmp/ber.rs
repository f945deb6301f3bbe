//! Minimal BER codec for SNMPv2c messages.
//!
//! Only what the poller needs is covered: Get/GetBulk requests out, Response
//! PDUs in. Lengths are definite; indefinite-length encodings are rejected.

use std::net::Ipv4Addr;
use super::{Oid, PolledValue, SnmpError, Varbind};

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

const PDU_GET: u8 = 0xa0;
const PDU_RESPONSE: u8 = 0xa2;
const PDU_GET_BULK: u8 = 0xa5;

/// Wire value of the version field for SNMPv2c
const VERSION_2C: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    GetBulk { non_repeaters: u32, max_repetitions: u32 },
}

#[derive(Debug)]
pub struct Response {
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<Varbind>,
}

pub fn encode_request(community: &[u8], request_id: i32, kind: RequestKind, oids: &[Oid]) -> Vec<u8> {
    let mut varbinds = Vec::new();
    for oid in oids {
        let mut vb = Vec::new();
        put_tlv(&mut vb, TAG_OID, &encode_oid(oid));
        put_tlv(&mut vb, TAG_NULL, &[]);
        put_tlv(&mut varbinds, TAG_SEQUENCE, &vb);
    }

    let (tag, second, third) = match kind {
        RequestKind::Get => (PDU_GET, 0, 0),
        RequestKind::GetBulk { non_repeaters, max_repetitions } => {
            (PDU_GET_BULK, i64::from(non_repeaters), i64::from(max_repetitions))
        }
    };

    let mut pdu = Vec::new();
    put_tlv(&mut pdu, TAG_INTEGER, &encode_integer(i64::from(request_id)));
    put_tlv(&mut pdu, TAG_INTEGER, &encode_integer(second));
    put_tlv(&mut pdu, TAG_INTEGER, &encode_integer(third));
    put_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

    let mut message = Vec::new();
    put_tlv(&mut message, TAG_INTEGER, &encode_integer(VERSION_2C));
    put_tlv(&mut message, TAG_OCTET_STRING, community);
    put_tlv(&mut message, tag, &pdu);

    let mut out = Vec::with_capacity(message.len() + 4);
    put_tlv(&mut out, TAG_SEQUENCE, &message);
    out
}

pub fn decode_response(buf: &[u8]) -> Result<Response, SnmpError> {
    let mut outer = Reader::new(buf);
    let message = outer.expect(TAG_SEQUENCE)?;

    let mut msg = Reader::new(message);
    let version = decode_integer(msg.expect(TAG_INTEGER)?)?;
    if version != VERSION_2C {
        return Err(malformed(format!("unsupported version {}", version)));
    }
    msg.expect(TAG_OCTET_STRING)?;
    let pdu = msg.expect(PDU_RESPONSE)?;

    let mut pdu = Reader::new(pdu);
    let request_id = decode_integer(pdu.expect(TAG_INTEGER)?)?;
    let request_id = i32::try_from(request_id)
        .map_err(|_| malformed(format!("request-id {} out of range", request_id)))?;
    let error_status = decode_integer(pdu.expect(TAG_INTEGER)?)?;
    let error_index = decode_integer(pdu.expect(TAG_INTEGER)?)?;

    let mut list = Reader::new(pdu.expect(TAG_SEQUENCE)?);
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut vb = Reader::new(list.expect(TAG_SEQUENCE)?);
        let oid = decode_oid(vb.expect(TAG_OID)?)?;
        let (tag, content) = vb.read_tlv()?;
        varbinds.push(Varbind {
            oid,
            value: decode_value(tag, content)?,
        });
    }

    Ok(Response {
        request_id,
        error_status,
        error_index,
        varbinds,
    })
}

fn decode_value(tag: u8, content: &[u8]) -> Result<PolledValue, SnmpError> {
    let value = match tag {
        TAG_INTEGER => PolledValue::Integer(decode_integer(content)?),
        TAG_OCTET_STRING | TAG_OPAQUE => PolledValue::Bytes(content.to_vec()),
        TAG_COUNTER32 | TAG_GAUGE32 | TAG_TIMETICKS | TAG_COUNTER64 => {
            let raw = decode_unsigned(content)?;
            PolledValue::Integer(i64::try_from(raw).unwrap_or(i64::MAX))
        }
        TAG_IP_ADDRESS => {
            let octets: [u8; 4] = content
                .try_into()
                .map_err(|_| malformed(format!("IpAddress of {} bytes", content.len())))?;
            PolledValue::Text(Ipv4Addr::from(octets).to_string())
        }
        TAG_OID => PolledValue::Text(decode_oid(content)?.to_string()),
        TAG_NULL | TAG_NO_SUCH_OBJECT | TAG_NO_SUCH_INSTANCE => PolledValue::Absent,
        TAG_END_OF_MIB_VIEW => PolledValue::EndOfMibView,
        other => return Err(malformed(format!("unsupported value tag 0x{:02x}", other))),
    };
    Ok(value)
}

fn put_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    put_length(out, content.len());
    out.extend_from_slice(content);
}

fn put_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // Drop redundant sign-extension bytes, keeping at least one
    while start < bytes.len() - 1 {
        let (cur, next) = (bytes[start], bytes[start + 1]);
        if (cur == 0x00 && next & 0x80 == 0) || (cur == 0xff && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

fn encode_oid(oid: &Oid) -> Vec<u8> {
    let arcs = oid.arcs();
    let mut out = Vec::new();
    let first = arcs[0].saturating_mul(40).saturating_add(arcs[1]);
    put_base128(&mut out, first);
    for &arc in &arcs[2..] {
        put_base128(&mut out, arc);
    }
    out
}

fn put_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    loop {
        groups[n] = (value & 0x7f) as u8;
        value >>= 7;
        n += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

fn decode_integer(content: &[u8]) -> Result<i64, SnmpError> {
    if content.is_empty() || content.len() > 8 {
        return Err(malformed(format!("INTEGER of {} bytes", content.len())));
    }
    let negative = content[0] & 0x80 != 0;
    let mut value: i64 = if negative { -1 } else { 0 };
    for &b in content {
        value = (value << 8) | i64::from(b);
    }
    Ok(value)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, SnmpError> {
    if content.is_empty() || content.len() > 9 {
        return Err(malformed(format!("unsigned of {} bytes", content.len())));
    }
    let mut value: u64 = 0;
    for &b in content {
        value = (value << 8) | u64::from(b);
    }
    Ok(value)
}

fn decode_oid(content: &[u8]) -> Result<Oid, SnmpError> {
    let mut subids = Vec::new();
    let mut current: u32 = 0;
    let mut pending = false;
    for &b in content {
        current = current
            .checked_mul(128)
            .ok_or_else(|| malformed("OID sub-identifier overflow".to_string()))?
            | u32::from(b & 0x7f);
        pending = true;
        if b & 0x80 == 0 {
            subids.push(current);
            current = 0;
            pending = false;
        }
    }
    if pending || subids.is_empty() {
        return Err(malformed("truncated OID".to_string()));
    }

    let first = subids[0];
    let (a, b) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut arcs = Vec::with_capacity(subids.len() + 1);
    arcs.push(a);
    arcs.push(b);
    arcs.extend_from_slice(&subids[1..]);
    Ok(Oid::new(arcs))
}

fn malformed(msg: String) -> SnmpError {
    SnmpError::Malformed(msg)
}

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

    fn byte(&mut self) -> Result<u8, SnmpError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| malformed("unexpected end of PDU".to_string()))?;
        self.pos += 1;
        Ok(b)
    }

    fn length(&mut self) -> Result<usize, SnmpError> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }
        let n = usize::from(first & 0x7f);
        if n == 0 || n > 4 {
            return Err(malformed(format!("unsupported length form 0x{:02x}", first)));
        }
        let mut len = 0usize;
        for _ in 0..n {
            len = (len << 8) | usize::from(self.byte()?);
        }
        Ok(len)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), SnmpError> {
        let tag = self.byte()?;
        let len = self.length()?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| malformed(format!("tag 0x{:02x} overruns buffer", tag)))?;
        let content = &self.buf[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, want: u8) -> Result<&'a [u8], SnmpError> {
        let (tag, content) = self.read_tlv()?;
        if tag != want {
            return Err(malformed(format!("expected tag 0x{:02x}, found 0x{:02x}", want, tag)));
        }
        Ok(content)
    }
}
