//! The DMAP tagged-binary value codec: encode/decode between a tree of
//! [`Node`]s and the wire format every DACP/DAAP response (and the
//! handful of request bodies that carry one) uses.
//!
//! Wire shape for one node: a 4-byte [`Tag`], a big-endian `u32` length,
//! then that many bytes of body (see spec.md §3, grounded on
//! `dacp/values.py`'s `build_node` in `original_source/`).

use std::fmt;

use thiserror::Error;

use crate::tags::{Tag, ValueKind, kind_of};

/// Sentinel `dmap.utctime` uses for "unset": signed 32-bit `0xFFFF9D90`
/// (`-25200`, incidentally the Pacific offset in seconds), per
/// `dacp/values.py`'s `DateTimeValue`.
pub const DATETIME_SENTINEL_NONE: i32 = 0xFFFF9D90_u32 as i32;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UByte(u8),
    Byte(i8),
    UShort(u16),
    Short(i16),
    UInt(u32),
    Int(i32),
    ULong(u64),
    Long(i64),
    /// Several big-endian `i32`s packed end to end, e.g. `dacp.nowplaying`.
    MultiInt(Vec<i32>),
    MultiUInt(Vec<u32>),
    /// Signed seconds since the Unix epoch, or `None` for the wire
    /// sentinel [`DATETIME_SENTINEL_NONE`].
    Datetime(Option<i32>),
    /// A 4-tuple `(a, b, c, d)`, serialized byte-swapped within each
    /// 16-bit half as `b, a, d, c` (`dacp/constants.py`'s protocol
    /// version tuples, e.g. `(3, 10, 0, 0)`).
    Version(u8, u8, u8, u8),
    String(String),
    Binary(Vec<u8>),
    Container(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tag: Tag,
    pub value: Value,
}

impl Node {
    pub fn new(tag: Tag, value: Value) -> Node {
        Node { tag, value }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated node header at offset {offset}")]
    TruncatedHeader { offset: usize },
    #[error("node at offset {offset} claims length {claimed} but only {available} bytes remain")]
    TruncatedBody {
        offset: usize,
        claimed: usize,
        available: usize,
    },
    #[error("tag {tag} expects a {expected:?}-shaped value but body is {len} bytes")]
    InvalidValue {
        tag: Tag,
        expected: ValueKind,
        len: usize,
    },
    #[error("string body for tag {tag} is not valid UTF-8")]
    InvalidUtf8 { tag: Tag },

    #[error("no registry entry for tag {tag}")]
    UnknownTag { tag: Tag },
}

/// One entry of a [`build_tree`] spec: a scalar value, a list of child
/// specs (for a container tag), or a closure evaluated at build time --
/// for tags like `mstc` whose value is only meaningful "now".
pub enum NodeSpec {
    Scalar(Value),
    List(Vec<(Tag, NodeSpec)>),
    Lazy(Box<dyn FnOnce() -> Value>),
}

impl From<Value> for NodeSpec {
    fn from(v: Value) -> Self {
        NodeSpec::Scalar(v)
    }
}

/// Materialize a nested `(tag, value_or_list_or_callable)` spec into a
/// tree of [`Node`]s, per spec.md §4.B's `build_tree`.
///
/// A container tag whose spec entry is a [`NodeSpec::List`] recurses into
/// its children; one whose entry is a bare [`NodeSpec::Scalar`] string is
/// stored as a flat string payload rather than an empty child list.
pub fn build_tree(spec: Vec<(Tag, NodeSpec)>) -> Result<Vec<Node>, CodecError> {
    spec.into_iter().map(|(tag, entry)| build_one(tag, entry)).collect()
}

fn build_one(tag: Tag, entry: NodeSpec) -> Result<Node, CodecError> {
    if kind_of(tag) == ValueKind::Binary && !crate::tags::tag_info().contains_key(&tag) {
        return Err(CodecError::UnknownTag { tag });
    }
    let value = match entry {
        NodeSpec::Scalar(v) => v,
        NodeSpec::Lazy(f) => f(),
        NodeSpec::List(children) => {
            let built = children
                .into_iter()
                .map(|(t, e)| build_one(t, e))
                .collect::<Result<Vec<_>, _>>()?;
            Value::Container(built)
        }
    };
    Ok(Node::new(tag, value))
}

/// Encode a tree of nodes depth-first, exactly mirroring `build_node`'s
/// recursive structure in the original source.
pub fn encode(nodes: &[Node]) -> Vec<u8> {
    let mut out = Vec::new();
    for node in nodes {
        encode_node(node, &mut out);
    }
    out
}

fn encode_node(node: &Node, out: &mut Vec<u8>) {
    let body = encode_value(&node.value);
    out.extend_from_slice(&node.tag.0);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
}

fn encode_value(value: &Value) -> Vec<u8> {
    match value {
        Value::UByte(v) => vec![*v],
        Value::Byte(v) => vec![*v as u8],
        Value::UShort(v) => v.to_be_bytes().to_vec(),
        Value::Short(v) => v.to_be_bytes().to_vec(),
        Value::UInt(v) => v.to_be_bytes().to_vec(),
        Value::Int(v) => v.to_be_bytes().to_vec(),
        Value::ULong(v) => v.to_be_bytes().to_vec(),
        Value::Long(v) => v.to_be_bytes().to_vec(),
        Value::MultiInt(vs) => vs.iter().flat_map(|v| v.to_be_bytes()).collect(),
        Value::MultiUInt(vs) => vs.iter().flat_map(|v| v.to_be_bytes()).collect(),
        Value::Datetime(None) => DATETIME_SENTINEL_NONE.to_be_bytes().to_vec(),
        Value::Datetime(Some(unix_secs)) => unix_secs.to_be_bytes().to_vec(),
        Value::Version(a, b, c, d) => vec![*b, *a, *d, *c],
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Binary(b) => b.clone(),
        Value::Container(children) => encode(children),
    }
}

/// Decode a flat sequence of sibling nodes from `buf`.
pub fn decode(buf: &[u8]) -> Result<Vec<Node>, CodecError> {
    let mut nodes = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let (node, consumed) = decode_one(buf, offset)?;
        nodes.push(node);
        offset += consumed;
    }
    Ok(nodes)
}

fn decode_one(buf: &[u8], offset: usize) -> Result<(Node, usize), CodecError> {
    if buf.len() < offset + 8 {
        return Err(CodecError::TruncatedHeader { offset });
    }
    let tag = Tag([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]);
    let len = u32::from_be_bytes([
        buf[offset + 4],
        buf[offset + 5],
        buf[offset + 6],
        buf[offset + 7],
    ]) as usize;
    let body_start = offset + 8;
    let body_end = body_start
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or(CodecError::TruncatedBody {
            offset,
            claimed: len,
            available: buf.len().saturating_sub(body_start),
        })?;
    let body = &buf[body_start..body_end];
    let value = decode_value(tag, body)?;
    Ok((Node { tag, value }, body_end - offset))
}

fn decode_value(tag: Tag, body: &[u8]) -> Result<Value, CodecError> {
    let kind = kind_of(tag);
    let bad = || CodecError::InvalidValue {
        tag,
        expected: kind,
        len: body.len(),
    };
    Ok(match kind {
        ValueKind::UByte => Value::UByte(*body.first().ok_or_else(bad)?),
        ValueKind::Byte => Value::Byte(*body.first().ok_or_else(bad)? as i8),
        ValueKind::UShort => Value::UShort(u16::from_be_bytes(body.try_into().map_err(|_| bad())?)),
        ValueKind::Short => Value::Short(i16::from_be_bytes(body.try_into().map_err(|_| bad())?)),
        ValueKind::UInt => Value::UInt(u32::from_be_bytes(body.try_into().map_err(|_| bad())?)),
        ValueKind::Int => Value::Int(i32::from_be_bytes(body.try_into().map_err(|_| bad())?)),
        ValueKind::ULong => Value::ULong(u64::from_be_bytes(body.try_into().map_err(|_| bad())?)),
        ValueKind::Long => Value::Long(i64::from_be_bytes(body.try_into().map_err(|_| bad())?)),
        ValueKind::MultiInt => {
            if body.len() % 4 != 0 {
                return Err(bad());
            }
            Value::MultiInt(body.chunks_exact(4).map(|c| i32::from_be_bytes(c.try_into().unwrap())).collect())
        }
        ValueKind::MultiUInt => {
            if body.len() % 4 != 0 {
                return Err(bad());
            }
            Value::MultiUInt(body.chunks_exact(4).map(|c| u32::from_be_bytes(c.try_into().unwrap())).collect())
        }
        ValueKind::Datetime => {
            let raw = i32::from_be_bytes(body.try_into().map_err(|_| bad())?);
            if raw == DATETIME_SENTINEL_NONE {
                Value::Datetime(None)
            } else {
                Value::Datetime(Some(raw))
            }
        }
        ValueKind::Version => {
            if body.len() != 4 {
                return Err(bad());
            }
            // wire order is b, a, d, c -- undo the swap within each half.
            Value::Version(body[1], body[0], body[3], body[2])
        }
        ValueKind::String => {
            Value::String(String::from_utf8(body.to_vec()).map_err(|_| CodecError::InvalidUtf8 { tag })?)
        }
        ValueKind::Binary => Value::Binary(body.to_vec()),
        ValueKind::Container => {
            // A container tag can legally carry a flat string instead of
            // children -- DAAP uses this for things like `abar`'s per-artist
            // `mlit` entries, which hold a plain name rather than a node
            // list. Fall back to treating the body as a string whenever it
            // doesn't parse as nested nodes.
            match decode(body) {
                Ok(children) if consumed_all(body, &children) => Value::Container(children),
                _ => match String::from_utf8(body.to_vec()) {
                    Ok(s) => Value::String(s),
                    Err(_) => Value::Binary(body.to_vec()),
                },
            }
        }
    })
}

fn consumed_all(body: &[u8], children: &[Node]) -> bool {
    encode(children).len() == body.len()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UByte(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::UShort(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::ULong(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::MultiInt(vs) => write!(f, "{vs:?}"),
            Value::MultiUInt(vs) => write!(f, "{vs:?}"),
            Value::Datetime(v) => write!(f, "{v:?}"),
            Value::Version(a, b, c, d) => write!(f, "{a}.{b}.{c}.{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Container(c) => write!(f, "<{} children>", c.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::Tag as T;
    use pretty_assertions::assert_eq;

    #[test]
    fn uint_round_trips() {
        let nodes = vec![Node::new(T::new("mstt"), Value::UInt(200))];
        let wire = encode(&nodes);
        assert_eq!(wire.len(), 8 + 4);
        assert_eq!(decode(&wire).unwrap(), nodes);
    }

    #[test]
    fn container_round_trips() {
        let inner = vec![Node::new(T::new("miid"), Value::UInt(7))];
        let nodes = vec![Node::new(T::new("mlit"), Value::Container(inner.clone()))];
        let wire = encode(&nodes);
        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded, nodes);
    }

    #[test]
    fn datetime_sentinel_decodes_to_none() {
        let nodes = vec![Node::new(T::new("mstc"), Value::Datetime(None))];
        let wire = encode(&nodes);
        assert_eq!(decode(&wire).unwrap(), nodes);
    }

    #[test]
    fn datetime_nonzero_round_trips() {
        let nodes = vec![Node::new(T::new("mstc"), Value::Datetime(Some(1_700_000_000)))];
        let wire = encode(&nodes);
        match &decode(&wire).unwrap()[0].value {
            Value::Datetime(Some(secs)) => assert_eq!(*secs, 1_700_000_000),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn version_bytes_are_swapped_within_each_half() {
        let nodes = vec![Node::new(T::new("mpro"), Value::Version(3, 10, 0, 0))];
        let wire = encode(&nodes);
        // body starts after 8-byte header: (a,b,c,d) -> (b,a,d,c)
        assert_eq!(&wire[8..12], &[10, 3, 0, 0]);
        assert_eq!(decode(&wire).unwrap(), nodes);
    }

    #[test]
    fn container_falls_back_to_string_for_scalar_payload() {
        let nodes = vec![Node::new(T::new("mlit"), Value::String("Radiohead".into()))];
        let wire = encode(&nodes);
        assert_eq!(decode(&wire).unwrap(), nodes);
    }

    #[test]
    fn build_tree_treats_scalar_container_value_as_string() {
        let spec = vec![(
            T::new("mlit"),
            NodeSpec::Scalar(Value::String("Radiohead".into())),
        )];
        let nodes = build_tree(spec).unwrap();
        assert_eq!(nodes[0].value, Value::String("Radiohead".into()));
    }

    #[test]
    fn build_tree_rejects_unknown_tag() {
        let spec = vec![(T::new("zzzz"), NodeSpec::Scalar(Value::UByte(1)))];
        assert!(matches!(build_tree(spec), Err(CodecError::UnknownTag { .. })));
    }

    #[test]
    fn scenario_node_round_trip() {
        let nodes = vec![Node::new(T::new("msup"), Value::UByte(255))];
        let wire = encode(&nodes);
        assert_eq!(wire, b"msup\x00\x00\x00\x01\xff");
        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded[0].tag, T::new("msup"));
        assert_eq!(decoded[0].value, Value::UByte(255));
    }

    #[test]
    fn scenario_datetime_sentinel_bytes() {
        let nodes = vec![Node::new(T::new("mstc"), Value::Datetime(None))];
        let wire = encode(&nodes);
        assert_eq!(&wire[8..], b"\xff\xff\x9d\x90");
    }

    #[test]
    fn scenario_version_byte_swap() {
        let nodes = vec![Node::new(T::new("mpro"), Value::Version(3, 0, 1, 0))];
        let wire = encode(&nodes);
        assert_eq!(&wire[8..], b"\x00\x03\x00\x01");
        assert_eq!(decode(&wire).unwrap(), nodes);
    }

    #[test]
    fn multi_uint_round_trips() {
        let nodes = vec![Node::new(T::new("canp"), Value::MultiUInt(vec![1, 2, 3, 4]))];
        let wire = encode(&nodes);
        assert_eq!(decode(&wire).unwrap(), nodes);
    }
}
