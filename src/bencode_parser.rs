use std::collections::BTreeMap;
use std::str;

use thiserror::Error;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    ByteString(Vec<u8>),
    List(Vec<BencodeValue>),
    Dictionary(BTreeMap<Vec<u8>, BencodeValue>),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BencodeError {
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Unexpected byte {0:#04x}")]
    UnexpectedByte(u8),

    #[error("Invalid integer: {0}")]
    InvalidInteger(String),

    #[error("Invalid byte string length prefix")]
    InvalidLength,

    #[error("Byte string of length {0} exceeds remaining input")]
    LengthOverflow(usize),

    #[error("Dictionary key must be a byte string")]
    NonStringKey,

    #[error("Nesting deeper than 64 levels")]
    TooDeep,
}

impl BencodeValue {
    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::ByteString(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(list) => Some(list),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a dictionary.
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict().and_then(|dict| dict.get(key))
    }
}

impl From<&str> for BencodeValue {
    fn from(s: &str) -> Self {
        BencodeValue::ByteString(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for BencodeValue {
    fn from(bytes: Vec<u8>) -> Self {
        BencodeValue::ByteString(bytes)
    }
}

impl From<i64> for BencodeValue {
    fn from(i: i64) -> Self {
        BencodeValue::Integer(i)
    }
}

/// Decodes the first value in `data`. Bytes after it are ignored.
pub fn decode(data: &[u8]) -> Result<BencodeValue, BencodeError> {
    parse_bencode(data).map(|(value, _)| value)
}

/// Parses one value and returns it with the unconsumed remainder of `data`.
pub fn parse_bencode(data: &[u8]) -> Result<(BencodeValue, &[u8]), BencodeError> {
    parse_value(data, 0)
}

fn parse_value(data: &[u8], depth: usize) -> Result<(BencodeValue, &[u8]), BencodeError> {
    if depth > MAX_DEPTH {
        return Err(BencodeError::TooDeep);
    }
    let first = *data.first().ok_or(BencodeError::UnexpectedEof)?;

    match first {
        b'i' => parse_integer(data),
        b'0'..=b'9' => {
            let (bytes, rest) = parse_byte_string(data)?;
            Ok((BencodeValue::ByteString(bytes), rest))
        }
        b'l' => {
            let mut list = Vec::new();
            let mut rest = &data[1..];
            loop {
                match rest.first() {
                    None => return Err(BencodeError::UnexpectedEof),
                    Some(b'e') => break,
                    Some(_) => {
                        let (value, new_rest) = parse_value(rest, depth + 1)?;
                        list.push(value);
                        rest = new_rest;
                    }
                }
            }
            Ok((BencodeValue::List(list), &rest[1..]))
        }
        b'd' => {
            let mut dict = BTreeMap::new();
            let mut rest = &data[1..];
            loop {
                match rest.first() {
                    None => return Err(BencodeError::UnexpectedEof),
                    Some(b'e') => break,
                    Some(b'0'..=b'9') => {
                        let (key, new_rest) = parse_byte_string(rest)?;
                        let (value, new_rest) = parse_value(new_rest, depth + 1)?;
                        dict.insert(key, value);
                        rest = new_rest;
                    }
                    Some(_) => return Err(BencodeError::NonStringKey),
                }
            }
            Ok((BencodeValue::Dictionary(dict), &rest[1..]))
        }
        other => Err(BencodeError::UnexpectedByte(other)),
    }
}

fn parse_integer(data: &[u8]) -> Result<(BencodeValue, &[u8]), BencodeError> {
    let end = data
        .iter()
        .position(|&x| x == b'e')
        .ok_or(BencodeError::UnexpectedEof)?;
    let digits = str::from_utf8(&data[1..end])
        .map_err(|_| BencodeError::InvalidInteger("not ascii".to_string()))?;

    let unsigned = digits.strip_prefix('-').unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BencodeError::InvalidInteger(digits.to_string()));
    }
    if digits == "-0" || (unsigned.len() > 1 && unsigned.starts_with('0')) {
        return Err(BencodeError::InvalidInteger(digits.to_string()));
    }

    let num = digits
        .parse::<i64>()
        .map_err(|_| BencodeError::InvalidInteger(digits.to_string()))?;
    Ok((BencodeValue::Integer(num), &data[end + 1..]))
}

fn parse_byte_string(data: &[u8]) -> Result<(Vec<u8>, &[u8]), BencodeError> {
    let colon = data
        .iter()
        .position(|&x| x == b':')
        .ok_or(BencodeError::UnexpectedEof)?;
    let prefix = &data[..colon];
    if prefix.is_empty() || !prefix.iter().all(u8::is_ascii_digit) {
        return Err(BencodeError::InvalidLength);
    }
    let length = str::from_utf8(prefix)
        .map_err(|_| BencodeError::InvalidLength)?
        .parse::<usize>()
        .map_err(|_| BencodeError::InvalidLength)?;

    let body = &data[colon + 1..];
    if length > body.len() {
        return Err(BencodeError::LengthOverflow(length));
    }
    Ok((body[..length].to_vec(), &body[length..]))
}

pub fn bencode_encode(value: &BencodeValue) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &BencodeValue, out: &mut Vec<u8>) {
    match value {
        BencodeValue::Integer(i) => out.extend(format!("i{}e", i).into_bytes()),
        BencodeValue::ByteString(s) => write_byte_string(s, out),
        BencodeValue::List(l) => {
            out.push(b'l');
            for item in l {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        BencodeValue::Dictionary(d) => {
            // BTreeMap iterates in raw byte order, which is the canonical key order.
            out.push(b'd');
            for (key, item) in d {
                write_byte_string(key, out);
                encode_into(item, out);
            }
            out.push(b'e');
        }
    }
}

fn write_byte_string(s: &[u8], out: &mut Vec<u8>) {
    out.extend(format!("{}:", s.len()).into_bytes());
    out.extend_from_slice(s);
}

#[cfg(test)]
mod tests {
    use proptest::collection::{btree_map, vec};
    use proptest::prelude::*;

    use super::*;

    fn dict(entries: &[(&str, BencodeValue)]) -> BencodeValue {
        BencodeValue::Dictionary(
            entries
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_parse_integer() {
        let (parsed, rest) = parse_bencode(b"i12345e").unwrap();
        assert_eq!(parsed, BencodeValue::Integer(12345));
        assert_eq!(rest, &b""[..]);

        let (parsed, _) = parse_bencode(b"i-6789e").unwrap();
        assert_eq!(parsed, BencodeValue::Integer(-6789));

        assert_eq!(decode(b"i0e").unwrap(), BencodeValue::Integer(0));
    }

    #[test]
    fn test_parse_invalid_integers() {
        let cases: [&[u8]; 6] = [b"i03e", b"i-0e", b"ie", b"i-e", b"i1x2e", b"i12345"];
        for data in cases {
            assert!(decode(data).is_err(), "accepted {:?}", data);
        }
    }

    #[test]
    fn test_parse_byte_string() {
        let (parsed, rest) = parse_bencode(b"5:hello").unwrap();
        assert_eq!(parsed, BencodeValue::ByteString(b"hello".to_vec()));
        assert_eq!(rest, &b""[..]);

        assert_eq!(decode(b"0:").unwrap(), BencodeValue::ByteString(Vec::new()));
    }

    #[test]
    fn test_parse_byte_string_errors() {
        assert_eq!(decode(b"10:short"), Err(BencodeError::LengthOverflow(10)));
        assert_eq!(decode(b"5x:hello"), Err(BencodeError::InvalidLength));
        assert_eq!(decode(b"5"), Err(BencodeError::UnexpectedEof));
    }

    #[test]
    fn test_parse_list() {
        let (parsed, rest) = parse_bencode(b"li123e4:spam4:eggse").unwrap();
        assert_eq!(
            parsed,
            BencodeValue::List(vec![
                BencodeValue::Integer(123),
                BencodeValue::ByteString(b"spam".to_vec()),
                BencodeValue::ByteString(b"eggs".to_vec())
            ])
        );
        assert_eq!(rest, &b""[..]);
    }

    #[test]
    fn test_parse_dictionary_with_binary_key() {
        let parsed = decode(b"d3:bar4:spam2:\xff\x00i42ee").unwrap();
        assert_eq!(parsed.get(b"bar").and_then(|v| v.as_bytes()), Some(&b"spam"[..]));
        assert_eq!(parsed.get(&[0xff, 0x00]).and_then(|v| v.as_int()), Some(42));
    }

    #[test]
    fn test_unterminated_containers() {
        assert_eq!(decode(b"li1e"), Err(BencodeError::UnexpectedEof));
        assert_eq!(decode(b"d3:fooi1e"), Err(BencodeError::UnexpectedEof));
        assert_eq!(decode(b"di1ei2ee"), Err(BencodeError::NonStringKey));
        assert_eq!(decode(b""), Err(BencodeError::UnexpectedEof));
        assert_eq!(decode(b"x"), Err(BencodeError::UnexpectedByte(b'x')));
    }

    #[test]
    fn test_nesting_limit() {
        let mut data = vec![b'l'; 100];
        data.extend(vec![b'e'; 100]);
        assert_eq!(decode(&data), Err(BencodeError::TooDeep));
    }

    #[test]
    fn test_trailing_bytes_are_left_over() {
        let (parsed, rest) = parse_bencode(b"i1etrailing").unwrap();
        assert_eq!(parsed, BencodeValue::Integer(1));
        assert_eq!(rest, &b"trailing"[..]);
        assert_eq!(decode(b"i1e\n").unwrap(), BencodeValue::Integer(1));
    }

    #[test]
    fn test_bencode_encode_scalars() {
        assert_eq!(bencode_encode(&BencodeValue::Integer(-12)), b"i-12e");
        assert_eq!(bencode_encode(&"hello".into()), b"5:hello");
        assert_eq!(bencode_encode(&BencodeValue::ByteString(Vec::new())), b"0:");
    }

    #[test]
    fn test_bencode_encode_sorts_keys() {
        let mut map = BTreeMap::new();
        map.insert(b"zeta".to_vec(), BencodeValue::Integer(1));
        map.insert(b"alpha".to_vec(), BencodeValue::Integer(2));
        map.insert(b"Beta".to_vec(), BencodeValue::Integer(3));
        let encoded = bencode_encode(&BencodeValue::Dictionary(map));
        assert_eq!(encoded, b"d4:Betai3e5:alphai2e4:zetai1ee");
    }

    #[test]
    fn test_unsorted_input_is_canonicalized() {
        let decoded = decode(b"d3:fooi42e3:bar4:spame").unwrap();
        assert_eq!(bencode_encode(&decoded), b"d3:bar4:spam3:fooi42ee");
    }

    #[test]
    fn test_round_trip_nested_value() {
        let value = dict(&[
            ("announce", "http://tracker.example/announce".into()),
            (
                "info",
                dict(&[
                    ("length", BencodeValue::Integer(1 << 40)),
                    ("name", "test".into()),
                    ("pieces", BencodeValue::ByteString(vec![0, 1, 2, 255])),
                ]),
            ),
            (
                "announce-list",
                BencodeValue::List(vec![BencodeValue::List(vec!["udp://x:1".into()])]),
            ),
        ]);
        let encoded = bencode_encode(&value);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    fn bencode_value() -> impl Strategy<Value = BencodeValue> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(BencodeValue::Integer),
            vec(any::<u8>(), 0..32).prop_map(BencodeValue::ByteString),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                vec(inner.clone(), 0..8).prop_map(BencodeValue::List),
                btree_map(vec(any::<u8>(), 0..8), inner, 0..8).prop_map(BencodeValue::Dictionary),
            ]
        })
    }

    proptest! {
        #[test]
        fn test_any_value_round_trips(value in bencode_value()) {
            let encoded = bencode_encode(&value);
            let (decoded, rest) = parse_bencode(&encoded).unwrap();
            prop_assert!(rest.is_empty());
            prop_assert_eq!(&decoded, &value);
            prop_assert_eq!(bencode_encode(&decoded), encoded);
        }

        #[test]
        fn test_truncated_encoding_is_rejected(value in bencode_value()) {
            let encoded = bencode_encode(&value);
            let cut = &encoded[..encoded.len() - 1];
            prop_assert!(decode(cut).is_err());
        }
    }
}
