//! Wire codec: value graph to self-describing byte blob and back.
//!
//! The blob is UTF-8 JSON with `$`-prefixed wrappers for the shapes JSON
//! cannot carry natively:
//!
//! - `{"$bytes": "<base64>"}` — byte buffers
//! - `{"$f64": "NaN" | "+Inf" | "-Inf" | "-0.0"}` — special floats
//! - `{"$set": [..]}` — sets of scalars
//! - `{"$map": [[k, v], ..]}` — mappings whose keys are not plain
//!   strings (or collide with the `$` prefix)
//! - `{"$record": {"name": .., "fields": {..}}}` — records
//!
//! String-keyed mappings encode as plain JSON objects. Encoding is
//! deterministic: object keys, `$map` entries, and `$set` elements are
//! emitted in sorted order, and whole floats keep a trailing `.0` so
//! they decode back as floats. The rest of the engine never depends on
//! byte-identity of re-encodings; determinism just keeps tests simple.

use crate::error::{Error, Result};
use crate::value::{Record, Scalar, Value};
use base64::Engine;
use std::collections::{HashMap, HashSet};

/// Encode a value graph to a blob.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut out = String::new();
    encode_value(value, &mut out);
    Ok(out.into_bytes())
}

/// Decode a blob produced by [`encode`].
pub fn decode(blob: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(blob)
        .map_err(|e| Error::Codec(format!("blob is not UTF-8: {e}")))?;
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::Codec(format!("invalid JSON: {e}")))?;
    decode_value(&json)
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => encode_float(*f, out),
        Value::String(s) => encode_string(s, out),
        Value::Bytes(b) => {
            let b64 = base64::engine::general_purpose::STANDARD.encode(b);
            out.push_str("{\"$bytes\":\"");
            out.push_str(&b64);
            out.push_str("\"}");
        }
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_value(item, out);
            }
            out.push(']');
        }
        Value::Map(map) => encode_map(map, out),
        Value::Set(set) => encode_set(set, out),
        Value::Record(rec) => encode_record(rec, out),
    }
}

/// Special floats take the `$f64` wrapper; whole floats keep a `.0` so
/// the decoder can tell them apart from integers.
fn encode_float(f: f64, out: &mut String) {
    if f.is_nan() {
        out.push_str("{\"$f64\":\"NaN\"}");
    } else if f == f64::INFINITY {
        out.push_str("{\"$f64\":\"+Inf\"}");
    } else if f == f64::NEG_INFINITY {
        out.push_str("{\"$f64\":\"-Inf\"}");
    } else if f.to_bits() == (-0.0_f64).to_bits() {
        out.push_str("{\"$f64\":\"-0.0\"}");
    } else {
        let s = f.to_string();
        out.push_str(&s);
        if !s.contains('.') && !s.contains('e') && !s.contains('E') {
            out.push_str(".0");
        }
    }
}

fn encode_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn encode_scalar(s: &Scalar, out: &mut String) {
    match s {
        Scalar::Null => out.push_str("null"),
        Scalar::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Scalar::Int(i) => out.push_str(&i.to_string()),
        Scalar::Float(f) => encode_float(*f, out),
        Scalar::Str(v) => encode_string(v, out),
    }
}

/// Plain-string keys become a JSON object; anything else falls back to
/// the `$map` entry-list form. A `$`-prefixed key forces the fallback
/// so plain objects never collide with wrappers.
fn encode_map(map: &HashMap<Scalar, Value>, out: &mut String) {
    let plain = map
        .keys()
        .all(|k| matches!(k, Scalar::Str(s) if !s.starts_with('$')));

    if plain {
        let mut entries: Vec<(&str, &Value)> = map
            .iter()
            .map(|(k, v)| match k {
                Scalar::Str(s) => (s.as_str(), v),
                _ => unreachable!("checked plain above"),
            })
            .collect();
        entries.sort_by_key(|(k, _)| *k);

        out.push('{');
        for (i, (k, v)) in entries.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            encode_string(k, out);
            out.push(':');
            encode_value(v, out);
        }
        out.push('}');
    } else {
        let mut entries: Vec<String> = map
            .iter()
            .map(|(k, v)| {
                let mut entry = String::from("[");
                encode_scalar(k, &mut entry);
                entry.push(',');
                encode_value(v, &mut entry);
                entry.push(']');
                entry
            })
            .collect();
        entries.sort();

        out.push_str("{\"$map\":[");
        out.push_str(&entries.join(","));
        out.push_str("]}");
    }
}

fn encode_set(set: &HashSet<Scalar>, out: &mut String) {
    let mut items: Vec<String> = set
        .iter()
        .map(|s| {
            let mut item = String::new();
            encode_scalar(s, &mut item);
            item
        })
        .collect();
    items.sort();

    out.push_str("{\"$set\":[");
    out.push_str(&items.join(","));
    out.push_str("]}");
}

fn encode_record(rec: &Record, out: &mut String) {
    let mut fields: Vec<(&String, &Value)> = rec.fields.iter().collect();
    fields.sort_by_key(|(k, _)| *k);

    out.push_str("{\"$record\":{\"name\":");
    encode_string(&rec.name, out);
    out.push_str(",\"fields\":{");
    for (i, (k, v)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        encode_string(k, out);
        out.push(':');
        encode_value(v, out);
    }
    out.push_str("}}}");
}

fn decode_value(json: &serde_json::Value) -> Result<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => decode_number(n),
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            let list = items.iter().map(decode_value).collect::<Result<Vec<_>>>()?;
            Ok(Value::List(list))
        }
        serde_json::Value::Object(obj) => decode_object(obj),
    }
}

fn decode_number(n: &serde_json::Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Int(i))
    } else if let Some(f) = n.as_f64() {
        Ok(Value::Float(f))
    } else {
        Err(Error::Codec(format!("integer out of range: {n}")))
    }
}

fn decode_object(obj: &serde_json::Map<String, serde_json::Value>) -> Result<Value> {
    if obj.len() == 1 {
        if let Some(v) = obj.get("$bytes") {
            let b64 = v
                .as_str()
                .ok_or_else(|| Error::Codec("$bytes payload must be a string".into()))?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| Error::Codec(format!("invalid base64 in $bytes: {e}")))?;
            return Ok(Value::Bytes(bytes));
        }
        if let Some(v) = obj.get("$f64") {
            let tag = v
                .as_str()
                .ok_or_else(|| Error::Codec("$f64 payload must be a string".into()))?;
            let f = match tag {
                "NaN" => f64::NAN,
                "+Inf" => f64::INFINITY,
                "-Inf" => f64::NEG_INFINITY,
                "-0.0" => -0.0,
                other => return Err(Error::Codec(format!("unknown $f64 tag: {other}"))),
            };
            return Ok(Value::Float(f));
        }
        if let Some(v) = obj.get("$set") {
            let items = v
                .as_array()
                .ok_or_else(|| Error::Codec("$set payload must be an array".into()))?;
            let mut set = HashSet::with_capacity(items.len());
            for item in items {
                set.insert(decode_scalar(item)?);
            }
            return Ok(Value::Set(set));
        }
        if let Some(v) = obj.get("$map") {
            let entries = v
                .as_array()
                .ok_or_else(|| Error::Codec("$map payload must be an array".into()))?;
            let mut map = HashMap::with_capacity(entries.len());
            for entry in entries {
                let pair = entry
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| Error::Codec("$map entry must be a [key, value] pair".into()))?;
                map.insert(decode_scalar(&pair[0])?, decode_value(&pair[1])?);
            }
            return Ok(Value::Map(map));
        }
        if let Some(v) = obj.get("$record") {
            let body = v
                .as_object()
                .ok_or_else(|| Error::Codec("$record payload must be an object".into()))?;
            let name = body
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| Error::Codec("$record missing name".into()))?;
            let fields_json = body
                .get("fields")
                .and_then(|f| f.as_object())
                .ok_or_else(|| Error::Codec("$record missing fields".into()))?;
            let mut fields = HashMap::with_capacity(fields_json.len());
            for (k, field) in fields_json {
                fields.insert(k.clone(), decode_value(field)?);
            }
            return Ok(Value::Record(Record { name: name.to_string(), fields }));
        }
    }

    // Plain string-keyed mapping.
    let mut map = HashMap::with_capacity(obj.len());
    for (k, v) in obj {
        if k.starts_with('$') {
            return Err(Error::Codec(format!("unknown wrapper key: {k}")));
        }
        map.insert(Scalar::Str(k.clone()), decode_value(v)?);
    }
    Ok(Value::Map(map))
}

fn decode_scalar(json: &serde_json::Value) -> Result<Scalar> {
    let value = decode_value(json)?;
    value
        .as_scalar()
        .ok_or_else(|| Error::Codec(format!("expected scalar, got {}", value.type_name())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let blob = encode(&v).unwrap();
        let back = decode(&blob).unwrap();
        assert_eq!(back, v, "blob: {}", String::from_utf8_lossy(&blob));
    }

    #[test]
    fn scalars_roundtrip() {
        roundtrip(Value::Null);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Int(-42));
        roundtrip(Value::Int(1 << 40));
        roundtrip(Value::Float(3.25));
        roundtrip(Value::String("héllo\n\"quoted\"".into()));
    }

    #[test]
    fn whole_floats_stay_floats() {
        let blob = encode(&Value::Float(2.0)).unwrap();
        assert_eq!(blob, b"2.0");
        assert_eq!(decode(&blob).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn special_floats_use_wrapper() {
        let blob = encode(&Value::Float(f64::INFINITY)).unwrap();
        assert_eq!(blob, br#"{"$f64":"+Inf"}"#);
        roundtrip(Value::Float(f64::NEG_INFINITY));

        let nan = decode(&encode(&Value::Float(f64::NAN)).unwrap()).unwrap();
        assert!(matches!(nan, Value::Float(f) if f.is_nan()));

        let neg_zero = decode(br#"{"$f64":"-0.0"}"#).unwrap();
        assert!(matches!(neg_zero, Value::Float(f) if f.to_bits() == (-0.0_f64).to_bits()));
    }

    #[test]
    fn bytes_use_base64_wrapper() {
        let blob = encode(&Value::Bytes(b"Hello".to_vec())).unwrap();
        assert_eq!(blob, br#"{"$bytes":"SGVsbG8="}"#);
        roundtrip(Value::Bytes(vec![]));
        roundtrip(Value::Bytes((0..=255).collect()));
    }

    #[test]
    fn string_keyed_map_is_plain_object() {
        let v = Value::map_of([("a", 1i64), ("z", 2i64)]);
        let blob = encode(&v).unwrap();
        assert_eq!(blob, br#"{"a":1,"z":2}"#);
        roundtrip(v);
    }

    #[test]
    fn non_string_keys_use_map_wrapper() {
        let mut m = HashMap::new();
        m.insert(Scalar::Int(1), Value::String("one".into()));
        m.insert(Scalar::Bool(true), Value::Int(1));
        let v = Value::Map(m);
        let blob = encode(&v).unwrap();
        assert!(blob.starts_with(br#"{"$map":["#));
        roundtrip(v);
    }

    #[test]
    fn dollar_prefixed_string_key_uses_map_wrapper() {
        let mut m = HashMap::new();
        m.insert(Scalar::Str("$bytes".into()), Value::Int(1));
        let v = Value::Map(m);
        let blob = encode(&v).unwrap();
        assert!(blob.starts_with(br#"{"$map":["#));
        roundtrip(v);
    }

    #[test]
    fn sets_and_records_roundtrip() {
        let mut s = HashSet::new();
        s.insert(Scalar::Int(1));
        s.insert(Scalar::Str("x".into()));
        roundtrip(Value::Set(s));

        roundtrip(Value::Record(
            Record::new("point").with("x", 1i64).with("y", Value::List(vec![Value::Int(2)])),
        ));
    }

    #[test]
    fn nested_graph_roundtrips() {
        let v = Value::map_of([
            ("list", Value::List(vec![Value::Int(1), Value::map_of([("deep", true)])])),
            ("buf", Value::Bytes(vec![0, 1, 2])),
        ]);
        roundtrip(v);
    }

    #[test]
    fn encoding_is_deterministic() {
        let v = Value::map_of([("b", 2i64), ("a", 1i64), ("c", 3i64)]);
        assert_eq!(encode(&v).unwrap(), encode(&v).unwrap());
        assert_eq!(encode(&v).unwrap(), br#"{"a":1,"b":2,"c":3}"#.to_vec());
    }

    #[test]
    fn decode_reports_errors_distinctly() {
        assert!(matches!(decode(b"\xff\xfe"), Err(Error::Codec(_))));
        assert!(matches!(decode(b"{not json"), Err(Error::Codec(_))));
        assert!(matches!(decode(br#"{"$f64":"huge"}"#), Err(Error::Codec(_))));
        assert!(matches!(decode(br#"{"$bytes":"!!"}"#), Err(Error::Codec(_))));
        assert!(matches!(decode(br#"{"$unknown":1}"#), Err(Error::Codec(_))));
    }

    #[test]
    fn reencode_of_decode_is_stable() {
        let blob = encode(&Value::map_of([("k", Value::List(vec![Value::Int(1)]))])).unwrap();
        let again = encode(&decode(&blob).unwrap()).unwrap();
        assert_eq!(blob, again);
    }
}
