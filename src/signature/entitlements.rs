//! Entitlements: XML plist dictionary (via `plist`) and a minimal hand-rolled
//! DER SET-OF/UTF8String/ANY walker for the DER variant (spec §4.4).

use std::collections::BTreeMap;

use super::error::SignatureError;

/// A typed entitlement value, mirroring the plist/DER value shapes Apple
/// actually emits: booleans, strings, integers, arrays, and nested dicts.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum EntitlementValue {
    Bool(bool),
    String(String),
    Integer(i64),
    Array(Vec<EntitlementValue>),
    Dict(BTreeMap<String, EntitlementValue>),
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Entitlements {
    pub values: BTreeMap<String, EntitlementValue>,
}

impl Entitlements {
    pub fn get(&self, key: &str) -> Option<&EntitlementValue> {
        self.values.get(key)
    }

    pub fn parse_xml(bytes: &[u8]) -> Result<Self, SignatureError> {
        let value = plist::Value::from_reader(std::io::Cursor::new(bytes))
            .map_err(|e| SignatureError::InvalidEntitlementsFormat(e.to_string()))?;
        let plist::Value::Dictionary(dict) = value else {
            return Err(SignatureError::InvalidEntitlementsFormat(
                "entitlements root is not a dictionary".into(),
            ));
        };
        Ok(Entitlements {
            values: dict
                .into_iter()
                .map(|(k, v)| (k, from_plist_value(v)))
                .collect(),
        })
    }

    pub fn parse_der(bytes: &[u8]) -> Result<Self, SignatureError> {
        let mut pos = 0usize;
        let (tag, content) = read_tlv(bytes, &mut pos)?;

        let set_content = match tag {
            TAG_SEQUENCE => {
                let mut inner_pos = 0usize;
                let (inner_tag, inner_content) = read_tlv(content, &mut inner_pos)?;
                if inner_tag != TAG_SET {
                    return Err(SignatureError::InvalidEntitlementsFormat(
                        "expected SET OF inside outer SEQUENCE".into(),
                    ));
                }
                inner_content
            }
            TAG_SET => content,
            _ => {
                return Err(SignatureError::InvalidEntitlementsFormat(format!(
                    "unexpected top-level DER tag {tag:#x}"
                )))
            }
        };

        Ok(Entitlements {
            values: parse_pairs(set_content)?,
        })
    }
}

fn from_plist_value(value: plist::Value) -> EntitlementValue {
    match value {
        plist::Value::Boolean(b) => EntitlementValue::Bool(b),
        plist::Value::String(s) => EntitlementValue::String(s),
        plist::Value::Integer(i) => {
            EntitlementValue::Integer(i.as_signed().unwrap_or_default())
        }
        plist::Value::Array(items) => {
            EntitlementValue::Array(items.into_iter().map(from_plist_value).collect())
        }
        plist::Value::Dictionary(dict) => EntitlementValue::Dict(
            dict.into_iter()
                .map(|(k, v)| (k, from_plist_value(v)))
                .collect(),
        ),
        other => EntitlementValue::String(format!("{other:?}")),
    }
}

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_UTF8_STRING: u8 = 0x0C;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;

/// Reads one DER tag-length-value starting at `*pos`, advancing `*pos` past
/// it. Only single-byte (low) tag numbers and definite-length encodings are
/// supported, matching the shapes Apple's signing tools emit.
fn read_tlv<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<(u8, &'a [u8]), SignatureError> {
    let start = *pos;
    if start >= bytes.len() {
        return Err(SignatureError::InvalidEntitlementsFormat(
            "DER input ended before tag".into(),
        ));
    }
    let tag = bytes[start];
    let mut cursor = start + 1;

    let first_len_byte = *bytes
        .get(cursor)
        .ok_or_else(|| SignatureError::InvalidEntitlementsFormat("DER input ended before length".into()))?;
    cursor += 1;

    let length = if first_len_byte & 0x80 == 0 {
        first_len_byte as usize
    } else {
        let num_len_bytes = (first_len_byte & 0x7f) as usize;
        if num_len_bytes == 0 || num_len_bytes > 4 {
            return Err(SignatureError::InvalidEntitlementsFormat(
                "unsupported DER long-form length".into(),
            ));
        }
        let mut len = 0usize;
        for _ in 0..num_len_bytes {
            let b = *bytes.get(cursor).ok_or_else(|| {
                SignatureError::InvalidEntitlementsFormat("DER length bytes truncated".into())
            })?;
            len = (len << 8) | b as usize;
            cursor += 1;
        }
        len
    };

    let end = cursor
        .checked_add(length)
        .ok_or_else(|| SignatureError::InvalidEntitlementsFormat("DER length overflow".into()))?;
    if end > bytes.len() {
        return Err(SignatureError::InvalidEntitlementsFormat(
            "DER value extends past buffer".into(),
        ));
    }

    *pos = end;
    Ok((tag, &bytes[cursor..end]))
}

fn parse_pairs(bytes: &[u8]) -> Result<BTreeMap<String, EntitlementValue>, SignatureError> {
    let mut values = BTreeMap::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let (tag, pair_content) = read_tlv(bytes, &mut pos)?;
        if tag != TAG_SEQUENCE {
            return Err(SignatureError::InvalidEntitlementsFormat(format!(
                "expected SEQUENCE pair, found tag {tag:#x}"
            )));
        }
        let mut inner_pos = 0usize;
        let (key_tag, key_bytes) = read_tlv(pair_content, &mut inner_pos)?;
        if key_tag != TAG_UTF8_STRING {
            return Err(SignatureError::InvalidEntitlementsFormat(
                "entitlement key is not a UTF8String".into(),
            ));
        }
        let key = String::from_utf8(key_bytes.to_vec())
            .map_err(|e| SignatureError::InvalidEntitlementsFormat(e.to_string()))?;

        let (value_tag, value_bytes) = read_tlv(pair_content, &mut inner_pos)?;
        let value = parse_any(value_tag, value_bytes)?;
        values.insert(key, value);
    }
    Ok(values)
}

fn parse_any(tag: u8, content: &[u8]) -> Result<EntitlementValue, SignatureError> {
    match tag {
        TAG_BOOLEAN => Ok(EntitlementValue::Bool(content.first().is_some_and(|b| *b != 0))),
        TAG_INTEGER => {
            if content.is_empty() {
                return Err(SignatureError::InvalidEntitlementsFormat("empty DER INTEGER".into()));
            }
            let negative = content[0] & 0x80 != 0;
            let mut value: i64 = if negative { -1 } else { 0 };
            for &b in content {
                value = (value << 8) | b as i64;
            }
            Ok(EntitlementValue::Integer(value))
        }
        TAG_UTF8_STRING => Ok(EntitlementValue::String(
            String::from_utf8(content.to_vec())
                .map_err(|e| SignatureError::InvalidEntitlementsFormat(e.to_string()))?,
        )),
        TAG_SEQUENCE => {
            let mut items = Vec::new();
            let mut pos = 0usize;
            while pos < content.len() {
                let (item_tag, item_content) = read_tlv(content, &mut pos)?;
                items.push(parse_any(item_tag, item_content)?);
            }
            Ok(EntitlementValue::Array(items))
        }
        TAG_SET => Ok(EntitlementValue::Dict(parse_pairs(content)?)),
        other => Err(SignatureError::InvalidEntitlementsFormat(format!(
            "unsupported DER value tag {other:#x}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xml_dictionary() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>com.apple.security.get-task-allow</key>
    <true/>
    <key>application-identifier</key>
    <string>ABCDE12345.com.example.app</string>
</dict>
</plist>"#;
        let ent = Entitlements::parse_xml(xml).unwrap();
        assert_eq!(
            ent.get("com.apple.security.get-task-allow"),
            Some(&EntitlementValue::Bool(true))
        );
        assert_eq!(
            ent.get("application-identifier"),
            Some(&EntitlementValue::String("ABCDE12345.com.example.app".into()))
        );
    }

    #[test]
    fn rejects_non_dictionary_xml_root() {
        let xml = b"<?xml version=\"1.0\"?><plist version=\"1.0\"><array/></plist>";
        assert!(Entitlements::parse_xml(xml).is_err());
    }

    fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        if content.len() < 0x80 {
            out.push(content.len() as u8);
        } else {
            out.push(0x81);
            out.push(content.len() as u8);
        }
        out.extend_from_slice(content);
        out
    }

    #[test]
    fn parses_der_set_of_key_value_pairs() {
        let key = der_tlv(TAG_UTF8_STRING, b"get-task-allow");
        let value = der_tlv(TAG_BOOLEAN, &[0xff]);
        let mut pair_body = key;
        pair_body.extend_from_slice(&value);
        let pair = der_tlv(TAG_SEQUENCE, &pair_body);
        let set = der_tlv(TAG_SET, &pair);

        let ent = Entitlements::parse_der(&set).unwrap();
        assert_eq!(ent.get("get-task-allow"), Some(&EntitlementValue::Bool(true)));
    }

    #[test]
    fn parses_der_wrapped_in_outer_sequence() {
        let key = der_tlv(TAG_UTF8_STRING, b"count");
        let value = der_tlv(TAG_INTEGER, &[0x2a]);
        let mut pair_body = key;
        pair_body.extend_from_slice(&value);
        let pair = der_tlv(TAG_SEQUENCE, &pair_body);
        let set = der_tlv(TAG_SET, &pair);
        let outer = der_tlv(TAG_SEQUENCE, &set);

        let ent = Entitlements::parse_der(&outer).unwrap();
        assert_eq!(ent.get("count"), Some(&EntitlementValue::Integer(42)));
    }
}
