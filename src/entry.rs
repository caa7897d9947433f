//! Search result entries.
//!
//! The server returns attribute values as bare octet strings, with no type
//! information. An [`Entry`](struct.Entry.html) keeps them as raw bytes in
//! the order the server sent them, and offers string-typed accessors for the
//! common case of textual attributes. Field-level decoding into user structs
//! is intentionally left to layers above this crate.

use std::collections::HashMap;

use crate::result::{LdapError, Result};

use bertree::Packet;

/// A single attribute of an entry: a description and its values, in
/// server-supplied order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute description (type name, possibly with options).
    pub name: String,
    /// Raw attribute values.
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    /// The values as strings; non-UTF-8 bytes are replaced.
    pub fn values_utf8(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect()
    }
}

/// A directory entry: a DN and an ordered attribute list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Entry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attributes, in server-supplied order for decoded entries.
    pub attributes: Vec<Attribute>,
}

impl Entry {
    /// Construct an entry from an attribute map.
    ///
    /// Map iteration order is unspecified, so the attribute names are sorted;
    /// the same input map always produces the same entry.
    pub fn new(dn: &str, attributes: HashMap<String, Vec<String>>) -> Entry {
        let mut names: Vec<String> = attributes.keys().cloned().collect();
        names.sort();
        let attributes = names
            .into_iter()
            .map(|name| {
                let values = attributes[&name]
                    .iter()
                    .map(|v| v.clone().into_bytes())
                    .collect();
                Attribute { name, values }
            })
            .collect();
        Entry {
            dn: String::from(dn),
            attributes,
        }
    }

    fn find(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    fn find_fold(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// The values of the named attribute as strings, or an empty vector.
    pub fn attr_values(&self, name: &str) -> Vec<String> {
        self.find(name).map(Attribute::values_utf8).unwrap_or_default()
    }

    /// Like [`attr_values()`](#method.attr_values), matching the attribute
    /// name case-insensitively.
    pub fn attr_values_fold(&self, name: &str) -> Vec<String> {
        self.find_fold(name)
            .map(Attribute::values_utf8)
            .unwrap_or_default()
    }

    /// The raw values of the named attribute, or an empty slice.
    pub fn raw_attr_values(&self, name: &str) -> &[Vec<u8>] {
        self.find(name).map(|a| a.values.as_slice()).unwrap_or(&[])
    }

    /// Like [`raw_attr_values()`](#method.raw_attr_values), matching the
    /// attribute name case-insensitively.
    pub fn raw_attr_values_fold(&self, name: &str) -> &[Vec<u8>] {
        self.find_fold(name)
            .map(|a| a.values.as_slice())
            .unwrap_or(&[])
    }

    /// The first value of the named attribute as a string, or an empty string.
    pub fn attr_first(&self, name: &str) -> String {
        self.attr_values(name).into_iter().next().unwrap_or_default()
    }

    /// The first raw value of the named attribute, or an empty slice.
    pub fn raw_attr_first(&self, name: &str) -> &[u8] {
        self.raw_attr_values(name)
            .first()
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Decode a SearchResultEntry operation packet:
    /// `SEQUENCE { objectName, SEQUENCE OF PartialAttribute }`, where each
    /// partial attribute is `SEQUENCE { type, SET OF value }`.
    pub(crate) fn from_packet(op: Packet) -> Result<Entry> {
        let mut children = op
            .into_children()
            .ok_or(LdapError::Decoding("entry PDU is not constructed"))?
            .into_iter();
        let dn = children
            .next()
            .and_then(|p| p.into_bytes())
            .map(String::from_utf8)
            .ok_or(LdapError::Decoding("missing entry DN"))?
            .map_err(|_| LdapError::DecodingUTF8)?;
        let attr_list = children
            .next()
            .and_then(|p| p.into_children())
            .ok_or(LdapError::Decoding("missing entry attribute list"))?;
        let mut attributes = Vec::with_capacity(attr_list.len());
        for partial in attr_list {
            let mut parts = partial
                .into_children()
                .ok_or(LdapError::Decoding("attribute is not constructed"))?
                .into_iter();
            let name = parts
                .next()
                .and_then(|p| p.into_bytes())
                .map(String::from_utf8)
                .ok_or(LdapError::Decoding("missing attribute type"))?
                .map_err(|_| LdapError::DecodingUTF8)?;
            let values = parts
                .next()
                .and_then(|p| p.into_children())
                .ok_or(LdapError::Decoding("missing attribute values"))?
                .into_iter()
                .map(|v| v.into_bytes().ok_or(LdapError::Decoding("constructed attribute value")))
                .collect::<Result<Vec<_>>>()?;
            attributes.push(Attribute { name, values });
        }
        Ok(Entry { dn, attributes })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bertree::{Class, Packet};

    fn sample() -> Entry {
        let op = Packet::constructed(Class::Application, 4)
            .with_child(Packet::octet_string("cn=a,dc=x"))
            .with_child(
                Packet::sequence()
                    .with_child(
                        Packet::sequence()
                            .with_child(Packet::octet_string("cn"))
                            .with_child(Packet::set().with_child(Packet::octet_string("a"))),
                    )
                    .with_child(
                        Packet::sequence()
                            .with_child(Packet::octet_string("jpegPhoto"))
                            .with_child(
                                Packet::set()
                                    .with_child(Packet::octet_string(vec![0xFF, 0xD8, 0x00])),
                            ),
                    ),
            );
        Entry::from_packet(op).unwrap()
    }

    #[test]
    fn decode_preserves_order() {
        let entry = sample();
        assert_eq!(entry.dn, "cn=a,dc=x");
        let names: Vec<&str> = entry.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["cn", "jpegPhoto"]);
    }

    #[test]
    fn typed_accessors() {
        let entry = sample();
        assert_eq!(entry.attr_values("cn"), ["a"]);
        assert_eq!(entry.attr_first("cn"), "a");
        assert_eq!(entry.attr_values_fold("CN"), ["a"]);
        assert!(entry.attr_values("missing").is_empty());
        assert_eq!(entry.raw_attr_first("jpegPhoto"), &[0xFF, 0xD8, 0x00]);
        assert_eq!(entry.raw_attr_values_fold("JPEGPHOTO").len(), 1);
    }

    #[test]
    fn constructed_entries_sort_names() {
        let mut attrs = HashMap::new();
        attrs.insert("sn".to_string(), vec!["b".to_string()]);
        attrs.insert("cn".to_string(), vec!["a".to_string()]);
        attrs.insert("ou".to_string(), vec![]);
        let entry = Entry::new("cn=a,dc=x", attrs);
        let names: Vec<&str> = entry.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["cn", "ou", "sn"]);
    }
}
