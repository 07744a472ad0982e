#![forbid(unsafe_code)]

//! Sort orders and serialization of namespace declarations and attributes.

use crate::escape::Escape;
use std::cmp::Ordering;
use std::io::Write;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for default namespace).
    pub prefix: String,
    /// The namespace URI.
    pub uri: String,
}

impl NsDecl {
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        if self.prefix.is_empty() {
            out.write_all(b" xmlns=\"")?;
        } else {
            write!(out, " xmlns:{}=\"", self.prefix)?;
        }
        Escape::Attribute.write(out, &self.uri)?;
        out.write_all(b"\"")
    }
}

impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> Ordering {
        // Default namespace first, then by prefix.
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The namespace URI of the attribute ("" for no namespace).
    pub ns_uri: String,
    pub local_name: String,
    /// The name as written (`prefix:local` or `local`).
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn from_attribute(attr: &hagalund_xml::Attribute) -> Self {
        Self {
            ns_uri: attr.namespace.clone().unwrap_or_default(),
            local_name: attr.name.local.clone(),
            qualified_name: attr.name.qualified(),
            value: attr.value.clone(),
        }
    }

    /// Prefix used by the attribute name, `""` when unprefixed.
    pub fn prefix(&self) -> &str {
        self.qualified_name
            .split_once(':')
            .map(|(p, _)| p)
            .unwrap_or("")
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, " {}=\"", self.qualified_name)?;
        Escape::Attribute.write(out, &self.value)?;
        out.write_all(b"\"")
    }
}

impl Ord for Attr {
    fn cmp(&self, other: &Self) -> Ordering {
        // Unqualified attributes first by local name, then the rest by
        // (namespace URI, local name).
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then(self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
