//! XML names, namespaces and identifier generation shared by every stage.
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// Home of the primitives XSD has no built-in type for (`char`, `guid`).
pub const PRIMITIVE_TYPES_NAMESPACE: &str = "urn:xsd-map:primitive-types";

static NC_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_][\p{L}\p{N}._\-\x{B7}]*$").expect("xml name pattern"));

// ————————————————————————————————————————————————————————————————————————————
// QUALIFIED NAMES
// ————————————————————————————————————————————————————————————————————————————

/// `(local name, namespace)`; the key of every accessor scope and type table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QualifiedName {
    pub name: String,
    pub namespace: Option<String>,
}

impl QualifiedName {
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self { name: name.into(), namespace: namespace.map(str::to_owned) }
    }
    pub fn local(name: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: None }
    }
    pub fn xsd(name: impl Into<String>) -> Self {
        Self::new(name, Some(XSD_NAMESPACE))
    }
    pub fn ns(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
    pub fn is_xsd(&self) -> bool {
        self.ns() == Some(XSD_NAMESPACE)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => write!(f, "{{{ns}}}{}", self.name),
            _ => f.write_str(&self.name),
        }
    }
}

impl FromStr for QualifiedName {
    type Err = String;

    /// Parses Clark notation: `{namespace}local` or a bare `local`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix('{') {
            let (ns, local) = rest
                .split_once('}')
                .ok_or_else(|| format!("unterminated namespace in `{s}`"))?;
            if local.is_empty() {
                return Err(format!("empty local name in `{s}`"));
            }
            let ns = if ns.is_empty() { None } else { Some(ns) };
            Ok(Self::new(local, ns))
        } else if s.is_empty() {
            Err("empty qualified name".to_owned())
        } else {
            Ok(Self::local(s))
        }
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QualifiedName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Element / attribute form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum XmlForm {
    #[default]
    Qualified,
    Unqualified,
}

// ————————————————————————————————————————————————————————————————————————————
// IDENTIFIERS
// ————————————————————————————————————————————————————————————————————————————

pub fn is_nc_name(name: &str) -> bool {
    NC_NAME.is_match(name)
}

/// Encode a name so it is a valid XML local name; offending characters
/// become `_xHHHH_`.
pub fn encode_local_name(name: &str) -> String {
    if is_nc_name(name) {
        return name.to_owned();
    }
    let mut out = String::with_capacity(name.len() + 8);
    for (i, c) in name.chars().enumerate() {
        let ok = if i == 0 {
            c.is_alphabetic() || c == '_'
        } else {
            c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '\u{B7}')
        };
        if ok {
            out.push(c);
        } else {
            out.push_str(&format!("_x{:04X}_", c as u32));
        }
    }
    out
}

/// Turn any XML name into a code identifier: invalid characters become `_`,
/// a leading digit gets a `_` prefix.
pub fn make_valid_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    match out.chars().next() {
        None => out.push('_'),
        Some(c) if c.is_ascii_digit() => out.insert(0, '_'),
        Some(_) => {}
    }
    out
}

/// Uppercase the first character only; `dateTime` → `DateTime`, `NMTOKEN` stays.
pub fn make_pascal(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A set of identifiers handing out `name`, `name1`, `name2`, ... on collision.
#[derive(Debug, Clone, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_owned());
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    pub fn make_unique(&self, name: &str) -> String {
        unique_with_suffix(name, |candidate| self.is_taken(candidate))
    }

    pub fn add_unique(&mut self, name: &str) -> String {
        let unique = self.make_unique(name);
        self.taken.insert(unique.clone());
        unique
    }
}

/// The collision-avoidance loop: `base`, then `base1`, `base2`, ... until
/// `in_use` says no.
pub fn unique_with_suffix(base: &str, mut in_use: impl FnMut(&str) -> bool) -> String {
    if !in_use(base) {
        return base.to_owned();
    }
    let mut i = 1usize;
    loop {
        let candidate = format!("{base}{i}");
        if !in_use(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clark_notation_round_trips() {
        let q: QualifiedName = "{urn:orders}Order".parse().unwrap();
        assert_eq!(q.name, "Order");
        assert_eq!(q.ns(), Some("urn:orders"));
        assert_eq!(q.to_string(), "{urn:orders}Order");

        let bare: QualifiedName = "Order".parse().unwrap();
        assert_eq!(bare.namespace, None);
        assert!("{urn:x".parse::<QualifiedName>().is_err());
    }

    #[test]
    fn encodes_invalid_local_names() {
        assert_eq!(encode_local_name("Order"), "Order");
        assert_eq!(encode_local_name("Pair<A>"), "Pair_x003C_A_x003E_");
        assert_eq!(encode_local_name("1st"), "_x0031_st");
    }

    #[test]
    fn identifiers() {
        assert_eq!(make_pascal("dateTime"), "DateTime");
        assert_eq!(make_pascal("NMTOKEN"), "NMTOKEN");
        assert_eq!(make_valid_identifier("first-name"), "first_name");
        assert_eq!(make_valid_identifier("9lives"), "_9lives");
    }

    #[test]
    fn unique_names_append_suffix() {
        let mut names = UniqueNames::new();
        assert_eq!(names.add_unique("Item"), "Item");
        assert_eq!(names.add_unique("Item"), "Item1");
        assert_eq!(names.add_unique("Item"), "Item2");
        names.reserve("Text");
        assert_eq!(names.make_unique("Text"), "Text1");
    }
}
