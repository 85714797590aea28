//! The reflected object model handed to the reflection importer.
//!
//! Type references are plain strings: a declared type name, a built-in
//! primitive (`i32`, `string`, `datetime`, ...), `object`, one of the special
//! DOM types (`XmlNode`, `XmlElement`, `XmlAttribute`, `XmlNamespaces`), or
//! any of those suffixed with `[]` (array) or `?` (optional value).
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::annotations::{XmlAttributeOverrides, XmlAttributes};
use crate::names::QualifiedName;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReflectedModel {
    pub types: Vec<ReflectedType>,
    pub overrides: XmlAttributeOverrides,
    #[serde(skip)]
    index: IndexMap<String, usize>,
}

impl ReflectedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, ty: ReflectedType) -> Self {
        self.add(ty);
        self
    }

    pub fn add(&mut self, ty: ReflectedType) {
        self.index.insert(ty.name.clone(), self.types.len());
        self.types.push(ty);
    }

    /// Rebuild the name index; needed after deserialization.
    pub fn reindex(&mut self) {
        self.index = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
    }

    pub fn get(&self, name: &str) -> Option<&ReflectedType> {
        match self.index.get(name) {
            Some(i) => self.types.get(*i),
            None => self.types.iter().find(|t| t.name == name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectedType {
    pub name: String,
    #[serde(flatten)]
    pub shape: ReflectedShape,
    #[serde(default)]
    pub attributes: XmlAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReflectedShape {
    #[serde(rename_all = "camelCase")]
    Struct {
        #[serde(default)]
        members: Vec<ReflectedMember>,
        #[serde(default)]
        base: Option<String>,
        #[serde(default)]
        is_abstract: bool,
        /// Value semantics (never null) rather than a reference class.
        #[serde(default)]
        is_value_type: bool,
    },
    #[serde(rename_all = "camelCase")]
    Enum {
        constants: Vec<ReflectedConstant>,
        #[serde(default)]
        is_flags: bool,
    },
    Collection { item: String },
    Enumerable { item: String },
    /// Supplies its own schema; `schema_type` is its xsi:type name.
    #[serde(rename_all = "camelCase")]
    Serializable {
        #[serde(default)]
        schema_type: Option<QualifiedName>,
        #[serde(default)]
        base: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectedMember {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub attributes: XmlAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectedConstant {
    pub name: String,
    pub value: i64,
    #[serde(default)]
    pub attributes: XmlAttributes,
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDERS
// ————————————————————————————————————————————————————————————————————————————

impl ReflectedType {
    pub fn class(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            shape: ReflectedShape::Struct {
                members: Vec::new(),
                base: None,
                is_abstract: false,
                is_value_type: false,
            },
            attributes: XmlAttributes::default(),
        }
    }

    pub fn value_struct(name: &str) -> Self {
        let mut ty = Self::class(name);
        if let ReflectedShape::Struct { is_value_type, .. } = &mut ty.shape {
            *is_value_type = true;
        }
        ty
    }

    pub fn enumeration(name: &str, constants: &[&str], is_flags: bool) -> Self {
        let constants = constants
            .iter()
            .enumerate()
            .map(|(i, c)| ReflectedConstant {
                name: (*c).to_owned(),
                value: if is_flags { 1i64 << i } else { i as i64 },
                attributes: XmlAttributes::default(),
            })
            .collect();
        Self {
            name: name.to_owned(),
            shape: ReflectedShape::Enum { constants, is_flags },
            attributes: XmlAttributes::default(),
        }
    }

    pub fn collection(name: &str, item: &str) -> Self {
        Self {
            name: name.to_owned(),
            shape: ReflectedShape::Collection { item: item.to_owned() },
            attributes: XmlAttributes::default(),
        }
    }

    pub fn serializable(name: &str, schema_type: Option<QualifiedName>, base: Option<&str>) -> Self {
        Self {
            name: name.to_owned(),
            shape: ReflectedShape::Serializable { schema_type, base: base.map(str::to_owned) },
            attributes: XmlAttributes::default(),
        }
    }

    pub fn member(self, name: &str, type_name: &str) -> Self {
        self.member_with(name, type_name, XmlAttributes::default())
    }

    pub fn member_with(mut self, name: &str, type_name: &str, attributes: XmlAttributes) -> Self {
        if let ReflectedShape::Struct { members, .. } = &mut self.shape {
            members.push(ReflectedMember { name: name.to_owned(), type_name: type_name.to_owned(), attributes });
        }
        self
    }

    pub fn extends(mut self, base_name: &str) -> Self {
        match &mut self.shape {
            ReflectedShape::Struct { base, .. } | ReflectedShape::Serializable { base, .. } => {
                *base = Some(base_name.to_owned());
            }
            _ => {}
        }
        self
    }

    pub fn abstract_(mut self) -> Self {
        if let ReflectedShape::Struct { is_abstract, .. } = &mut self.shape {
            *is_abstract = true;
        }
        self
    }

    pub fn annotated(mut self, attributes: XmlAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}
