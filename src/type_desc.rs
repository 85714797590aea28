//! Canonical shape descriptors and the per-session registry that owns them.
//!
//! A `TypeDesc` is created once per identity key and addressed by
//! `TypeDescId` from then on; two lookups of the same key always hand back
//! the same id for the lifetime of the `TypeScope`.
use std::collections::HashMap;

use bitflags::bitflags;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{MappingError, MappingResult, ReferenceKind};
use crate::names::{PRIMITIVE_TYPES_NAMESPACE, QualifiedName, XSD_NAMESPACE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeDescId(u32);

impl TypeDescId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum TypeKind {
    Primitive,
    Enum,
    Struct,
    Class,
    Array,
    Collection,
    Enumerable,
    Root,
    Serializable,
    Special,
}

/// The opaque DOM-ish types that map to wildcards and namespace tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum SpecialType {
    Node,
    Element,
    Attribute,
    Namespaces,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u32 {
        const VALUE_TYPE              = 1 << 0;
        const NULLABLE                = 1 << 1;
        const ABSTRACT                = 1 << 2;
        const OPTIONAL_VALUE          = 1 << 3;
        const MIXED                   = 1 << 4;
        const CAN_BE_ATTRIBUTE_VALUE  = 1 << 5;
        const CAN_BE_ELEMENT_VALUE    = 1 << 6;
        const CAN_BE_TEXT_VALUE       = 1 << 7;
        const HAS_CUSTOM_FORMATTER    = 1 << 8;
        const AMBIGUOUS_DATA_TYPE     = 1 << 9;
        const XSD_TYPE                = 1 << 10;
        /// Synthesized by the schema importer, no backing reflected type.
        const GENERATED               = 1 << 11;
        const COLLAPSE_WHITESPACE     = 1 << 12;
    }
}

const SCALAR: TypeFlags = TypeFlags::CAN_BE_ATTRIBUTE_VALUE
    .union(TypeFlags::CAN_BE_ELEMENT_VALUE)
    .union(TypeFlags::CAN_BE_TEXT_VALUE);

#[derive(Debug, Clone, Serialize)]
pub struct TypeDesc {
    /// Identity name: `Order`, `i32`, `string[]`, `i32?`.
    pub name: String,
    /// XSD (or primitive-namespace) type name, primitives only.
    pub data_type: Option<String>,
    pub kind: TypeKind,
    #[serde(skip)]
    pub flags: TypeFlags,
    pub base: Option<TypeDescId>,
    /// Item type of arrays / collections / enumerables.
    pub element: Option<TypeDescId>,
    /// Underlying value type of an optional value (`i32?` → `i32`).
    pub optional_of: Option<TypeDescId>,
    pub special: Option<SpecialType>,
}

impl TypeDesc {
    pub fn new(name: impl Into<String>, kind: TypeKind, flags: TypeFlags) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            kind,
            flags,
            base: None,
            element: None,
            optional_of: None,
            special: None,
        }
    }

    pub fn is_array_like(&self) -> bool {
        matches!(self.kind, TypeKind::Array | TypeKind::Collection | TypeKind::Enumerable)
    }
    pub fn is_value_type(&self) -> bool {
        self.flags.contains(TypeFlags::VALUE_TYPE)
    }
    pub fn is_nullable(&self) -> bool {
        self.flags.contains(TypeFlags::NULLABLE)
    }
    pub fn is_optional_value(&self) -> bool {
        self.flags.contains(TypeFlags::OPTIONAL_VALUE)
    }
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(TypeFlags::ABSTRACT)
    }
    pub fn is_root(&self) -> bool {
        self.kind == TypeKind::Root
    }
    pub fn is_xsd_type(&self) -> bool {
        self.flags.contains(TypeFlags::XSD_TYPE)
    }
    pub fn can_be_attribute_value(&self) -> bool {
        self.flags.contains(TypeFlags::CAN_BE_ATTRIBUTE_VALUE)
    }
    pub fn can_be_text_value(&self) -> bool {
        self.flags.contains(TypeFlags::CAN_BE_TEXT_VALUE)
    }
    pub fn is_special(&self, special: SpecialType) -> bool {
        self.special == Some(special)
    }
}

/// Identity under which a descriptor is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// A reflected / code-level name (`Order`, `i32`, `string[]`).
    Named(String),
    /// A primitive data type by XSD (or primitive-namespace) name.
    DataType(QualifiedName),
}

// ————————————————————————————————————————————————————————————————————————————
// PRIMITIVE TABLE
// ————————————————————————————————————————————————————————————————————————————

/// `(data type, namespace, code name, flags)`. The first row per code name is
/// its default data type.
struct PrimitiveRow {
    data_type: &'static str,
    namespace: &'static str,
    code_name: &'static str,
    flags: TypeFlags,
}

const fn row(
    data_type: &'static str,
    namespace: &'static str,
    code_name: &'static str,
    flags: TypeFlags,
) -> PrimitiveRow {
    PrimitiveRow { data_type, namespace, code_name, flags }
}

const VALUE: TypeFlags = SCALAR.union(TypeFlags::VALUE_TYPE);
const REF: TypeFlags = SCALAR.union(TypeFlags::NULLABLE);
const FORMATTED: TypeFlags = TypeFlags::HAS_CUSTOM_FORMATTER;
const AMBIGUOUS: TypeFlags = TypeFlags::AMBIGUOUS_DATA_TYPE;

static PRIMITIVES: Lazy<Vec<PrimitiveRow>> = Lazy::new(|| {
    let x = XSD_NAMESPACE;
    let p = PRIMITIVE_TYPES_NAMESPACE;
    vec![
        row("string", x, "string", REF),
        row("int", x, "i32", VALUE),
        row("boolean", x, "bool", VALUE),
        row("short", x, "i16", VALUE),
        row("long", x, "i64", VALUE),
        row("float", x, "f32", VALUE),
        row("double", x, "f64", VALUE),
        row("decimal", x, "decimal", VALUE),
        row("dateTime", x, "datetime", VALUE.union(AMBIGUOUS)),
        row("QName", x, "qname", REF),
        row("unsignedByte", x, "u8", VALUE),
        row("byte", x, "i8", VALUE),
        row("unsignedShort", x, "u16", VALUE),
        row("unsignedInt", x, "u32", VALUE),
        row("unsignedLong", x, "u64", VALUE),
        row("base64Binary", x, "bytes", REF.union(AMBIGUOUS)),
        // same code types, alternate data types
        row("date", x, "datetime", VALUE.union(FORMATTED).union(AMBIGUOUS)),
        row("time", x, "datetime", VALUE.union(FORMATTED).union(AMBIGUOUS)),
        row("hexBinary", x, "bytes", REF.union(FORMATTED).union(AMBIGUOUS)),
        row("anyURI", x, "string", REF),
        row("normalizedString", x, "string", REF),
        row("token", x, "string", REF.union(TypeFlags::COLLAPSE_WHITESPACE)),
        row("language", x, "string", REF),
        row("Name", x, "string", REF.union(FORMATTED)),
        row("NCName", x, "string", REF.union(FORMATTED)),
        row("NMTOKEN", x, "string", REF.union(FORMATTED)),
        row("NMTOKENS", x, "string", REF.union(FORMATTED)),
        row("ID", x, "string", REF),
        row("IDREF", x, "string", REF),
        row("IDREFS", x, "string", REF),
        row("ENTITY", x, "string", REF),
        row("ENTITIES", x, "string", REF),
        row("NOTATION", x, "string", REF),
        row("integer", x, "string", REF),
        row("positiveInteger", x, "string", REF),
        row("negativeInteger", x, "string", REF),
        row("nonPositiveInteger", x, "string", REF),
        row("nonNegativeInteger", x, "string", REF),
        row("duration", x, "string", REF),
        row("gYearMonth", x, "string", REF),
        row("gYear", x, "string", REF),
        row("gMonthDay", x, "string", REF),
        row("gDay", x, "string", REF),
        row("gMonth", x, "string", REF),
        // not expressible as XSD built-ins
        row("char", p, "char", VALUE.union(FORMATTED)),
        row("guid", p, "guid", VALUE),
    ]
});

// ————————————————————————————————————————————————————————————————————————————
// SCOPE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct TypeScope {
    descs: Vec<TypeDesc>,
    by_key: HashMap<TypeKey, TypeDescId>,
    arrays: HashMap<TypeDescId, TypeDescId>,
    optionals: HashMap<TypeDescId, TypeDescId>,
}

impl Default for TypeScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeScope {
    pub fn new() -> Self {
        let mut scope = Self {
            descs: Vec::new(),
            by_key: HashMap::new(),
            arrays: HashMap::new(),
            optionals: HashMap::new(),
        };
        for row in PRIMITIVES.iter() {
            let mut flags = row.flags;
            if row.namespace == XSD_NAMESPACE {
                flags |= TypeFlags::XSD_TYPE;
            }
            let mut desc = TypeDesc::new(row.code_name, TypeKind::Primitive, flags);
            desc.data_type = Some(row.data_type.to_owned());
            let id = scope.push(desc);
            scope
                .by_key
                .insert(TypeKey::DataType(QualifiedName::new(row.data_type, Some(row.namespace))), id);
            scope.by_key.entry(TypeKey::Named(row.code_name.to_owned())).or_insert(id);
        }

        let root = scope.push(TypeDesc::new("object", TypeKind::Root, TypeFlags::NULLABLE));
        scope.by_key.insert(TypeKey::Named("object".to_owned()), root);
        for (name, special, flags) in [
            ("XmlNode", SpecialType::Node, TypeFlags::CAN_BE_ELEMENT_VALUE | TypeFlags::CAN_BE_TEXT_VALUE),
            ("XmlElement", SpecialType::Element, TypeFlags::CAN_BE_ELEMENT_VALUE),
            ("XmlAttribute", SpecialType::Attribute, TypeFlags::CAN_BE_ATTRIBUTE_VALUE),
            ("XmlNamespaces", SpecialType::Namespaces, TypeFlags::empty()),
        ] {
            let mut desc = TypeDesc::new(name, TypeKind::Special, flags | TypeFlags::NULLABLE);
            desc.special = Some(special);
            let id = scope.push(desc);
            scope.by_key.insert(TypeKey::Named(name.to_owned()), id);
        }
        scope
    }

    fn push(&mut self, desc: TypeDesc) -> TypeDescId {
        let id = TypeDescId(self.descs.len() as u32);
        self.descs.push(desc);
        id
    }

    pub fn get(&self, id: TypeDescId) -> &TypeDesc {
        &self.descs[id.index()]
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn lookup(&self, key: &TypeKey) -> Option<TypeDescId> {
        self.by_key.get(key).copied()
    }

    pub fn named(&self, name: &str) -> Option<TypeDescId> {
        self.lookup(&TypeKey::Named(name.to_owned()))
    }

    /// Register `desc` under `key`, or hand back the descriptor already there.
    pub fn get_or_insert(&mut self, key: TypeKey, make: impl FnOnce() -> TypeDesc) -> TypeDescId {
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }
        let id = self.push(make());
        self.by_key.insert(key, id);
        id
    }

    /// Allow a caller that built the descriptor itself (base links and all)
    /// to patch it before anyone else sees it.
    pub fn get_mut(&mut self, id: TypeDescId) -> &mut TypeDesc {
        &mut self.descs[id.index()]
    }

    pub fn root(&self) -> TypeDescId {
        self.named("object").unwrap_or(TypeDescId(0))
    }

    pub fn string(&self) -> TypeDescId {
        self.named("string").unwrap_or(TypeDescId(0))
    }

    pub fn special(&self, special: SpecialType) -> TypeDescId {
        let name = match special {
            SpecialType::Node => "XmlNode",
            SpecialType::Element => "XmlElement",
            SpecialType::Attribute => "XmlAttribute",
            SpecialType::Namespaces => "XmlNamespaces",
        };
        self.named(name).unwrap_or(TypeDescId(0))
    }

    /// True for the built-in primitives.
    pub fn is_known_type(&self, name: &str) -> bool {
        self.named(name)
            .is_some_and(|id| self.get(id).kind == TypeKind::Primitive)
    }

    /// Resolve a data type by qualified XSD (or primitive-namespace) name.
    pub fn data_type(&self, name: &QualifiedName) -> MappingResult<TypeDescId> {
        self.lookup(&TypeKey::DataType(name.clone()))
            .ok_or_else(|| MappingError::missing(ReferenceKind::Type, name.clone()))
    }

    /// Resolve an unqualified `dataType` annotation: XSD first, then the
    /// primitive-types namespace.
    pub fn data_type_by_local_name(&self, name: &str) -> Option<TypeDescId> {
        [XSD_NAMESPACE, PRIMITIVE_TYPES_NAMESPACE]
            .into_iter()
            .find_map(|ns| self.lookup(&TypeKey::DataType(QualifiedName::new(name, Some(ns)))))
    }

    /// The qualified data type name a primitive descriptor exports as.
    pub fn data_type_name(&self, id: TypeDescId) -> Option<QualifiedName> {
        let desc = self.get(id);
        let data_type = desc.data_type.as_deref()?;
        let ns = if desc.is_xsd_type() { XSD_NAMESPACE } else { PRIMITIVE_TYPES_NAMESPACE };
        Some(QualifiedName::new(data_type, Some(ns)))
    }

    /// `T` → `T[]`, memoized so repeated calls return one descriptor.
    pub fn array_of(&mut self, element: TypeDescId) -> TypeDescId {
        if let Some(id) = self.arrays.get(&element) {
            return *id;
        }
        let name = format!("{}[]", self.get(element).name);
        let id = self.get_or_insert(TypeKey::Named(name.clone()), || {
            let mut desc = TypeDesc::new(name, TypeKind::Array, TypeFlags::NULLABLE | TypeFlags::CAN_BE_ELEMENT_VALUE);
            desc.element = Some(element);
            desc
        });
        self.arrays.insert(element, id);
        id
    }

    /// `T` → `T?`; only value types have an optional form.
    pub fn optional_of(&mut self, base: TypeDescId) -> MappingResult<TypeDescId> {
        if let Some(id) = self.optionals.get(&base) {
            return Ok(*id);
        }
        let base_desc = self.get(base).clone();
        if !base_desc.is_value_type() {
            return Err(MappingError::unsupported(
                base_desc.name,
                "an optional value",
                "only value types have an optional form",
            ));
        }
        let name = format!("{}?", base_desc.name);
        let id = self.get_or_insert(TypeKey::Named(name.clone()), || {
            let mut flags = base_desc.flags;
            flags.remove(TypeFlags::VALUE_TYPE);
            flags |= TypeFlags::OPTIONAL_VALUE;
            let mut desc = TypeDesc::new(name, base_desc.kind, flags);
            desc.optional_of = Some(base);
            desc.data_type = base_desc.data_type.clone();
            desc
        });
        self.optionals.insert(base, id);
        Ok(id)
    }

    /// Walk `derived` up its base chain looking for `base`.
    pub fn is_derived_from(&self, derived: TypeDescId, base: TypeDescId) -> bool {
        let mut cursor = Some(derived);
        while let Some(id) = cursor {
            if id == base {
                return true;
            }
            cursor = self.get(id).base;
        }
        self.get(base).is_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_idempotent() {
        let mut scope = TypeScope::new();
        let int = scope.named("i32").unwrap();
        assert_eq!(scope.named("i32"), Some(int));
        assert_eq!(scope.data_type(&QualifiedName::xsd("int")).unwrap(), int);
        let arr = scope.array_of(int);
        assert_eq!(scope.array_of(int), arr);
        assert_eq!(scope.get(arr).name, "i32[]");
    }

    #[test]
    fn alternate_data_types_share_the_code_type() {
        let scope = TypeScope::new();
        let date = scope.data_type(&QualifiedName::xsd("date")).unwrap();
        let date_time = scope.named("datetime").unwrap();
        assert_ne!(date, date_time);
        assert_eq!(scope.get(date).name, scope.get(date_time).name);
        assert_eq!(scope.get(date_time).data_type.as_deref(), Some("dateTime"));
    }

    #[test]
    fn unknown_xsd_type_is_a_missing_reference() {
        let scope = TypeScope::new();
        let err = scope.data_type(&QualifiedName::xsd("notAType")).unwrap_err();
        assert!(matches!(err, MappingError::MissingReference { kind: ReferenceKind::Type, .. }));
        assert!(scope.is_known_type("bool"));
        assert!(!scope.is_known_type("object"));
    }

    #[test]
    fn optional_requires_value_type() {
        let mut scope = TypeScope::new();
        let int = scope.named("i32").unwrap();
        let opt = scope.optional_of(int).unwrap();
        assert!(scope.get(opt).is_optional_value());
        assert_eq!(scope.get(opt).optional_of, Some(int));
        let string = scope.string();
        assert!(scope.optional_of(string).is_err());
    }
}
