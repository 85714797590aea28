//! The mapping graph: an arena of mappings addressed by `MappingId`, with
//! derived-type and array-alternate links kept as owned side tables.
pub mod accessor;
pub mod dump;
pub mod scope;

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{MappingError, MappingResult};
use crate::names::{QualifiedName, XSD_NAMESPACE};
use crate::type_desc::{TypeDescId, TypeScope};

pub use accessor::{ANY_ELEMENT_CONSTANT, Accessor, ChoiceIdentifier, MemberMapping, XmlnsAccessor};
pub use scope::{MemberScope, NameTable};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MappingId(u32);

impl MappingId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub type_name: String,
    pub namespace: Option<String>,
    /// `None` only for members mappings, which have no backing type.
    pub type_desc: Option<TypeDescId>,
    pub include_in_schema: bool,
    pub is_anonymous: bool,
    pub is_fully_initialized: bool,
    pub kind: MappingKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MappingKind {
    Struct(StructMapping),
    Array(ArrayMapping),
    Enum(EnumMapping),
    Primitive(PrimitiveMapping),
    Nullable(NullableMapping),
    Members(MembersMapping),
    Special(SpecialMapping),
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructMapping {
    pub members: Vec<MemberMapping>,
    pub base: Option<MappingId>,
    pub xmlns_member: Option<MemberMapping>,
    pub is_open_model: bool,
    /// Members carry explicit particle order.
    pub is_sequence: bool,
    /// Element and attribute names visible in this type, base ones included.
    #[serde(skip)]
    pub local_elements: NameTable<Accessor>,
    #[serde(skip)]
    pub local_attributes: NameTable<Accessor>,
}

impl StructMapping {
    pub fn text_member(&self) -> Option<&MemberMapping> {
        self.members.iter().find(|m| m.text.is_some())
    }

    /// Only text content, no element particles.
    pub fn has_simple_content(&self) -> bool {
        self.text_member().is_some() && !self.members.iter().any(MemberMapping::is_particle)
    }

    pub fn is_mixed(&self) -> bool {
        self.text_member().is_some() && self.members.iter().any(MemberMapping::is_particle)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayMapping {
    pub elements: Vec<Accessor>,
    /// Struct wrapper used when the array is itself a named complex type.
    pub top_level: Option<MappingId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstantMapping {
    pub name: String,
    pub xml_name: String,
    pub value: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumMapping {
    pub constants: Vec<ConstantMapping>,
    pub is_flags: bool,
}

impl EnumMapping {
    pub fn constant_by_xml_name(&self, xml_name: &str) -> Option<&ConstantMapping> {
        self.constants.iter().find(|c| c.xml_name == xml_name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveMapping {
    /// `xs:list` of the underlying type.
    pub is_list: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NullableMapping {
    pub base: MappingId,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembersMapping {
    pub members: Vec<MemberMapping>,
    pub has_wrapper_element: bool,
    pub xmlns_member: Option<MemberMapping>,
    pub is_sequence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum SpecialKind {
    /// Any node: text, elements, comments.
    Node,
    Element,
    Attribute,
    /// Supplies its own schema.
    Serializable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialMapping {
    pub special: SpecialKind,
    /// A wildcard element restricted to one name.
    pub named_any: bool,
    /// xsi:type name of a serializable type.
    pub schema_type: Option<QualifiedName>,
}

/// Owns every mapping of one session plus the `TypeScope` they describe.
#[derive(Debug, Clone, Default)]
pub struct MappingGraph {
    pub types: TypeScope,
    mappings: Vec<Mapping>,
    derived: HashMap<MappingId, Vec<MappingId>>,
    alternates: HashMap<MappingId, Vec<MappingId>>,
    root: Option<MappingId>,
    /// Top-level elements and attributes, one shared scope each.
    pub elements: NameTable<Accessor>,
    pub attributes: NameTable<Accessor>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Mapping {
    pub fn new(type_name: impl Into<String>, namespace: Option<&str>, type_desc: Option<TypeDescId>, kind: MappingKind) -> Self {
        Self {
            type_name: type_name.into(),
            namespace: namespace.map(str::to_owned),
            type_desc,
            include_in_schema: true,
            is_anonymous: false,
            is_fully_initialized: false,
            kind,
        }
    }

    pub fn qname(&self) -> QualifiedName {
        QualifiedName { name: self.type_name.clone(), namespace: self.namespace.clone() }
    }

    pub fn as_struct(&self) -> Option<&StructMapping> {
        match &self.kind {
            MappingKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayMapping> {
        match &self.kind {
            MappingKind::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumMapping> {
        match &self.kind {
            MappingKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, MappingKind::Struct(_))
    }
    pub fn is_array(&self) -> bool {
        matches!(self.kind, MappingKind::Array(_))
    }
    pub fn is_members(&self) -> bool {
        matches!(self.kind, MappingKind::Members(_))
    }
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, MappingKind::Primitive(_))
    }
}

impl MappingGraph {
    pub fn new(types: TypeScope) -> Self {
        Self { types, ..Self::default() }
    }

    /// Register a mapping; ids follow registration order.
    pub fn add(&mut self, mapping: Mapping) -> MappingId {
        let id = MappingId(self.mappings.len() as u32);
        self.mappings.push(mapping);
        id
    }

    pub fn get(&self, id: MappingId) -> &Mapping {
        &self.mappings[id.index()]
    }

    pub fn get_mut(&mut self, id: MappingId) -> &mut Mapping {
        &mut self.mappings[id.index()]
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = MappingId> + '_ {
        (0..self.mappings.len() as u32).map(MappingId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MappingId, &Mapping)> {
        self.ids().zip(self.mappings.iter())
    }

    pub fn struct_mut(&mut self, id: MappingId) -> MappingResult<&mut StructMapping> {
        match &mut self.get_mut(id).kind {
            MappingKind::Struct(s) => Ok(s),
            other => Err(MappingError::Internal(format!("mapping {id:?} is not a struct but {}", kind_name(other)))),
        }
    }

    pub fn array_mut(&mut self, id: MappingId) -> MappingResult<&mut ArrayMapping> {
        match &mut self.get_mut(id).kind {
            MappingKind::Array(a) => Ok(a),
            other => Err(MappingError::Internal(format!("mapping {id:?} is not an array but {}", kind_name(other)))),
        }
    }

    /// The `xs:anyType` sentinel every struct base chain ends in.
    pub fn root_mapping(&mut self) -> MappingId {
        if let Some(root) = self.root {
            return root;
        }
        let mut mapping = Mapping::new(
            "anyType",
            Some(XSD_NAMESPACE),
            Some(self.types.root()),
            MappingKind::Struct(StructMapping::default()),
        );
        mapping.include_in_schema = false;
        mapping.is_fully_initialized = true;
        let id = self.add(mapping);
        self.root = Some(id);
        id
    }

    pub fn root(&self) -> Option<MappingId> {
        self.root
    }

    pub fn is_root(&self, id: MappingId) -> bool {
        self.root == Some(id)
    }

    /// Link `derived` under `base`; also records the base on the struct.
    pub fn set_base(&mut self, derived: MappingId, base: MappingId) -> MappingResult<()> {
        self.struct_mut(derived)?.base = Some(base);
        let siblings = self.derived.entry(base).or_default();
        if !siblings.contains(&derived) {
            siblings.push(derived);
        }
        Ok(())
    }

    /// Register a derived link without touching the struct (serializable
    /// and special mappings chain this way).
    pub fn add_derived(&mut self, base: MappingId, derived: MappingId) {
        let siblings = self.derived.entry(base).or_default();
        if !siblings.contains(&derived) {
            siblings.push(derived);
        }
    }

    pub fn derived_mappings(&self, base: MappingId) -> &[MappingId] {
        self.derived.get(&base).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn base_of(&self, id: MappingId) -> Option<MappingId> {
        self.get(id).as_struct().and_then(|s| s.base)
    }

    /// `id` and its base chain, nearest first, the root sentinel excluded.
    pub fn base_chain(&self, id: MappingId) -> Vec<MappingId> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.is_root(current) || chain.contains(&current) {
                break;
            }
            chain.push(current);
            cursor = self.base_of(current);
        }
        chain
    }

    pub fn add_alternate(&mut self, first: MappingId, alternate: MappingId) {
        let chain = self.alternates.entry(first).or_default();
        if !chain.contains(&alternate) {
            chain.push(alternate);
        }
    }

    /// The `Next` chain of array shapes sharing `first`'s default name.
    pub fn alternates(&self, first: MappingId) -> &[MappingId] {
        self.alternates.get(&first).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Step through nullable wrappers.
    pub fn unwrap_nullable(&self, mut id: MappingId) -> MappingId {
        while let MappingKind::Nullable(n) = &self.get(id).kind {
            id = n.base;
        }
        id
    }

    /// Structural equality of two element accessor sets.
    pub fn elements_match(&self, a: &[Accessor], b: &[Accessor]) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| {
                x.name == y.name
                    && x.namespace == y.namespace
                    && x.form == y.form
                    && x.is_nullable == y.is_nullable
                    && x.any == y.any
                    && (x.mapping == y.mapping || self.get(x.mapping).type_desc == self.get(y.mapping).type_desc)
            })
    }

    /// Members of a struct or members mapping, empty for anything else.
    pub fn members_of(&self, id: MappingId) -> &[MemberMapping] {
        match &self.get(id).kind {
            MappingKind::Struct(s) => &s.members,
            MappingKind::Members(m) => &m.members,
            _ => &[],
        }
    }
}

pub(crate) fn kind_name(kind: &MappingKind) -> &'static str {
    match kind {
        MappingKind::Struct(_) => "struct",
        MappingKind::Array(_) => "array",
        MappingKind::Enum(_) => "enum",
        MappingKind::Primitive(_) => "primitive",
        MappingKind::Nullable(_) => "nullable",
        MappingKind::Members(_) => "members",
        MappingKind::Special(_) => "special",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn struct_mapping(graph: &mut MappingGraph, name: &str) -> MappingId {
        let desc = graph.types.root();
        graph.add(Mapping::new(name, Some("urn:t"), Some(desc), MappingKind::Struct(StructMapping::default())))
    }

    #[test]
    fn derived_links_are_kept_per_base() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let base = struct_mapping(&mut graph, "Base");
        let a = struct_mapping(&mut graph, "A");
        let b = struct_mapping(&mut graph, "B");
        graph.set_base(a, base).unwrap();
        graph.set_base(b, base).unwrap();
        graph.set_base(a, base).unwrap();
        assert_eq!(graph.derived_mappings(base), &[a, b]);
        assert_eq!(graph.base_chain(a), vec![a, base]);
    }

    #[test]
    fn root_sentinel_is_created_once() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let root = graph.root_mapping();
        assert_eq!(graph.root_mapping(), root);
        assert_eq!(graph.get(root).qname(), QualifiedName::xsd("anyType"));
        assert!(!graph.get(root).include_in_schema);
    }

    #[test]
    fn set_base_rejects_non_structs() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let string = graph.types.string();
        let prim = graph.add(Mapping::new("string", Some(XSD_NAMESPACE), Some(string), MappingKind::Primitive(PrimitiveMapping::default())));
        let base = struct_mapping(&mut graph, "Base");
        assert!(matches!(graph.set_base(prim, base), Err(MappingError::Internal(_))));
    }
}
