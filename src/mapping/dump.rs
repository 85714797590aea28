//! JSON views of a finished graph: the full walk contract for inspection, and
//! a name-level shape used to compare two graphs of the same model.
use std::collections::HashSet;

use serde::Serialize;

use crate::default_value::DefaultValue;
use crate::mapping::{Accessor, MappingGraph, MappingId, MappingKind, MemberMapping, kind_name};
use crate::names::XmlForm;

// ------ Walk contract ------ //

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDump {
    pub elements: Vec<AccessorDump>,
    pub attributes: Vec<AccessorDump>,
    pub mappings: Vec<MappingDump>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessorDump {
    pub name: String,
    pub form: XmlForm,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub any: bool,
    pub mapping: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDump {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<AccessorDump>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<AccessorDump>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<AccessorDump>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub xmlns: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_identifier: Option<(String, Vec<String>)>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub check_specified: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub repeats: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDump {
    pub id: MappingId,
    pub kind: &'static str,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_desc: Option<String>,
    pub include_in_schema: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub derived: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<MemberDump>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<AccessorDump>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<(String, String, i64)>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_flags: bool,
}

impl MappingGraph {
    pub fn dump(&self) -> GraphDump {
        GraphDump {
            elements: self.elements.values().map(|a| self.dump_accessor(a)).collect(),
            attributes: self.attributes.values().map(|a| self.dump_accessor(a)).collect(),
            mappings: self.iter().map(|(id, _)| self.dump_mapping(id)).collect(),
        }
    }

    fn label(&self, id: MappingId) -> String {
        self.get(id).qname().to_string()
    }

    fn dump_accessor(&self, accessor: &Accessor) -> AccessorDump {
        AccessorDump {
            name: accessor.qname().to_string(),
            form: accessor.form,
            is_nullable: accessor.is_nullable,
            default: accessor.default.clone(),
            any: accessor.any,
            mapping: self.label(accessor.mapping),
        }
    }

    fn dump_member(&self, member: &MemberMapping) -> MemberDump {
        MemberDump {
            name: member.name.clone(),
            elements: member.elements.iter().map(|a| self.dump_accessor(a)).collect(),
            attribute: member.attribute.as_ref().map(|a| self.dump_accessor(a)),
            text: member.text.as_ref().map(|a| self.dump_accessor(a)),
            xmlns: member.xmlns.is_some(),
            choice_identifier: member
                .choice_identifier
                .as_ref()
                .map(|c| (c.member_name.clone(), c.member_ids.clone())),
            check_specified: member.check_specified,
            repeats: member.repeats,
            sequence_id: member.sequence_id,
            ignore: member.ignore,
        }
    }

    fn dump_mapping(&self, id: MappingId) -> MappingDump {
        let mapping = self.get(id);
        let mut dump = MappingDump {
            id,
            kind: kind_name(&mapping.kind),
            type_name: mapping.qname().to_string(),
            type_desc: mapping.type_desc.map(|d| self.types.get(d).name.clone()),
            include_in_schema: mapping.include_in_schema,
            is_anonymous: mapping.is_anonymous,
            base: None,
            derived: self.derived_mappings(id).iter().map(|d| self.label(*d)).collect(),
            members: Vec::new(),
            elements: Vec::new(),
            next: self.alternates(id).iter().map(|d| self.label(*d)).collect(),
            constants: Vec::new(),
            is_flags: false,
        };
        match &mapping.kind {
            MappingKind::Struct(s) => {
                dump.base = s.base.map(|b| self.label(b));
                dump.members = s.members.iter().chain(s.xmlns_member.iter()).map(|m| self.dump_member(m)).collect();
            }
            MappingKind::Members(m) => {
                dump.members = m.members.iter().map(|m| self.dump_member(m)).collect();
            }
            MappingKind::Array(a) => {
                dump.elements = a.elements.iter().map(|e| self.dump_accessor(e)).collect();
            }
            MappingKind::Enum(e) => {
                dump.constants = e
                    .constants
                    .iter()
                    .map(|c| (c.name.clone(), c.xml_name.clone(), c.value))
                    .collect();
                dump.is_flags = e.is_flags;
            }
            MappingKind::Nullable(n) => dump.base = Some(self.label(n.base)),
            MappingKind::Primitive(_) | MappingKind::Special(_) => {}
        }
        dump
    }
}

// ------ Shapes ------ //

/// Accessor names, namespaces and nullability reachable from one accessor;
/// recursion is cut at the first repeated mapping on a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub name: String,
    pub is_nullable: bool,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Shape>,
}

impl MappingGraph {
    pub fn shape_of(&self, accessor: &Accessor) -> Shape {
        let mut path = HashSet::new();
        self.shape_inner(accessor.qname().to_string(), accessor, &mut path)
    }

    /// Shapes of every top-level element, in registration order.
    pub fn element_shapes(&self) -> Vec<Shape> {
        self.elements.values().map(|a| self.shape_of(a)).collect()
    }

    fn shape_inner(&self, name: String, accessor: &Accessor, path: &mut HashSet<MappingId>) -> Shape {
        let id = self.unwrap_nullable(accessor.mapping);
        let mapping = self.get(id);
        let mut shape = Shape {
            name,
            is_nullable: accessor.is_nullable,
            kind: kind_name(&mapping.kind),
            children: Vec::new(),
        };
        if !path.insert(id) {
            shape.kind = "recursive";
            return shape;
        }
        match &mapping.kind {
            MappingKind::Struct(_) | MappingKind::Members(_) => {
                let chain = self.base_chain(id);
                let members: Vec<&MemberMapping> =
                    chain.iter().rev().flat_map(|owner| self.members_of(*owner)).collect();
                shape.children = self.member_shapes(&members, path);
            }
            MappingKind::Array(a) => {
                for element in &a.elements {
                    shape.children.push(self.shape_inner(element.qname().to_string(), element, path));
                }
            }
            _ => {}
        }
        path.remove(&id);
        shape
    }

    /// Elements first, then attributes, then text, so that member order
    /// within a category is all that matters.
    fn member_shapes(&self, members: &[&MemberMapping], path: &mut HashSet<MappingId>) -> Vec<Shape> {
        let mut out = Vec::new();
        for element in members.iter().flat_map(|m| &m.elements) {
            out.push(self.shape_inner(element.qname().to_string(), element, path));
        }
        for attribute in members.iter().filter_map(|m| m.attribute.as_ref()) {
            out.push(self.shape_inner(format!("@{}", attribute.qname()), attribute, path));
        }
        for text in members.iter().filter_map(|m| m.text.as_ref()) {
            out.push(self.shape_inner("#text".to_owned(), text, path));
        }
        out
    }
}
