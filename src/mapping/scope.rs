//! `(local name, namespace)` keyed tables and the reconciliation rule for
//! accessors that meet in one shared scope.
use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{MappingError, MappingResult};
use crate::mapping::{Accessor, MappingGraph, MappingId, MappingKind, MemberMapping, StructMapping};
use crate::names::QualifiedName;
use crate::type_desc::TypeDescId;

/// Insertion-ordered table with insert-or-get semantics.
#[derive(Debug, Clone)]
pub struct NameTable<T> {
    entries: IndexMap<QualifiedName, T>,
}

impl<T> Default for NameTable<T> {
    fn default() -> Self {
        Self { entries: IndexMap::new() }
    }
}

impl<T> NameTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, ns: Option<&str>) -> Option<&T> {
        self.entries.get(&QualifiedName::new(name, ns))
    }

    pub fn get_q(&self, key: &QualifiedName) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn contains(&self, name: &str, ns: Option<&str>) -> bool {
        self.get(name, ns).is_some()
    }

    /// Insert; an existing entry under the key is replaced.
    pub fn insert(&mut self, name: &str, ns: Option<&str>, value: T) {
        self.entries.insert(QualifiedName::new(name, ns), value);
    }

    /// Insert unless the key is taken; returns the entry now in the table.
    pub fn get_or_insert(&mut self, name: &str, ns: Option<&str>, value: T) -> &T {
        self.entries.entry(QualifiedName::new(name, ns)).or_insert(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QualifiedName, &T)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorScope {
    Element,
    Attribute,
}

impl MappingGraph {
    /// Add a top-level element or attribute to its shared scope, reusing a
    /// compatible accessor already registered under the same name.
    pub fn reconcile_accessor(&mut self, scope: AccessorScope, accessor: Accessor) -> MappingResult<Accessor> {
        if accessor.any && accessor.name.is_empty() {
            return Ok(accessor);
        }
        let table = match scope {
            AccessorScope::Element => &self.elements,
            AccessorScope::Attribute => &self.attributes,
        };
        let Some(existing) = table.get(&accessor.name, accessor.namespace.as_deref()).cloned() else {
            let mut accessor = accessor;
            accessor.is_top_level_in_schema = true;
            let table = match scope {
                AccessorScope::Element => &mut self.elements,
                AccessorScope::Attribute => &mut self.attributes,
            };
            table.entries.insert(accessor.qname(), accessor.clone());
            return Ok(accessor);
        };

        if existing.mapping == accessor.mapping {
            return Ok(existing);
        }
        let qname = accessor.qname();
        let a = self.get(accessor.mapping);
        let b = self.get(existing.mapping);

        if a.is_members() || b.is_members() {
            return Err(MappingError::conflict(qname, "a parameter list and a type are mapped to the same element"));
        }
        if self.type_descs_compatible(accessor.mapping, existing.mapping) {
            let ours = accessor.default.as_ref().map(|d| d.to_xml_string());
            let theirs = existing.default.as_ref().map(|d| d.to_xml_string());
            if ours == theirs {
                trace!(name = %qname, "reusing compatible top-level accessor");
                return Ok(existing);
            }
            return Err(MappingError::conflict(
                qname,
                format!(
                    "default value `{}` differs from `{}`",
                    ours.unwrap_or_default(),
                    theirs.unwrap_or_default()
                ),
            ));
        }
        if a.is_array() && b.is_array() {
            trace!(name = %qname, "chaining array shape under existing element");
            self.add_alternate(existing.mapping, accessor.mapping);
            return Ok(existing);
        }
        Err(MappingError::conflict(
            qname,
            format!(
                "types `{}` and `{}` are both mapped to this name",
                self.get(existing.mapping).type_name,
                self.get(accessor.mapping).type_name
            ),
        ))
    }

    /// Equal descriptors, counting `T?` as equal to `T`.
    fn type_descs_compatible(&self, a: MappingId, b: MappingId) -> bool {
        match (self.effective_desc(a), self.effective_desc(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn effective_desc(&self, id: MappingId) -> Option<TypeDescId> {
        let mapping = self.get(id);
        let desc = match &mapping.kind {
            MappingKind::Nullable(n) => self.get(n.base).type_desc,
            _ => mapping.type_desc,
        }?;
        Some(self.types.get(desc).optional_of.unwrap_or(desc))
    }
}

// ------ Member scope ------ //

/// Members of one struct (or parameter list) as they are collected, with the
/// element and attribute names already visible in it.
#[derive(Debug, Default)]
pub struct MemberScope {
    pub members: Vec<MemberMapping>,
    pub xmlns_member: Option<MemberMapping>,
    pub is_sequence: bool,
    pub local_elements: NameTable<Accessor>,
    pub local_attributes: NameTable<Accessor>,
    has_text: bool,
    inherits_xmlns: bool,
}

impl MemberScope {
    /// Seed from `base` and its chain. Element and attribute names are only
    /// inherited when the base has no explicit particle order.
    pub fn for_base(graph: &MappingGraph, base: MappingId) -> Self {
        let chain = graph.base_chain(base);
        let in_chain = |test: fn(&StructMapping) -> bool| chain.iter().any(|b| graph.get(*b).as_struct().is_some_and(test));
        let mut scope = Self {
            has_text: in_chain(|s| s.text_member().is_some()),
            inherits_xmlns: in_chain(|s| s.xmlns_member.is_some()),
            ..Self::default()
        };
        if let Some(base) = graph.get(base).as_struct().filter(|s| !s.is_sequence) {
            scope.local_elements = base.local_elements.clone();
            scope.local_attributes = base.local_attributes.clone();
        }
        scope
    }

    pub fn has_text(&self) -> bool {
        self.has_text
    }

    pub fn add(&mut self, owner: &str, member: MemberMapping) -> MappingResult<()> {
        if member.xmlns.is_some() {
            if self.inherits_xmlns || self.xmlns_member.is_some() {
                return Err(MappingError::annotation(
                    format!("{owner}.{}", member.name),
                    "only one xmlns member is allowed per type hierarchy",
                ));
            }
            self.xmlns_member = Some(member);
            return Ok(());
        }
        if member.text.is_some() {
            if self.has_text {
                return Err(MappingError::annotation(
                    format!("{owner}.{}", member.name),
                    "only one text member is allowed per type hierarchy",
                ));
            }
            self.has_text = true;
        }
        for element in &member.elements {
            if element.any && element.name.is_empty() {
                continue;
            }
            if self.local_elements.contains(&element.name, element.namespace.as_deref()) {
                return Err(MappingError::conflict(
                    element.qname(),
                    format!("element is declared twice in `{owner}`"),
                ));
            }
            self.local_elements.insert(&element.name, element.namespace.as_deref(), element.clone());
        }
        if let Some(attribute) = &member.attribute {
            if !(attribute.any && attribute.name.is_empty()) {
                if self.local_attributes.contains(&attribute.name, attribute.namespace.as_deref()) {
                    return Err(MappingError::conflict(
                        attribute.qname(),
                        format!("attribute is declared twice in `{owner}`"),
                    ));
                }
                self.local_attributes.insert(&attribute.name, attribute.namespace.as_deref(), attribute.clone());
            }
        }
        self.is_sequence |= member.is_sequence();
        self.members.push(member);
        Ok(())
    }

    /// Validate explicit order and sort: non-particles first, then particles
    /// by their sequence id.
    pub fn finish(mut self, owner: &str, base_is_sequence: bool) -> MappingResult<Self> {
        let has_particles = self.members.iter().any(MemberMapping::is_particle);
        if base_is_sequence && !self.is_sequence && has_particles {
            return Err(MappingError::sequence(owner, "the base type orders its particles but this type does not"));
        }
        if !self.is_sequence {
            return Ok(self);
        }
        let mut seen = HashSet::new();
        for member in self.members.iter().filter(|m| m.is_particle()) {
            let Some(id) = member.sequence_id else {
                return Err(MappingError::sequence(
                    owner,
                    format!("member `{}` has no order while others do", member.name),
                ));
            };
            if !seen.insert(id) {
                return Err(MappingError::sequence(owner, format!("order {id} is used twice")));
            }
        }
        self.members
            .sort_by_key(|m| if m.is_particle() { (1, m.sequence_id.unwrap_or(0)) } else { (0, 0) });
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_value::DefaultValue;
    use crate::mapping::{ArrayMapping, Mapping, MembersMapping, NullableMapping, PrimitiveMapping, StructMapping};
    use crate::type_desc::TypeScope;

    fn primitive(graph: &mut MappingGraph, code: &str) -> MappingId {
        let desc = graph.types.named(code).unwrap();
        graph.add(Mapping::new(code, None, Some(desc), MappingKind::Primitive(PrimitiveMapping::default())))
    }

    #[test]
    fn first_insert_becomes_top_level() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let int = primitive(&mut graph, "i32");
        let acc = graph
            .reconcile_accessor(AccessorScope::Element, Accessor::new("Id", Some("urn:a"), int))
            .unwrap();
        assert!(acc.is_top_level_in_schema);
        assert!(graph.elements.contains("Id", Some("urn:a")));
    }

    #[test]
    fn equal_descs_merge_and_defaults_must_agree() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let a = primitive(&mut graph, "i32");
        let b = primitive(&mut graph, "i32");
        let first = graph.reconcile_accessor(AccessorScope::Attribute, Accessor::new("n", None, a)).unwrap();
        let again = graph.reconcile_accessor(AccessorScope::Attribute, Accessor::new("n", None, b)).unwrap();
        assert_eq!(again.mapping, first.mapping);

        let mut with_default = Accessor::new("n", None, b);
        with_default.default = Some(DefaultValue::Int(3));
        let err = graph.reconcile_accessor(AccessorScope::Attribute, with_default).unwrap_err();
        assert!(matches!(err, MappingError::Conflict { .. }));
    }

    #[test]
    fn nullable_is_compatible_with_its_base() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let int = primitive(&mut graph, "i32");
        let int_desc = graph.types.named("i32").unwrap();
        let opt_desc = graph.types.optional_of(int_desc).unwrap();
        let nullable = graph.add(Mapping::new("int", None, Some(opt_desc), MappingKind::Nullable(NullableMapping { base: int })));
        graph.reconcile_accessor(AccessorScope::Element, Accessor::new("v", None, int)).unwrap();
        let merged = graph.reconcile_accessor(AccessorScope::Element, Accessor::new("v", None, nullable)).unwrap();
        assert_eq!(merged.mapping, int);
    }

    #[test]
    fn members_and_mismatched_types_conflict() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let int = primitive(&mut graph, "i32");
        let string = primitive(&mut graph, "string");
        let members = graph.add(Mapping::new("Op", None, None, MappingKind::Members(MembersMapping::default())));
        graph.reconcile_accessor(AccessorScope::Element, Accessor::new("x", None, int)).unwrap();
        assert!(graph.reconcile_accessor(AccessorScope::Element, Accessor::new("x", None, string)).is_err());
        assert!(graph.reconcile_accessor(AccessorScope::Element, Accessor::new("x", None, members)).is_err());
    }

    #[test]
    fn arrays_chain_instead_of_conflicting() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let root = graph.types.root();
        let s = graph.add(Mapping::new("S", None, Some(root), MappingKind::Struct(StructMapping::default())));
        let int = graph.types.named("i32").unwrap();
        let string = graph.types.string();
        let ints = graph.types.array_of(int);
        let strings = graph.types.array_of(string);
        let a = graph.add(Mapping::new("ArrayOfX", None, Some(ints), MappingKind::Array(ArrayMapping::default())));
        let b = graph.add(Mapping::new("ArrayOfX", None, Some(strings), MappingKind::Array(ArrayMapping::default())));
        graph.reconcile_accessor(AccessorScope::Element, Accessor::new("list", None, a)).unwrap();
        let merged = graph.reconcile_accessor(AccessorScope::Element, Accessor::new("list", None, b)).unwrap();
        assert_eq!(merged.mapping, a);
        assert_eq!(graph.alternates(a), &[b]);
        let wild = Accessor { any: true, ..Accessor::new("", None, s) };
        assert_eq!(graph.reconcile_accessor(AccessorScope::Element, wild.clone()).unwrap(), wild);
    }

    fn particle(graph: &mut MappingGraph, name: &str, order: Option<u32>) -> MemberMapping {
        let int = primitive(graph, "i32");
        let mut member = MemberMapping::new(name, graph.types.named("i32").unwrap());
        member.elements.push(Accessor::new(name, None, int));
        member.sequence_id = order;
        member
    }

    fn scope_of(members: Vec<MemberMapping>) -> MemberScope {
        let mut scope = MemberScope::default();
        for member in members {
            scope.add("T", member).unwrap();
        }
        scope
    }

    #[test]
    fn finish_sorts_particles_by_order() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let mut attr = MemberMapping::new("Id", graph.types.string());
        attr.attribute = Some(Accessor::new("id", None, primitive(&mut graph, "string")));
        let members = vec![particle(&mut graph, "b", Some(2)), attr, particle(&mut graph, "a", Some(1))];
        let finished = scope_of(members).finish("T", false).unwrap();
        let names: Vec<_> = finished.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Id", "a", "b"]);
        assert!(finished.is_sequence);
    }

    #[test]
    fn order_used_twice_is_inconsistent() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let members = vec![particle(&mut graph, "a", Some(1)), particle(&mut graph, "b", Some(1))];
        let err = scope_of(members).finish("T", false).unwrap_err();
        assert!(matches!(err, MappingError::SequenceConsistency { .. }));
    }

    #[test]
    fn partial_order_is_inconsistent() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let members = vec![particle(&mut graph, "a", Some(1)), particle(&mut graph, "b", None)];
        let err = scope_of(members).finish("T", false).unwrap_err();
        assert!(matches!(err, MappingError::SequenceConsistency { ref type_name, .. } if type_name == "T"));
    }

    #[test]
    fn unordered_type_cannot_extend_an_ordered_base() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let members = vec![particle(&mut graph, "a", None)];
        assert!(scope_of(members).finish("T", false).is_ok());

        let members = vec![particle(&mut graph, "a", None)];
        let err = scope_of(members).finish("T", true).unwrap_err();
        assert!(matches!(err, MappingError::SequenceConsistency { .. }));

        assert!(MemberScope::default().finish("T", true).is_ok());
    }
}
