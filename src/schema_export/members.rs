//! Struct content: members become a sequence of element particles (a choice
//! for members with several alternatives), attribute uses and wildcards.
use tracing::debug;

use crate::error::{MappingError, MappingResult};
use crate::mapping::{Accessor, MappingId, MemberMapping};
use crate::names::XmlForm;
use crate::schema_export::{SchemaExporter, TypeRef};
use crate::xsd::{
    AttributeDecl, AttributeItem, AttributeUse, ComplexType, Derivation, DerivationMethod, ElementDecl, MaxOccurs,
    ModelGroup, Particle, SimpleContent, SimpleType, Wildcard,
};

impl SchemaExporter<'_> {
    pub(super) fn struct_type(&mut self, id: MappingId, name: Option<String>) -> MappingResult<ComplexType> {
        let graph = self.graph;
        let mapping = graph.get(id);
        let Some(s) = mapping.as_struct() else {
            return Err(MappingError::Internal(format!("`{}` is not a struct", mapping.type_name)));
        };
        let ns = mapping.namespace.as_deref();
        let mut ct = ComplexType {
            name,
            is_abstract: mapping.type_desc.is_some_and(|d| graph.types.get(d).is_abstract()),
            ..ComplexType::default()
        };

        let base = s.base.filter(|b| !graph.is_root(*b));
        if let Some(base) = base {
            let TypeRef::Named(base_name) = self.type_ref(base, ns)? else {
                return Err(MappingError::unsupported(
                    mapping.type_name.clone(),
                    "a derived type",
                    "an anonymous type cannot be a base type",
                ));
            };
            let simple_content = graph
                .base_chain(base)
                .iter()
                .any(|b| graph.get(*b).as_struct().is_some_and(|s| s.has_simple_content()));
            ct.derivation = Some(Derivation { method: DerivationMethod::Extension, base: base_name, simple_content });
        } else if let Some(text) = s.text_member().filter(|_| s.has_simple_content()).and_then(|m| m.text.as_ref()) {
            let TypeRef::Named(value_type) = self.type_ref(text.mapping, ns)? else {
                return Err(MappingError::unsupported(
                    mapping.type_name.clone(),
                    "simple content",
                    "text content needs a named simple type",
                ));
            };
            ct.derivation = Some(Derivation { method: DerivationMethod::Extension, base: value_type, simple_content: true });
        }

        self.member_content(&s.members, s.xmlns_member.is_some(), ns, &mut ct)?;

        if s.is_open_model {
            let any = Particle::Any(Wildcard { namespace: None, min_occurs: 0, max_occurs: MaxOccurs::UNBOUNDED });
            match &mut ct.particle {
                Some(Particle::Sequence(group)) => group.items.push(any),
                Some(_) => {}
                None => ct.particle = Some(Particle::Sequence(ModelGroup::of(vec![any]))),
            }
            ct.any_attribute.get_or_insert_with(Wildcard::default);
        }
        Ok(ct)
    }

    /// Write `members` into `ct`. Text goes to the derivation when the
    /// content is simple and marks the type mixed otherwise.
    pub(super) fn member_content(
        &mut self,
        members: &[MemberMapping],
        keep_namespaces: bool,
        ns: Option<&str>,
        ct: &mut ComplexType,
    ) -> MappingResult<()> {
        let simple = ct.derivation.as_ref().is_some_and(|d| d.simple_content);
        let mut particles = Vec::new();
        for member in members {
            if member.ignore || member.xmlns.is_some() {
                continue;
            }
            if member.text.is_some() {
                ct.is_mixed |= !simple;
                continue;
            }
            if let Some(attribute) = &member.attribute {
                if attribute.any {
                    ct.any_attribute = Some(Wildcard { namespace: attribute.namespace.clone(), ..Wildcard::default() });
                } else {
                    let item = self.attribute_use(member, attribute, ns)?;
                    ct.attributes.push(item);
                }
                continue;
            }
            if !member.elements.is_empty() {
                particles.push(self.member_particle(member, ns)?);
            }
        }
        if !particles.is_empty() {
            ct.particle = Some(Particle::Sequence(ModelGroup::of(particles)));
        }
        ct.keep_namespace_declarations = keep_namespaces;
        Ok(())
    }

    fn member_particle(&mut self, member: &MemberMapping, ns: Option<&str>) -> MappingResult<Particle> {
        let min = self.min_occurs(member);
        if let [single] = member.elements.as_slice() {
            return self.element_particle(single, ns, min, member.repeats);
        }
        let mut items = Vec::with_capacity(member.elements.len());
        for element in &member.elements {
            items.push(self.element_particle(element, ns, 1, false)?);
        }
        Ok(Particle::Choice(ModelGroup {
            min_occurs: min,
            max_occurs: if member.repeats { MaxOccurs::UNBOUNDED } else { MaxOccurs::ONE },
            items,
        }))
    }

    /// Required only for a value that is always written: a non-repeating
    /// value type without a specified flag or default, or a nillable element.
    fn min_occurs(&self, member: &MemberMapping) -> u32 {
        if member.repeats || member.check_specified || member.elements.iter().any(|e| e.default.is_some()) {
            return 0;
        }
        let nillable = member.elements.len() == 1 && member.elements[0].is_nullable;
        u32::from(nillable || self.graph.types.get(member.type_desc).is_value_type())
    }

    pub(super) fn element_particle(
        &mut self,
        accessor: &Accessor,
        owner_ns: Option<&str>,
        min: u32,
        repeats: bool,
    ) -> MappingResult<Particle> {
        let max = if repeats { MaxOccurs::UNBOUNDED } else { MaxOccurs::ONE };
        if accessor.any {
            return Ok(Particle::Any(Wildcard { namespace: accessor.namespace.clone(), min_occurs: min, max_occurs: max }));
        }
        let ns = accessor.namespace.as_deref();
        if ns.is_some() && ns != owner_ns {
            self.export_element(accessor)?;
            self.ensure_schema(owner_ns);
            if self.schemas.add_import(owner_ns, ns) {
                debug!(element = %accessor.qname(), "referencing element of another namespace");
            }
            return Ok(Particle::Element(ElementDecl::reference(accessor.qname()).occurs(min, max)));
        }

        let mut decl = ElementDecl {
            name: Some(accessor.name.clone()),
            nillable: accessor.is_nullable,
            ..ElementDecl::default()
        }
        .occurs(min, max);
        let form = if ns.is_none() && owner_ns.is_some() { XmlForm::Unqualified } else { XmlForm::Qualified };
        if form != self.schemas.element_form_default(owner_ns) {
            decl.form = Some(form);
        }
        self.type_ref(accessor.mapping, owner_ns)?.apply_to_element(&mut decl);
        if !repeats {
            decl.default_value = self.default_text(accessor)?;
        }
        Ok(Particle::Element(decl))
    }

    fn attribute_use(&mut self, member: &MemberMapping, accessor: &Accessor, owner_ns: Option<&str>) -> MappingResult<AttributeItem> {
        if accessor.is_special_xml_namespace {
            return Ok(AttributeItem::Attribute(AttributeDecl { ref_name: Some(accessor.qname()), ..AttributeDecl::default() }));
        }
        let required = !member.check_specified
            && accessor.default.is_none()
            && self.graph.types.get(member.type_desc).is_value_type();
        let use_ = if required { AttributeUse::Required } else { AttributeUse::Optional };

        let ns = accessor.namespace.as_deref();
        if ns.is_some() && ns != owner_ns {
            self.export_attribute(accessor)?;
            self.ensure_schema(owner_ns);
            if self.schemas.add_import(owner_ns, ns) {
                debug!(attribute = %accessor.qname(), "referencing attribute of another namespace");
            }
            return Ok(AttributeItem::Attribute(AttributeDecl {
                ref_name: Some(accessor.qname()),
                use_,
                ..AttributeDecl::default()
            }));
        }

        let mut decl = AttributeDecl { name: Some(accessor.name.clone()), use_, ..AttributeDecl::default() };
        let form = if ns.is_some() { XmlForm::Qualified } else { XmlForm::Unqualified };
        if form != self.schemas.attribute_form_default(owner_ns) {
            decl.form = Some(form);
        }
        self.attribute_type(accessor, owner_ns)?.apply_to_attribute(&mut decl, &accessor.name)?;
        decl.default_value = self.default_text(accessor)?;
        Ok(AttributeItem::Attribute(decl))
    }

    /// The attribute's simple type; list attributes wrap it in `xs:list`.
    pub(super) fn attribute_type(&mut self, accessor: &Accessor, ns: Option<&str>) -> MappingResult<TypeRef> {
        let item = self.type_ref(accessor.mapping, ns)?;
        if !accessor.is_list {
            return Ok(item);
        }
        let content = match item {
            TypeRef::Named(name) => SimpleContent::List { item_type: Some(name), simple_type: None },
            TypeRef::Simple(st) => SimpleContent::List { item_type: None, simple_type: Some(Box::new(st)) },
            TypeRef::Complex(_) => {
                return Err(MappingError::unsupported(
                    accessor.name.clone(),
                    "a list attribute",
                    "list items must be simple types",
                ));
            }
        };
        Ok(TypeRef::Simple(SimpleType { name: None, content }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportOptions;
    use crate::mapping::scope::AccessorScope;
    use crate::mapping::{Mapping, MappingGraph, MappingKind, StructMapping};
    use crate::names::{QualifiedName, XSD_NAMESPACE};
    use crate::type_desc::TypeScope;
    use crate::xsd::SchemaType;

    fn int_mapping(graph: &mut MappingGraph) -> MappingId {
        let desc = graph.types.data_type(&QualifiedName::xsd("int")).unwrap();
        graph.add(Mapping::new("int", Some(XSD_NAMESPACE), Some(desc), MappingKind::Primitive(Default::default())))
    }

    fn exported_type(graph: &MappingGraph, name: &str) -> ComplexType {
        let mut exporter = SchemaExporter::new(graph, ExportOptions::default());
        exporter.export_graph().unwrap();
        let set = exporter.finish();
        match set.find_type(&QualifiedName::new(name, Some("urn:a"))) {
            Some(SchemaType::Complex(ct)) => ct.clone(),
            other => panic!("expected complex type, got {other:?}"),
        }
    }

    #[test]
    fn value_members_are_required_and_specified_ones_optional() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let int = int_mapping(&mut graph);
        let int_desc = graph.types.data_type(&QualifiedName::xsd("int")).unwrap();
        let root = graph.types.root();
        let mut id = MemberMapping::new("Id", int_desc);
        id.elements.push(Accessor::new("Id", Some("urn:a"), int));
        let mut count = MemberMapping::new("Count", int_desc);
        count.check_specified = true;
        count.elements.push(Accessor::new("Count", Some("urn:a"), int));
        let mut size = MemberMapping::new("Size", int_desc);
        size.check_specified = true;
        size.attribute = Some(Accessor::new("size", None, int).with_form(XmlForm::Unqualified));
        let s = graph.add(Mapping::new(
            "T",
            Some("urn:a"),
            Some(root),
            MappingKind::Struct(StructMapping { members: vec![id, count, size], ..StructMapping::default() }),
        ));
        graph.reconcile_accessor(AccessorScope::Element, Accessor::new("T", Some("urn:a"), s)).unwrap();

        let ct = exported_type(&graph, "T");
        let Some(Particle::Sequence(seq)) = &ct.particle else { panic!("no sequence") };
        let occurs: Vec<u32> = seq
            .items
            .iter()
            .map(|p| match p {
                Particle::Element(e) => e.min_occurs,
                _ => panic!("expected elements"),
            })
            .collect();
        assert_eq!(occurs, vec![1, 0]);
        let [AttributeItem::Attribute(size)] = ct.attributes.as_slice() else { panic!("expected one attribute") };
        assert_eq!(size.use_, AttributeUse::Optional);
        assert_eq!(size.form, None);
    }

    #[test]
    fn text_only_struct_has_simple_content() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let int = int_mapping(&mut graph);
        let int_desc = graph.types.data_type(&QualifiedName::xsd("int")).unwrap();
        let root = graph.types.root();
        let mut value = MemberMapping::new("Value", int_desc);
        value.text = Some(Accessor::new("", None, int));
        let s = graph.add(Mapping::new(
            "Money",
            Some("urn:a"),
            Some(root),
            MappingKind::Struct(StructMapping { members: vec![value], ..StructMapping::default() }),
        ));
        graph.reconcile_accessor(AccessorScope::Element, Accessor::new("Money", Some("urn:a"), s)).unwrap();

        let ct = exported_type(&graph, "Money");
        let derivation = ct.derivation.unwrap();
        assert!(derivation.simple_content);
        assert_eq!(derivation.base, QualifiedName::xsd("int"));
        assert!(!ct.is_mixed);
        assert!(ct.particle.is_none());
    }
}
