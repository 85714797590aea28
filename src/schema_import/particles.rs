//! Content particles → members. Sequences flatten, choices collapse into one
//! member with element alternatives, group references expand in place.
use tracing::{debug, trace};

use crate::error::{MappingError, MappingResult, ReferenceKind};
use crate::mapping::{
    ANY_ELEMENT_CONSTANT, Accessor, ChoiceIdentifier, ConstantMapping, EnumMapping, Mapping, MappingId, MappingKind,
    MemberMapping,
};
use crate::names::{QualifiedName, UniqueNames, XmlForm, make_valid_identifier};
use crate::schema_import::types::ENUM_FLAGS;
use crate::schema_import::{ContentScope, SchemaImporter};
use crate::type_desc::{SpecialType, TypeDescId, TypeKind};
use crate::xsd::{ElementDecl, GroupDecl, Particle, Wildcard};

/// One alternative of a choice.
#[derive(Debug, Clone)]
enum Leaf<'s> {
    /// A local declaration or a reference.
    Local(&'s ElementDecl),
    /// A top-level declaration reached through a substitution group.
    Global(QualifiedName, &'s ElementDecl),
    Any(&'s Wildcard),
}

impl<'s> SchemaImporter<'s> {
    pub(crate) fn import_particle(
        &mut self,
        particle: &'s Particle,
        repeats: bool,
        content: &mut ContentScope,
    ) -> MappingResult<()> {
        match particle {
            Particle::Element(e) => {
                let repeats = repeats || e.max_occurs.repeats();
                if let Some(leaves) = self.substitution_leaves(e)? {
                    return self.import_choice_member(leaves, repeats, content);
                }
                let (mut accessor, item_desc) = self.element_accessor(e, content.ns.as_deref(), &content.owner)?;
                let desc = if repeats { self.graph.types.array_of(item_desc) } else { item_desc };
                let mut member = MemberMapping::new(content.member_name(&accessor.name), desc);
                member.repeats = repeats;
                member.check_specified =
                    !repeats && e.min_occurs == 0 && accessor.default.is_none() && self.graph.types.get(item_desc).is_value_type();
                if repeats {
                    accessor.default = None;
                }
                member.elements.push(accessor);
                content.add(member)
            }
            Particle::Sequence(group) | Particle::All(group) => {
                let repeats = repeats || group.max_occurs.repeats();
                for item in &group.items {
                    self.import_particle(item, repeats, content)?;
                }
                Ok(())
            }
            Particle::Choice(group) => {
                let mut repeats = repeats || group.max_occurs.repeats();
                let mut leaves = Vec::new();
                for item in &group.items {
                    self.collect_leaves(item, &mut leaves, &mut repeats)?;
                }
                self.import_choice_member(leaves, repeats, content)
            }
            Particle::Any(wildcard) => {
                let repeats = repeats || wildcard.max_occurs.repeats();
                let (accessor, item_desc) = self.any_accessor(wildcard);
                let desc = if repeats { self.graph.types.array_of(item_desc) } else { item_desc };
                let mut member = MemberMapping::new(content.member_name("Any"), desc);
                member.repeats = repeats;
                member.elements.push(accessor);
                content.add(member)
            }
            Particle::Group(reference) => {
                let group = self.enter_group(&reference.ref_name)?;
                let result = self.import_particle(&group.particle, repeats || reference.max_occurs.repeats(), content);
                self.group_stack.pop();
                result
            }
        }
    }

    fn enter_group(&mut self, name: &QualifiedName) -> MappingResult<&'s GroupDecl> {
        if self.group_stack.contains(name) {
            return Err(MappingError::CircularReference { kind: ReferenceKind::Group, name: name.clone() });
        }
        let set = self.set;
        let group = set.find_group(name).ok_or_else(|| MappingError::missing(ReferenceKind::Group, name.clone()))?;
        self.group_stack.push(name.clone());
        Ok(group)
    }

    /// Flatten a choice alternative down to single elements and wildcards.
    fn collect_leaves(&mut self, particle: &'s Particle, leaves: &mut Vec<Leaf<'s>>, repeats: &mut bool) -> MappingResult<()> {
        *repeats |= particle.max_occurs().repeats();
        match particle {
            Particle::Element(e) => match self.substitution_leaves(e)? {
                Some(members) => leaves.extend(members),
                None => leaves.push(Leaf::Local(e)),
            },
            Particle::Any(w) => leaves.push(Leaf::Any(w)),
            Particle::Sequence(group) | Particle::Choice(group) | Particle::All(group) => {
                if group.items.len() > 1 && !matches!(particle, Particle::Choice(_)) {
                    debug!(items = group.items.len(), "flattening a nested group into the enclosing choice");
                }
                for item in &group.items {
                    self.collect_leaves(item, leaves, repeats)?;
                }
            }
            Particle::Group(reference) => {
                let group = self.enter_group(&reference.ref_name)?;
                let result = self.collect_leaves(&group.particle, leaves, repeats);
                self.group_stack.pop();
                result?;
            }
        }
        Ok(())
    }

    /// A reference to a substitution group head with members stands for a
    /// choice of the head and every member that is not abstract.
    fn substitution_leaves(&mut self, e: &'s ElementDecl) -> MappingResult<Option<Vec<Leaf<'s>>>> {
        let Some(head) = &e.ref_name else { return Ok(None) };
        let set = self.set;
        let members = set.substitution_members(head);
        if members.is_empty() {
            return Ok(None);
        }
        let mut leaves = Vec::with_capacity(members.len() + 1);
        for name in std::iter::once(head.clone()).chain(members) {
            let decl = set.find_element(&name).ok_or_else(|| MappingError::missing(ReferenceKind::Element, name.clone()))?;
            if !decl.is_abstract {
                leaves.push(Leaf::Global(name, decl));
            }
        }
        trace!(head = %head, alternatives = leaves.len(), "expanded substitution group");
        Ok(Some(leaves))
    }

    fn import_choice_member(&mut self, leaves: Vec<Leaf<'s>>, repeats: bool, content: &mut ContentScope) -> MappingResult<()> {
        if leaves.is_empty() {
            return Ok(());
        }
        let mut elements = Vec::with_capacity(leaves.len());
        let mut descs = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let (mut accessor, desc) = match leaf {
                Leaf::Local(e) => self.element_accessor(e, content.ns.as_deref(), &content.owner)?,
                Leaf::Global(name, decl) => self.global_accessor(&name, decl)?,
                Leaf::Any(w) => self.any_accessor(w),
            };
            if repeats {
                accessor.default = None;
            }
            elements.push(accessor);
            descs.push(desc);
        }
        let item_desc = self.common_desc(&descs);
        let desc = if repeats { self.graph.types.array_of(item_desc) } else { item_desc };
        let base_name = match elements.as_slice() {
            [single] if !single.name.is_empty() => single.name.clone(),
            _ if repeats => "Items".to_owned(),
            _ => "Item".to_owned(),
        };
        let mut member = MemberMapping::new(content.member_name(&base_name), desc);
        member.repeats = repeats;
        let identifier = if self.is_ambiguous(&elements) {
            let identifier = self.choice_identifier(&member.name, &elements, content)?;
            let kind = self.desc_of(identifier.mapping);
            let desc = if repeats { self.graph.types.array_of(kind) } else { kind };
            let mut sibling = MemberMapping::new(identifier.member_name.clone(), desc);
            sibling.ignore = true;
            member.choice_identifier = Some(identifier);
            Some(sibling)
        } else {
            None
        };
        member.elements = elements;
        content.add(member)?;
        match identifier {
            Some(sibling) => content.add(sibling),
            None => Ok(()),
        }
    }

    /// Two alternatives of one type, or two wildcards, cannot be told apart
    /// by the value alone.
    fn is_ambiguous(&self, elements: &[Accessor]) -> bool {
        elements.iter().enumerate().any(|(i, a)| {
            elements[i + 1..].iter().any(|b| {
                (a.any && b.any) || self.graph.get(a.mapping).type_desc == self.graph.get(b.mapping).type_desc
            })
        })
    }

    /// Generate `<Member>ChoiceType` with one enumerant per alternative.
    fn choice_identifier(
        &mut self,
        member_name: &str,
        elements: &[Accessor],
        content: &mut ContentScope,
    ) -> MappingResult<ChoiceIdentifier> {
        let ns = content.ns.clone();
        let type_name = self.generate_type_name(&format!("{member_name}ChoiceType"), ns.as_deref());
        let mut code_names = UniqueNames::new();
        let constants: Vec<ConstantMapping> = elements
            .iter()
            .enumerate()
            .map(|(i, element)| {
                let xml_name = match &element.namespace {
                    _ if element.any && element.name.is_empty() => ANY_ELEMENT_CONSTANT.to_owned(),
                    Some(element_ns) if ns.as_ref() != Some(element_ns) => format!("{element_ns}:{}", element.name),
                    _ => element.name.clone(),
                };
                let code = if element.name.is_empty() { "Item" } else { element.name.as_str() };
                ConstantMapping {
                    name: code_names.add_unique(&make_valid_identifier(code)),
                    xml_name,
                    value: i as i64,
                }
            })
            .collect();
        let member_ids = constants.iter().map(|c| c.name.clone()).collect();

        let desc = self.generated_desc(&type_name, TypeKind::Enum, ENUM_FLAGS);
        let mut mapping = Mapping::new(
            type_name,
            ns.as_deref(),
            Some(desc),
            MappingKind::Enum(EnumMapping { constants, is_flags: false }),
        );
        mapping.include_in_schema = false;
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        Ok(ChoiceIdentifier {
            member_name: content.member_name(&format!("{member_name}ElementName")),
            mapping: id,
            member_ids,
        })
    }

    // ------ Accessors ------ //

    /// Element accessor and the descriptor a member holding it is typed as.
    pub(crate) fn element_accessor(
        &mut self,
        e: &'s ElementDecl,
        owner_ns: Option<&str>,
        context: &str,
    ) -> MappingResult<(Accessor, TypeDescId)> {
        if let Some(reference) = &e.ref_name {
            let set = self.set;
            let decl = set
                .find_element(reference)
                .ok_or_else(|| MappingError::missing(ReferenceKind::Element, reference.clone()))?;
            return self.global_accessor(reference, decl);
        }
        let name = e.name.as_deref().ok_or_else(|| {
            MappingError::unsupported(context, "a local element", "a local element needs a name or a reference")
        })?;
        let form = e.form.unwrap_or_else(|| self.set.element_form_default(owner_ns));
        let ns = match form {
            XmlForm::Qualified => owner_ns,
            XmlForm::Unqualified => None,
        };
        let mapping = self.element_type(e, name, owner_ns, Some(context))?;
        self.finish_element(name, ns, form, e, mapping)
    }

    fn global_accessor(&mut self, name: &QualifiedName, decl: &'s ElementDecl) -> MappingResult<(Accessor, TypeDescId)> {
        let mapping = self.element_type(decl, &name.name, name.ns(), None)?;
        self.finish_element(&name.name, name.ns(), XmlForm::Qualified, decl, mapping)
    }

    fn finish_element(
        &mut self,
        name: &str,
        ns: Option<&str>,
        form: XmlForm,
        decl: &ElementDecl,
        mapping: MappingId,
    ) -> MappingResult<(Accessor, TypeDescId)> {
        let mapping = if decl.nillable { self.nullable_of(mapping)? } else { mapping };
        let mut accessor = Accessor::new(name, ns, mapping).with_form(form).nullable(decl.nillable);
        accessor.default = decl.value_constraint().map(|v| self.parse_default(name, v, mapping)).transpose()?;
        Ok((accessor, self.desc_of(mapping)))
    }

    fn any_accessor(&mut self, wildcard: &Wildcard) -> (Accessor, TypeDescId) {
        let mapping = self.special(SpecialType::Element);
        let mut accessor = Accessor::new("", wildcard.single_namespace(), mapping);
        accessor.any = true;
        (accessor, self.graph.types.special(SpecialType::Element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportOptions;
    use crate::xsd::{ComplexType, GroupRef, MaxOccurs, ModelGroup, SchemaItem, XmlSchema, XmlSchemaSet};

    fn q(name: &str) -> QualifiedName {
        QualifiedName::new(name, Some("urn:t"))
    }

    fn set_of(items: Vec<SchemaItem>) -> XmlSchemaSet {
        let mut schema = XmlSchema::new(Some("urn:t"));
        schema.element_form_default = XmlForm::Qualified;
        schema.items = items;
        XmlSchemaSet::from_schemas(vec![schema]).unwrap()
    }

    fn complex(name: &str, particle: Particle) -> SchemaItem {
        SchemaItem::ComplexType(ComplexType { name: Some(name.into()), particle: Some(particle), ..Default::default() })
    }

    fn element(name: &str, ty: &str) -> Particle {
        Particle::Element(ElementDecl::named(name, QualifiedName::xsd(ty)))
    }

    #[test]
    fn optional_value_elements_check_specified() {
        let set = set_of(vec![complex(
            "T",
            Particle::Sequence(ModelGroup::of(vec![
                Particle::Element(ElementDecl::named("n", QualifiedName::xsd("int")).occurs(0, MaxOccurs::ONE)),
                Particle::Element(ElementDecl::named("tags", QualifiedName::xsd("string")).occurs(0, MaxOccurs::UNBOUNDED)),
            ])),
        )]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let id = importer.import_type_mapping(&q("T")).unwrap();
        let graph = importer.graph();
        let members = graph.members_of(id);
        assert_eq!(members.len(), 2);
        assert!(members[0].check_specified);
        assert!(members[1].repeats && !members[1].check_specified);
        assert_eq!(members[0].elements[0].namespace.as_deref(), Some("urn:t"));
    }

    #[test]
    fn same_typed_choice_gets_an_identifier() {
        let set = set_of(vec![complex(
            "T",
            Particle::Choice(ModelGroup::of(vec![element("a", "string"), element("b", "string"), element("c", "int")])),
        )]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let id = importer.import_type_mapping(&q("T")).unwrap();
        let graph = importer.graph();
        let [member, kind] = graph.members_of(id) else { panic!("expected the choice and its identifier") };
        assert_eq!(member.name, "Item");
        assert_eq!(member.type_desc, graph.types.root());
        let identifier = member.choice_identifier.as_ref().unwrap();
        assert_eq!(identifier.member_name, "ItemElementName");
        assert_eq!(identifier.member_ids, vec!["a", "b", "c"]);
        let choice = graph.get(identifier.mapping);
        assert_eq!(choice.type_name, "ItemChoiceType");
        assert!(!choice.include_in_schema);

        assert_eq!(kind.name, "ItemElementName");
        assert!(kind.ignore);
        assert!(kind.accessors().next().is_none());
        assert_eq!(Some(kind.type_desc), choice.type_desc);
    }

    #[test]
    fn repeated_choice_identifier_holds_a_list() {
        let set = set_of(vec![complex(
            "T",
            Particle::Choice(ModelGroup {
                max_occurs: MaxOccurs::UNBOUNDED,
                ..ModelGroup::of(vec![element("a", "string"), element("b", "string")])
            }),
        )]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let id = importer.import_type_mapping(&q("T")).unwrap();
        let graph = importer.graph();
        let [member, kind] = graph.members_of(id) else { panic!("expected the choice and its identifier") };
        assert_eq!(kind.name, "ItemsElementName");
        assert!(kind.ignore);
        let choice_desc = graph.get(member.choice_identifier.as_ref().unwrap().mapping).type_desc.unwrap();
        assert_eq!(graph.types.get(kind.type_desc).element, Some(choice_desc));
    }

    #[test]
    fn distinct_typed_choice_needs_no_identifier() {
        let set = set_of(vec![complex(
            "T",
            Particle::Sequence(ModelGroup::of(vec![
                element("x", "string"),
                Particle::Choice(ModelGroup {
                    max_occurs: MaxOccurs::UNBOUNDED,
                    ..ModelGroup::of(vec![element("a", "string"), element("b", "int")])
                }),
            ])),
        )]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let id = importer.import_type_mapping(&q("T")).unwrap();
        let [_, member] = importer.graph().members_of(id) else { panic!("expected two members") };
        assert_eq!(member.name, "Items");
        assert!(member.repeats);
        assert!(member.choice_identifier.is_none());
    }

    #[test]
    fn self_referencing_group_is_circular() {
        let set = set_of(vec![
            SchemaItem::Group(GroupDecl {
                name: "G".into(),
                particle: Particle::Sequence(ModelGroup::of(vec![Particle::Group(GroupRef {
                    ref_name: q("G"),
                    min_occurs: 1,
                    max_occurs: MaxOccurs::ONE,
                })])),
            }),
            complex(
                "T",
                Particle::Group(GroupRef { ref_name: q("G"), min_occurs: 1, max_occurs: MaxOccurs::ONE }),
            ),
        ]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        assert!(matches!(
            importer.import_type_mapping(&q("T")),
            Err(MappingError::CircularReference { kind: ReferenceKind::Group, .. })
        ));
    }

    #[test]
    fn substitution_head_reference_becomes_a_choice() {
        let set = set_of(vec![
            SchemaItem::Element(ElementDecl { is_abstract: true, ..ElementDecl::named("shape", QualifiedName::xsd("anyType")) }),
            SchemaItem::Element(ElementDecl {
                substitution_group: Some(q("shape")),
                ..ElementDecl::named("circle", QualifiedName::xsd("double"))
            }),
            SchemaItem::Element(ElementDecl {
                substitution_group: Some(q("shape")),
                ..ElementDecl::named("label", QualifiedName::xsd("string"))
            }),
            complex("T", Particle::Sequence(ModelGroup::of(vec![Particle::Element(ElementDecl::reference(q("shape")))]))),
        ]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let id = importer.import_type_mapping(&q("T")).unwrap();
        let [member] = importer.graph().members_of(id) else { panic!("expected one member") };
        let names: Vec<&str> = member.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["circle", "label"]);
    }
}
