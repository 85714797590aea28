//! Named and inline types: complex types become structs or arrays, simple
//! types become primitives or enums.
use tracing::{debug, trace, warn};

use crate::error::{MappingError, MappingResult, ReferenceKind};
use crate::mapping::{
    Accessor, ArrayMapping, ConstantMapping, EnumMapping, Mapping, MappingId, MappingKind, MemberMapping,
    MemberScope, StructMapping,
};
use crate::names::{PRIMITIVE_TYPES_NAMESPACE, QualifiedName, UniqueNames, make_pascal, make_valid_identifier};
use crate::reflection::Progress;
use crate::schema_import::{ContentScope, ImportComplexTypeWorkItem, SchemaImporter, TypeOrigin};
use crate::type_desc::{SpecialType, TypeDescId, TypeFlags, TypeKind};
use crate::xsd::{ComplexType, DerivationMethod, ElementDecl, Particle, SchemaType, SimpleContent, SimpleType};

/// Flag values are packed into a 64-bit word with one bit left unused, so a
/// flags enum holds at most this many constants.
pub const MAX_FLAG_CONSTANTS: usize = 63;

pub(crate) const ENUM_FLAGS: TypeFlags = TypeFlags::VALUE_TYPE
    .union(TypeFlags::CAN_BE_ATTRIBUTE_VALUE)
    .union(TypeFlags::CAN_BE_ELEMENT_VALUE)
    .union(TypeFlags::CAN_BE_TEXT_VALUE);

impl<'s> SchemaImporter<'s> {
    pub(crate) fn import_type_by_name(&mut self, name: &QualifiedName) -> MappingResult<MappingId> {
        if name.is_xsd() || name.ns() == Some(PRIMITIVE_TYPES_NAMESPACE) {
            return self.import_builtin(name);
        }
        if let Some(id) = self.types.get_q(name) {
            return Ok(*id);
        }
        let set = self.set;
        match set.find_type(name) {
            Some(SchemaType::Complex(ct)) => self.import_complex_type(ct, TypeOrigin::Named(name.clone())),
            Some(SchemaType::Simple(st)) => self.import_simple_type(st, TypeOrigin::Named(name.clone())),
            None => Err(MappingError::missing(ReferenceKind::Type, name.clone())),
        }
    }

    /// Type of an element declaration: named, inline, inherited from the
    /// substitution head, or `anyType`. `owner` is the type declaring a local
    /// element and `None` at the top level.
    pub(crate) fn element_type(
        &mut self,
        decl: &'s ElementDecl,
        context: &str,
        ns: Option<&str>,
        owner: Option<&str>,
    ) -> MappingResult<MappingId> {
        if let Some(type_name) = &decl.type_name {
            return self.import_type_by_name(type_name);
        }
        if let Some(ct) = &decl.complex_type {
            return self.import_complex_type(ct, TypeOrigin::inline(context, ns, owner, context));
        }
        if let Some(st) = &decl.simple_type {
            return self.import_simple_type(st, TypeOrigin::inline(context, ns, owner, context));
        }
        if let Some(head) = &decl.substitution_group {
            let set = self.set;
            let head_decl =
                set.find_element(head).ok_or_else(|| MappingError::missing(ReferenceKind::Element, head.clone()))?;
            return self.element_type(head_decl, &head.name, head.ns(), None);
        }
        Ok(self.graph.root_mapping())
    }

    // ------ Complex types ------ //

    pub(crate) fn import_complex_type(&mut self, ct: &'s ComplexType, origin: TypeOrigin) -> MappingResult<MappingId> {
        if let Some(id) = self.registered(&origin, true) {
            return Ok(id);
        }
        if let TypeOrigin::Named(name) = &origin {
            self.check_derivation_chain(name)?;
        }
        if let Some(items) = array_items(ct) {
            return self.import_array_type(items, origin);
        }

        let ns = origin.ns().map(str::to_owned);
        let (type_name, anonymous) = match &origin {
            TypeOrigin::Named(name) => (name.name.clone(), false),
            TypeOrigin::Anonymous { context, ns, .. } => (self.generate_type_name(context, ns.as_deref()), true),
        };
        let mut flags = TypeFlags::NULLABLE | TypeFlags::CAN_BE_ELEMENT_VALUE;
        flags.set(TypeFlags::ABSTRACT, ct.is_abstract);
        flags.set(TypeFlags::MIXED, ct.is_mixed);
        let desc = self.generated_desc(&type_name, TypeKind::Class, flags);

        let mut mapping = Mapping::new(
            type_name.clone(),
            ns.as_deref(),
            Some(desc),
            MappingKind::Struct(StructMapping { is_open_model: self.options.open_model, ..StructMapping::default() }),
        );
        mapping.is_anonymous = anonymous;
        let id = self.graph.add(mapping);
        self.register(&origin, true, id);

        let item = ImportComplexTypeWorkItem { ct, mapping: id, ns };
        if self.limiter.is_exceeded_limit() {
            trace!(type_name = %type_name, depth = self.limiter.depth(), "recursion limit reached, deferring");
            self.limiter.defer(item);
        } else {
            self.limiter.enter();
            let outermost = self.limiter.depth() == 1;
            self.populate_struct(&item)?;
            self.drain_deferred(outermost)?;
            self.limiter.leave();
        }

        if let TypeOrigin::Named(name) = &origin {
            for derived in self.set.derived_types(name) {
                debug!(base = %name, derived = %derived, "importing derived type");
                self.import_type_by_name(&derived)?;
            }
        }
        Ok(id)
    }

    /// A type may not derive from itself through any number of steps.
    fn check_derivation_chain(&self, name: &QualifiedName) -> MappingResult<()> {
        let mut seen = vec![name.clone()];
        let mut current = name.clone();
        while let Some(SchemaType::Complex(ct)) = self.set.find_type(&current) {
            let Some(derivation) = &ct.derivation else { break };
            if seen.contains(&derivation.base) {
                return Err(MappingError::CircularReference { kind: ReferenceKind::Type, name: derivation.base.clone() });
            }
            seen.push(derivation.base.clone());
            current = derivation.base.clone();
        }
        Ok(())
    }

    fn registered(&self, origin: &TypeOrigin, complex: bool) -> Option<MappingId> {
        match (origin, origin.declaration_key()) {
            (TypeOrigin::Named(name), _) => self.types.get_q(name).copied(),
            (_, Some(key)) if complex => self.anonymous_complex.get(&key).copied(),
            (_, Some(key)) => self.anonymous_simple.get(&key).copied(),
            (_, None) => None,
        }
    }

    fn register(&mut self, origin: &TypeOrigin, complex: bool, id: MappingId) {
        match (origin, origin.declaration_key()) {
            (TypeOrigin::Named(name), _) => self.types.insert(&name.name, name.ns(), id),
            (_, Some(key)) if complex => {
                self.anonymous_complex.insert(key, id);
            }
            (_, Some(key)) => {
                self.anonymous_simple.insert(key, id);
            }
            (_, None) => {}
        }
    }

    /// Retry queued types, newest first. Stops early when the top entry
    /// waits on a base still being populated further up the stack; at the
    /// outermost level that can only mean the loop is stuck.
    fn drain_deferred(&mut self, outermost: bool) -> MappingResult<()> {
        while let Some(item) = self.limiter.top().cloned() {
            match self.populate_struct(&item)? {
                Progress::Done => self.limiter.remove(item.mapping),
                Progress::Deferred => continue,
                Progress::Blocked if outermost => {
                    return Err(MappingError::Internal(format!(
                        "deferred import of `{}` made no progress",
                        self.graph.get(item.mapping).type_name
                    )));
                }
                Progress::Blocked => break,
            }
        }
        Ok(())
    }

    /// Walk the content of a registered complex type into its struct
    /// mapping. A struct base must be complete first, so a derived type whose
    /// base is queued or still filling goes back on the work-list.
    fn populate_struct(&mut self, item: &ImportComplexTypeWorkItem<'s>) -> MappingResult<Progress> {
        let id = item.mapping;
        if self.graph.get(id).is_fully_initialized {
            return Ok(Progress::Done);
        }
        if self.in_progress.contains(&id) {
            return Ok(Progress::Blocked);
        }
        self.in_progress.insert(id);
        let ct = item.ct;
        let ns = item.ns.as_deref();
        let type_name = self.graph.get(id).type_name.clone();
        let mut members = MemberScope::default();
        let mut base_is_sequence = false;
        let mut text_base = None;
        let mut restricted = false;

        if let Some(derivation) = ct.derivation.as_ref().filter(|d| d.base != QualifiedName::xsd("anyType")) {
            let base = self.import_type_by_name(&derivation.base)?;
            let base_mapping = self.graph.get(base);
            let base_desc = base_mapping.type_desc;
            let is_struct = base_mapping.is_struct() && !self.graph.is_root(base);
            let is_simple = matches!(base_mapping.kind, MappingKind::Primitive(_) | MappingKind::Enum(_));
            if is_struct {
                if let Some(index) = self.limiter.position(base) {
                    self.limiter.defer(item.clone());
                    self.limiter.promote(index);
                    self.in_progress.remove(&id);
                    trace!(derived = %type_name, base = %derivation.base, "base is deferred, retrying it first");
                    return Ok(Progress::Deferred);
                }
                if self.in_progress.contains(&base) {
                    self.limiter.defer(item.clone());
                    self.in_progress.remove(&id);
                    trace!(derived = %type_name, base = %derivation.base, "base is still being populated");
                    return Ok(Progress::Blocked);
                }
                if !self.graph.get(base).is_fully_initialized {
                    return Err(MappingError::Internal(format!(
                        "base of `{type_name}` is neither populated, queued nor in progress"
                    )));
                }
                members = MemberScope::for_base(&self.graph, base);
                base_is_sequence = self.graph.get(base).as_struct().is_some_and(|s| s.is_sequence);
                self.graph.set_base(id, base)?;
                if let Some(desc) = self.graph.get(id).type_desc {
                    self.graph.types.get_mut(desc).base = base_desc;
                }
                restricted = derivation.method == DerivationMethod::Restriction;
            } else if is_simple && derivation.simple_content {
                text_base = Some(base);
            } else if !self.graph.is_root(base) {
                return Err(MappingError::unsupported(
                    derivation.base.to_string(),
                    "a base type",
                    "complex content can only extend complex types",
                ));
            }
        }

        let mut content = ContentScope::new(type_name.clone(), ns, members);
        for member in self.graph.base_chain(id).iter().skip(1).flat_map(|b| self.graph.members_of(*b)) {
            content.names.reserve(&member.name);
        }

        if let Some(base) = text_base {
            let member = self.text_member(&mut content, base, false);
            content.add(member)?;
        }
        if !restricted {
            if let Some(particle) = &ct.particle {
                self.import_particle(particle, false, &mut content)?;
            }
            self.import_attributes(&ct.attributes, ct.any_attribute.as_ref(), &mut content)?;
        }
        if ct.is_mixed && !content.members.has_text() {
            let string = self.string_mapping()?;
            let member = self.text_member(&mut content, string, true);
            content.add(member)?;
        }
        if ct.keep_namespace_declarations {
            let desc = self.graph.types.special(SpecialType::Namespaces);
            let name = content.member_name("Namespaces");
            let mut member = MemberMapping::new(name.clone(), desc);
            member.xmlns = Some(crate::mapping::XmlnsAccessor { member_name: name });
            content.add(member)?;
        }

        let owner = content.owner.clone();
        let finished = content.members.finish(&owner, base_is_sequence)?;
        let target = self.graph.struct_mut(id)?;
        target.members = finished.members;
        target.is_sequence = finished.is_sequence;
        target.xmlns_member = finished.xmlns_member;
        target.local_elements = finished.local_elements;
        target.local_attributes = finished.local_attributes;
        self.graph.get_mut(id).is_fully_initialized = true;
        self.in_progress.remove(&id);
        Ok(Progress::Done)
    }

    /// Text content typed by `mapping`; mixed content collects it as a list.
    fn text_member(&mut self, content: &mut ContentScope, mapping: MappingId, repeats: bool) -> MemberMapping {
        let item = self.desc_of(mapping);
        let desc = if repeats { self.graph.types.array_of(item) } else { item };
        let mut member = MemberMapping::new(content.member_name(if repeats { "Text" } else { "Value" }), desc);
        member.text = Some(Accessor::new("", None, mapping));
        member.repeats = repeats;
        member
    }

    // ------ Array shapes ------ //

    fn import_array_type(&mut self, items: Vec<&'s ElementDecl>, origin: TypeOrigin) -> MappingResult<MappingId> {
        let ns = origin.ns().map(str::to_owned);
        let (type_name, anonymous) = match &origin {
            TypeOrigin::Named(name) => (name.name.clone(), false),
            TypeOrigin::Anonymous { context, ns, .. } => (self.generate_type_name(context, ns.as_deref()), true),
        };
        let desc = self.generated_desc(&type_name, TypeKind::Array, TypeFlags::NULLABLE | TypeFlags::CAN_BE_ELEMENT_VALUE);
        let mut mapping = Mapping::new(type_name.clone(), ns.as_deref(), Some(desc), MappingKind::Array(ArrayMapping::default()));
        mapping.is_anonymous = anonymous;
        let id = self.graph.add(mapping);
        self.register(&origin, true, id);

        self.array_stack.push(id);
        let resolved = self.array_elements(items, ns.as_deref(), &type_name);
        self.array_stack.pop();
        let (elements, item_descs) = resolved?;

        let item_desc = self.common_desc(&item_descs);
        self.graph.types.get_mut(desc).element = Some(item_desc);
        self.graph.array_mut(id)?.elements = elements;
        self.graph.get_mut(id).is_fully_initialized = true;
        trace!(array = %type_name, "imported array shape");
        Ok(id)
    }

    /// Item accessors of an array type. An item that is itself an array
    /// whose items are still being resolved closes an array-shape cycle.
    fn array_elements(
        &mut self,
        items: Vec<&'s ElementDecl>,
        ns: Option<&str>,
        owner: &str,
    ) -> MappingResult<(Vec<Accessor>, Vec<TypeDescId>)> {
        let mut elements = Vec::with_capacity(items.len());
        let mut item_descs = Vec::with_capacity(items.len());
        for item in items {
            let (accessor, item_desc) = self.element_accessor(item, ns, owner)?;
            let target = self.graph.unwrap_nullable(accessor.mapping);
            if self.array_stack.contains(&target) {
                return Err(MappingError::CircularReference {
                    kind: ReferenceKind::Type,
                    name: self.graph.get(target).qname(),
                });
            }
            item_descs.push(item_desc);
            elements.push(accessor);
        }
        Ok((elements, item_descs))
    }

    /// The one descriptor every alternative shares, else `object`.
    pub(crate) fn common_desc(&self, descs: &[TypeDescId]) -> TypeDescId {
        match descs.split_first() {
            Some((first, rest)) if rest.iter().all(|d| d == first) => *first,
            _ => self.graph.types.root(),
        }
    }

    // ------ Simple types ------ //

    pub(crate) fn import_simple_type(&mut self, st: &'s SimpleType, origin: TypeOrigin) -> MappingResult<MappingId> {
        if let Some(id) = self.registered(&origin, false) {
            return Ok(id);
        }

        let id = match &st.content {
            SimpleContent::Restriction { enumeration, .. } if !enumeration.is_empty() => {
                self.import_enum_type(enumeration, false, &origin)?
            }
            SimpleContent::Restriction { base: Some(base), .. } => self.import_type_by_name(base)?,
            SimpleContent::Restriction { simple_type: Some(inner), .. } => self.import_simple_type(inner, origin.clone())?,
            SimpleContent::Restriction { .. } | SimpleContent::Union { .. } => self.string_mapping()?,
            SimpleContent::List { item_type, simple_type } => {
                let set = self.set;
                let item = match (item_type, simple_type) {
                    (_, Some(inline)) => Some(inline.as_ref()),
                    (Some(name), None) => match set.find_type(name) {
                        Some(SchemaType::Simple(named)) => Some(named),
                        _ => None,
                    },
                    (None, None) => None,
                };
                match item.map(|i| &i.content) {
                    Some(SimpleContent::Restriction { enumeration, .. }) if !enumeration.is_empty() => {
                        if enumeration.len() > MAX_FLAG_CONSTANTS {
                            warn!(
                                values = enumeration.len(),
                                limit = MAX_FLAG_CONSTANTS,
                                "list of enumeration has too many values for a flags enum, mapping it to a string"
                            );
                            self.string_mapping()?
                        } else {
                            self.import_enum_type(enumeration, true, &origin)?
                        }
                    }
                    _ => self.string_mapping()?,
                }
            }
        };

        self.register(&origin, false, id);
        Ok(id)
    }

    fn import_enum_type(&mut self, values: &[String], is_flags: bool, origin: &TypeOrigin) -> MappingResult<MappingId> {
        let (type_name, anonymous) = match origin {
            TypeOrigin::Named(name) => (name.name.clone(), false),
            TypeOrigin::Anonymous { context, ns, .. } => (self.generate_type_name(context, ns.as_deref()), true),
        };
        let mut code_names = UniqueNames::new();
        let mut constants: Vec<ConstantMapping> = Vec::with_capacity(values.len());
        for value in values {
            if constants.iter().any(|c| &c.xml_name == value) {
                continue;
            }
            let index = constants.len() as u32;
            constants.push(ConstantMapping {
                name: code_names.add_unique(&make_valid_identifier(&make_pascal(value))),
                xml_name: value.clone(),
                value: if is_flags { 1i64 << index } else { i64::from(index) },
            });
        }
        let desc = self.generated_desc(&type_name, TypeKind::Enum, ENUM_FLAGS);
        let mut mapping = Mapping::new(
            type_name,
            origin.ns(),
            Some(desc),
            MappingKind::Enum(EnumMapping { constants, is_flags }),
        );
        mapping.is_anonymous = anonymous;
        mapping.is_fully_initialized = true;
        Ok(self.graph.add(mapping))
    }
}

/// Item elements of a complex type whose whole content is one repeating
/// element, or one repeating choice of single elements.
fn array_items(ct: &ComplexType) -> Option<Vec<&ElementDecl>> {
    if ct.derivation.is_some()
        || ct.is_mixed
        || ct.keep_namespace_declarations
        || !ct.attributes.is_empty()
        || ct.any_attribute.is_some()
    {
        return None;
    }
    let particle = match ct.particle.as_ref()? {
        Particle::Sequence(g) | Particle::All(g) if g.items.len() == 1 && !g.max_occurs.repeats() => &g.items[0],
        other => other,
    };
    match particle {
        Particle::Element(e) if e.max_occurs.repeats() => Some(vec![e]),
        Particle::Choice(c) if c.max_occurs.repeats() && !c.items.is_empty() => c
            .items
            .iter()
            .map(|p| match p {
                Particle::Element(e) if !e.max_occurs.repeats() => Some(e),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportOptions;
    use crate::xsd::{Derivation, MaxOccurs, ModelGroup, SchemaItem, XmlSchema, XmlSchemaSet};

    fn q(name: &str) -> QualifiedName {
        QualifiedName::new(name, Some("urn:t"))
    }

    fn set_of(items: Vec<SchemaItem>) -> XmlSchemaSet {
        let mut schema = XmlSchema::new(Some("urn:t"));
        schema.items = items;
        XmlSchemaSet::from_schemas(vec![schema]).unwrap()
    }

    fn sequence(items: Vec<Particle>) -> Option<Particle> {
        Some(Particle::Sequence(ModelGroup::of(items)))
    }

    #[test]
    fn one_unbounded_child_is_an_array() {
        let set = set_of(vec![SchemaItem::ComplexType(ComplexType {
            name: Some("ArrayOfString".into()),
            particle: sequence(vec![Particle::Element(
                ElementDecl::named("string", QualifiedName::xsd("string")).occurs(0, MaxOccurs::UNBOUNDED),
            )]),
            ..Default::default()
        })]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let id = importer.import_type_mapping(&q("ArrayOfString")).unwrap();
        assert_eq!(importer.import_type_mapping(&q("ArrayOfString")).unwrap(), id);
        let graph = importer.graph();
        let array = graph.get(id).as_array().unwrap();
        assert_eq!(array.elements.len(), 1);
        assert_eq!(array.elements[0].name, "string");
        let desc = graph.types.get(graph.get(id).type_desc.unwrap());
        assert_eq!(desc.element, graph.types.data_type(&QualifiedName::xsd("string")).ok());
    }

    #[test]
    fn array_of_itself_is_circular() {
        let set = set_of(vec![SchemaItem::ComplexType(ComplexType {
            name: Some("Loop".into()),
            particle: sequence(vec![Particle::Element(
                ElementDecl::named("Loop", q("Loop")).occurs(0, MaxOccurs::UNBOUNDED),
            )]),
            ..Default::default()
        })]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        assert!(matches!(
            importer.import_type_mapping(&q("Loop")),
            Err(MappingError::CircularReference { kind: ReferenceKind::Type, .. })
        ));
    }

    #[test]
    fn extension_links_base_and_imports_derived() {
        let set = set_of(vec![
            SchemaItem::ComplexType(ComplexType {
                name: Some("Shape".into()),
                particle: sequence(vec![Particle::Element(ElementDecl::named("Name", QualifiedName::xsd("string")))]),
                ..Default::default()
            }),
            SchemaItem::ComplexType(ComplexType {
                name: Some("Circle".into()),
                derivation: Some(Derivation { method: DerivationMethod::Extension, base: q("Shape"), simple_content: false }),
                particle: sequence(vec![Particle::Element(ElementDecl::named("Radius", QualifiedName::xsd("double")))]),
                ..Default::default()
            }),
        ]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let shape = importer.import_type_mapping(&q("Shape")).unwrap();
        let graph = importer.graph();
        let [circle] = graph.derived_mappings(shape) else { panic!("expected one derived type") };
        assert_eq!(graph.base_of(*circle), Some(shape));
        assert_eq!(graph.members_of(*circle).len(), 1);
        let circle_desc = graph.get(*circle).type_desc.unwrap();
        assert!(graph.types.is_derived_from(circle_desc, graph.get(shape).type_desc.unwrap()));
    }

    #[test]
    fn list_of_enumeration_is_flags() {
        let values: Vec<String> = ["read", "write"].iter().map(|s| s.to_string()).collect();
        let set = set_of(vec![SchemaItem::SimpleType(SimpleType {
            name: Some("Perm".into()),
            content: SimpleContent::List {
                item_type: None,
                simple_type: Some(Box::new(SimpleType::enumeration(None, values))),
            },
        })]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let id = importer.import_type_mapping(&q("Perm")).unwrap();
        let e = importer.graph().get(id).as_enum().unwrap();
        assert!(e.is_flags);
        assert_eq!(e.constants.iter().map(|c| c.value).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(e.constants[1].name, "Write");
    }

    #[test]
    fn oversized_flags_degrade_to_string() {
        let values: Vec<String> = (0..=MAX_FLAG_CONSTANTS).map(|i| format!("v{i}")).collect();
        let set = set_of(vec![SchemaItem::SimpleType(SimpleType {
            name: Some("Many".into()),
            content: SimpleContent::List {
                item_type: None,
                simple_type: Some(Box::new(SimpleType::enumeration(None, values))),
            },
        })]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let id = importer.import_type_mapping(&q("Many")).unwrap();
        assert_eq!(importer.graph().get(id).qname(), QualifiedName::xsd("string"));
    }

    fn named_complex(name: &str, base: Option<&str>, items: Vec<Particle>) -> SchemaItem {
        SchemaItem::ComplexType(ComplexType {
            name: Some(name.into()),
            derivation: base.map(|b| Derivation { method: DerivationMethod::Extension, base: q(b), simple_content: false }),
            particle: sequence(items),
            ..Default::default()
        })
    }

    fn field(name: &str, ty: QualifiedName) -> Particle {
        Particle::Element(ElementDecl::named(name, ty))
    }

    fn by_name(graph: &crate::mapping::MappingGraph, name: &str) -> MappingId {
        graph.iter().find(|(_, m)| m.type_name == name && m.is_struct()).map(|(id, _)| id).unwrap()
    }

    fn shape_and_circle(circle_field: &str) -> XmlSchemaSet {
        set_of(vec![
            named_complex(
                "Shape",
                None,
                vec![field("Name", QualifiedName::xsd("string")), field("Child", q("Circle"))],
            ),
            named_complex("Circle", Some("Shape"), vec![field(circle_field, QualifiedName::xsd("string"))]),
        ])
    }

    #[test]
    fn derived_type_sees_its_whole_base_from_either_entry_point() {
        for entry in ["Shape", "Circle"] {
            let set = shape_and_circle("Name");
            let mut importer = SchemaImporter::new(&set, ImportOptions::default());
            let err = importer.import_type_mapping(&q(entry)).unwrap_err();
            assert!(matches!(err, MappingError::Conflict { .. }), "entry {entry}: {err:?}");
        }
        for entry in ["Shape", "Circle"] {
            let set = shape_and_circle("Radius");
            let mut importer = SchemaImporter::new(&set, ImportOptions::default());
            importer.import_type_mapping(&q(entry)).unwrap();
            let graph = importer.graph();
            let shape = by_name(graph, "Shape");
            let circle = by_name(graph, "Circle");
            assert_eq!(graph.base_of(circle), Some(shape), "entry {entry}");
            assert!(graph.get(circle).is_fully_initialized);
            assert_eq!(graph.members_of(circle).len(), 1);
        }
    }

    #[test]
    fn types_deriving_from_each_other_are_circular() {
        let set = set_of(vec![
            named_complex("A", Some("B"), vec![field("a", QualifiedName::xsd("string"))]),
            named_complex("B", Some("A"), vec![field("b", QualifiedName::xsd("string"))]),
        ]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        assert!(matches!(
            importer.import_type_mapping(&q("A")),
            Err(MappingError::CircularReference { kind: ReferenceKind::Type, .. })
        ));
    }

    #[test]
    fn arrays_of_each_other_are_circular() {
        let set = set_of(vec![
            named_complex("A", None, vec![Particle::Element(ElementDecl::named("B", q("B")).occurs(0, MaxOccurs::UNBOUNDED))]),
            named_complex("B", None, vec![Particle::Element(ElementDecl::named("A", q("A")).occurs(0, MaxOccurs::UNBOUNDED))]),
        ]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        assert!(matches!(
            importer.import_type_mapping(&q("A")),
            Err(MappingError::CircularReference { kind: ReferenceKind::Type, .. })
        ));
    }

    #[test]
    fn deep_nesting_is_finished_past_the_recursion_limit() {
        let set = set_of(vec![
            named_complex("A", None, vec![field("b", q("B"))]),
            named_complex("B", None, vec![field("c", q("C"))]),
            named_complex("C", None, vec![field("d", q("D"))]),
            named_complex("D", None, vec![field("x", QualifiedName::xsd("string"))]),
            named_complex("E", Some("D"), vec![field("y", QualifiedName::xsd("int"))]),
        ]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default().with_recursion_limit(1));
        importer.import_type_mapping(&q("A")).unwrap();
        let graph = importer.graph();
        for name in ["A", "B", "C", "D", "E"] {
            let id = by_name(graph, name);
            assert!(graph.get(id).is_fully_initialized, "{name} left unpopulated");
            assert_eq!(graph.members_of(id).len(), 1);
        }
        let d = by_name(graph, "D");
        assert_eq!(graph.base_of(by_name(graph, "E")), Some(d));
    }

    #[test]
    fn inline_types_are_keyed_by_declaration_path() {
        let inline = |child: &str| {
            Particle::Element(ElementDecl {
                name: Some("Item".into()),
                complex_type: Some(Box::new(ComplexType {
                    particle: sequence(vec![field(child, QualifiedName::xsd("string"))]),
                    ..Default::default()
                })),
                ..Default::default()
            })
        };
        let set = set_of(vec![
            named_complex("Left", None, vec![inline("x")]),
            named_complex("Right", None, vec![inline("y")]),
        ]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let left = importer.import_type_mapping(&q("Left")).unwrap();
        let right = importer.import_type_mapping(&q("Right")).unwrap();
        let graph = importer.graph();
        let item_of = |owner| graph.members_of(owner)[0].elements[0].mapping;
        assert_ne!(item_of(left), item_of(right));
        assert!(graph.get(item_of(left)).is_anonymous);
        assert_eq!(graph.members_of(item_of(right))[0].name, "y");
    }
}
