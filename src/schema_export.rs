//! Mapping graph → schema set.
//!
//! Named mappings become one top-level type each, keyed by mapping id so a
//! type reached twice is written once. Anonymous mappings are built inline at
//! their use site. A reference that crosses into another namespace gets an
//! `import` on the referring schema.
mod members;

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::config::ExportOptions;
use crate::default_value::DefaultValue;
use crate::error::{MappingError, MappingResult, ReferenceKind};
use crate::mapping::{Accessor, MappingGraph, MappingId, MappingKind, SpecialKind};
use crate::names::{PRIMITIVE_TYPES_NAMESPACE, QualifiedName};
use crate::xsd::{
    AttributeDecl, ComplexType, ElementDecl, MaxOccurs, ModelGroup, Particle, SchemaItem, SimpleContent, SimpleType,
    XmlSchemaSet,
};

/// How a declaration refers to its type.
#[derive(Debug, Clone)]
pub(crate) enum TypeRef {
    Named(QualifiedName),
    Complex(ComplexType),
    Simple(SimpleType),
}

impl TypeRef {
    fn apply_to_element(self, decl: &mut ElementDecl) {
        match self {
            Self::Named(name) => decl.type_name = Some(name),
            Self::Complex(ct) => decl.complex_type = Some(Box::new(ct)),
            Self::Simple(st) => decl.simple_type = Some(Box::new(st)),
        }
    }

    fn apply_to_attribute(self, decl: &mut AttributeDecl, owner: &str) -> MappingResult<()> {
        match self {
            Self::Named(name) => decl.type_name = Some(name),
            Self::Simple(st) => decl.simple_type = Some(Box::new(st)),
            Self::Complex(_) => {
                return Err(MappingError::unsupported(owner, "an attribute", "attributes can only hold simple types"));
            }
        }
        Ok(())
    }
}

pub struct SchemaExporter<'g> {
    graph: &'g MappingGraph,
    options: ExportOptions,
    schemas: XmlSchemaSet,
    exported: HashMap<MappingId, QualifiedName>,
    /// Anonymous mappings whose inline type is being built right now.
    inlining: HashSet<MappingId>,
    /// Top-level declarations written so far and the mapping each declares.
    elements: HashMap<QualifiedName, MappingId>,
    attributes: HashMap<QualifiedName, MappingId>,
}

impl<'g> SchemaExporter<'g> {
    pub fn new(graph: &'g MappingGraph, options: ExportOptions) -> Self {
        Self {
            graph,
            options,
            schemas: XmlSchemaSet::new(),
            exported: HashMap::new(),
            inlining: HashSet::new(),
            elements: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn schemas(&self) -> &XmlSchemaSet {
        &self.schemas
    }

    pub fn finish(self) -> XmlSchemaSet {
        self.schemas
    }

    // ------ Entry points ------ //

    /// Every top-level element and attribute of the graph, then any named
    /// type no element reached.
    pub fn export_graph(&mut self) -> MappingResult<()> {
        let graph = self.graph;
        for accessor in graph.elements.values() {
            self.export_element(accessor)?;
        }
        for accessor in graph.attributes.values() {
            self.export_attribute(accessor)?;
        }
        for (id, mapping) in graph.iter() {
            let named = matches!(mapping.kind, MappingKind::Struct(_) | MappingKind::Enum(_) | MappingKind::Array(_));
            if named && mapping.include_in_schema && !mapping.is_anonymous && !graph.is_root(id) {
                self.export_type_mapping(id)?;
            }
        }
        Ok(())
    }

    /// Export a named mapping as a top-level type and return its name.
    pub fn export_type_mapping(&mut self, id: MappingId) -> MappingResult<QualifiedName> {
        let mapping = self.graph.get(id);
        if mapping.is_anonymous {
            return Err(MappingError::unsupported(
                mapping.type_name.clone(),
                "a top-level type",
                "anonymous types are only written inline",
            ));
        }
        match self.type_ref(id, mapping.namespace.as_deref())? {
            TypeRef::Named(name) => Ok(name),
            TypeRef::Complex(_) | TypeRef::Simple(_) => Err(MappingError::Internal(format!(
                "named mapping `{}` exported inline",
                mapping.type_name
            ))),
        }
    }

    /// A top-level element. Declaring one name twice is fine for the same
    /// mapping and a conflict otherwise.
    pub fn export_element(&mut self, accessor: &Accessor) -> MappingResult<()> {
        if accessor.any && accessor.name.is_empty() {
            return Ok(());
        }
        let graph = self.graph;
        let qname = accessor.qname();
        let id = graph.unwrap_nullable(accessor.mapping);
        if let Some(existing) = self.elements.get(&qname) {
            if *existing == id {
                return Ok(());
            }
            return Err(MappingError::conflict(qname, "two different types are exported under this element"));
        }
        self.elements.insert(qname.clone(), id);
        let ns = accessor.namespace.as_deref();
        self.ensure_schema(ns);

        let mut decl = ElementDecl { name: Some(accessor.name.clone()), nillable: accessor.is_nullable, ..ElementDecl::default() };
        if let MappingKind::Members(members) = &graph.get(id).kind {
            if !members.has_wrapper_element {
                return Err(MappingError::unsupported(
                    accessor.name.clone(),
                    "a top-level element",
                    "a parameter list without wrapper is exported member by member",
                ));
            }
            let mut ct = ComplexType::default();
            self.member_content(&members.members, members.xmlns_member.is_some(), ns, &mut ct)?;
            decl.complex_type = Some(Box::new(ct));
        } else {
            self.type_ref(accessor.mapping, ns)?.apply_to_element(&mut decl);
        }
        decl.default_value = self.default_text(accessor)?;
        debug!(element = %qname, "exported top-level element");
        self.schemas.add_item(ns, SchemaItem::Element(decl))
    }

    pub fn export_attribute(&mut self, accessor: &Accessor) -> MappingResult<()> {
        if accessor.is_special_xml_namespace || (accessor.any && accessor.name.is_empty()) {
            return Ok(());
        }
        let qname = accessor.qname();
        if let Some(existing) = self.attributes.get(&qname) {
            if *existing == accessor.mapping {
                return Ok(());
            }
            return Err(MappingError::conflict(qname, "two different types are exported under this attribute"));
        }
        self.attributes.insert(qname.clone(), accessor.mapping);
        let ns = accessor.namespace.as_deref();
        self.ensure_schema(ns);
        let mut decl = AttributeDecl { name: Some(accessor.name.clone()), ..AttributeDecl::default() };
        self.attribute_type(accessor, ns)?.apply_to_attribute(&mut decl, &accessor.name)?;
        decl.default_value = self.default_text(accessor)?;
        self.schemas.add_item(ns, SchemaItem::Attribute(decl))
    }

    /// A parameter list: the wrapper element with the members inline, or
    /// one top-level element per member when there is no wrapper.
    pub fn export_members_mapping(&mut self, accessor: &Accessor) -> MappingResult<()> {
        let graph = self.graph;
        let MappingKind::Members(members) = &graph.get(accessor.mapping).kind else {
            return Err(MappingError::Internal(format!("`{}` is not a members mapping", accessor.name)));
        };
        if members.has_wrapper_element {
            return self.export_element(accessor);
        }
        for member in &members.members {
            for element in &member.elements {
                self.export_element(element)?;
            }
        }
        Ok(())
    }

    // ------ Types ------ //

    /// Reference to the type of `id` from a declaration in schema `from_ns`.
    pub(crate) fn type_ref(&mut self, id: MappingId, from_ns: Option<&str>) -> MappingResult<TypeRef> {
        let graph = self.graph;
        let mapping = graph.get(id);
        let named = match &mapping.kind {
            MappingKind::Nullable(n) => return self.type_ref(n.base, from_ns),
            MappingKind::Members(_) => {
                return Err(MappingError::unsupported(
                    mapping.type_name.clone(),
                    "a member type",
                    "a parameter list cannot be nested",
                ));
            }
            MappingKind::Special(special) => match (special.special, &special.schema_type) {
                (SpecialKind::Serializable, Some(schema_type)) => schema_type.clone(),
                _ => QualifiedName::xsd("anyType"),
            },
            MappingKind::Struct(_) if graph.is_root(id) => QualifiedName::xsd("anyType"),
            MappingKind::Primitive(_) => {
                let name = mapping.qname();
                if name.ns() == Some(PRIMITIVE_TYPES_NAMESPACE) {
                    self.export_primitive_type(&name)?;
                }
                name
            }
            _ if mapping.is_anonymous => return self.inline_type(id),
            _ => self.export_named(id)?,
        };
        if !named.is_xsd() && named.ns() != from_ns && self.schemas.add_import(from_ns, named.ns()) {
            debug!(from = from_ns.unwrap_or_default(), to = named.ns().unwrap_or_default(), "added namespace import");
        }
        Ok(TypeRef::Named(named))
    }

    fn inline_type(&mut self, id: MappingId) -> MappingResult<TypeRef> {
        if !self.inlining.insert(id) {
            let mapping = self.graph.get(id);
            return Err(MappingError::CircularReference { kind: ReferenceKind::Type, name: mapping.qname() });
        }
        let built = self.build_type(id, None);
        self.inlining.remove(&id);
        Ok(match built? {
            SchemaItem::SimpleType(st) => TypeRef::Simple(st),
            SchemaItem::ComplexType(ct) => TypeRef::Complex(ct),
            _ => return Err(MappingError::Internal("inline type built as a declaration".to_owned())),
        })
    }

    fn export_named(&mut self, id: MappingId) -> MappingResult<QualifiedName> {
        if let Some(name) = self.exported.get(&id) {
            return Ok(name.clone());
        }
        let graph = self.graph;
        let mapping = graph.get(id);
        let name = mapping.qname();
        self.exported.insert(id, name.clone());
        self.ensure_schema(name.ns());
        let item = self.build_type(id, Some(name.name.clone()))?;
        self.schemas.add_item(name.ns(), item)?;
        trace!(type_name = %name, "exported type");

        for derived in graph.derived_mappings(id) {
            let derived_mapping = graph.get(*derived);
            if derived_mapping.include_in_schema && !derived_mapping.is_anonymous && derived_mapping.is_struct() {
                self.export_named(*derived)?;
            }
        }
        Ok(name)
    }

    fn build_type(&mut self, id: MappingId, name: Option<String>) -> MappingResult<SchemaItem> {
        let graph = self.graph;
        let mapping = graph.get(id);
        let ns = mapping.namespace.as_deref();
        match &mapping.kind {
            MappingKind::Struct(_) => Ok(SchemaItem::ComplexType(self.struct_type(id, name)?)),
            MappingKind::Array(array) => {
                let mut items = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    items.push(self.element_particle(element, ns, 1, false)?);
                }
                let particle = match items.len() {
                    1 => {
                        let mut item = items.remove(0);
                        set_occurs(&mut item, 0, true);
                        item
                    }
                    _ => Particle::Choice(ModelGroup { min_occurs: 0, max_occurs: MaxOccurs::UNBOUNDED, items }),
                };
                Ok(SchemaItem::ComplexType(ComplexType {
                    name,
                    particle: Some(Particle::Sequence(ModelGroup::of(vec![particle]))),
                    ..ComplexType::default()
                }))
            }
            MappingKind::Enum(e) => {
                let values = e.constants.iter().map(|c| c.xml_name.clone()).collect();
                if e.is_flags {
                    Ok(SchemaItem::SimpleType(SimpleType {
                        name,
                        content: SimpleContent::List {
                            item_type: None,
                            simple_type: Some(Box::new(SimpleType::enumeration(None, values))),
                        },
                    }))
                } else {
                    Ok(SchemaItem::SimpleType(SimpleType::enumeration(name, values)))
                }
            }
            MappingKind::Primitive(_)
            | MappingKind::Nullable(_)
            | MappingKind::Members(_)
            | MappingKind::Special(_) => Err(MappingError::Internal(format!(
                "`{}` has no type of its own to export",
                mapping.type_name
            ))),
        }
    }

    /// Types of the primitive-types namespace as restrictions of XSD types.
    fn export_primitive_type(&mut self, name: &QualifiedName) -> MappingResult<()> {
        if self.schemas.contains_type(name) {
            return Ok(());
        }
        let (base, pattern) = match name.name.as_str() {
            "char" => ("unsignedShort", None),
            "guid" => ("string", Some("[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")),
            _ => ("string", None),
        };
        self.ensure_schema(name.ns());
        let st = SimpleType {
            name: Some(name.name.clone()),
            content: SimpleContent::Restriction {
                base: Some(QualifiedName::xsd(base)),
                simple_type: None,
                enumeration: Vec::new(),
                pattern: pattern.map(str::to_owned),
            },
        };
        self.schemas.add_item(name.ns(), SchemaItem::SimpleType(st))
    }

    // ------ Shared helpers ------ //

    pub(crate) fn ensure_schema(&mut self, ns: Option<&str>) {
        self.schemas.schema_mut(ns, self.options.element_form_default, self.options.attribute_form_default);
    }

    /// Default values in their XML form; enum constants by XML name.
    pub(crate) fn default_text(&self, accessor: &Accessor) -> MappingResult<Option<String>> {
        let Some(default) = &accessor.default else { return Ok(None) };
        let DefaultValue::Enum(names) = default else { return Ok(Some(default.to_xml_string())) };
        let mapping = self.graph.get(self.graph.unwrap_nullable(accessor.mapping));
        let Some(e) = mapping.as_enum() else {
            return Err(MappingError::Internal(format!("enum default on non-enum `{}`", mapping.type_name)));
        };
        let xml_names = names
            .iter()
            .map(|name| {
                e.constants.iter().find(|c| &c.name == name).map(|c| c.xml_name.as_str()).ok_or_else(|| {
                    MappingError::annotation(accessor.name.clone(), format!("`{name}` is not a constant of `{}`", mapping.type_name))
                })
            })
            .collect::<MappingResult<Vec<_>>>()?;
        Ok(Some(xml_names.join(" ")))
    }
}

fn set_occurs(particle: &mut Particle, min: u32, repeats: bool) {
    let max = if repeats { MaxOccurs::UNBOUNDED } else { MaxOccurs::ONE };
    match particle {
        Particle::Element(e) => {
            e.min_occurs = min;
            e.max_occurs = max;
        }
        Particle::Any(w) => {
            w.min_occurs = min;
            w.max_occurs = max;
        }
        Particle::Sequence(g) | Particle::Choice(g) | Particle::All(g) => {
            g.min_occurs = min;
            g.max_occurs = max;
        }
        Particle::Group(r) => {
            r.min_occurs = min;
            r.max_occurs = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::scope::AccessorScope;
    use crate::mapping::{ArrayMapping, ConstantMapping, EnumMapping, Mapping, MemberMapping, StructMapping};
    use crate::type_desc::TypeScope;
    use crate::xsd::SchemaType;

    fn primitive(graph: &mut MappingGraph, xsd: &str) -> MappingId {
        let desc = graph.types.data_type(&QualifiedName::xsd(xsd)).unwrap();
        let mut mapping = Mapping::new(xsd, Some(crate::names::XSD_NAMESPACE), Some(desc), MappingKind::Primitive(Default::default()));
        mapping.include_in_schema = false;
        graph.add(mapping)
    }

    #[test]
    fn named_types_are_written_once() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let root = graph.types.root();
        let s = graph.add(Mapping::new("S", Some("urn:a"), Some(root), MappingKind::Struct(StructMapping::default())));
        graph.reconcile_accessor(AccessorScope::Element, Accessor::new("one", Some("urn:a"), s)).unwrap();
        graph.reconcile_accessor(AccessorScope::Element, Accessor::new("two", Some("urn:a"), s)).unwrap();
        let mut exporter = SchemaExporter::new(&graph, ExportOptions::default());
        exporter.export_graph().unwrap();
        let set = exporter.finish();
        let schema = set.schema(Some("urn:a")).unwrap();
        let types = schema.items.iter().filter(|i| matches!(i, SchemaItem::ComplexType(_))).count();
        assert_eq!(types, 1);
        assert!(set.find_element(&QualifiedName::new("two", Some("urn:a"))).is_some());
    }

    #[test]
    fn cross_namespace_type_adds_an_import() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let root = graph.types.root();
        let s = graph.add(Mapping::new("S", Some("urn:types"), Some(root), MappingKind::Struct(StructMapping::default())));
        let mut exporter = SchemaExporter::new(&graph, ExportOptions::default());
        exporter.export_element(&Accessor::new("e", Some("urn:elements"), s)).unwrap();
        let set = exporter.finish();
        assert!(set.schema(Some("urn:elements")).unwrap().imports_namespace(Some("urn:types")));
        assert!(set.find_type(&QualifiedName::new("S", Some("urn:types"))).is_some());
    }

    #[test]
    fn flags_enum_is_a_list_of_an_enumeration() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let desc = graph.types.root();
        let constants = vec![
            ConstantMapping { name: "Read".into(), xml_name: "read".into(), value: 1 },
            ConstantMapping { name: "Write".into(), xml_name: "write".into(), value: 2 },
        ];
        let e = graph.add(Mapping::new("Perm", None, Some(desc), MappingKind::Enum(EnumMapping { constants, is_flags: true })));
        let mut accessor = Accessor::new("perm", None, e);
        accessor.default = Some(DefaultValue::Enum(vec!["Read".into(), "Write".into()]));
        let mut exporter = SchemaExporter::new(&graph, ExportOptions::default());
        exporter.export_element(&accessor).unwrap();
        let set = exporter.finish();
        let Some(SchemaType::Simple(st)) = set.find_type(&QualifiedName::local("Perm")) else { panic!("no simple type") };
        assert!(matches!(st.content, SimpleContent::List { .. }));
        assert_eq!(set.find_element(&QualifiedName::local("perm")).unwrap().default_value.as_deref(), Some("read write"));
    }

    #[test]
    fn arrays_repeat_their_single_item() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let int = primitive(&mut graph, "int");
        let int_desc = graph.types.data_type(&QualifiedName::xsd("int")).unwrap();
        let desc = graph.types.array_of(int_desc);
        let elements = vec![Accessor::new("int", None, int)];
        let array = graph.add(Mapping::new("ArrayOfInt", None, Some(desc), MappingKind::Array(ArrayMapping { elements, top_level: None })));
        let mut exporter = SchemaExporter::new(&graph, ExportOptions::default());
        assert_eq!(exporter.export_type_mapping(array).unwrap(), QualifiedName::local("ArrayOfInt"));
        let set = exporter.finish();
        let Some(SchemaType::Complex(ct)) = set.find_type(&QualifiedName::local("ArrayOfInt")) else { panic!("no complex type") };
        let Some(Particle::Sequence(seq)) = &ct.particle else { panic!("no sequence") };
        let [Particle::Element(item)] = seq.items.as_slice() else { panic!("expected one item") };
        assert_eq!((item.min_occurs, item.max_occurs), (0, MaxOccurs::UNBOUNDED));
    }

    #[test]
    fn self_containing_anonymous_type_is_circular() {
        let mut graph = MappingGraph::new(TypeScope::new());
        let root = graph.types.root();
        let mut mapping = Mapping::new("Anon", None, Some(root), MappingKind::Struct(StructMapping::default()));
        mapping.is_anonymous = true;
        let anon = graph.add(mapping);
        let mut member = MemberMapping::new("Child", root);
        member.elements.push(Accessor::new("Child", None, anon));
        graph.struct_mut(anon).unwrap().members.push(member);
        let mut exporter = SchemaExporter::new(&graph, ExportOptions::default());
        assert!(matches!(
            exporter.export_element(&Accessor::new("top", None, anon)),
            Err(MappingError::CircularReference { kind: ReferenceKind::Type, .. })
        ));
    }
}
