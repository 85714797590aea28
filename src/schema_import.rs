//! Schema set → mapping graph.
//!
//! Mirrors the reflection importer but reads particles instead of members.
//! Complex types are registered before they are populated, so a type that
//! reaches itself through its content finds its own (still filling) mapping.
//! Population runs under the same depth guard and deferred work-list as the
//! reflection side; a derived type waits until its base is complete. Group
//! and attribute-group references are expanded inline under an explicit
//! reference stack.
mod attributes;
mod particles;
mod types;

pub use types::MAX_FLAG_CONSTANTS;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::ImportOptions;
use crate::default_value::DefaultValue;
use crate::error::{MappingError, MappingResult, ReferenceKind};
use crate::mapping::scope::AccessorScope;
use crate::mapping::{
    Accessor, Mapping, MappingGraph, MappingId, MappingKind, MemberMapping, MemberScope, MembersMapping, NameTable,
    NullableMapping, PrimitiveMapping, SpecialKind, SpecialMapping,
};
use crate::names::{QualifiedName, UniqueNames, make_valid_identifier, unique_with_suffix};
use crate::reflection::{RecursionLimiter, WorkItem};
use crate::type_desc::{SpecialType, TypeDesc, TypeDescId, TypeFlags, TypeKey, TypeKind, TypeScope};
use crate::xsd::{ComplexType, SchemaType, XmlSchemaSet};

/// Namespace and declaration path of an inline type.
pub(crate) type DeclarationKey = (Option<String>, String);

/// How a schema type is reached: by name, or inline under a declaration
/// whose name seeds the generated type name.
#[derive(Debug, Clone)]
pub(crate) enum TypeOrigin {
    Named(QualifiedName),
    /// `path` tells inline types apart: two declarations of one name under
    /// different owners get different types.
    Anonymous { context: String, ns: Option<String>, path: String },
}

impl TypeOrigin {
    /// Inline under the declaration `name`, local to `owner` unless it is
    /// declared at the top level.
    pub(crate) fn inline(name: &str, ns: Option<&str>, owner: Option<&str>, path_name: &str) -> Self {
        let path = match owner {
            Some(owner) => format!("{owner}/{path_name}"),
            None => path_name.to_owned(),
        };
        Self::Anonymous { context: name.to_owned(), ns: ns.map(str::to_owned), path }
    }

    fn ns(&self) -> Option<&str> {
        match self {
            Self::Named(q) => q.ns(),
            Self::Anonymous { ns, .. } => ns.as_deref(),
        }
    }

    fn declaration_key(&self) -> Option<DeclarationKey> {
        match self {
            Self::Named(_) => None,
            Self::Anonymous { ns, path, .. } => Some((ns.clone(), path.clone())),
        }
    }
}

/// A complex type whose content still has to be walked.
#[derive(Debug, Clone)]
pub struct ImportComplexTypeWorkItem<'s> {
    pub ct: &'s ComplexType,
    pub mapping: MappingId,
    /// Target namespace of the schema declaring the type.
    pub ns: Option<String>,
}

impl WorkItem for ImportComplexTypeWorkItem<'_> {
    fn mapping(&self) -> MappingId {
        self.mapping
    }
}

/// Members of one complex type (or parameter list) while its content is
/// walked.
pub(crate) struct ContentScope {
    pub owner: String,
    /// Target namespace of the schema declaring the content.
    pub ns: Option<String>,
    pub members: MemberScope,
    names: UniqueNames,
    has_any_attribute: bool,
}

impl ContentScope {
    fn new(owner: impl Into<String>, ns: Option<&str>, members: MemberScope) -> Self {
        Self {
            owner: owner.into(),
            ns: ns.map(str::to_owned),
            members,
            names: UniqueNames::new(),
            has_any_attribute: false,
        }
    }

    /// Code-level member name, unique within the type.
    pub fn member_name(&mut self, xml_name: &str) -> String {
        self.names.add_unique(&make_valid_identifier(xml_name))
    }

    pub fn add(&mut self, member: MemberMapping) -> MappingResult<()> {
        self.members.add(&self.owner, member)
    }
}

pub struct SchemaImporter<'s> {
    set: &'s XmlSchemaSet,
    graph: MappingGraph,
    options: ImportOptions,
    /// Named type mappings by schema type name.
    types: NameTable<MappingId>,
    /// Inline types by declaration; two equal-looking inline types stay apart.
    anonymous_complex: HashMap<DeclarationKey, MappingId>,
    anonymous_simple: HashMap<DeclarationKey, MappingId>,
    /// Names handed to generated types, per namespace.
    type_names: HashMap<Option<String>, UniqueNames>,
    code_names: UniqueNames,
    primitives: HashMap<QualifiedName, MappingId>,
    nullables: HashMap<MappingId, MappingId>,
    specials: HashMap<SpecialType, MappingId>,
    group_stack: Vec<QualifiedName>,
    attribute_group_stack: Vec<QualifiedName>,
    /// Array types whose items are being resolved.
    array_stack: Vec<MappingId>,
    limiter: RecursionLimiter<ImportComplexTypeWorkItem<'s>>,
    /// Structs whose population is on the call stack right now.
    in_progress: HashSet<MappingId>,
}

impl<'s> SchemaImporter<'s> {
    pub fn new(set: &'s XmlSchemaSet, options: ImportOptions) -> Self {
        let limiter = RecursionLimiter::new(options.effective_recursion_limit());
        Self {
            set,
            graph: MappingGraph::new(TypeScope::new()),
            options,
            types: NameTable::new(),
            anonymous_complex: HashMap::new(),
            anonymous_simple: HashMap::new(),
            type_names: HashMap::new(),
            code_names: UniqueNames::new(),
            primitives: HashMap::new(),
            nullables: HashMap::new(),
            specials: HashMap::new(),
            group_stack: Vec::new(),
            attribute_group_stack: Vec::new(),
            array_stack: Vec::new(),
            limiter,
            in_progress: HashSet::new(),
        }
    }

    pub fn graph(&self) -> &MappingGraph {
        &self.graph
    }

    pub fn finish(self) -> MappingGraph {
        self.graph
    }

    // ------ Entry points ------ //

    pub fn import_type_mapping(&mut self, name: &QualifiedName) -> MappingResult<MappingId> {
        self.import_type_by_name(name)
    }

    /// A top-level element, reconciled into the graph's element scope.
    pub fn import_element(&mut self, name: &QualifiedName) -> MappingResult<Accessor> {
        let set = self.set;
        let decl = set
            .find_element(name)
            .ok_or_else(|| MappingError::missing(ReferenceKind::Element, name.clone()))?;
        let mut mapping = self.element_type(decl, &name.name, name.ns(), None)?;
        if decl.nillable {
            mapping = self.nullable_of(mapping)?;
        }
        let mut accessor = Accessor::new(name.name.clone(), name.ns(), mapping).nullable(decl.nillable);
        accessor.default = decl.value_constraint().map(|v| self.parse_default(&name.name, v, mapping)).transpose()?;
        debug!(element = %name, "imported top-level element");
        self.graph.reconcile_accessor(AccessorScope::Element, accessor)
    }

    /// Every top-level element of the set, in schema order.
    pub fn import_all_elements(&mut self) -> MappingResult<Vec<Accessor>> {
        let names: Vec<QualifiedName> = self.set.elements().map(|(name, _)| name).collect();
        names.iter().map(|name| self.import_element(name)).collect()
    }

    /// A top-level attribute, reconciled into the graph's attribute scope.
    pub fn import_attribute(&mut self, name: &QualifiedName) -> MappingResult<Accessor> {
        let set = self.set;
        let decl = set
            .find_attribute(name)
            .ok_or_else(|| MappingError::missing(ReferenceKind::Attribute, name.clone()))?;
        let mapping = self.attribute_type(decl, &name.name, name.ns(), None)?;
        let mut accessor = Accessor::new(name.name.clone(), name.ns(), mapping);
        accessor.default = decl.value_constraint().map(|v| self.parse_default(&name.name, v, mapping)).transpose()?;
        self.graph.reconcile_accessor(AccessorScope::Attribute, accessor)
    }

    /// The content of a wrapper element compiled to a flat member list.
    pub fn import_members_mapping(&mut self, name: &QualifiedName) -> MappingResult<Accessor> {
        let set = self.set;
        let decl = set
            .find_element(name)
            .ok_or_else(|| MappingError::missing(ReferenceKind::Element, name.clone()))?;
        let complex = match (&decl.complex_type, &decl.type_name) {
            (Some(inline), _) => inline.as_ref(),
            (None, Some(type_name)) => match set.find_type(type_name) {
                Some(SchemaType::Complex(ct)) => ct,
                _ => {
                    return Err(MappingError::unsupported(
                        type_name.to_string(),
                        "a members wrapper",
                        "the wrapper element needs complex content",
                    ));
                }
            },
            (None, None) => {
                return Err(MappingError::unsupported(
                    name.to_string(),
                    "a members wrapper",
                    "the wrapper element needs complex content",
                ));
            }
        };

        let mut content = ContentScope::new(name.name.clone(), name.ns(), MemberScope::default());
        if let Some(particle) = &complex.particle {
            self.import_particle(particle, false, &mut content)?;
        }
        self.import_attributes(&complex.attributes, complex.any_attribute.as_ref(), &mut content)?;
        let owner = content.owner.clone();
        let MemberScope { members, xmlns_member, is_sequence, .. } = content.members.finish(&owner, false)?;

        let mut mapping = Mapping::new(
            name.name.clone(),
            name.ns(),
            None,
            MappingKind::Members(MembersMapping { members, has_wrapper_element: true, xmlns_member, is_sequence }),
        );
        mapping.include_in_schema = false;
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        let accessor = Accessor::new(name.name.clone(), name.ns(), id).nullable(decl.nillable);
        self.graph.reconcile_accessor(AccessorScope::Element, accessor)
    }

    // ------ Shared helpers ------ //

    /// A type name not yet used in `ns` by the set or by earlier generated
    /// types.
    pub(crate) fn generate_type_name(&mut self, base: &str, ns: Option<&str>) -> String {
        let set = self.set;
        let types = &self.types;
        let names = self.type_names.entry(ns.map(str::to_owned)).or_default();
        let name = unique_with_suffix(base, |candidate| {
            names.is_taken(candidate)
                || types.contains(candidate, ns)
                || set.contains_type(&QualifiedName::new(candidate, ns))
        });
        names.reserve(&name);
        name
    }

    /// Register a descriptor for a generated type under a unique code name.
    pub(crate) fn generated_desc(&mut self, xml_name: &str, kind: TypeKind, flags: TypeFlags) -> TypeDescId {
        let base = make_valid_identifier(xml_name);
        let types = &self.graph.types;
        let code_names = &self.code_names;
        let code = unique_with_suffix(&base, |c| code_names.is_taken(c) || types.named(c).is_some());
        self.code_names.reserve(&code);
        self.graph.types.get_or_insert(TypeKey::Named(code.clone()), || {
            TypeDesc::new(code, kind, flags | TypeFlags::GENERATED)
        })
    }

    /// Built-in types: `anyType` is the root, `anySimpleType` reads as a
    /// string, everything else goes through the data type table.
    pub(crate) fn import_builtin(&mut self, name: &QualifiedName) -> MappingResult<MappingId> {
        if name.is_xsd() {
            match name.name.as_str() {
                "anyType" => return Ok(self.graph.root_mapping()),
                "anySimpleType" => return self.import_builtin(&QualifiedName::xsd("string")),
                _ => {}
            }
        }
        if let Some(id) = self.primitives.get(name) {
            return Ok(*id);
        }
        let desc = self.graph.types.data_type(name)?;
        let mut mapping = Mapping::new(
            name.name.clone(),
            name.ns(),
            Some(desc),
            MappingKind::Primitive(PrimitiveMapping::default()),
        );
        mapping.include_in_schema = !name.is_xsd();
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        self.primitives.insert(name.clone(), id);
        Ok(id)
    }

    pub(crate) fn string_mapping(&mut self) -> MappingResult<MappingId> {
        self.import_builtin(&QualifiedName::xsd("string"))
    }

    pub(crate) fn special(&mut self, kind: SpecialType) -> MappingId {
        if let Some(id) = self.specials.get(&kind) {
            return *id;
        }
        let desc = self.graph.types.special(kind);
        let special = match kind {
            SpecialType::Element => SpecialKind::Element,
            SpecialType::Attribute => SpecialKind::Attribute,
            SpecialType::Node | SpecialType::Namespaces => SpecialKind::Node,
        };
        let mut mapping = Mapping::new(
            self.graph.types.get(desc).name.clone(),
            None,
            Some(desc),
            MappingKind::Special(SpecialMapping { special, named_any: false, schema_type: None }),
        );
        mapping.include_in_schema = false;
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        self.specials.insert(kind, id);
        id
    }

    /// Wrap value types for a nillable position; reference types are
    /// nillable as they are.
    pub(crate) fn nullable_of(&mut self, base: MappingId) -> MappingResult<MappingId> {
        if let Some(id) = self.nullables.get(&base) {
            return Ok(*id);
        }
        let base_mapping = self.graph.get(base);
        let Some(desc) = base_mapping.type_desc.filter(|d| self.graph.types.get(*d).is_value_type()) else {
            return Ok(base);
        };
        let (type_name, ns, include, anonymous) = (
            base_mapping.type_name.clone(),
            base_mapping.namespace.clone(),
            base_mapping.include_in_schema,
            base_mapping.is_anonymous,
        );
        let optional = self.graph.types.optional_of(desc)?;
        let mut mapping = Mapping::new(type_name, ns.as_deref(), Some(optional), MappingKind::Nullable(NullableMapping { base }));
        mapping.include_in_schema = include;
        mapping.is_anonymous = anonymous;
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        self.nullables.insert(base, id);
        Ok(id)
    }

    /// The descriptor a member holding `mapping` is typed as.
    pub(crate) fn desc_of(&self, mapping: MappingId) -> TypeDescId {
        self.graph.get(mapping).type_desc.unwrap_or_else(|| self.graph.types.root())
    }

    /// Default and fixed values, typed against the (unwrapped) mapping.
    pub(crate) fn parse_default(&self, target: &str, text: &str, mapping: MappingId) -> MappingResult<DefaultValue> {
        let id = self.graph.unwrap_nullable(mapping);
        let mapping = self.graph.get(id);
        match &mapping.kind {
            MappingKind::Primitive(_) => {
                let desc = mapping.type_desc.ok_or_else(|| MappingError::Internal(format!("primitive `{}` has no descriptor", mapping.type_name)))?;
                DefaultValue::parse(text, self.graph.types.get(desc))
            }
            MappingKind::Enum(e) => {
                let names = text
                    .split_whitespace()
                    .map(|value| {
                        e.constant_by_xml_name(value).map(|c| c.name.clone()).ok_or_else(|| {
                            MappingError::annotation(target, format!("`{value}` is not a value of `{}`", mapping.type_name))
                        })
                    })
                    .collect::<MappingResult<Vec<_>>>()?;
                Ok(DefaultValue::Enum(names))
            }
            _ => Err(MappingError::annotation(target, "default values apply to simple types only")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::{ElementDecl, SchemaItem, XmlSchema};

    fn set_of(items: Vec<SchemaItem>) -> XmlSchemaSet {
        let mut schema = XmlSchema::new(Some("urn:t"));
        schema.items = items;
        XmlSchemaSet::from_schemas(vec![schema]).unwrap()
    }

    fn q(name: &str) -> QualifiedName {
        QualifiedName::new(name, Some("urn:t"))
    }

    #[test]
    fn nillable_value_element_wraps_in_nullable() {
        let set = set_of(vec![SchemaItem::Element(ElementDecl {
            nillable: true,
            ..ElementDecl::named("count", QualifiedName::xsd("int"))
        })]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let accessor = importer.import_element(&q("count")).unwrap();
        assert!(accessor.is_nullable);
        let graph = importer.graph();
        assert!(matches!(graph.get(accessor.mapping).kind, MappingKind::Nullable(_)));
        assert_eq!(graph.get(graph.unwrap_nullable(accessor.mapping)).type_name, "int");
    }

    #[test]
    fn missing_element_and_type() {
        let set = set_of(vec![SchemaItem::Element(ElementDecl::named("x", q("Nope")))]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        assert!(matches!(
            importer.import_element(&q("y")),
            Err(MappingError::MissingReference { kind: ReferenceKind::Element, .. })
        ));
        assert!(matches!(
            importer.import_element(&q("x")),
            Err(MappingError::MissingReference { kind: ReferenceKind::Type, .. })
        ));
    }

    #[test]
    fn generated_names_avoid_schema_types() {
        let set = set_of(vec![SchemaItem::ComplexType(ComplexType { name: Some("Item".into()), ..Default::default() })]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        assert_eq!(importer.generate_type_name("Item", Some("urn:t")), "Item1");
        assert_eq!(importer.generate_type_name("Item", Some("urn:t")), "Item2");
        assert_eq!(importer.generate_type_name("Item", None), "Item");
    }

    #[test]
    fn defaults_are_typed() {
        let set = set_of(vec![SchemaItem::Element(ElementDecl {
            default_value: Some("42".into()),
            ..ElementDecl::named("n", QualifiedName::xsd("int"))
        })]);
        let mut importer = SchemaImporter::new(&set, ImportOptions::default());
        let accessor = importer.import_element(&q("n")).unwrap();
        assert_eq!(accessor.default, Some(DefaultValue::Int(42)));
    }
}
