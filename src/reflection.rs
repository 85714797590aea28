//! Reflected model → mapping graph.
//!
//! One `ReflectionImporter` is one session: every table it fills is a field,
//! and the graph it builds is handed out whole by [`ReflectionImporter::finish`].
mod arrays;
mod limiter;
mod members;
mod structs;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::annotations::XmlRootAttribute;
use crate::config::ImportOptions;
use crate::error::{MappingError, MappingResult};
use crate::mapping::scope::AccessorScope;
use crate::mapping::{
    Accessor, ConstantMapping, EnumMapping, Mapping, MappingGraph, MappingId, MappingKind, MemberScope, MembersMapping,
    NameTable, NullableMapping, PrimitiveMapping, SpecialKind, SpecialMapping,
};
use crate::model::{EnumModel, ModelScope, ReflectedMember, ReflectedModel, SerializableModel, TypeModel};
use crate::names::{QualifiedName, XmlForm, encode_local_name};
use crate::type_desc::{SpecialType, TypeDescId, TypeScope};

pub use limiter::{ImportStructWorkItem, RecursionLimiter, WorkItem};
pub(crate) use limiter::Progress;

/// Where a mapping is about to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImportContext {
    Element,
    Attribute,
    Text,
}

impl ImportContext {
    fn describe(self) -> &'static str {
        match self {
            Self::Element => "an element",
            Self::Attribute => "an attribute value",
            Self::Text => "text content",
        }
    }
}

pub struct ReflectionImporter<'m> {
    models: ModelScope<'m>,
    graph: MappingGraph,
    options: ImportOptions,
    /// Named struct, enum, array and serializable mappings by XML type name.
    types: NameTable<MappingId>,
    nullables: NameTable<MappingId>,
    anonymous: HashMap<TypeDescId, MappingId>,
    anonymous_nullables: HashMap<TypeDescId, MappingId>,
    primitives: HashMap<QualifiedName, MappingId>,
    specials: HashMap<TypeDescId, MappingId>,
    serializables: HashMap<TypeDescId, MappingId>,
    limiter: RecursionLimiter<ImportStructWorkItem<'m>>,
    /// Structs whose population is on the call stack right now.
    in_progress: HashSet<MappingId>,
}

impl<'m> ReflectionImporter<'m> {
    pub fn new(model: &'m ReflectedModel, options: ImportOptions) -> Self {
        let limiter = RecursionLimiter::new(options.effective_recursion_limit());
        Self {
            models: ModelScope::new(model),
            graph: MappingGraph::new(TypeScope::new()),
            options,
            types: NameTable::new(),
            nullables: NameTable::new(),
            anonymous: HashMap::new(),
            anonymous_nullables: HashMap::new(),
            primitives: HashMap::new(),
            specials: HashMap::new(),
            serializables: HashMap::new(),
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

    fn default_ns(&self) -> Option<String> {
        self.options.default_namespace.clone()
    }

    // ------ Entry points ------ //

    /// Import the type mapping for a type expression without declaring an
    /// element for it.
    pub fn import_type_mapping(&mut self, type_expr: &str) -> MappingResult<MappingId> {
        let desc = self.models.resolve(&mut self.graph.types, type_expr)?;
        let ns = self.default_ns();
        self.import_type(desc, ns.as_deref(), ImportContext::Element, None, false)
    }

    /// Import a type as a top-level element; the root annotation falls back
    /// to the one on the type itself.
    pub fn import_element(&mut self, type_expr: &str, root: Option<&XmlRootAttribute>) -> MappingResult<Accessor> {
        let desc = self.models.resolve(&mut self.graph.types, type_expr)?;
        let root = match root {
            Some(root) => root.clone(),
            None => self.type_root(desc)?.unwrap_or_default(),
        };

        let ns = root.namespace.clone().or_else(|| self.default_ns());
        let mapping = self.import_type(desc, ns.as_deref(), ImportContext::Element, root.data_type.as_deref(), false)?;
        let type_desc = self.graph.types.get(desc);
        let nullable_by_type = type_desc.is_nullable() || type_desc.is_optional_value();
        let is_nullable = root.is_nullable.unwrap_or(nullable_by_type);
        if is_nullable && type_desc.is_value_type() {
            return Err(MappingError::annotation(
                type_desc.name.clone(),
                "a value type cannot be a nillable root element",
            ));
        }
        let name = match &root.element_name {
            Some(name) => encode_local_name(name),
            None => self.graph.get(self.graph.unwrap_nullable(mapping)).type_name.clone(),
        };
        let accessor = Accessor::new(name, ns.as_deref(), mapping).nullable(is_nullable);
        self.graph.reconcile_accessor(AccessorScope::Element, accessor)
    }

    fn type_root(&self, desc: TypeDescId) -> MappingResult<Option<XmlRootAttribute>> {
        let ty = match self.models.type_model(&self.graph.types, desc)? {
            TypeModel::Struct(m) => m.ty,
            TypeModel::Enum(m) => m.ty,
            TypeModel::Serializable(m) => m.ty,
            _ => return Ok(None),
        };
        let attrs = self.models.resolver().type_attributes(&ty.name, &ty.attributes)?;
        Ok(attrs.root.clone())
    }

    /// Force import of a type so it joins its base's derived chain.
    pub fn include_type(&mut self, type_expr: &str) -> MappingResult<MappingId> {
        self.import_type_mapping(type_expr)
    }

    /// Compile a flat member list, e.g. an operation's parameters.
    pub fn import_members_mapping(
        &mut self,
        element_name: &str,
        ns: Option<&str>,
        members: &'m [ReflectedMember],
        has_wrapper_element: bool,
    ) -> MappingResult<Accessor> {
        let fields = self.models.member_fields(&mut self.graph.types, element_name, members)?;
        let ns_owned = ns.map(str::to_owned).or_else(|| self.default_ns());
        let ns = ns_owned.as_deref();

        let mut scope = MemberScope::default();
        for field in &fields {
            let member = self.import_field(element_name, field, members, ns, ns)?;
            scope.add(element_name, member)?;
        }
        let MemberScope { members: mapped, xmlns_member, is_sequence, .. } =
            scope.finish(element_name, false)?;

        let mut mapping = Mapping::new(
            element_name,
            ns,
            None,
            MappingKind::Members(MembersMapping {
                members: mapped,
                has_wrapper_element,
                xmlns_member,
                is_sequence,
            }),
        );
        mapping.include_in_schema = false;
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        let accessor = Accessor::new(encode_local_name(element_name), ns, id);
        if has_wrapper_element {
            self.graph.reconcile_accessor(AccessorScope::Element, accessor)
        } else {
            Ok(accessor)
        }
    }

    // ------ Dispatch ------ //

    pub(crate) fn import_type(
        &mut self,
        desc: TypeDescId,
        ns: Option<&str>,
        context: ImportContext,
        data_type: Option<&str>,
        repeats: bool,
    ) -> MappingResult<MappingId> {
        let model = self.models.type_model(&self.graph.types, desc)?;
        let unsupported = |types: &TypeScope, reason: &str| {
            Err(MappingError::unsupported(types.get(desc).name.clone(), context.describe(), reason))
        };
        match model {
            TypeModel::Primitive(_) => self.import_primitive(desc, data_type),
            TypeModel::Enum(model) => self.import_enum(model, ns, repeats),
            TypeModel::Struct(model) => {
                if context != ImportContext::Element {
                    return unsupported(&self.graph.types, "structs only map to elements");
                }
                if data_type.is_some() {
                    return Err(MappingError::annotation(model.name(), "a dataType applies to primitives only"));
                }
                let open_model = self.options.open_model;
                self.import_struct(model, ns, open_model)
            }
            TypeModel::Array { .. } => {
                if context != ImportContext::Element {
                    return unsupported(&self.graph.types, "array-like types only map to elements");
                }
                self.import_array(desc, &[], ns, 0)
            }
            TypeModel::Nullable { desc, base } => {
                if context != ImportContext::Element {
                    return unsupported(&self.graph.types, "optional values only map to elements");
                }
                self.import_nullable(desc, base, ns, data_type)
            }
            TypeModel::Special { kind, .. } => match (kind, context) {
                (SpecialType::Namespaces, _) => {
                    unsupported(&self.graph.types, "namespace tables only map to an xmlns member")
                }
                (SpecialType::Attribute, ImportContext::Attribute)
                | (SpecialType::Node, ImportContext::Element | ImportContext::Text)
                | (SpecialType::Element, ImportContext::Element) => Ok(self.import_special(desc, kind)),
                _ => unsupported(&self.graph.types, "wrong DOM node kind for this position"),
            },
            TypeModel::Root(_) => {
                if context != ImportContext::Element {
                    return unsupported(&self.graph.types, "`object` only maps to elements");
                }
                Ok(self.graph.root_mapping())
            }
            TypeModel::Serializable(model) => {
                if context != ImportContext::Element {
                    return unsupported(&self.graph.types, "self-describing types only map to elements");
                }
                self.import_serializable(model, ns)
            }
        }
    }

    // ------ Leaf mappings ------ //

    pub(crate) fn import_primitive(&mut self, desc: TypeDescId, data_type: Option<&str>) -> MappingResult<MappingId> {
        let code_name = self.graph.types.get(desc).name.clone();
        let data_desc = match data_type {
            None => desc,
            Some(dt) => {
                let found = self.graph.types.data_type_by_local_name(dt).ok_or_else(|| {
                    MappingError::annotation(code_name.clone(), format!("`{dt}` is not a known data type"))
                })?;
                if self.graph.types.get(found).name != code_name {
                    return Err(MappingError::annotation(
                        code_name,
                        format!("data type `{dt}` does not match the member type"),
                    ));
                }
                found
            }
        };
        let qname = self
            .graph
            .types
            .data_type_name(data_desc)
            .ok_or_else(|| MappingError::Internal(format!("primitive `{code_name}` has no data type")))?;
        if let Some(id) = self.primitives.get(&qname) {
            return Ok(*id);
        }
        let mut mapping = Mapping::new(
            qname.name.clone(),
            qname.ns(),
            Some(data_desc),
            MappingKind::Primitive(PrimitiveMapping::default()),
        );
        mapping.include_in_schema = !qname.is_xsd();
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        self.primitives.insert(qname, id);
        Ok(id)
    }

    fn import_enum(&mut self, model: EnumModel<'m>, ns: Option<&str>, repeats: bool) -> MappingResult<MappingId> {
        let resolver = self.models.resolver();
        let attrs = resolver.type_attributes(&model.ty.name, &model.ty.attributes)?;
        if model.is_flags() && repeats {
            return Err(MappingError::annotation(
                model.ty.name.clone(),
                "a flags enum cannot be used as a list of values",
            ));
        }
        let xml_type = attrs.xml_type.clone().unwrap_or_default();
        let type_name = xml_type.type_name.clone().unwrap_or_else(|| encode_local_name(&model.ty.name));
        let type_ns = xml_type.namespace.clone().or(ns.map(str::to_owned));
        let anonymous = attrs.is_anonymous_in(ns);

        let existing = if anonymous {
            self.anonymous.get(&model.desc).copied()
        } else {
            self.types.get(&type_name, type_ns.as_deref()).copied()
        };
        if let Some(id) = existing {
            return self.check_same_type(id, model.desc, &type_name, type_ns.as_deref());
        }

        let mut constants = Vec::new();
        let mut seen = HashSet::new();
        for constant in model.constants() {
            let attrs = resolver.constant_attributes(&model.ty.name, &constant.name, &constant.attributes)?;
            if attrs.ignore {
                continue;
            }
            let xml_name = attrs.enum_name.clone().unwrap_or_else(|| constant.name.clone());
            if !seen.insert(xml_name.clone()) {
                return Err(MappingError::annotation(
                    format!("{}.{}", model.ty.name, constant.name),
                    format!("XML name `{xml_name}` is used by two constants"),
                ));
            }
            constants.push(ConstantMapping { name: constant.name.clone(), xml_name, value: constant.value });
        }

        let mut mapping = Mapping::new(
            type_name.clone(),
            type_ns.as_deref(),
            Some(model.desc),
            MappingKind::Enum(EnumMapping { constants, is_flags: model.is_flags() }),
        );
        mapping.include_in_schema = attrs.include_in_schema();
        mapping.is_anonymous = anonymous;
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        if anonymous {
            self.anonymous.insert(model.desc, id);
        } else {
            self.types.insert(&type_name, type_ns.as_deref(), id);
        }
        Ok(id)
    }

    /// An existing named mapping may only be reused for the same type.
    fn check_same_type(&self, id: MappingId, desc: TypeDescId, name: &str, ns: Option<&str>) -> MappingResult<MappingId> {
        let existing = self.graph.get(id);
        if existing.type_desc == Some(desc) {
            return Ok(id);
        }
        let theirs = existing.type_desc.map(|d| self.graph.types.get(d).name.clone()).unwrap_or_default();
        Err(MappingError::conflict(
            QualifiedName::new(name, ns),
            format!(
                "types `{}` and `{theirs}` both use this XML type name",
                self.graph.types.get(desc).name
            ),
        ))
    }

    fn import_nullable(
        &mut self,
        desc: TypeDescId,
        base_desc: TypeDescId,
        ns: Option<&str>,
        data_type: Option<&str>,
    ) -> MappingResult<MappingId> {
        let base = self.import_type(base_desc, ns, ImportContext::Element, data_type, false)?;
        let base_mapping = self.graph.get(base);
        let (type_name, type_ns, anonymous) =
            (base_mapping.type_name.clone(), base_mapping.namespace.clone(), base_mapping.is_anonymous);

        let existing = if anonymous {
            self.anonymous_nullables.get(&base_desc).copied()
        } else {
            self.nullables.get(&type_name, type_ns.as_deref()).copied()
        };
        if let Some(id) = existing {
            let MappingKind::Nullable(n) = &self.graph.get(id).kind else {
                return Err(MappingError::Internal(format!("nullable table holds a non-nullable `{type_name}`")));
            };
            let other = n.base;
            let same_primitive = self.graph.get(other).is_primitive()
                && self.graph.get(base).is_primitive()
                && self.graph.get(other).type_desc == self.graph.get(base).type_desc;
            if other == base || same_primitive {
                return Ok(id);
            }
            return Err(MappingError::conflict(
                QualifiedName { name: type_name, namespace: type_ns },
                "two different optional value types share this XML type name",
            ));
        }

        let include_in_schema = self.graph.get(base).include_in_schema;
        let mut mapping = Mapping::new(type_name.clone(), type_ns.as_deref(), Some(desc), MappingKind::Nullable(NullableMapping { base }));
        mapping.include_in_schema = include_in_schema;
        mapping.is_anonymous = anonymous;
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        if anonymous {
            self.anonymous_nullables.insert(base_desc, id);
        } else {
            self.nullables.insert(&type_name, type_ns.as_deref(), id);
        }
        Ok(id)
    }

    pub(crate) fn import_special(&mut self, desc: TypeDescId, kind: SpecialType) -> MappingId {
        if let Some(id) = self.specials.get(&desc) {
            return *id;
        }
        let special = match kind {
            SpecialType::Element => SpecialKind::Element,
            SpecialType::Attribute => SpecialKind::Attribute,
            SpecialType::Node | SpecialType::Namespaces => SpecialKind::Node,
        };
        let name = self.graph.types.get(desc).name.clone();
        let mut mapping = Mapping::new(
            name,
            None,
            Some(desc),
            MappingKind::Special(SpecialMapping { special, named_any: false, schema_type: None }),
        );
        mapping.include_in_schema = false;
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        self.specials.insert(desc, id);
        id
    }

    fn import_serializable(&mut self, model: SerializableModel<'m>, ns: Option<&str>) -> MappingResult<MappingId> {
        if let Some(id) = self.serializables.get(&model.desc) {
            return Ok(*id);
        }
        let schema_type = model.schema_type().cloned();
        let (name, type_ns) = match &schema_type {
            Some(q) => (q.name.clone(), q.namespace.clone()),
            None => (encode_local_name(&model.ty.name), ns.map(str::to_owned)),
        };
        let mut mapping = Mapping::new(
            name,
            type_ns.as_deref(),
            Some(model.desc),
            MappingKind::Special(SpecialMapping { special: SpecialKind::Serializable, named_any: false, schema_type }),
        );
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        self.serializables.insert(model.desc, id);

        if let Some(base_desc) = self.graph.types.get(model.desc).base {
            if let TypeModel::Serializable(base_model) = self.models.type_model(&self.graph.types, base_desc)? {
                let base = self.import_serializable(base_model, ns)?;
                debug!(derived = %model.ty.name, base = %base_model.ty.name, "chaining serializable type");
                self.graph.add_derived(base, id);
            }
        }
        Ok(id)
    }

    /// Element / attribute namespace and form from explicit annotations.
    pub(crate) fn accessor_namespace(
        target: &str,
        explicit_ns: Option<&str>,
        explicit_form: Option<XmlForm>,
        type_ns: Option<&str>,
        is_attribute: bool,
    ) -> MappingResult<(Option<String>, XmlForm)> {
        if is_attribute {
            return match (explicit_form, explicit_ns) {
                (Some(XmlForm::Unqualified), Some(ns)) if !ns.is_empty() => {
                    Err(MappingError::annotation(target, "an unqualified attribute cannot carry a namespace"))
                }
                (Some(XmlForm::Qualified), ns) => Ok((ns.or(type_ns).map(str::to_owned), XmlForm::Qualified)),
                (None, Some(ns)) if !ns.is_empty() && Some(ns) != type_ns => {
                    Ok((Some(ns.to_owned()), XmlForm::Qualified))
                }
                _ => Ok((None, XmlForm::Unqualified)),
            };
        }
        match (explicit_form.unwrap_or_default(), explicit_ns) {
            (XmlForm::Unqualified, Some(ns)) if !ns.is_empty() => {
                Err(MappingError::annotation(target, "an unqualified element cannot carry a namespace"))
            }
            (XmlForm::Unqualified, _) => Ok((None, XmlForm::Unqualified)),
            (XmlForm::Qualified, ns) => Ok((ns.or(type_ns).map(str::to_owned), XmlForm::Qualified)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{XmlAttributes, XmlTypeAttribute};
    use crate::model::ReflectedType;

    fn importer(model: &ReflectedModel) -> ReflectionImporter<'_> {
        ReflectionImporter::new(model, ImportOptions::default())
    }

    #[test]
    fn primitives_are_cached_per_data_type() {
        let model = ReflectedModel::new();
        let mut imp = importer(&model);
        let a = imp.import_type_mapping("i32").unwrap();
        assert_eq!(imp.import_type_mapping("i32").unwrap(), a);
        assert_eq!(imp.graph().get(a).qname(), QualifiedName::xsd("int"));

        let datetime = imp.graph.types.named("datetime").unwrap();
        let date = imp.import_primitive(datetime, Some("date")).unwrap();
        assert_ne!(date, imp.import_primitive(datetime, None).unwrap());
        assert!(matches!(
            imp.import_primitive(datetime, Some("int")),
            Err(MappingError::InvalidAnnotation { .. })
        ));
    }

    #[test]
    fn nullable_primitives_dedupe() {
        let model = ReflectedModel::new();
        let mut imp = importer(&model);
        let a = imp.import_type_mapping("i32?").unwrap();
        let b = imp.import_type_mapping("i32?").unwrap();
        assert_eq!(a, b);
        let MappingKind::Nullable(n) = &imp.graph().get(a).kind else { panic!("not nullable") };
        assert_eq!(imp.graph().get(n.base).type_name, "int");
    }

    #[test]
    fn flags_enum_list_is_rejected() {
        let model = ReflectedModel::new().with_type(ReflectedType::enumeration("Perm", &["Read", "Write"], true));
        let mut imp = importer(&model);
        let desc = imp.models.resolve(&mut imp.graph.types, "Perm").unwrap();
        let err = imp.import_type(desc, None, ImportContext::Attribute, None, true).unwrap_err();
        assert!(matches!(err, MappingError::InvalidAnnotation { .. }));
        let id = imp.import_type(desc, None, ImportContext::Attribute, None, false).unwrap();
        assert!(imp.graph().get(id).as_enum().unwrap().is_flags);
    }

    #[test]
    fn renamed_types_cannot_share_a_name() {
        let renamed = XmlAttributes {
            xml_type: Some(XmlTypeAttribute { type_name: Some("Color".into()), ..Default::default() }),
            ..Default::default()
        };
        let model = ReflectedModel::new()
            .with_type(ReflectedType::enumeration("Color", &["Red"], false))
            .with_type(ReflectedType::enumeration("Shade", &["Dark"], false).annotated(renamed));
        let mut imp = importer(&model);
        imp.import_type_mapping("Color").unwrap();
        let err = imp.import_type_mapping("Shade").unwrap_err();
        assert!(matches!(err, MappingError::Conflict { .. }));
    }

    #[test]
    fn structs_are_not_attribute_values() {
        let model = ReflectedModel::new().with_type(ReflectedType::class("Point").member("X", "i32"));
        let mut imp = importer(&model);
        let desc = imp.models.resolve(&mut imp.graph.types, "Point").unwrap();
        let err = imp.import_type(desc, None, ImportContext::Attribute, None, false).unwrap_err();
        assert!(matches!(err, MappingError::UnsupportedShape { .. }));
    }

    #[test]
    fn element_namespace_rules() {
        let q = ReflectionImporter::accessor_namespace("T.m", None, None, Some("urn:t"), false).unwrap();
        assert_eq!(q, (Some("urn:t".to_owned()), XmlForm::Qualified));
        let u = ReflectionImporter::accessor_namespace("T.m", None, Some(XmlForm::Unqualified), Some("urn:t"), false).unwrap();
        assert_eq!(u, (None, XmlForm::Unqualified));
        let a = ReflectionImporter::accessor_namespace("T.m", None, None, Some("urn:t"), true).unwrap();
        assert_eq!(a, (None, XmlForm::Unqualified));
        let other = ReflectionImporter::accessor_namespace("T.m", Some("urn:o"), None, Some("urn:t"), true).unwrap();
        assert_eq!(other, (Some("urn:o".to_owned()), XmlForm::Qualified));
    }

    #[test]
    fn anonymous_struct_stays_out_of_the_named_scope() {
        let named = XmlAttributes {
            xml_type: Some(XmlTypeAttribute { type_name: Some("Shape".into()), ..Default::default() }),
            ..Default::default()
        };
        let anonymous = XmlAttributes {
            xml_type: Some(XmlTypeAttribute {
                type_name: Some("Shape".into()),
                anonymous_type: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let model = ReflectedModel::new()
            .with_type(ReflectedType::class("Outline").member("Edges", "i32").annotated(named))
            .with_type(ReflectedType::class("Fill").member("Color", "string").annotated(anonymous));
        let mut imp = importer(&model);
        let outline = imp.import_type_mapping("Outline").unwrap();
        let fill = imp.import_type_mapping("Fill").unwrap();
        assert_ne!(outline, fill);
        assert_eq!(imp.import_type_mapping("Fill").unwrap(), fill);
        let graph = imp.graph();
        assert!(graph.get(fill).is_anonymous);
        assert!(!graph.get(outline).is_anonymous);
        assert_eq!(graph.members_of(fill)[0].name, "Color");
    }
}
