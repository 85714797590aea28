//! Normalizes reflected types into the handful of shapes the reflection
//! importer dispatches on, registering a `TypeDesc` for each on first sight.
pub mod reflected;

use std::collections::HashSet;

use crate::annotations::{AttributeResolver, XmlAttributes};
use crate::error::{MappingError, MappingResult, ReferenceKind};
use crate::names::QualifiedName;
use crate::type_desc::{SpecialType, TypeDesc, TypeDescId, TypeFlags, TypeKey, TypeKind, TypeScope};

pub use reflected::{ReflectedConstant, ReflectedMember, ReflectedModel, ReflectedShape, ReflectedType};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy)]
pub enum TypeModel<'m> {
    Primitive(TypeDescId),
    Enum(EnumModel<'m>),
    Struct(StructModel<'m>),
    /// Arrays, collections and enumerables alike.
    Array { desc: TypeDescId, element: TypeDescId },
    /// An optional value type, `T?`.
    Nullable { desc: TypeDescId, base: TypeDescId },
    Special { desc: TypeDescId, kind: SpecialType },
    Root(TypeDescId),
    Serializable(SerializableModel<'m>),
}

impl TypeModel<'_> {
    pub fn desc(&self) -> TypeDescId {
        match self {
            Self::Primitive(d) | Self::Root(d) => *d,
            Self::Enum(m) => m.desc,
            Self::Struct(m) => m.desc,
            Self::Serializable(m) => m.desc,
            Self::Array { desc, .. } | Self::Nullable { desc, .. } | Self::Special { desc, .. } => *desc,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StructModel<'m> {
    pub desc: TypeDescId,
    pub ty: &'m ReflectedType,
}

impl<'m> StructModel<'m> {
    pub fn name(&self) -> &'m str {
        &self.ty.name
    }

    pub fn members(&self) -> &'m [ReflectedMember] {
        match &self.ty.shape {
            ReflectedShape::Struct { members, .. } => members,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnumModel<'m> {
    pub desc: TypeDescId,
    pub ty: &'m ReflectedType,
}

impl<'m> EnumModel<'m> {
    pub fn constants(&self) -> &'m [ReflectedConstant] {
        match &self.ty.shape {
            ReflectedShape::Enum { constants, .. } => constants,
            _ => &[],
        }
    }

    pub fn is_flags(&self) -> bool {
        matches!(self.ty.shape, ReflectedShape::Enum { is_flags: true, .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SerializableModel<'m> {
    pub desc: TypeDescId,
    pub ty: &'m ReflectedType,
}

impl SerializableModel<'_> {
    pub fn schema_type(&self) -> Option<&QualifiedName> {
        match &self.ty.shape {
            ReflectedShape::Serializable { schema_type, .. } => schema_type.as_ref(),
            _ => None,
        }
    }
}

/// One member after overlay resolution and companion detection.
#[derive(Debug, Clone, Copy)]
pub struct FieldModel<'m> {
    pub name: &'m str,
    pub type_desc: TypeDescId,
    pub attributes: &'m XmlAttributes,
    /// A `<name>Specified` companion governs whether the member is written.
    pub check_specified: bool,
}

/// Type-expression resolution over one reflected model. Holds no descriptors
/// itself; they live in the `TypeScope` passed in, which the mapping graph
/// owns.
#[derive(Debug)]
pub struct ModelScope<'m> {
    model: &'m ReflectedModel,
    resolving: HashSet<String>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl<'m> ModelScope<'m> {
    pub fn new(model: &'m ReflectedModel) -> Self {
        Self { model, resolving: HashSet::new() }
    }

    pub fn reflected(&self) -> &'m ReflectedModel {
        self.model
    }

    pub fn resolver(&self) -> AttributeResolver<'m> {
        AttributeResolver::new(&self.model.overrides)
    }

    /// Resolve a type expression (`Order`, `i32?`, `string[][]`) to its
    /// canonical descriptor.
    pub fn resolve(&mut self, types: &mut TypeScope, expr: &str) -> MappingResult<TypeDescId> {
        let expr = expr.trim();
        if let Some(inner) = expr.strip_suffix("[]") {
            let element = self.resolve(types, inner)?;
            return Ok(types.array_of(element));
        }
        if let Some(inner) = expr.strip_suffix('?') {
            let base = self.resolve(types, inner)?;
            return types.optional_of(base);
        }
        if let Some(id) = types.named(expr) {
            return Ok(id);
        }
        let ty = self
            .model
            .get(expr)
            .ok_or_else(|| MappingError::missing(ReferenceKind::Type, QualifiedName::local(expr)))?;
        self.register(types, ty)
    }

    fn register(&mut self, types: &mut TypeScope, ty: &'m ReflectedType) -> MappingResult<TypeDescId> {
        if !self.resolving.insert(ty.name.clone()) {
            return Err(MappingError::CircularReference {
                kind: ReferenceKind::Type,
                name: QualifiedName::local(ty.name.clone()),
            });
        }
        let desc = self.describe(types, ty);
        self.resolving.remove(&ty.name);
        let desc = desc?;
        Ok(types.get_or_insert(TypeKey::Named(ty.name.clone()), || desc))
    }

    fn describe(&mut self, types: &mut TypeScope, ty: &'m ReflectedType) -> MappingResult<TypeDesc> {
        let element_flags = TypeFlags::CAN_BE_ELEMENT_VALUE;
        let desc = match &ty.shape {
            ReflectedShape::Struct { base, is_abstract, is_value_type, .. } => {
                let (kind, mut flags) = if *is_value_type {
                    (TypeKind::Struct, TypeFlags::VALUE_TYPE | element_flags)
                } else {
                    (TypeKind::Class, TypeFlags::NULLABLE | element_flags)
                };
                flags.set(TypeFlags::ABSTRACT, *is_abstract);
                let mut desc = TypeDesc::new(&ty.name, kind, flags);
                if let Some(base) = base {
                    let base_id = self.resolve(types, base)?;
                    let base_desc = types.get(base_id);
                    if !matches!(base_desc.kind, TypeKind::Class | TypeKind::Struct | TypeKind::Root) {
                        return Err(MappingError::unsupported(
                            ty.name.clone(),
                            "a base type",
                            format!("`{}` is a {} and cannot be derived from", base_desc.name, base_desc.kind),
                        ));
                    }
                    desc.base = Some(base_id);
                }
                desc
            }
            ReflectedShape::Enum { .. } => TypeDesc::new(
                &ty.name,
                TypeKind::Enum,
                TypeFlags::VALUE_TYPE
                    | TypeFlags::CAN_BE_ATTRIBUTE_VALUE
                    | TypeFlags::CAN_BE_ELEMENT_VALUE
                    | TypeFlags::CAN_BE_TEXT_VALUE,
            ),
            ReflectedShape::Collection { item } | ReflectedShape::Enumerable { item } => {
                let kind = match ty.shape {
                    ReflectedShape::Collection { .. } => TypeKind::Collection,
                    _ => TypeKind::Enumerable,
                };
                let mut desc = TypeDesc::new(&ty.name, kind, TypeFlags::NULLABLE | element_flags);
                desc.element = Some(self.resolve(types, item)?);
                desc
            }
            ReflectedShape::Serializable { base, .. } => {
                let mut desc = TypeDesc::new(&ty.name, TypeKind::Serializable, TypeFlags::NULLABLE | element_flags);
                if let Some(base) = base {
                    desc.base = Some(self.resolve(types, base)?);
                }
                desc
            }
        };
        Ok(desc)
    }

    /// Classify a registered descriptor.
    pub fn type_model(&self, types: &TypeScope, id: TypeDescId) -> MappingResult<TypeModel<'m>> {
        let desc = types.get(id);
        if let Some(base) = desc.optional_of {
            return Ok(TypeModel::Nullable { desc: id, base });
        }
        let reflected = || {
            self.model
                .get(&desc.name)
                .ok_or_else(|| MappingError::missing(ReferenceKind::Type, QualifiedName::local(desc.name.clone())))
        };
        let model = match desc.kind {
            TypeKind::Primitive => TypeModel::Primitive(id),
            TypeKind::Root => TypeModel::Root(id),
            TypeKind::Special => match desc.special {
                Some(kind) => TypeModel::Special { desc: id, kind },
                None => return Err(MappingError::Internal(format!("special type `{}` has no kind", desc.name))),
            },
            TypeKind::Array | TypeKind::Collection | TypeKind::Enumerable => match desc.element {
                Some(element) => TypeModel::Array { desc: id, element },
                None => return Err(MappingError::Internal(format!("array type `{}` has no item type", desc.name))),
            },
            TypeKind::Enum => TypeModel::Enum(EnumModel { desc: id, ty: reflected()? }),
            TypeKind::Struct | TypeKind::Class => TypeModel::Struct(StructModel { desc: id, ty: reflected()? }),
            TypeKind::Serializable => TypeModel::Serializable(SerializableModel { desc: id, ty: reflected()? }),
        };
        Ok(model)
    }

    /// The members a struct declares itself, overlay applied, ignored members
    /// and `Specified` companions removed.
    pub fn fields(&mut self, types: &mut TypeScope, model: StructModel<'m>) -> MappingResult<Vec<FieldModel<'m>>> {
        self.member_fields(types, model.name(), model.members())
    }

    /// Same as [`Self::fields`] for a flat member list; `owner` keys the
    /// member overrides.
    pub fn member_fields(
        &mut self,
        types: &mut TypeScope,
        owner: &str,
        members: &'m [ReflectedMember],
    ) -> MappingResult<Vec<FieldModel<'m>>> {
        let resolver = self.resolver();
        let visible: Vec<(&'m ReflectedMember, &'m XmlAttributes)> = members
            .iter()
            .map(|m| (m, resolver.member_attributes(owner, &m.name, &m.attributes)))
            .filter(|(_, attrs)| !attrs.ignore)
            .collect();

        let names: HashSet<&str> = visible.iter().map(|(m, _)| m.name.as_str()).collect();
        let companion_of = |m: &'m ReflectedMember| -> Option<&'m str> {
            let target = m.name.strip_suffix("Specified")?;
            (m.type_name == "bool" && names.contains(target)).then_some(target)
        };
        let specified: HashSet<&str> = visible.iter().filter_map(|(m, _)| companion_of(m)).collect();

        let mut fields = Vec::with_capacity(visible.len());
        for (member, attributes) in visible {
            if companion_of(member).is_some() {
                continue;
            }
            let type_desc = self.resolve(types, &member.type_name)?;
            fields.push(FieldModel {
                name: &member.name,
                type_desc,
                attributes,
                check_specified: specified.contains(member.name.as_str()),
            });
        }
        Ok(fields)
    }

    /// Every reflected type's descriptor; used for `--type`-less runs.
    pub fn all_types(&mut self, types: &mut TypeScope) -> MappingResult<Vec<TypeDescId>> {
        self.model
            .types
            .iter()
            .map(|t| self.resolve(types, &t.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ReflectedModel {
        ReflectedModel::new()
            .with_type(
                ReflectedType::class("Order")
                    .member("Id", "i32")
                    .member("Note", "string")
                    .member("NoteSpecified", "bool")
                    .member("Items", "string[]"),
            )
            .with_type(ReflectedType::class("Special").extends("Order"))
            .with_type(ReflectedType::enumeration("Color", &["Red", "Green"], false))
            .with_type(ReflectedType::class("Loop").extends("Loop"))
    }

    #[test]
    fn resolves_type_expressions() {
        let model = model();
        let mut types = TypeScope::new();
        let mut scope = ModelScope::new(&model);
        let arr = scope.resolve(&mut types, "Order[]").unwrap();
        let order = scope.resolve(&mut types, "Order").unwrap();
        assert_eq!(types.get(arr).element, Some(order));
        assert_eq!(scope.resolve(&mut types, "Order").unwrap(), order);

        let special = scope.resolve(&mut types, "Special").unwrap();
        assert_eq!(types.get(special).base, Some(order));
        assert!(types.is_derived_from(special, order));

        let color = scope.resolve(&mut types, "Color?").unwrap();
        assert!(matches!(scope.type_model(&types, color).unwrap(), TypeModel::Nullable { .. }));
        assert!(scope.resolve(&mut types, "Order?").is_err());
    }

    #[test]
    fn unknown_and_cyclic_types_fail() {
        let model = model();
        let mut types = TypeScope::new();
        let mut scope = ModelScope::new(&model);
        assert!(matches!(
            scope.resolve(&mut types, "Nope").unwrap_err(),
            MappingError::MissingReference { .. }
        ));
        assert!(matches!(
            scope.resolve(&mut types, "Loop").unwrap_err(),
            MappingError::CircularReference { .. }
        ));
    }

    #[test]
    fn specified_companions_fold_into_their_member() {
        let model = model();
        let mut types = TypeScope::new();
        let mut scope = ModelScope::new(&model);
        let order = scope.resolve(&mut types, "Order").unwrap();
        let TypeModel::Struct(sm) = scope.type_model(&types, order).unwrap() else {
            panic!("expected struct");
        };
        let fields = scope.fields(&mut types, sm).unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["Id", "Note", "Items"]);
        assert!(fields[1].check_specified);
        assert!(!fields[0].check_specified);
    }
}
