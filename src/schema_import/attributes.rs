//! Attribute uses, attribute groups and attribute wildcards.
use tracing::trace;

use crate::error::{MappingError, MappingResult, ReferenceKind};
use crate::mapping::{Accessor, MappingId, MappingKind, MemberMapping};
use crate::names::{XML_NAMESPACE, XmlForm};
use crate::schema_import::{ContentScope, SchemaImporter, TypeOrigin};
use crate::type_desc::SpecialType;
use crate::xsd::{AttributeDecl, AttributeItem, AttributeUse, Wildcard};

impl<'s> SchemaImporter<'s> {
    pub(crate) fn import_attributes(
        &mut self,
        items: &'s [AttributeItem],
        any: Option<&'s Wildcard>,
        content: &mut ContentScope,
    ) -> MappingResult<()> {
        for item in items {
            match item {
                AttributeItem::Attribute(decl) => self.import_attribute_use(decl, content)?,
                AttributeItem::AttributeGroup { ref_name } => {
                    if self.attribute_group_stack.contains(ref_name) {
                        return Err(MappingError::CircularReference {
                            kind: ReferenceKind::AttributeGroup,
                            name: ref_name.clone(),
                        });
                    }
                    let set = self.set;
                    let group = set
                        .find_attribute_group(ref_name)
                        .ok_or_else(|| MappingError::missing(ReferenceKind::AttributeGroup, ref_name.clone()))?;
                    self.attribute_group_stack.push(ref_name.clone());
                    let result = self.import_attributes(&group.attributes, group.any_attribute.as_ref(), content);
                    self.attribute_group_stack.pop();
                    result?;
                }
            }
        }
        match any {
            Some(wildcard) if !content.has_any_attribute => {
                content.has_any_attribute = true;
                let mapping = self.special(SpecialType::Attribute);
                let item = self.graph.types.special(SpecialType::Attribute);
                let mut member = MemberMapping::new(content.member_name("AnyAttr"), self.graph.types.array_of(item));
                let mut accessor = Accessor::new("", wildcard.single_namespace(), mapping);
                accessor.any = true;
                member.attribute = Some(accessor);
                member.repeats = true;
                content.add(member)
            }
            _ => Ok(()),
        }
    }

    fn import_attribute_use(&mut self, decl: &'s AttributeDecl, content: &mut ContentScope) -> MappingResult<()> {
        if decl.use_ == AttributeUse::Prohibited {
            trace!(owner = %content.owner, "skipping prohibited attribute");
            return Ok(());
        }
        let set = self.set;
        let (mut accessor, default_text) = match &decl.ref_name {
            Some(reference) if reference.ns() == Some(XML_NAMESPACE) => {
                let mapping = self.string_mapping()?;
                let mut accessor = Accessor::new(reference.name.clone(), reference.ns(), mapping).with_form(XmlForm::Qualified);
                accessor.is_special_xml_namespace = true;
                (accessor, decl.value_constraint())
            }
            Some(reference) => {
                let global = set
                    .find_attribute(reference)
                    .ok_or_else(|| MappingError::missing(ReferenceKind::Attribute, reference.clone()))?;
                let mapping = self.attribute_type(global, &reference.name, reference.ns(), None)?;
                let accessor = Accessor::new(reference.name.clone(), reference.ns(), mapping).with_form(XmlForm::Qualified);
                (accessor, decl.value_constraint().or(global.value_constraint()))
            }
            None => {
                let name = decl.name.as_deref().ok_or_else(|| {
                    MappingError::unsupported(content.owner.clone(), "a local attribute", "a local attribute needs a name or a reference")
                })?;
                let form = decl.form.unwrap_or_else(|| set.attribute_form_default(content.ns.as_deref()));
                let ns = match form {
                    XmlForm::Qualified => content.ns.as_deref(),
                    XmlForm::Unqualified => None,
                };
                let mapping = self.attribute_type(decl, name, content.ns.as_deref(), Some(content.owner.as_str()))?;
                (Accessor::new(name, ns, mapping).with_form(form), decl.value_constraint())
            }
        };
        accessor.default = default_text.map(|v| self.parse_default(&accessor.name, v, accessor.mapping)).transpose()?;

        let desc = self.desc_of(accessor.mapping);
        let mut member = MemberMapping::new(content.member_name(&accessor.name), desc);
        member.check_specified = decl.use_ == AttributeUse::Optional
            && accessor.default.is_none()
            && self.graph.types.get(desc).is_value_type();
        member.attribute = Some(accessor);
        content.add(member)
    }

    /// Attributes hold simple values: a named or inline simple type, or
    /// `string` when the declaration names none.
    pub(crate) fn attribute_type(
        &mut self,
        decl: &'s AttributeDecl,
        context: &str,
        ns: Option<&str>,
        owner: Option<&str>,
    ) -> MappingResult<MappingId> {
        let id = match (&decl.type_name, &decl.simple_type) {
            (Some(type_name), _) => self.import_type_by_name(type_name)?,
            (None, Some(inline)) => {
                let origin = TypeOrigin::inline(context, ns, owner, &format!("@{context}"));
                self.import_simple_type(inline, origin)?
            }
            (None, None) => self.string_mapping()?,
        };
        let mapping = self.graph.get(id);
        match mapping.kind {
            MappingKind::Primitive(_) | MappingKind::Enum(_) => Ok(id),
            _ => Err(MappingError::unsupported(
                mapping.type_name.clone(),
                "an attribute",
                "attributes can only hold simple types",
            )),
        }
    }
}
