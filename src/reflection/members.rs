//! Per-member import: one member becomes element alternatives, an attribute,
//! text, an xmlns capture or a wildcard.
use crate::annotations::{XmlAttributeFlags, XmlAttributes, XmlElementAttribute, check_member_flags};
use crate::default_value::DefaultValue;
use crate::error::{MappingError, MappingResult};
use crate::mapping::{ANY_ELEMENT_CONSTANT, Accessor, ChoiceIdentifier, MemberMapping, XmlnsAccessor};
use crate::model::{FieldModel, ReflectedMember, TypeModel};
use crate::names::{XML_NAMESPACE, encode_local_name};
use crate::reflection::{ImportContext, ReflectionImporter};
use crate::type_desc::{SpecialType, TypeDescId, TypeKind};

impl<'m> ReflectionImporter<'m> {
    /// Import one member of `owner`. `type_ns` qualifies its accessors,
    /// `ns` is where types it references are imported.
    pub(crate) fn import_field(
        &mut self,
        owner: &str,
        field: &FieldModel<'m>,
        siblings: &'m [ReflectedMember],
        type_ns: Option<&str>,
        ns: Option<&str>,
    ) -> MappingResult<MemberMapping> {
        let target = format!("{owner}.{}", field.name);
        let attrs = field.attributes;
        let desc = self.graph.types.get(field.type_desc).clone();
        let flags = check_member_flags(&target, attrs, desc.is_array_like())?;

        let mut member = MemberMapping::new(field.name, field.type_desc);
        member.check_specified = field.check_specified;

        if flags.contains(XmlAttributeFlags::XMLNS) {
            if !desc.is_special(SpecialType::Namespaces) {
                return Err(MappingError::annotation(target, "an xmlns member must be of type XmlNamespaces"));
            }
            member.xmlns = Some(XmlnsAccessor { member_name: field.name.to_owned() });
            return Ok(member);
        }
        if desc.is_special(SpecialType::Namespaces) {
            return Err(MappingError::unsupported(
                desc.name,
                "a plain member",
                "namespace tables need the xmlns annotation",
            ));
        }

        let default = self.member_default(&target, attrs, field.type_desc)?;
        let item_desc = match (desc.is_array_like(), desc.element) {
            (true, Some(element)) => element,
            _ => field.type_desc,
        };

        if flags.contains(XmlAttributeFlags::ATTRIBUTE) {
            let a = attrs.attribute.clone().unwrap_or_default();
            let (attr_ns, form) =
                Self::accessor_namespace(&target, a.namespace.as_deref(), a.form, type_ns, true)?;
            let is_list = desc.is_array_like();
            let mapping =
                self.import_type(item_desc, ns, ImportContext::Attribute, a.data_type.as_deref(), is_list)?;
            let name = a.attribute_name.as_deref().unwrap_or(field.name);
            let mut accessor = Accessor::new(encode_local_name(name), attr_ns.as_deref(), mapping).with_form(form);
            accessor.is_list = is_list;
            accessor.default = default;
            accessor.is_special_xml_namespace = attr_ns.as_deref() == Some(XML_NAMESPACE);
            member.attribute = Some(accessor);
            return Ok(member);
        }

        if flags.contains(XmlAttributeFlags::ANY_ATTRIBUTE) {
            let item = self.graph.types.get(item_desc);
            let kind = match item.special {
                Some(kind @ (SpecialType::Attribute | SpecialType::Node)) => kind,
                _ => {
                    return Err(MappingError::annotation(
                        target,
                        "an attribute wildcard must hold XmlAttribute or XmlNode values",
                    ));
                }
            };
            let mapping = self.import_special(item_desc, kind);
            let mut accessor = Accessor::new("", None, mapping);
            accessor.any = true;
            member.attribute = Some(accessor);
            member.repeats = desc.is_array_like();
            return Ok(member);
        }

        if flags.contains(XmlAttributeFlags::TEXT) {
            if desc.is_array_like() {
                let item = self.graph.types.get(item_desc);
                if !(item.name == "string" || item.is_special(SpecialType::Node)) {
                    return Err(MappingError::unsupported(
                        desc.name,
                        "text content",
                        "only string[] and XmlNode[] collect repeated text",
                    ));
                }
            }
            let data_type = attrs.text.as_ref().and_then(|t| t.data_type.as_deref());
            let mapping = self.import_type(item_desc, ns, ImportContext::Text, data_type, false)?;
            let mut accessor = Accessor::new("", None, mapping);
            accessor.default = default;
            member.text = Some(accessor);
            member.repeats = desc.is_array_like();
            return Ok(member);
        }

        let flattened = flags.intersects(XmlAttributeFlags::ELEMENTS | XmlAttributeFlags::ANY_ELEMENTS);
        if desc.is_array_like() && !flattened {
            if default.is_some() {
                return Err(MappingError::annotation(target, "arrays cannot carry a default value"));
            }
            let arr = attrs.array.clone().unwrap_or_default();
            let (element_ns, form) =
                Self::accessor_namespace(&target, arr.namespace.as_deref(), arr.form, type_ns, false)?;
            let items_ns = element_ns.as_deref().or(type_ns);
            let mapping = self.import_array(field.type_desc, &attrs.array_items, items_ns, 0)?;
            let name = arr.element_name.as_deref().unwrap_or(field.name);
            let accessor = Accessor::new(encode_local_name(name), element_ns.as_deref(), mapping)
                .with_form(form)
                .nullable(arr.is_nullable.unwrap_or(false));
            member.elements.push(accessor);
            member.sequence_id = arr.order;
        } else {
            member.repeats = desc.is_array_like();
            self.import_element_alternatives(&target, field, item_desc, &mut member, default, type_ns, ns)?;
        }

        if let Some(identifier) = &attrs.choice_identifier {
            member.choice_identifier = Some(self.import_choice_identifier(&target, identifier, &member, siblings, ns)?);
        } else if member.elements.len() > 1 {
            self.check_unambiguous(&target, &member)?;
        }
        Ok(member)
    }

    #[allow(clippy::too_many_arguments)]
    fn import_element_alternatives(
        &mut self,
        target: &str,
        field: &FieldModel<'m>,
        item_desc: TypeDescId,
        member: &mut MemberMapping,
        default: Option<DefaultValue>,
        type_ns: Option<&str>,
        ns: Option<&str>,
    ) -> MappingResult<()> {
        let attrs = field.attributes;
        let implicit = [XmlElementAttribute::default()];
        let elements: &[XmlElementAttribute] =
            if attrs.elements.is_empty() && attrs.any_elements.is_empty() { &implicit } else { &attrs.elements };
        let multiple = elements.len() + attrs.any_elements.len() > 1;
        let mut orders = Vec::new();

        for e in elements {
            let alt_desc = match &e.type_name {
                None => item_desc,
                Some(name) => {
                    let alt = self.models.resolve(&mut self.graph.types, name)?;
                    let base = self.graph.types.get(item_desc);
                    if !(base.is_root() || self.graph.types.is_derived_from(alt, item_desc)) {
                        return Err(MappingError::annotation(
                            target,
                            format!("`{name}` is not assignable to `{}`", base.name),
                        ));
                    }
                    alt
                }
            };
            let mapping = self.import_type(alt_desc, ns, ImportContext::Element, e.data_type.as_deref(), false)?;
            let name = match &e.element_name {
                Some(name) => encode_local_name(name),
                None if multiple => self.graph.get(self.graph.unwrap_nullable(mapping)).type_name.clone(),
                None => encode_local_name(field.name),
            };
            let (element_ns, form) = Self::accessor_namespace(target, e.namespace.as_deref(), e.form, type_ns, false)?;
            let alt = self.graph.types.get(alt_desc);
            let is_nullable = match e.is_nullable {
                Some(true) if alt.is_value_type() => {
                    return Err(MappingError::annotation(target, "a value type cannot be nillable"));
                }
                Some(value) => value,
                None => alt.is_optional_value(),
            };
            let mut accessor = Accessor::new(name, element_ns.as_deref(), mapping).with_form(form).nullable(is_nullable);
            if !member.repeats {
                accessor.default = default.clone();
            }
            member.elements.push(accessor);
            orders.push(e.order);
        }

        for any in &attrs.any_elements {
            let kind = match self.graph.types.get(item_desc).special {
                Some(kind @ (SpecialType::Element | SpecialType::Node)) => kind,
                _ => {
                    return Err(MappingError::annotation(
                        target,
                        "an element wildcard must hold XmlElement or XmlNode values",
                    ));
                }
            };
            let mapping = self.import_special(item_desc, kind);
            let mut accessor = Accessor::new(
                any.name.as_deref().map(encode_local_name).unwrap_or_default(),
                any.namespace.as_deref(),
                mapping,
            );
            accessor.any = true;
            member.elements.push(accessor);
            orders.push(any.order);
        }

        let mut explicit = orders.into_iter().flatten();
        member.sequence_id = explicit.next();
        if let Some(other) = explicit.find(|o| Some(*o) != member.sequence_id) {
            return Err(MappingError::sequence(
                target,
                format!("alternatives of one member declare orders {} and {other}", member.sequence_id.unwrap_or(0)),
            ));
        }
        Ok(())
    }

    /// Without an identifier, alternatives must differ by type.
    fn check_unambiguous(&self, target: &str, member: &MemberMapping) -> MappingResult<()> {
        for (i, a) in member.elements.iter().enumerate() {
            for b in &member.elements[i + 1..] {
                let same_type = self.graph.get(a.mapping).type_desc == self.graph.get(b.mapping).type_desc;
                if same_type || (a.any && b.any) {
                    return Err(MappingError::annotation(
                        target,
                        format!(
                            "alternatives `{}` and `{}` are ambiguous without a choice identifier",
                            a.qname(),
                            b.qname()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn import_choice_identifier(
        &mut self,
        target: &str,
        identifier: &str,
        member: &MemberMapping,
        siblings: &'m [ReflectedMember],
        ns: Option<&str>,
    ) -> MappingResult<ChoiceIdentifier> {
        let sibling = siblings.iter().find(|m| m.name == identifier).ok_or_else(|| {
            MappingError::annotation(target, format!("choice identifier member `{identifier}` does not exist"))
        })?;
        let sibling_desc = self.models.resolve(&mut self.graph.types, &sibling.type_name)?;
        let enum_desc = if member.repeats {
            let desc = self.graph.types.get(sibling_desc);
            match (desc.is_array_like(), desc.element) {
                (true, Some(element)) => element,
                _ => {
                    return Err(MappingError::annotation(
                        target,
                        format!("a repeating choice needs an array of enums in `{identifier}`"),
                    ));
                }
            }
        } else {
            sibling_desc
        };
        if self.graph.types.get(enum_desc).kind != TypeKind::Enum {
            return Err(MappingError::annotation(target, format!("choice identifier `{identifier}` is not an enum")));
        }
        let TypeModel::Enum(enum_model) = self.models.type_model(&self.graph.types, enum_desc)? else {
            return Err(MappingError::annotation(target, format!("choice identifier `{identifier}` is not an enum")));
        };
        let mapping = self.import_type(enum_model.desc, ns, ImportContext::Element, None, false)?;
        let Some(constants) = self.graph.get(mapping).as_enum() else {
            return Err(MappingError::Internal(format!("enum `{identifier}` imported as a non-enum mapping")));
        };

        let mut member_ids = Vec::with_capacity(member.elements.len());
        for element in &member.elements {
            let found = if element.any && element.name.is_empty() {
                constants.constant_by_xml_name(ANY_ELEMENT_CONSTANT)
            } else {
                let qualified = element.namespace.as_ref().map(|ns| format!("{ns}:{}", element.name));
                constants
                    .constant_by_xml_name(&element.name)
                    .or_else(|| qualified.as_deref().and_then(|q| constants.constant_by_xml_name(q)))
            };
            let constant = found.ok_or_else(|| {
                MappingError::annotation(
                    target,
                    format!("choice identifier `{identifier}` has no value for element `{}`", element.qname()),
                )
            })?;
            member_ids.push(constant.name.clone());
        }
        Ok(ChoiceIdentifier { member_name: identifier.to_owned(), mapping, member_ids })
    }

    /// A default value typed against the member, or its optional base.
    fn member_default(
        &mut self,
        target: &str,
        attrs: &XmlAttributes,
        desc: TypeDescId,
    ) -> MappingResult<Option<DefaultValue>> {
        let Some(value) = &attrs.default_value else {
            return Ok(None);
        };
        let base = self.graph.types.get(desc).optional_of.unwrap_or(desc);
        match self.models.type_model(&self.graph.types, base)? {
            TypeModel::Primitive(_) => DefaultValue::from_json(value, self.graph.types.get(base)).map(Some),
            TypeModel::Enum(model) => {
                let text = value.as_str().ok_or_else(|| {
                    MappingError::annotation(target, "an enum default must be a string of constant names")
                })?;
                let names: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
                if names.is_empty() || (names.len() > 1 && !model.is_flags()) {
                    return Err(MappingError::annotation(target, format!("`{text}` is not a valid enum default")));
                }
                if let Some(bad) = names.iter().find(|n| !model.constants().iter().any(|c| &c.name == *n)) {
                    return Err(MappingError::annotation(target, format!("`{bad}` is not a constant of `{}`", model.ty.name)));
                }
                Ok(Some(DefaultValue::Enum(names)))
            }
            _ => Err(MappingError::annotation(target, "default values apply to primitives and enums only")),
        }
    }
}
