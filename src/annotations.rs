//! Declarative annotations on reflected types and members, and the overlay
//! resolver that picks between explicit overrides and intrinsic annotations.
use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, MappingResult};
use crate::names::XmlForm;

bitflags! {
    /// Which annotation kinds are present on one type / member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct XmlAttributeFlags: u32 {
        const ENUM              = 1 << 0;
        const ARRAY             = 1 << 1;
        const TEXT              = 1 << 2;
        const ARRAY_ITEMS       = 1 << 3;
        const ELEMENTS          = 1 << 4;
        const ATTRIBUTE         = 1 << 5;
        const ROOT              = 1 << 6;
        const TYPE              = 1 << 7;
        const ANY_ELEMENTS      = 1 << 8;
        const ANY_ATTRIBUTE     = 1 << 9;
        const CHOICE_IDENTIFIER = 1 << 10;
        const XMLNS             = 1 << 11;
    }
}

impl XmlAttributeFlags {
    /// Permitted on a type declaration.
    pub const TYPE_LEVEL: Self = Self::TYPE.union(Self::ROOT);
    /// Permitted on an enum constant.
    pub const CONSTANT_LEVEL: Self = Self::ENUM;
    /// Members serialized as element particles.
    pub const ELEMENT_KINDS: Self = Self::ELEMENTS
        .union(Self::TEXT)
        .union(Self::ANY_ELEMENTS)
        .union(Self::CHOICE_IDENTIFIER);
    pub const ATTRIBUTE_KINDS: Self = Self::ATTRIBUTE.union(Self::ANY_ATTRIBUTE);
    pub const ARRAY_KINDS: Self = Self::ARRAY.union(Self::ARRAY_ITEMS);
}

// ————————————————————————————————————————————————————————————————————————————
// ANNOTATION KINDS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlElementAttribute {
    pub element_name: Option<String>,
    pub namespace: Option<String>,
    /// Narrower type this alternative carries (polymorphic members).
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub data_type: Option<String>,
    pub form: Option<XmlForm>,
    pub is_nullable: Option<bool>,
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlArrayAttribute {
    pub element_name: Option<String>,
    pub namespace: Option<String>,
    pub form: Option<XmlForm>,
    pub is_nullable: Option<bool>,
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlArrayItemAttribute {
    pub element_name: Option<String>,
    pub namespace: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub data_type: Option<String>,
    pub form: Option<XmlForm>,
    pub is_nullable: Option<bool>,
    /// Array dimension this applies to; 0 is the outermost.
    pub nesting_level: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlAttributeAttribute {
    pub attribute_name: Option<String>,
    pub namespace: Option<String>,
    pub data_type: Option<String>,
    pub form: Option<XmlForm>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlTextAttribute {
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlAnyElementAttribute {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub order: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlTypeAttribute {
    pub type_name: Option<String>,
    pub namespace: Option<String>,
    pub anonymous_type: bool,
    pub include_in_schema: bool,
}

impl Default for XmlTypeAttribute {
    fn default() -> Self {
        Self { type_name: None, namespace: None, anonymous_type: false, include_in_schema: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlRootAttribute {
    pub element_name: Option<String>,
    pub namespace: Option<String>,
    pub is_nullable: Option<bool>,
    pub data_type: Option<String>,
}

/// Every annotation one type, member or enum constant may carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlAttributes {
    pub elements: Vec<XmlElementAttribute>,
    pub array: Option<XmlArrayAttribute>,
    pub array_items: Vec<XmlArrayItemAttribute>,
    pub attribute: Option<XmlAttributeAttribute>,
    pub text: Option<XmlTextAttribute>,
    pub any_elements: Vec<XmlAnyElementAttribute>,
    pub any_attribute: bool,
    /// Name of the sibling member holding the choice discriminant.
    pub choice_identifier: Option<String>,
    pub default_value: Option<serde_json::Value>,
    /// XML name of an enum constant.
    #[serde(rename = "enum")]
    pub enum_name: Option<String>,
    pub ignore: bool,
    pub xmlns: bool,
    #[serde(rename = "type")]
    pub xml_type: Option<XmlTypeAttribute>,
    pub root: Option<XmlRootAttribute>,
    /// Derived types to import alongside this one.
    pub include: Vec<String>,
}

impl XmlAttributes {
    pub fn flags(&self) -> XmlAttributeFlags {
        let mut flags = XmlAttributeFlags::empty();
        flags.set(XmlAttributeFlags::ELEMENTS, !self.elements.is_empty());
        flags.set(XmlAttributeFlags::ARRAY, self.array.is_some());
        flags.set(XmlAttributeFlags::ARRAY_ITEMS, !self.array_items.is_empty());
        flags.set(XmlAttributeFlags::ATTRIBUTE, self.attribute.is_some());
        flags.set(XmlAttributeFlags::TEXT, self.text.is_some());
        flags.set(XmlAttributeFlags::ANY_ELEMENTS, !self.any_elements.is_empty());
        flags.set(XmlAttributeFlags::ANY_ATTRIBUTE, self.any_attribute);
        flags.set(XmlAttributeFlags::CHOICE_IDENTIFIER, self.choice_identifier.is_some());
        flags.set(XmlAttributeFlags::ENUM, self.enum_name.is_some());
        flags.set(XmlAttributeFlags::XMLNS, self.xmlns);
        flags.set(XmlAttributeFlags::TYPE, self.xml_type.is_some());
        flags.set(XmlAttributeFlags::ROOT, self.root.is_some());
        flags
    }

    /// Reject any annotation outside `allowed` on `target`.
    pub fn check_allowed(&self, target: &str, allowed: XmlAttributeFlags) -> MappingResult<()> {
        let extra = self.flags() - allowed;
        if extra.is_empty() {
            Ok(())
        } else {
            Err(MappingError::annotation(
                target,
                format!("annotations {extra:?} are not permitted here"),
            ))
        }
    }

    /// Anonymous only when marked so and declared for the importing namespace.
    pub fn is_anonymous_in(&self, ns: Option<&str>) -> bool {
        match &self.xml_type {
            Some(t) if t.anonymous_type => {
                t.namespace.is_none() || t.namespace.as_deref() == ns
            }
            _ => false,
        }
    }

    pub fn include_in_schema(&self) -> bool {
        self.xml_type.as_ref().is_none_or(|t| t.include_in_schema)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// OVERLAY
// ————————————————————————————————————————————————————————————————————————————

/// Explicit annotations replacing a type's or member's intrinsic ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlAttributeOverrides {
    pub types: HashMap<String, XmlAttributes>,
    /// Keyed `Type.member`.
    pub members: HashMap<String, XmlAttributes>,
}

impl XmlAttributeOverrides {
    pub fn set_type(&mut self, type_name: &str, attrs: XmlAttributes) {
        self.types.insert(type_name.to_owned(), attrs);
    }

    pub fn set_member(&mut self, type_name: &str, member: &str, attrs: XmlAttributes) {
        self.members.insert(member_key(type_name, member), attrs);
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.members.is_empty()
    }
}

fn member_key(type_name: &str, member: &str) -> String {
    format!("{type_name}.{member}")
}

/// Resolves the effective annotation set; an override always wins outright,
/// it is never merged with the intrinsic set.
#[derive(Debug, Clone, Copy)]
pub struct AttributeResolver<'a> {
    overrides: &'a XmlAttributeOverrides,
}

impl<'a> AttributeResolver<'a> {
    pub fn new(overrides: &'a XmlAttributeOverrides) -> Self {
        Self { overrides }
    }

    pub fn type_attributes(&self, type_name: &str, intrinsic: &'a XmlAttributes) -> MappingResult<&'a XmlAttributes> {
        let attrs = self.overrides.types.get(type_name).unwrap_or(intrinsic);
        attrs.check_allowed(type_name, XmlAttributeFlags::TYPE_LEVEL)?;
        Ok(attrs)
    }

    pub fn member_attributes(&self, declaring: &str, member: &str, intrinsic: &'a XmlAttributes) -> &'a XmlAttributes {
        self.overrides
            .members
            .get(&member_key(declaring, member))
            .unwrap_or(intrinsic)
    }

    pub fn constant_attributes(&self, enum_name: &str, constant: &str, intrinsic: &'a XmlAttributes) -> MappingResult<&'a XmlAttributes> {
        let attrs = self.member_attributes(enum_name, constant, intrinsic);
        let mut allowed = XmlAttributeFlags::CONSTANT_LEVEL;
        if attrs.ignore {
            allowed = XmlAttributeFlags::all();
        }
        attrs.check_allowed(&member_key(enum_name, constant), allowed)?;
        Ok(attrs)
    }
}

/// Validates the annotation combination of one member for the shape of its
/// type; returns the flags for the importer to dispatch on.
pub fn check_member_flags(target: &str, attrs: &XmlAttributes, array_like: bool) -> MappingResult<XmlAttributeFlags> {
    let flags = attrs.flags();
    let fail = |reason: &str| Err(MappingError::annotation(target, reason));
    if flags.intersects(XmlAttributeFlags::TYPE_LEVEL | XmlAttributeFlags::ENUM) {
        return fail("type-level or enum annotations cannot be applied to a member");
    }
    if flags.intersects(XmlAttributeFlags::ATTRIBUTE_KINDS) {
        if !(flags - XmlAttributeFlags::ATTRIBUTE_KINDS).is_empty() {
            return fail("attribute annotations cannot be combined with element, text or array annotations");
        }
        if flags.contains(XmlAttributeFlags::ATTRIBUTE_KINDS) {
            return fail("a member cannot be both a named attribute and an attribute wildcard");
        }
        return Ok(flags);
    }
    if flags.contains(XmlAttributeFlags::XMLNS) {
        if flags != XmlAttributeFlags::XMLNS {
            return fail("an xmlns member cannot carry other annotations");
        }
        return Ok(flags);
    }
    if flags.contains(XmlAttributeFlags::TEXT) && flags.intersects(XmlAttributeFlags::ELEMENTS | XmlAttributeFlags::ARRAY_KINDS) {
        return fail("text annotations cannot be combined with element or array annotations");
    }
    if flags.contains(XmlAttributeFlags::TEXT | XmlAttributeFlags::CHOICE_IDENTIFIER) {
        return fail("text content has no element alternatives for a choice identifier");
    }
    if array_like {
        if flags.intersects(XmlAttributeFlags::ELEMENT_KINDS) {
            if flags.intersects(XmlAttributeFlags::ARRAY) {
                return fail("a flattened array cannot also declare a wrapper array element");
            }
        } else if !(flags - XmlAttributeFlags::ARRAY_KINDS).is_empty() {
            return fail("unsupported annotation on an array member");
        }
    } else if flags.intersects(XmlAttributeFlags::ARRAY_KINDS) {
        return fail("array annotations require an array-like member type");
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_replaces_intrinsic() {
        let intrinsic = XmlAttributes {
            attribute: Some(XmlAttributeAttribute::default()),
            ..Default::default()
        };
        let mut overrides = XmlAttributeOverrides::default();
        overrides.set_member("Order", "Id", XmlAttributes {
            elements: vec![XmlElementAttribute { element_name: Some("id".into()), ..Default::default() }],
            ..Default::default()
        });
        let resolver = AttributeResolver::new(&overrides);
        let resolved = resolver.member_attributes("Order", "Id", &intrinsic);
        assert!(resolved.attribute.is_none());
        assert_eq!(resolved.elements.len(), 1);
        let untouched = resolver.member_attributes("Order", "Name", &intrinsic);
        assert!(untouched.attribute.is_some());
    }

    #[test]
    fn attribute_and_text_are_exclusive() {
        let attrs = XmlAttributes {
            attribute: Some(XmlAttributeAttribute::default()),
            text: Some(XmlTextAttribute::default()),
            ..Default::default()
        };
        let err = check_member_flags("Order.Id", &attrs, false).unwrap_err();
        assert!(matches!(err, MappingError::InvalidAnnotation { .. }));
    }

    #[test]
    fn text_cannot_carry_a_choice_identifier() {
        let attrs = XmlAttributes {
            text: Some(XmlTextAttribute::default()),
            choice_identifier: Some("Kind".into()),
            ..Default::default()
        };
        let err = check_member_flags("Note.Body", &attrs, false).unwrap_err();
        assert!(matches!(err, MappingError::InvalidAnnotation { .. }));
    }

    #[test]
    fn array_annotations_need_array_members() {
        let attrs = XmlAttributes { array: Some(XmlArrayAttribute::default()), ..Default::default() };
        assert!(check_member_flags("Order.Id", &attrs, false).is_err());
        assert!(check_member_flags("Order.Items", &attrs, true).is_ok());
    }

    #[test]
    fn type_level_mask_rejects_member_annotations() {
        let overrides = XmlAttributeOverrides::default();
        let attrs = XmlAttributes { text: Some(XmlTextAttribute::default()), ..Default::default() };
        let resolver = AttributeResolver::new(&overrides);
        assert!(resolver.type_attributes("Order", &attrs).is_err());
    }
}
