/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message adapter.
//!
//! The adapter is the bridge between user data and the codec. It has two
//! modes:
//!
//! 1. **Structural mode**: the user supplies a [`DynamicMessage`], an owned
//!    aggregate of named attributes. The codec locates attributes by name
//!    (case-insensitive) and converts numbers with range checks.
//! 2. **Visitor mode**: the user implements [`FastMessage`] directly and
//!    the codec calls it field by field. No lookup tables are touched on
//!    the hot path; this is the performance contract.
//!
//! Both modes produce identical wire output.

use fastwire_core::{BindError, Value};
use fastwire_template::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of the field the codec is currently visiting.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor<'a> {
    /// Field id from the template.
    pub id: u32,
    /// Field name from the template.
    pub name: &'a str,
    /// Wire type from the template.
    pub field_type: FieldType,
}

/// Callback interface between the codec and a message.
///
/// The encoder drives the `get` side, the decoder the `set` side. Nested
/// scopes are bracketed by [`FastMessage::enter`] / [`FastMessage::leave`]
/// calls: once for each group, once for each sequence element, always in
/// wire order.
pub trait FastMessage {
    /// The template this message encodes with.
    fn template_id(&self) -> Option<u32>;

    /// Records the template a decoded message arrived with.
    fn set_template_id(&mut self, id: u32);

    /// Returns the value of a scalar field, or `None` when absent.
    ///
    /// # Errors
    /// Returns `BindError` if the attribute exists but cannot be read.
    fn get(&self, field: &FieldDescriptor<'_>) -> Result<Option<Value>, BindError>;

    /// Returns the element count of a sequence, or `None` when absent.
    ///
    /// # Errors
    /// Returns `BindError` if the attribute exists but is not a sequence.
    fn get_length(&self, field: &FieldDescriptor<'_>) -> Result<Option<usize>, BindError>;

    /// Returns true if a group attribute is present; probed before the
    /// encoder enters the group.
    ///
    /// # Errors
    /// Returns `BindError` if the attribute exists but is not a group.
    fn group_present(&self, field: &FieldDescriptor<'_>) -> Result<bool, BindError>;

    /// Deposits a decoded scalar value; `None` deposits an explicit null.
    ///
    /// # Errors
    /// Returns `BindError` if the value cannot be stored.
    fn set(&mut self, field: &FieldDescriptor<'_>, value: Option<Value>) -> Result<(), BindError>;

    /// Prepares a sequence attribute with `length` elements.
    ///
    /// # Errors
    /// Returns `BindError` if the container cannot be created.
    fn set_length(&mut self, field: &FieldDescriptor<'_>, length: usize)
        -> Result<(), BindError>;

    /// Moves the cursor into a group (`index` is `None`) or into one
    /// sequence element.
    ///
    /// # Errors
    /// Returns `BindError` if the scope cannot be addressed.
    fn enter(&mut self, field: &FieldDescriptor<'_>, index: Option<usize>)
        -> Result<(), BindError>;

    /// Moves the cursor back out of the innermost scope.
    fn leave(&mut self);
}

/// One attribute of an [`Aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    /// Scalar value.
    Value(Value),
    /// Explicit null.
    Null,
    /// Nested aggregate.
    Group(Aggregate),
    /// Ordered container of aggregates.
    Sequence(Vec<Aggregate>),
}

/// Named attribute set; the structural form of one message scope.
///
/// Attribute names are matched case-insensitively against template field
/// names, so `"price"`, `"Price"`, and `"PRICE"` address the same slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Aggregate {
    attrs: HashMap<String, Attribute>,
}

fn key_of(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Aggregate {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scalar attribute.
    #[must_use]
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_value(name, value);
        self
    }

    /// Adds an explicit null attribute.
    #[must_use]
    pub fn with_null(mut self, name: &str) -> Self {
        self.attrs.insert(key_of(name), Attribute::Null);
        self
    }

    /// Adds a nested group attribute.
    #[must_use]
    pub fn with_group(mut self, name: &str, group: Aggregate) -> Self {
        self.attrs.insert(key_of(name), Attribute::Group(group));
        self
    }

    /// Adds a sequence attribute.
    #[must_use]
    pub fn with_sequence(mut self, name: &str, elements: Vec<Aggregate>) -> Self {
        self.attrs
            .insert(key_of(name), Attribute::Sequence(elements));
        self
    }

    /// Sets a scalar attribute.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) {
        self.attrs
            .insert(key_of(name), Attribute::Value(value.into()));
    }

    /// Returns an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(&key_of(name))
    }

    /// Returns a scalar attribute's value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.attribute(name) {
            Some(Attribute::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Returns a group attribute.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Aggregate> {
        match self.attribute(name) {
            Some(Attribute::Group(g)) => Some(g),
            _ => None,
        }
    }

    /// Returns a sequence attribute's elements.
    #[must_use]
    pub fn sequence(&self, name: &str) -> Option<&[Aggregate]> {
        match self.attribute(name) {
            Some(Attribute::Sequence(v)) => Some(v),
            _ => None,
        }
    }
}

/// Cursor segment inside a [`DynamicMessage`].
#[derive(Debug, Clone)]
enum Segment {
    Group(String),
    Element(String, usize),
}

/// Structural message: a template id plus a tree of named attributes.
///
/// Implements [`FastMessage`] with an internal cursor so nested scopes
/// address the right sub-aggregate during encoding and decoding.
#[derive(Debug, Clone, Default)]
pub struct DynamicMessage {
    template_id: u32,
    root: Aggregate,
    cursor: Vec<Segment>,
}

impl DynamicMessage {
    /// Creates an empty message for the given template.
    #[must_use]
    pub fn new(template_id: u32) -> Self {
        Self {
            template_id,
            root: Aggregate::new(),
            cursor: Vec::new(),
        }
    }

    /// Creates a message from an existing aggregate.
    #[must_use]
    pub fn from_aggregate(template_id: u32, root: Aggregate) -> Self {
        Self {
            template_id,
            root,
            cursor: Vec::new(),
        }
    }

    /// Returns the root aggregate.
    #[must_use]
    pub fn root(&self) -> &Aggregate {
        &self.root
    }

    fn current(&self) -> Result<&Aggregate, BindError> {
        let mut aggregate = &self.root;
        for segment in &self.cursor {
            aggregate = match segment {
                Segment::Group(name) => match aggregate.attrs.get(name) {
                    Some(Attribute::Group(g)) => g,
                    _ => {
                        return Err(BindError::NotAGroup {
                            field: name.clone(),
                        })
                    }
                },
                Segment::Element(name, index) => match aggregate.attrs.get(name) {
                    Some(Attribute::Sequence(items)) => {
                        items.get(*index).ok_or(BindError::ElementOutOfBounds {
                            field: name.clone(),
                            index: *index,
                        })?
                    }
                    _ => {
                        return Err(BindError::NotASequence {
                            field: name.clone(),
                        })
                    }
                },
            };
        }
        Ok(aggregate)
    }

    fn current_mut(&mut self) -> Result<&mut Aggregate, BindError> {
        let mut aggregate = &mut self.root;
        for segment in &self.cursor {
            aggregate = match segment {
                Segment::Group(name) => match aggregate.attrs.get_mut(name) {
                    Some(Attribute::Group(g)) => g,
                    _ => {
                        return Err(BindError::NotAGroup {
                            field: name.clone(),
                        })
                    }
                },
                Segment::Element(name, index) => match aggregate.attrs.get_mut(name) {
                    Some(Attribute::Sequence(items)) => {
                        items
                            .get_mut(*index)
                            .ok_or(BindError::ElementOutOfBounds {
                                field: name.clone(),
                                index: *index,
                            })?
                    }
                    _ => {
                        return Err(BindError::NotASequence {
                            field: name.clone(),
                        })
                    }
                },
            };
        }
        Ok(aggregate)
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        // the cursor is traversal state, not message content
        self.template_id == other.template_id && self.root == other.root
    }
}

impl FastMessage for DynamicMessage {
    fn template_id(&self) -> Option<u32> {
        Some(self.template_id)
    }

    fn set_template_id(&mut self, id: u32) {
        self.template_id = id;
    }

    fn get(&self, field: &FieldDescriptor<'_>) -> Result<Option<Value>, BindError> {
        match self.current()?.attribute(field.name) {
            None | Some(Attribute::Null) => Ok(None),
            Some(Attribute::Value(v)) => Ok(Some(v.clone())),
            Some(Attribute::Group(_) | Attribute::Sequence(_)) => Err(BindError::TypeMismatch {
                field: field.name.to_string(),
                expected: "scalar",
                actual: "aggregate",
            }),
        }
    }

    fn get_length(&self, field: &FieldDescriptor<'_>) -> Result<Option<usize>, BindError> {
        match self.current()?.attribute(field.name) {
            None | Some(Attribute::Null) => Ok(None),
            Some(Attribute::Sequence(items)) => Ok(Some(items.len())),
            Some(_) => Err(BindError::NotASequence {
                field: field.name.to_string(),
            }),
        }
    }

    fn group_present(&self, field: &FieldDescriptor<'_>) -> Result<bool, BindError> {
        match self.current()?.attribute(field.name) {
            None | Some(Attribute::Null) => Ok(false),
            Some(Attribute::Group(_)) => Ok(true),
            Some(_) => Err(BindError::NotAGroup {
                field: field.name.to_string(),
            }),
        }
    }

    fn set(&mut self, field: &FieldDescriptor<'_>, value: Option<Value>) -> Result<(), BindError> {
        let key = key_of(field.name);
        let attribute = match value {
            Some(v) => Attribute::Value(v),
            None => Attribute::Null,
        };
        self.current_mut()?.attrs.insert(key, attribute);
        Ok(())
    }

    fn set_length(
        &mut self,
        field: &FieldDescriptor<'_>,
        length: usize,
    ) -> Result<(), BindError> {
        let key = key_of(field.name);
        self.current_mut()?
            .attrs
            .insert(key, Attribute::Sequence(vec![Aggregate::new(); length]));
        Ok(())
    }

    fn enter(
        &mut self,
        field: &FieldDescriptor<'_>,
        index: Option<usize>,
    ) -> Result<(), BindError> {
        let key = key_of(field.name);
        match index {
            None => {
                let aggregate = self.current_mut()?;
                match aggregate.attrs.get(&key) {
                    Some(Attribute::Group(_)) => {}
                    None | Some(Attribute::Null) => {
                        aggregate
                            .attrs
                            .insert(key.clone(), Attribute::Group(Aggregate::new()));
                    }
                    Some(_) => {
                        return Err(BindError::NotAGroup {
                            field: field.name.to_string(),
                        })
                    }
                }
                self.cursor.push(Segment::Group(key));
            }
            Some(i) => {
                match self.current()?.attribute(field.name) {
                    Some(Attribute::Sequence(items)) if i < items.len() => {}
                    Some(Attribute::Sequence(_)) => {
                        return Err(BindError::ElementOutOfBounds {
                            field: field.name.to_string(),
                            index: i,
                        })
                    }
                    _ => {
                        return Err(BindError::NotASequence {
                            field: field.name.to_string(),
                        })
                    }
                }
                self.cursor.push(Segment::Element(key, i));
            }
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.cursor.pop();
    }
}

/// Coerces a message value to a template field type.
///
/// Integers narrow and widen with range checks; ASCII and unicode strings
/// interchange when the content allows; integers widen to decimals. Every
/// other combination is a type mismatch.
///
/// # Arguments
/// * `value` - The value supplied by the message
/// * `kind` - The field type required by the template
/// * `field` - Field name, for error reporting
///
/// # Errors
/// Returns `BindError::TypeMismatch` or `BindError::ValueOutOfRange`.
pub fn coerce(value: Value, kind: FieldType, field: &str) -> Result<Value, BindError> {
    let mismatch = |actual: &'static str| BindError::TypeMismatch {
        field: field.to_string(),
        expected: type_label(kind),
        actual,
    };
    let out_of_range = || BindError::ValueOutOfRange {
        field: field.to_string(),
        target: type_label(kind),
    };

    match kind {
        FieldType::UInt32 | FieldType::Int32 | FieldType::UInt64 | FieldType::Int64 => {
            let raw = value.to_i128().ok_or_else(|| mismatch(value.type_name()))?;
            match kind {
                FieldType::UInt32 => u32::try_from(raw)
                    .map(Value::UInt32)
                    .map_err(|_| out_of_range()),
                FieldType::Int32 => i32::try_from(raw)
                    .map(Value::Int32)
                    .map_err(|_| out_of_range()),
                FieldType::UInt64 => u64::try_from(raw)
                    .map(Value::UInt64)
                    .map_err(|_| out_of_range()),
                _ => i64::try_from(raw)
                    .map(Value::Int64)
                    .map_err(|_| out_of_range()),
            }
        }
        FieldType::AsciiString => match value {
            Value::Ascii(s) => Ok(Value::Ascii(s)),
            Value::Unicode(s) if s.is_ascii() => Ok(Value::Ascii(s)),
            other => Err(mismatch(other.type_name())),
        },
        FieldType::UnicodeString => match value {
            Value::Unicode(s) | Value::Ascii(s) => Ok(Value::Unicode(s)),
            other => Err(mismatch(other.type_name())),
        },
        FieldType::ByteVector => match value {
            Value::Bytes(b) => Ok(Value::Bytes(b)),
            other => Err(mismatch(other.type_name())),
        },
        FieldType::Decimal => match value {
            Value::Decimal(d) => Ok(Value::Decimal(d)),
            other if other.is_integer() => {
                let raw = other.to_i128().ok_or_else(|| mismatch(other.type_name()))?;
                let mantissa = i64::try_from(raw).map_err(|_| out_of_range())?;
                Ok(Value::Decimal(fastwire_core::Decimal::new(0, mantissa)))
            }
            other => Err(mismatch(other.type_name())),
        },
        FieldType::Group | FieldType::Sequence | FieldType::TemplateRef => {
            Err(mismatch("aggregate"))
        }
    }
}

const fn type_label(kind: FieldType) -> &'static str {
    match kind {
        FieldType::UInt32 => "uInt32",
        FieldType::Int32 => "int32",
        FieldType::UInt64 => "uInt64",
        FieldType::Int64 => "int64",
        FieldType::AsciiString => "string",
        FieldType::UnicodeString => "unicode",
        FieldType::ByteVector => "byteVector",
        FieldType::Decimal => "decimal",
        FieldType::Group => "group",
        FieldType::Sequence => "sequence",
        FieldType::TemplateRef => "templateRef",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, field_type: FieldType) -> FieldDescriptor<'_> {
        FieldDescriptor {
            id: 1,
            name,
            field_type,
        }
    }

    #[test]
    fn test_aggregate_case_insensitive_lookup() {
        let agg = Aggregate::new().with_value("Price", 7u32);
        assert_eq!(agg.value("price"), Some(&Value::UInt32(7)));
        assert_eq!(agg.value("PRICE"), Some(&Value::UInt32(7)));
    }

    #[test]
    fn test_get_missing_attribute_is_absent() {
        let msg = DynamicMessage::new(1);
        let value = msg.get(&descriptor("Qty", FieldType::UInt32)).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_get_null_attribute_is_absent() {
        let msg =
            DynamicMessage::from_aggregate(1, Aggregate::new().with_null("Qty"));
        assert_eq!(msg.get(&descriptor("Qty", FieldType::UInt32)).unwrap(), None);
    }

    #[test]
    fn test_get_aggregate_attribute_is_mismatch() {
        let msg = DynamicMessage::from_aggregate(
            1,
            Aggregate::new().with_group("Body", Aggregate::new()),
        );
        assert!(msg.get(&descriptor("Body", FieldType::UInt32)).is_err());
    }

    #[test]
    fn test_cursor_into_group() {
        let inner = Aggregate::new().with_value("Px", 9u32);
        let mut msg = DynamicMessage::from_aggregate(
            1,
            Aggregate::new().with_group("Body", inner),
        );

        let body = descriptor("Body", FieldType::Group);
        msg.enter(&body, None).unwrap();
        assert_eq!(
            msg.get(&descriptor("Px", FieldType::UInt32)).unwrap(),
            Some(Value::UInt32(9))
        );
        msg.leave();
        assert_eq!(msg.get(&descriptor("Px", FieldType::UInt32)).unwrap(), None);
    }

    #[test]
    fn test_cursor_into_sequence_elements() {
        let elements = vec![
            Aggregate::new().with_value("X", 1u32),
            Aggregate::new().with_value("X", 2u32),
        ];
        let mut msg = DynamicMessage::from_aggregate(
            1,
            Aggregate::new().with_sequence("Entries", elements),
        );

        let seq = descriptor("Entries", FieldType::Sequence);
        assert_eq!(msg.get_length(&seq).unwrap(), Some(2));

        msg.enter(&seq, Some(1)).unwrap();
        assert_eq!(
            msg.get(&descriptor("X", FieldType::UInt32)).unwrap(),
            Some(Value::UInt32(2))
        );
        msg.leave();

        assert!(msg.enter(&seq, Some(5)).is_err());
    }

    #[test]
    fn test_set_length_then_set_elements() {
        let mut msg = DynamicMessage::new(1);
        let seq = descriptor("Entries", FieldType::Sequence);
        msg.set_length(&seq, 2).unwrap();

        msg.enter(&seq, Some(0)).unwrap();
        msg.set(&descriptor("X", FieldType::UInt32), Some(Value::UInt32(5)))
            .unwrap();
        msg.leave();

        assert_eq!(msg.root().sequence("Entries").unwrap().len(), 2);
        assert_eq!(
            msg.root().sequence("Entries").unwrap()[0].value("X"),
            Some(&Value::UInt32(5))
        );
    }

    #[test]
    fn test_enter_creates_group_on_decode_path() {
        let mut msg = DynamicMessage::new(1);
        let body = descriptor("Body", FieldType::Group);
        msg.enter(&body, None).unwrap();
        msg.set(&descriptor("Px", FieldType::UInt32), Some(Value::UInt32(3)))
            .unwrap();
        msg.leave();
        assert_eq!(
            msg.root().group("Body").unwrap().value("Px"),
            Some(&Value::UInt32(3))
        );
    }

    #[test]
    fn test_group_present() {
        let msg = DynamicMessage::from_aggregate(
            1,
            Aggregate::new().with_group("Body", Aggregate::new()),
        );
        assert!(msg.group_present(&descriptor("Body", FieldType::Group)).unwrap());
        assert!(!msg.group_present(&descriptor("Other", FieldType::Group)).unwrap());
    }

    #[test]
    fn test_coerce_widens_and_narrows() {
        assert_eq!(
            coerce(Value::UInt32(7), FieldType::UInt64, "F").unwrap(),
            Value::UInt64(7)
        );
        assert_eq!(
            coerce(Value::Int64(7), FieldType::UInt32, "F").unwrap(),
            Value::UInt32(7)
        );
        assert_eq!(
            coerce(Value::Int64(-1), FieldType::UInt32, "F"),
            Err(BindError::ValueOutOfRange {
                field: "F".to_string(),
                target: "uInt32"
            })
        );
    }

    #[test]
    fn test_coerce_strings() {
        assert_eq!(
            coerce(Value::Unicode("abc".into()), FieldType::AsciiString, "F").unwrap(),
            Value::Ascii("abc".into())
        );
        assert!(coerce(Value::Unicode("héllo".into()), FieldType::AsciiString, "F").is_err());
        assert_eq!(
            coerce(Value::Ascii("abc".into()), FieldType::UnicodeString, "F").unwrap(),
            Value::Unicode("abc".into())
        );
    }

    #[test]
    fn test_coerce_integer_to_decimal() {
        assert_eq!(
            coerce(Value::Int64(42), FieldType::Decimal, "F").unwrap(),
            Value::Decimal(fastwire_core::Decimal::new(0, 42))
        );
        assert!(coerce(Value::Ascii("x".into()), FieldType::Decimal, "F").is_err());
    }

    #[test]
    fn test_dynamic_message_equality_ignores_cursor() {
        let agg = Aggregate::new().with_group("Body", Aggregate::new());
        let mut a = DynamicMessage::from_aggregate(1, agg.clone());
        let b = DynamicMessage::from_aggregate(1, agg);
        a.enter(&descriptor("Body", FieldType::Group), None).unwrap();
        assert_eq!(a, b);
    }
}
