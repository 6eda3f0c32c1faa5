/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Template instructions.
//!
//! This module defines the executable form of a FAST template:
//! - [`FieldType`]: the wire type of a field
//! - [`Presence`]: mandatory or optional
//! - [`Operator`]: the per-field compression rule
//! - [`Instruction`]: one field entry, possibly with nested instructions
//! - [`Template`]: an ordered list of instructions keyed by template id

use fastwire_core::{TemplateError, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// FAST field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// Signed 64-bit integer.
    Int64,
    /// ASCII string, stop-bit terminated.
    AsciiString,
    /// Unicode string, length-prefixed UTF-8.
    UnicodeString,
    /// Raw byte vector, length-prefixed.
    ByteVector,
    /// Decimal exponent/mantissa pair.
    Decimal,
    /// Nested group of fields sharing a presence map scope.
    Group,
    /// Repeated group of fields; the first child is the length field.
    Sequence,
    /// Reference to another template, inlined at link time.
    TemplateRef,
}

impl FieldType {
    /// Returns true for the four plain integer types.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::UInt32 | Self::Int32 | Self::UInt64 | Self::Int64)
    }

    /// Returns true for types carried as a byte run (strings and vectors).
    #[must_use]
    pub const fn is_vector(&self) -> bool {
        matches!(
            self,
            Self::AsciiString | Self::UnicodeString | Self::ByteVector
        )
    }

    /// Returns true for group, sequence, and template reference.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Group | Self::Sequence | Self::TemplateRef)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UInt32 => "uInt32",
            Self::Int32 => "int32",
            Self::UInt64 => "uInt64",
            Self::Int64 => "int64",
            Self::AsciiString => "string",
            Self::UnicodeString => "unicode",
            Self::ByteVector => "byteVector",
            Self::Decimal => "decimal",
            Self::Group => "group",
            Self::Sequence => "sequence",
            Self::TemplateRef => "templateRef",
        };
        write!(f, "{}", name)
    }
}

/// Field presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Presence {
    /// The field is always present in the message.
    #[default]
    Mandatory,
    /// The field may be null.
    Optional,
}

impl Presence {
    /// Returns true if the field may be null.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        matches!(self, Self::Optional)
    }
}

/// FAST field operators.
///
/// Operators compress the wire representation of a field using state from
/// prior messages held in the operator dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Operator {
    /// No operator; the value is always in the stream.
    #[default]
    None,
    /// The value never appears in the stream; it is the initial value.
    Constant,
    /// If absent from the stream, the value is the initial value.
    Default,
    /// If absent from the stream, the value is the previous value.
    Copy,
    /// If absent from the stream, the value is the previous value plus one.
    Increment,
    /// The stream carries the difference from the previous value.
    Delta,
    /// The stream carries the bytes that differ from the previous value's tail.
    Tail,
}

impl Operator {
    /// Returns true if this operator consults the dictionary.
    #[must_use]
    pub const fn uses_dictionary(&self) -> bool {
        matches!(
            self,
            Self::Copy | Self::Increment | Self::Delta | Self::Tail
        )
    }

    /// Returns a short name, used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Constant => "constant",
            Self::Default => "default",
            Self::Copy => "copy",
            Self::Increment => "increment",
            Self::Delta => "delta",
            Self::Tail => "tail",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One field entry within a template.
///
/// Scalar instructions have no children. A group's children are its fields.
/// A sequence's first child is always the length instruction, followed by the
/// per-element fields. A template reference carries the referenced template's
/// name and is replaced by its instructions at link time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Field id.
    pub id: u32,
    /// Field name; the lookup key for the message adapter and dictionary.
    pub name: String,
    /// Wire type.
    pub field_type: FieldType,
    /// Mandatory or optional.
    pub presence: Presence,
    /// Compression operator.
    pub operator: Operator,
    /// Operator seed value.
    pub initial: Option<Value>,
    /// Child instructions for groups and sequences.
    pub instructions: Vec<Instruction>,
}

impl Instruction {
    /// Creates a new scalar instruction with mandatory presence and no
    /// operator.
    ///
    /// # Arguments
    /// * `id` - The field id
    /// * `name` - The field name
    /// * `field_type` - The wire type
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            presence: Presence::Mandatory,
            operator: Operator::None,
            initial: None,
            instructions: Vec::new(),
        }
    }

    /// Creates a group instruction.
    #[must_use]
    pub fn group(id: u32, name: impl Into<String>) -> Self {
        Self::new(id, name, FieldType::Group)
    }

    /// Creates a sequence instruction with an implicit length child named
    /// `<name>Length`, the way the XML loader generates one when the
    /// description carries no explicit `<length>` element.
    #[must_use]
    pub fn sequence(id: u32, name: impl Into<String>) -> Self {
        let name = name.into();
        let length = Self::new(id, format!("{}Length", name), FieldType::UInt32);
        let mut seq = Self::new(id, name, FieldType::Sequence);
        seq.instructions.push(length);
        seq
    }

    /// Creates a template reference instruction.
    ///
    /// # Arguments
    /// * `name` - The name of the referenced template
    #[must_use]
    pub fn template_ref(name: impl Into<String>) -> Self {
        Self::new(0, name, FieldType::TemplateRef)
    }

    /// Sets the presence.
    #[must_use]
    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        if self.field_type == FieldType::Sequence {
            if let Some(length) = self.instructions.first_mut() {
                length.presence = presence;
            }
        }
        self
    }

    /// Marks the instruction optional.
    #[must_use]
    pub fn optional(self) -> Self {
        self.with_presence(Presence::Optional)
    }

    /// Sets the operator.
    #[must_use]
    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    /// Sets the operator's initial value.
    #[must_use]
    pub fn with_initial(mut self, initial: impl Into<Value>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    /// Replaces the length instruction of a sequence.
    #[must_use]
    pub fn with_length(mut self, length: Instruction) -> Self {
        if self.field_type == FieldType::Sequence && !self.instructions.is_empty() {
            self.instructions[0] = length;
        }
        self
    }

    /// Appends a child instruction to a group or sequence.
    #[must_use]
    pub fn push(mut self, child: Instruction) -> Self {
        self.instructions.push(child);
        self
    }

    /// Returns the length instruction of a sequence.
    #[must_use]
    pub fn length_instruction(&self) -> Option<&Instruction> {
        match self.field_type {
            FieldType::Sequence => self.instructions.first(),
            _ => None,
        }
    }

    /// Returns the per-element instructions of a sequence.
    #[must_use]
    pub fn element_instructions(&self) -> &[Instruction] {
        match self.field_type {
            FieldType::Sequence if !self.instructions.is_empty() => &self.instructions[1..],
            _ => &self.instructions,
        }
    }

    /// Returns true if the wire form of this field is nullable.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.presence.is_optional()
    }

    /// Returns true if this instruction claims a bit in the presence map of
    /// the scope that contains it.
    ///
    /// Groups claim a bit only when optional; a sequence claims whatever its
    /// length instruction claims. Scalar fields follow the operator table:
    /// `none` and `delta` never claim a bit, `constant` claims one only when
    /// optional, and the remaining operators always do.
    #[must_use]
    pub fn claims_pmap_bit(&self) -> bool {
        match self.field_type {
            FieldType::Group => self.presence.is_optional(),
            FieldType::Sequence => self
                .length_instruction()
                .is_some_and(Instruction::claims_pmap_bit),
            FieldType::TemplateRef => false,
            _ => match self.operator {
                Operator::None | Operator::Delta => false,
                Operator::Constant => self.presence.is_optional(),
                Operator::Default | Operator::Copy | Operator::Increment | Operator::Tail => true,
            },
        }
    }

    /// Validates the instruction and its children against the static rules
    /// of the template model.
    ///
    /// # Errors
    /// Returns `TemplateError` when an operator is applied to a type it does
    /// not support or a required initial value is missing.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.field_type.is_composite() && self.operator != Operator::None {
            return Err(TemplateError::InvalidOperator {
                field: self.name.clone(),
                operator: self.operator.name(),
            });
        }

        match self.operator {
            Operator::Constant if self.initial.is_none() => {
                return Err(TemplateError::ConstantWithoutInitial {
                    field: self.name.clone(),
                });
            }
            Operator::Default
                if self.presence == Presence::Mandatory && self.initial.is_none() =>
            {
                return Err(TemplateError::DefaultWithoutInitial {
                    field: self.name.clone(),
                });
            }
            Operator::Increment if !self.field_type.is_integer() => {
                return Err(TemplateError::InvalidOperator {
                    field: self.name.clone(),
                    operator: "increment",
                });
            }
            Operator::Delta
                if !self.field_type.is_integer()
                    && !self.field_type.is_vector()
                    && self.field_type != FieldType::Decimal =>
            {
                return Err(TemplateError::InvalidOperator {
                    field: self.name.clone(),
                    operator: "delta",
                });
            }
            Operator::Tail if !self.field_type.is_vector() => {
                return Err(TemplateError::InvalidOperator {
                    field: self.name.clone(),
                    operator: "tail",
                });
            }
            _ => {}
        }

        if self.field_type == FieldType::Sequence {
            let length = self
                .length_instruction()
                .ok_or_else(|| TemplateError::SequenceWithoutLength {
                    field: self.name.clone(),
                })?;
            if length.field_type != FieldType::UInt32 {
                return Err(TemplateError::SequenceWithoutLength {
                    field: self.name.clone(),
                });
            }
        }

        for child in &self.instructions {
            child.validate()?;
        }

        Ok(())
    }
}

/// Returns true if a segment made of `instructions` carries its own presence
/// map. The answer is static: it depends only on the template, so encoder and
/// decoder agree without lookahead.
#[must_use]
pub fn segment_claims_pmap(instructions: &[Instruction]) -> bool {
    instructions.iter().any(Instruction::claims_pmap_bit)
}

/// An ordered description of fields defining one message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template id; the wire key selecting this template.
    pub id: u32,
    /// Template name; the key for template references.
    pub name: String,
    /// Root instructions in wire order.
    pub instructions: Vec<Instruction>,
}

impl Template {
    /// Creates an empty template.
    ///
    /// # Arguments
    /// * `id` - The template id
    /// * `name` - The template name
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            instructions: Vec::new(),
        }
    }

    /// Appends a root instruction.
    #[must_use]
    pub fn push(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Validates every instruction in the template.
    ///
    /// # Errors
    /// Returns `TemplateError` on the first static rule violation.
    pub fn validate(&self) -> Result<(), TemplateError> {
        for instruction in &self.instructions {
            instruction.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_uses_dictionary() {
        assert!(!Operator::None.uses_dictionary());
        assert!(!Operator::Constant.uses_dictionary());
        assert!(!Operator::Default.uses_dictionary());
        assert!(Operator::Copy.uses_dictionary());
        assert!(Operator::Increment.uses_dictionary());
        assert!(Operator::Delta.uses_dictionary());
        assert!(Operator::Tail.uses_dictionary());
    }

    #[test]
    fn test_claims_pmap_bit_scalar() {
        let none = Instruction::new(1, "A", FieldType::UInt32);
        assert!(!none.claims_pmap_bit());

        let copy = Instruction::new(1, "A", FieldType::UInt32).with_operator(Operator::Copy);
        assert!(copy.claims_pmap_bit());

        let delta = Instruction::new(1, "A", FieldType::Int64).with_operator(Operator::Delta);
        assert!(!delta.claims_pmap_bit());

        let constant = Instruction::new(1, "A", FieldType::UInt32)
            .with_operator(Operator::Constant)
            .with_initial(1u32);
        assert!(!constant.claims_pmap_bit());
        assert!(constant.optional().claims_pmap_bit());
    }

    #[test]
    fn test_claims_pmap_bit_composite() {
        let group = Instruction::group(1, "G").push(Instruction::new(2, "A", FieldType::UInt32));
        assert!(!group.claims_pmap_bit());
        assert!(group.optional().claims_pmap_bit());

        let seq = Instruction::sequence(3, "S").push(Instruction::new(4, "X", FieldType::UInt32));
        assert!(!seq.claims_pmap_bit());
    }

    #[test]
    fn test_sequence_builder_length_child() {
        let seq = Instruction::sequence(3, "Entries")
            .push(Instruction::new(4, "Px", FieldType::Decimal));
        let length = seq.length_instruction().unwrap();
        assert_eq!(length.name, "EntriesLength");
        assert_eq!(length.field_type, FieldType::UInt32);
        assert_eq!(seq.element_instructions().len(), 1);
        assert_eq!(seq.element_instructions()[0].name, "Px");
    }

    #[test]
    fn test_optional_sequence_length_is_optional() {
        let seq = Instruction::sequence(3, "Entries").optional();
        assert!(seq.length_instruction().unwrap().presence.is_optional());
    }

    #[test]
    fn test_validate_constant_requires_initial() {
        let bad = Instruction::new(1, "A", FieldType::UInt32).with_operator(Operator::Constant);
        assert_eq!(
            bad.validate(),
            Err(TemplateError::ConstantWithoutInitial {
                field: "A".to_string()
            })
        );
    }

    #[test]
    fn test_validate_increment_requires_integer() {
        let bad =
            Instruction::new(1, "A", FieldType::AsciiString).with_operator(Operator::Increment);
        assert!(matches!(
            bad.validate(),
            Err(TemplateError::InvalidOperator { .. })
        ));
    }

    #[test]
    fn test_validate_tail_requires_vector() {
        let bad = Instruction::new(1, "A", FieldType::UInt32).with_operator(Operator::Tail);
        assert!(matches!(
            bad.validate(),
            Err(TemplateError::InvalidOperator { .. })
        ));
        let good =
            Instruction::new(1, "A", FieldType::AsciiString).with_operator(Operator::Tail);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_validate_mandatory_default_requires_initial() {
        let bad = Instruction::new(1, "A", FieldType::UInt32).with_operator(Operator::Default);
        assert!(matches!(
            bad.validate(),
            Err(TemplateError::DefaultWithoutInitial { .. })
        ));
        let good = Instruction::new(1, "A", FieldType::UInt32)
            .with_operator(Operator::Default)
            .optional();
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_template_builder() {
        let tpl = Template::new(1, "Quote")
            .push(Instruction::new(1, "Symbol", FieldType::AsciiString))
            .push(Instruction::new(2, "Px", FieldType::Decimal));
        assert_eq!(tpl.instructions.len(), 2);
        assert!(tpl.validate().is_ok());
    }
}
