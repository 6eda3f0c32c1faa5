/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the fastwire FAST codec.
//!
//! This module provides a unified error hierarchy using `thiserror` for typed,
//! domain-specific errors across all fastwire operations. Where the FAST 1.1
//! specification assigns a dynamic error code (D5, D7, D9, ...), the code is
//! carried in the error message.

use thiserror::Error;

/// Result type alias using [`FastError`] as the error type.
pub type Result<T> = std::result::Result<T, FastError>;

/// Top-level error type for all fastwire operations.
#[derive(Debug, Error)]
pub enum FastError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error binding a message value to a template field.
    #[error("bind error: {0}")]
    Bind(#[from] BindError),

    /// Error in the template model.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// I/O error from the underlying source or sink.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while decoding a FAST stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ended before the current entity was complete.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// No stop bit was found within the maximum byte count for the type.
    #[error("missing stop bit within {limit} bytes")]
    MissingStopBit {
        /// Maximum number of bytes allowed for the entity.
        limit: usize,
    },

    /// A decoded integer does not fit the target type.
    #[error("integer overflow")]
    IntegerOverflow,

    /// A string field contained bytes that do not form a valid string.
    #[error("invalid string encoding")]
    InvalidString,

    /// A unicode field contained invalid UTF-8.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Template id is not present in the registry [ERR D9].
    #[error("dynamic error D9: template id {0} is not registered")]
    UnknownTemplate(u32),

    /// The stream carries no template id and no previous one is known.
    #[error("no template id in stream and none remembered")]
    MissingTemplateId,

    /// A mandatory field had no value in the stream or dictionary [ERR D5].
    #[error("dynamic error D5: mandatory field {name} has no value")]
    MandatoryFieldAbsent {
        /// Field name.
        name: String,
    },

    /// A delta subtraction length exceeds the stored value [ERR D7].
    #[error("dynamic error D7: subtraction length {subtraction} exceeds stored length {length}")]
    SubtractionTooLong {
        /// The subtraction length from the stream.
        subtraction: i64,
        /// Length of the stored base value.
        length: usize,
    },

    /// A delta was applied to an empty dictionary entry [ERR D6].
    #[error("dynamic error D6: delta on empty previous value of {name}")]
    PreviousValueEmpty {
        /// Field name.
        name: String,
    },
}

/// Errors that occur while encoding a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The message does not name an encoding template.
    #[error("message carries no template id")]
    MissingTemplateId,

    /// Template id is not present in the registry [ERR D9].
    #[error("dynamic error D9: template id {0} is not registered")]
    UnknownTemplate(u32),

    /// A mandatory field has no value in the message [ERR D5].
    #[error("dynamic error D5: mandatory field {name} has no value")]
    MissingMandatoryField {
        /// Field name.
        name: String,
    },

    /// The value cannot be represented by the field's operator [ERR D3].
    #[error("dynamic error D3: value of {name} cannot be represented by its operator")]
    ValueNotRepresentable {
        /// Field name.
        name: String,
    },

    /// A delta was applied to an empty dictionary entry [ERR D6].
    #[error("dynamic error D6: delta on empty previous value of {name}")]
    PreviousValueEmpty {
        /// Field name.
        name: String,
    },

    /// A value exceeds the range of its wire form.
    #[error("value of {name} is out of range for the wire form")]
    ValueOutOfRange {
        /// Field name.
        name: String,
    },
}

/// Errors binding message attributes to template fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The message value cannot be coerced to the field type.
    #[error("type mismatch for {field}: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Type required by the template.
        expected: &'static str,
        /// Type found in the message.
        actual: &'static str,
    },

    /// A numeric value does not fit the field type after conversion.
    #[error("value of {field} is out of range for {target}")]
    ValueOutOfRange {
        /// Field name.
        field: String,
        /// Target type name.
        target: &'static str,
    },

    /// The named attribute is not a nested aggregate.
    #[error("attribute {field} is not a group")]
    NotAGroup {
        /// Field name.
        field: String,
    },

    /// The named attribute is not an ordered container.
    #[error("attribute {field} is not a sequence")]
    NotASequence {
        /// Field name.
        field: String,
    },

    /// A sequence element index is outside the container.
    #[error("element {index} of {field} does not exist")]
    ElementOutOfBounds {
        /// Field name.
        field: String,
        /// Requested element index.
        index: usize,
    },
}

/// Errors raised while building or linking templates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Two templates share the same id.
    #[error("duplicate template id {0}")]
    DuplicateTemplate(u32),

    /// A constant operator has no initial value [ERR S4].
    #[error("static error S4: constant field {field} has no initial value")]
    ConstantWithoutInitial {
        /// Field name.
        field: String,
    },

    /// A mandatory default operator has no initial value [ERR S5].
    #[error("static error S5: mandatory default field {field} has no initial value")]
    DefaultWithoutInitial {
        /// Field name.
        field: String,
    },

    /// An operator is applied to a type it does not support [ERR S2].
    #[error("static error S2: operator {operator} is not valid for {field}")]
    InvalidOperator {
        /// Field name.
        field: String,
        /// Operator name.
        operator: &'static str,
    },

    /// A sequence instruction has no length child.
    #[error("sequence {field} has no length instruction")]
    SequenceWithoutLength {
        /// Field name.
        field: String,
    },

    /// A template reference names an unregistered template.
    #[error("template reference {name} cannot be resolved")]
    UnresolvedReference {
        /// Referenced template name.
        name: String,
    },

    /// Template references form a cycle.
    #[error("template reference cycle through {name}")]
    CyclicReference {
        /// Template name on the cycle.
        name: String,
    },
}
