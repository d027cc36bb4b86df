//! Compiler for declared list elements.
//!
//! A list model can be declared with literal rows:
//!
//! ```text
//! ListModel {
//!     ListElement { name: "Apples"; cost: 2.45; attributes: [
//!         ListElement { description: "Core" },
//!         ListElement { description: "Deciduous" }
//!     ] }
//!     ListElement { name: "Oranges"; cost: 3.25 }
//! }
//! ```
//!
//! The declaration reaches this module already parsed into
//! [`DeclaredProperty`] / [`DeclaredObject`] trees. [`ListModelParser`]
//! compiles such a tree into a [`CompiledListModel`]: a flat instruction
//! stream plus a data blob of NUL-terminated payloads. Replaying the stream
//! with [`ListModel::from_compiled`] populates a fresh static-schema model.
//!
//! Instructions:
//!
//! | Instruction   | Effect                                              |
//! |---------------|-----------------------------------------------------|
//! | `Push`        | begin a row (a nested row inside a `Set`)           |
//! | `Pop`         | end the innermost row or column                     |
//! | `Set(offset)` | begin the column whose name is stored at `offset`   |
//! | `Value(offset)` | store the tagged value at `offset` in that column |
//!
//! A value payload starts with a tag byte: [`TAG_INVALID`] (an empty list),
//! [`TAG_BOOLEAN`], [`TAG_NUMBER`] (number as text) or [`TAG_STRING`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use horizon_listmodel_core::UidGenerator;
use horizon_listmodel_core::logging::targets;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::facade::ListModel;
use crate::value::{Value, ValueMap};

/// Tag of an empty list payload.
pub const TAG_INVALID: u8 = 0;
/// Tag of a boolean payload (one byte, `0` or `1`).
pub const TAG_BOOLEAN: u8 = 1;
/// Tag of a number payload, stored as decimal text.
pub const TAG_NUMBER: u8 = 2;
/// Tag of a UTF-8 string payload.
pub const TAG_STRING: u8 = 3;

const HEADER_SIZE: usize = 8;
const INSTRUCTION_SIZE: usize = 8;

const TRANSLATE_FUNCTIONS: [&str; 3] = ["QT_TR_NOOP", "QT_TRID_NOOP", "QT_TRANSLATE_NOOP"];

// =============================================================================
// Declarations
// =============================================================================

/// Position of a declaration in its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl Location {
    /// Creates a location.
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A literal as written in a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// A string literal.
    String(String),
    /// A numeric literal.
    Number(f64),
    /// `true` or `false`.
    Boolean(bool),
    /// Any other expression, kept as source text.
    Script(String),
}

impl From<&str> for LiteralValue {
    fn from(value: &str) -> Self {
        LiteralValue::String(value.to_string())
    }
}

impl From<f64> for LiteralValue {
    fn from(value: f64) -> Self {
        LiteralValue::Number(value)
    }
}

impl From<bool> for LiteralValue {
    fn from(value: bool) -> Self {
        LiteralValue::Boolean(value)
    }
}

/// One value assigned to a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A nested object declaration.
    Object(DeclaredObject),
    /// A literal.
    Literal(LiteralValue),
}

/// A property assignment. The default property has an empty name.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredProperty {
    /// Property name, empty for the default property.
    pub name: String,
    /// Assigned values in declaration order.
    pub values: Vec<PropertyValue>,
    /// Where the assignment appears.
    pub location: Location,
}

impl DeclaredProperty {
    /// Creates a named property with no values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            location: Location::default(),
        }
    }

    /// The default property holding `objects`.
    pub fn default_property(objects: impl IntoIterator<Item = DeclaredObject>) -> Self {
        Self {
            name: String::new(),
            values: objects.into_iter().map(PropertyValue::Object).collect(),
            location: Location::default(),
        }
    }

    /// A named property holding one literal.
    pub fn literal(name: impl Into<String>, value: impl Into<LiteralValue>) -> Self {
        Self::new(name).with_value(PropertyValue::Literal(value.into()))
    }

    /// A named property holding one script expression.
    pub fn script(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::literal(name, LiteralValue::Script(source.into()))
    }

    /// A named property holding nested objects.
    pub fn objects(name: impl Into<String>, objects: impl IntoIterator<Item = DeclaredObject>) -> Self {
        let mut property = Self::new(name);
        property.values = objects.into_iter().map(PropertyValue::Object).collect();
        property
    }

    /// Appends a value.
    pub fn with_value(mut self, value: PropertyValue) -> Self {
        self.values.push(value);
        self
    }

    /// Sets the source location.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Location::new(line, column);
        self
    }
}

/// An object declaration such as `ListElement { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredObject {
    /// Type name as written, possibly qualified (`Models.ListElement`).
    pub type_name: String,
    /// Property assignments in declaration order.
    pub properties: Vec<DeclaredProperty>,
    /// Where the declaration appears.
    pub location: Location,
}

impl DeclaredObject {
    /// Creates an object declaration with no properties.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
            location: Location::default(),
        }
    }

    /// A `ListElement` declaration.
    pub fn element() -> Self {
        Self::new("ListElement")
    }

    /// Appends a property assignment.
    pub fn with(mut self, property: DeclaredProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Sets the source location.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Location::new(line, column);
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A declaration the compiler rejects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// An object other than a list element, or an unnamed nested property.
    #[error("{location}: ListElement: cannot contain nested elements")]
    NestedElement {
        /// Offending declaration.
        location: Location,
    },

    /// A list element assigns `id`.
    #[error("{location}: ListElement: cannot use reserved \"id\" property")]
    ReservedId {
        /// Offending assignment.
        location: Location,
    },

    /// The model itself assigns a named property.
    #[error("{location}: ListModel: undefined property '{name}'")]
    UndefinedProperty {
        /// Property name.
        name: String,
        /// Offending assignment.
        location: Location,
    },

    /// A column value is an expression rather than a literal.
    #[error("{location}: ListElement: cannot use script for property value")]
    ScriptValue {
        /// Offending assignment.
        location: Location,
    },

    /// A translation marker with the wrong arguments.
    #[error("{location}: ListElement: improperly specified {function}")]
    ImproperTranslation {
        /// `QT_TR_NOOP`, `QT_TRID_NOOP` or `QT_TRANSLATE_NOOP`.
        function: String,
        /// Offending assignment.
        location: Location,
    },

    /// A literal assigned directly to the model instead of to an element.
    #[error("{location}: ListModel: expected ListElement declarations")]
    UnexpectedValue {
        /// Offending assignment.
        location: Location,
    },
}

impl CompileError {
    /// Where the error was detected.
    pub fn location(&self) -> Location {
        match self {
            CompileError::NestedElement { location }
            | CompileError::ReservedId { location }
            | CompileError::UndefinedProperty { location, .. }
            | CompileError::ScriptValue { location }
            | CompileError::ImproperTranslation { location, .. }
            | CompileError::UnexpectedValue { location } => *location,
        }
    }
}

/// A compiled blob that cannot be replayed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ends before its header says it should.
    #[error("compiled list model truncated at {len} bytes")]
    Truncated {
        /// Buffer length.
        len: usize,
    },

    /// The header's data offset disagrees with its instruction count.
    #[error("compiled list model header is inconsistent (data offset {data_offset}, {instruction_count} instructions)")]
    BadHeader {
        /// Declared data offset.
        data_offset: usize,
        /// Declared instruction count.
        instruction_count: usize,
    },

    /// An instruction with an unknown opcode.
    #[error("unknown opcode {opcode} at instruction {position}")]
    UnknownOpcode {
        /// Instruction index.
        position: usize,
        /// The opcode found.
        opcode: u32,
    },

    /// An instruction refers outside the data blob.
    #[error("data reference {offset} out of range")]
    DataOutOfRange {
        /// The referenced offset.
        offset: usize,
    },

    /// A value payload with an unknown tag.
    #[error("unknown value tag {tag} at data offset {offset}")]
    UnknownValueTag {
        /// Payload offset.
        offset: usize,
        /// The tag found.
        tag: u8,
    },

    /// Instructions that do not nest properly.
    #[error("unbalanced instruction stream at instruction {position}")]
    Malformed {
        /// Instruction index.
        position: usize,
    },
}

// =============================================================================
// Compiled form
// =============================================================================

/// One step of the replay program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Begin a row.
    Push,
    /// End the innermost row or column.
    Pop,
    /// Store the value at the data offset in the current column.
    Value(u32),
    /// Begin the column named at the data offset.
    Set(u32),
}

impl Instruction {
    fn opcode(self) -> u32 {
        match self {
            Instruction::Push => 0,
            Instruction::Pop => 1,
            Instruction::Value(_) => 2,
            Instruction::Set(_) => 3,
        }
    }

    fn data_index(self) -> i32 {
        match self {
            Instruction::Push | Instruction::Pop => -1,
            Instruction::Value(offset) | Instruction::Set(offset) => offset as i32,
        }
    }

    fn decode(position: usize, opcode: u32, data_index: i32) -> Result<Self, DecodeError> {
        let offset = || u32::try_from(data_index).map_err(|_| DecodeError::DataOutOfRange { offset: usize::MAX });
        Ok(match opcode {
            0 => Instruction::Push,
            1 => Instruction::Pop,
            2 => Instruction::Value(offset()?),
            3 => Instruction::Set(offset()?),
            _ => return Err(DecodeError::UnknownOpcode { position, opcode }),
        })
    }
}

/// Output of [`ListModelParser::compile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledListModel {
    instructions: Vec<Instruction>,
    data: Vec<u8>,
}

impl CompiledListModel {
    /// The replay program.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The payload blob.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes into one buffer: header, instructions, data.
    ///
    /// The header holds the data offset and the instruction count; every
    /// instruction is an opcode and a data index (`-1` for none). All
    /// integers are little-endian 32-bit.
    pub fn to_bytes(&self) -> Vec<u8> {
        let data_offset = HEADER_SIZE + self.instructions.len() * INSTRUCTION_SIZE;
        let mut bytes = Vec::with_capacity(data_offset + self.data.len());
        bytes.extend_from_slice(&(data_offset as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.instructions.len() as u32).to_le_bytes());
        for instruction in &self.instructions {
            bytes.extend_from_slice(&instruction.opcode().to_le_bytes());
            bytes.extend_from_slice(&instruction.data_index().to_le_bytes());
        }
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Parses a buffer produced by [`to_bytes`](Self::to_bytes) and checks
    /// every data reference.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let truncated = || DecodeError::Truncated { len: bytes.len() };
        let word = |at: usize| -> Result<[u8; 4], DecodeError> {
            bytes
                .get(at..at + 4)
                .and_then(|w| <[u8; 4]>::try_from(w).ok())
                .ok_or_else(truncated)
        };

        let data_offset = u32::from_le_bytes(word(0)?) as usize;
        let instruction_count = u32::from_le_bytes(word(4)?) as usize;
        let expected = instruction_count
            .checked_mul(INSTRUCTION_SIZE)
            .and_then(|size| size.checked_add(HEADER_SIZE));
        if expected != Some(data_offset) {
            return Err(DecodeError::BadHeader {
                data_offset,
                instruction_count,
            });
        }
        if bytes.len() < data_offset {
            return Err(truncated());
        }

        let instructions = (0..instruction_count)
            .map(|position| {
                let at = HEADER_SIZE + position * INSTRUCTION_SIZE;
                let opcode = u32::from_le_bytes(word(at)?);
                let data_index = i32::from_le_bytes(word(at + 4)?);
                Instruction::decode(position, opcode, data_index)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let compiled = Self {
            instructions,
            data: bytes[data_offset..].to_vec(),
        };
        compiled.validate()?;
        Ok(compiled)
    }

    /// Checks that every instruction refers to a decodable payload.
    pub fn validate(&self) -> Result<(), DecodeError> {
        for instruction in &self.instructions {
            match *instruction {
                Instruction::Set(offset) => {
                    self.name_at(offset)?;
                }
                Instruction::Value(offset) => {
                    self.value_at(offset)?;
                }
                Instruction::Push | Instruction::Pop => {}
            }
        }
        Ok(())
    }

    /// The NUL-terminated bytes starting at `offset`, without the NUL.
    fn c_str_at(&self, offset: usize) -> Result<&[u8], DecodeError> {
        let tail = self.data.get(offset..).ok_or(DecodeError::DataOutOfRange { offset })?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::DataOutOfRange { offset })?;
        Ok(&tail[..end])
    }

    fn name_at(&self, offset: u32) -> Result<String, DecodeError> {
        self.c_str_at(offset as usize)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn value_at(&self, offset: u32) -> Result<Value, DecodeError> {
        let offset = offset as usize;
        let tag = *self.data.get(offset).ok_or(DecodeError::DataOutOfRange { offset })?;
        match tag {
            TAG_INVALID => Ok(Value::List(Vec::new())),
            TAG_BOOLEAN => self
                .data
                .get(offset + 1)
                .map(|&b| Value::Bool(b != 0))
                .ok_or(DecodeError::DataOutOfRange { offset }),
            TAG_NUMBER => {
                let text = self.c_str_at(offset + 1)?;
                let number = std::str::from_utf8(text)
                    .ok()
                    .and_then(|text| text.parse::<f64>().ok())
                    .unwrap_or(f64::NAN);
                Ok(Value::Number(number))
            }
            TAG_STRING => {
                let text = self.c_str_at(offset + 1)?;
                Ok(Value::String(String::from_utf8_lossy(text).into_owned()))
            }
            tag => Err(DecodeError::UnknownValueTag { offset, tag }),
        }
    }

    /// Replays the program into top-level row records.
    ///
    /// Returns the rows and whether any column value was assigned.
    fn rows(&self) -> Result<(Vec<ValueMap>, bool), DecodeError> {
        enum Frame {
            Row(ValueMap),
            Column(String),
        }

        let mut rows = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut assigned = false;

        for (position, instruction) in self.instructions.iter().enumerate() {
            let malformed = DecodeError::Malformed { position };
            match *instruction {
                Instruction::Push => {
                    if let [.., Frame::Row(parent), Frame::Column(name)] = stack.as_mut_slice() {
                        if !parent.get(name).is_some_and(Value::is_list) {
                            parent.insert(name.clone(), Value::List(Vec::new()));
                        }
                    } else if !stack.is_empty() {
                        return Err(malformed);
                    }
                    stack.push(Frame::Row(ValueMap::new()));
                }
                Instruction::Pop => match stack.pop() {
                    Some(Frame::Row(row)) => match stack.as_mut_slice() {
                        [] => rows.push(row),
                        [.., Frame::Row(parent), Frame::Column(name)] => {
                            if let Some(Value::List(items)) = parent.get_mut(name) {
                                items.push(Value::Map(row));
                            }
                        }
                        _ => return Err(malformed),
                    },
                    Some(Frame::Column(_)) => {}
                    None => return Err(malformed),
                },
                Instruction::Set(offset) => {
                    if !matches!(stack.last(), Some(Frame::Row(_))) {
                        return Err(malformed);
                    }
                    stack.push(Frame::Column(self.name_at(offset)?));
                }
                Instruction::Value(offset) => {
                    let value = self.value_at(offset)?;
                    match stack.as_mut_slice() {
                        [.., Frame::Row(row), Frame::Column(name)] => {
                            row.insert(name.clone(), value);
                            assigned = true;
                        }
                        _ => return Err(malformed),
                    }
                }
            }
        }

        if !stack.is_empty() {
            return Err(DecodeError::Malformed {
                position: self.instructions.len(),
            });
        }
        Ok((rows, assigned))
    }
}

// =============================================================================
// Compiler
// =============================================================================

/// Compiles declared list elements.
#[derive(Debug, Clone)]
pub struct ListModelParser {
    element_types: Vec<String>,
    enums: HashMap<String, i32>,
}

impl Default for ListModelParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ListModelParser {
    /// A parser accepting `ListElement` declarations.
    pub fn new() -> Self {
        Self {
            element_types: vec!["ListElement".to_string()],
            enums: HashMap::new(),
        }
    }

    /// Accepts another element type name.
    pub fn with_element_type(mut self, name: impl Into<String>) -> Self {
        self.element_types.push(name.into());
        self
    }

    /// Registers an enumeration value usable as a column value
    /// (`Text.AlignLeft`).
    pub fn with_enum(mut self, name: impl Into<String>, value: i32) -> Self {
        self.enums.insert(name.into(), value);
        self
    }

    fn is_element_type(&self, type_name: &str) -> bool {
        let unqualified = type_name.rsplit('.').next().unwrap_or(type_name);
        self.element_types
            .iter()
            .any(|name| name == type_name || name == unqualified)
    }

    /// Compiles the properties assigned to a list model declaration.
    ///
    /// Only the default property (empty name) may be assigned, and only
    /// with element declarations.
    pub fn compile(&self, properties: &[DeclaredProperty]) -> Result<CompiledListModel, CompileError> {
        let mut compiled = CompiledListModel::default();
        for property in properties {
            if !property.name.is_empty() {
                return Err(CompileError::UndefinedProperty {
                    name: property.name.clone(),
                    location: property.location,
                });
            }
            if property.values.iter().any(|v| matches!(v, PropertyValue::Literal(_))) {
                return Err(CompileError::UnexpectedValue {
                    location: property.location,
                });
            }
            self.compile_property(property, &mut compiled)?;
        }
        tracing::debug!(
            target: targets::PARSER,
            instructions = compiled.instructions.len(),
            data = compiled.data.len(),
            "compiled list elements"
        );
        Ok(compiled)
    }

    fn compile_property(&self, property: &DeclaredProperty, out: &mut CompiledListModel) -> Result<(), CompileError> {
        for value in &property.values {
            match value {
                PropertyValue::Object(node) => {
                    if !self.is_element_type(&node.type_name) {
                        return Err(CompileError::NestedElement { location: node.location });
                    }
                    out.instructions.push(Instruction::Push);
                    for column in &node.properties {
                        if column.name.is_empty() {
                            return Err(CompileError::NestedElement { location: column.location });
                        }
                        if column.name == "id" {
                            return Err(CompileError::ReservedId { location: column.location });
                        }
                        let offset = out.data.len() as u32;
                        out.data.extend_from_slice(column.name.as_bytes());
                        out.data.push(0);
                        out.instructions.push(Instruction::Set(offset));
                        self.compile_property(column, out)?;
                        out.instructions.push(Instruction::Pop);
                    }
                    out.instructions.push(Instruction::Pop);
                }
                PropertyValue::Literal(literal) => {
                    let payload = self.encode_literal(literal, property.location)?;
                    let offset = out.data.len() as u32;
                    out.data.extend_from_slice(&payload);
                    out.data.push(0);
                    out.instructions.push(Instruction::Value(offset));
                }
            }
        }
        Ok(())
    }

    /// Encodes a literal as tag plus payload, without the terminator.
    fn encode_literal(&self, literal: &LiteralValue, location: Location) -> Result<Vec<u8>, CompileError> {
        let mut payload = Vec::new();
        match literal {
            LiteralValue::String(s) => {
                payload.push(TAG_STRING);
                payload.extend_from_slice(s.as_bytes());
            }
            LiteralValue::Number(n) => {
                payload.push(TAG_NUMBER);
                payload.extend_from_slice(n.to_string().as_bytes());
            }
            LiteralValue::Boolean(b) => {
                payload.push(TAG_BOOLEAN);
                payload.push(u8::from(*b));
            }
            LiteralValue::Script(source) => {
                if defines_empty_list(source) {
                    payload.push(TAG_INVALID);
                } else if let Some(value) = self.enums.get(source.trim()) {
                    payload.push(TAG_NUMBER);
                    payload.extend_from_slice(value.to_string().as_bytes());
                } else {
                    let text = translation_literal(source, location)?
                        .ok_or(CompileError::ScriptValue { location })?;
                    payload.push(TAG_STRING);
                    payload.extend_from_slice(text.as_bytes());
                }
            }
        }
        Ok(payload)
    }
}

/// `[ ]` with nothing but whitespace between the brackets.
fn defines_empty_list(source: &str) -> bool {
    let source = source.trim();
    source.len() >= 2
        && source.starts_with('[')
        && source.ends_with(']')
        && source[1..source.len() - 1].chars().all(char::is_whitespace)
}

// =============================================================================
// Translation markers
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Open,
    Close,
    Comma,
    Other,
}

/// Splits a script expression into the tokens a call expression needs.
///
/// Returns `None` for an unterminated string literal.
fn tokenize(source: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            ',' => tokens.push(Token::Comma),
            '"' | '\'' => {
                let mut text = String::new();
                loop {
                    match chars.next()? {
                        q if q == c => break,
                        '\\' => match chars.next()? {
                            'n' => text.push('\n'),
                            't' => text.push('\t'),
                            'r' => text.push('\r'),
                            other => text.push(other),
                        },
                        other => text.push(other),
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' || next == '$' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            _ => tokens.push(Token::Other),
        }
    }
    Some(tokens)
}

/// Extracts the string of a translation marker call.
///
/// `Ok(None)` means the script is not a translation marker at all.
fn translation_literal(source: &str, location: Location) -> Result<Option<String>, CompileError> {
    let Some(tokens) = tokenize(source) else {
        return Ok(None);
    };
    let [Token::Ident(function), Token::Open, arguments @ .., Token::Close] = tokens.as_slice() else {
        return Ok(None);
    };
    if !TRANSLATE_FUNCTIONS.contains(&function.as_str()) {
        return Ok(None);
    }

    let mut args: Vec<&[Token]> = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in arguments.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close if depth == 0 => return Ok(None),
            Token::Close => depth -= 1,
            Token::Comma if depth == 0 => {
                args.push(&arguments[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !arguments.is_empty() {
        args.push(&arguments[start..]);
    }

    let wanted = if function == "QT_TRANSLATE_NOOP" { 2 } else { 1 };
    let literal = match args.as_slice() {
        list if list.len() == wanted => match list[wanted - 1] {
            [Token::Str(text)] => Some(text.clone()),
            _ => None,
        },
        _ => None,
    };
    literal.map(Some).ok_or_else(|| CompileError::ImproperTranslation {
        function: function.clone(),
        location,
    })
}

// =============================================================================
// Replay
// =============================================================================

impl ListModel {
    /// Builds a static-schema model from compiled declarations.
    ///
    /// No notifications are emitted. If no declared element assigns any
    /// column, an informational message is logged since the model ends up
    /// with no roles.
    pub fn from_compiled(compiled: &CompiledListModel) -> Result<Arc<ListModel>, DecodeError> {
        Self::from_compiled_with_uids(compiled, UidGenerator::global())
    }

    /// Like [`from_compiled`](Self::from_compiled), drawing uids from `uids`.
    pub fn from_compiled_with_uids(
        compiled: &CompiledListModel,
        uids: UidGenerator,
    ) -> Result<Arc<ListModel>, DecodeError> {
        let (rows, assigned) = compiled.rows()?;
        let model = ListModel::with_uids(uids);
        if let Some(table) = model.shared_model() {
            let mut table = table.lock();
            for row in &rows {
                table.append_record(row);
            }
        }
        if !assigned {
            tracing::info!(
                target: targets::PARSER,
                "All ListElement declarations are empty, no roles can be created unless dynamicRoles is set."
            );
        }
        tracing::debug!(target: targets::PARSER, uid = model.uid(), rows = rows.len(), "populated declared model");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(columns: Vec<DeclaredProperty>) -> DeclaredObject {
        columns.into_iter().fold(DeclaredObject::element(), DeclaredObject::with)
    }

    fn compile(objects: Vec<DeclaredObject>) -> Result<CompiledListModel, CompileError> {
        ListModelParser::new().compile(&[DeclaredProperty::default_property(objects)])
    }

    #[test]
    fn test_instruction_stream_shape() {
        let compiled = compile(vec![element(vec![DeclaredProperty::literal("a", 1.0)])]).unwrap();
        assert_eq!(
            compiled.instructions(),
            &[
                Instruction::Push,
                Instruction::Set(0),
                Instruction::Value(2),
                Instruction::Pop,
                Instruction::Pop,
            ]
        );
        assert_eq!(compiled.data(), b"a\0\x021\0");
    }

    #[test]
    fn test_payload_tags() {
        let compiled = compile(vec![element(vec![
            DeclaredProperty::literal("s", "hi"),
            DeclaredProperty::literal("b", false),
            DeclaredProperty::script("l", "[  ]"),
        ])])
        .unwrap();
        let (rows, assigned) = compiled.rows().unwrap();
        assert!(assigned);
        assert_eq!(rows[0].get("s"), Some(&Value::from("hi")));
        assert_eq!(rows[0].get("b"), Some(&Value::Bool(false)));
        assert_eq!(rows[0].get("l"), Some(&Value::List(Vec::new())));
    }

    #[test]
    fn test_nested_elements_become_list_rows() {
        let compiled = compile(vec![element(vec![
            DeclaredProperty::literal("name", "Apples"),
            DeclaredProperty::objects(
                "attributes",
                vec![
                    element(vec![DeclaredProperty::literal("description", "Core")]),
                    element(vec![DeclaredProperty::literal("description", "Deciduous")]),
                ],
            ),
        ])])
        .unwrap();
        let (rows, _) = compiled.rows().unwrap();
        let attributes = rows[0].get("attributes").and_then(Value::as_list).unwrap();
        assert_eq!(attributes.len(), 2);
        assert_eq!(
            attributes[1].as_map().and_then(|m| m.get("description")),
            Some(&Value::from("Deciduous"))
        );
    }

    #[test]
    fn test_translation_markers() {
        let parser = ListModelParser::new();
        let location = Location::new(3, 9);
        assert_eq!(
            translation_literal(r#"QT_TR_NOOP("Apple")"#, location),
            Ok(Some("Apple".to_string()))
        );
        assert_eq!(
            translation_literal(r#"QT_TRANSLATE_NOOP("fruit", 'Pear')"#, location),
            Ok(Some("Pear".to_string()))
        );
        assert_eq!(translation_literal("Math.max(1, 2)", location), Ok(None));

        let err = parser
            .encode_literal(&LiteralValue::Script(r#"QT_TRID_NOOP("a", "b")"#.into()), location)
            .unwrap_err();
        assert_eq!(err.to_string(), "3:9: ListElement: improperly specified QT_TRID_NOOP");

        let err = parser
            .encode_literal(&LiteralValue::Script(r#"QT_TRANSLATE_NOOP("only")"#.into()), location)
            .unwrap_err();
        assert_eq!(err.to_string(), "3:9: ListElement: improperly specified QT_TRANSLATE_NOOP");

        let err = parser
            .encode_literal(&LiteralValue::Script("1 + 2".into()), location)
            .unwrap_err();
        assert_eq!(err, CompileError::ScriptValue { location });
    }

    #[test]
    fn test_enum_values_compile_as_numbers() {
        let parser = ListModelParser::new().with_enum("Text.AlignRight", 2);
        let compiled = parser
            .compile(&[DeclaredProperty::default_property(vec![element(vec![
                DeclaredProperty::script("align", "Text.AlignRight"),
            ])])])
            .unwrap();
        let (rows, _) = compiled.rows().unwrap();
        assert_eq!(rows[0].get("align"), Some(&Value::from(2)));
    }

    #[test]
    fn test_rejected_declarations() {
        let err = compile(vec![DeclaredObject::new("Rectangle").at(2, 5)]).unwrap_err();
        assert_eq!(err.to_string(), "2:5: ListElement: cannot contain nested elements");

        let err = compile(vec![element(vec![DeclaredProperty::literal("id", "x").at(4, 1)])]).unwrap_err();
        assert_eq!(err.to_string(), "4:1: ListElement: cannot use reserved \"id\" property");
        assert_eq!(err.location(), Location::new(4, 1));

        let err = ListModelParser::new()
            .compile(&[DeclaredProperty::literal("count", 3.0).at(1, 11)])
            .unwrap_err();
        assert_eq!(err.to_string(), "1:11: ListModel: undefined property 'count'");
    }

    #[test]
    fn test_qualified_and_aliased_element_types() {
        let parser = ListModelParser::new().with_element_type("Row");
        let declared = DeclaredProperty::default_property(vec![
            DeclaredObject::new("Models.ListElement"),
            DeclaredObject::new("Row"),
        ]);
        let compiled = parser.compile(&[declared]).unwrap();
        assert_eq!(compiled.rows().unwrap().0.len(), 2);
    }

    #[test]
    fn test_unbalanced_stream_is_malformed() {
        let compiled = CompiledListModel {
            instructions: vec![Instruction::Push, Instruction::Pop, Instruction::Pop],
            data: Vec::new(),
        };
        assert_eq!(compiled.rows().unwrap_err(), DecodeError::Malformed { position: 2 });

        let compiled = CompiledListModel {
            instructions: vec![Instruction::Push, Instruction::Value(0), Instruction::Pop],
            data: vec![TAG_STRING, b'x', 0],
        };
        assert_eq!(compiled.rows().unwrap_err(), DecodeError::Malformed { position: 1 });
    }

    #[test]
    fn test_from_bytes_rejects_bad_buffers() {
        let compiled = compile(vec![element(vec![DeclaredProperty::literal("a", "x")])]).unwrap();
        let bytes = compiled.to_bytes();
        assert_eq!(CompiledListModel::from_bytes(&bytes), Ok(compiled));

        assert_eq!(
            CompiledListModel::from_bytes(&bytes[..6]),
            Err(DecodeError::Truncated { len: 6 })
        );

        let mut bad_tag = bytes.clone();
        let tag_at = bad_tag.len() - 3;
        bad_tag[tag_at] = 9;
        assert!(matches!(
            CompiledListModel::from_bytes(&bad_tag),
            Err(DecodeError::UnknownValueTag { tag: 9, .. })
        ));

        let mut bad_opcode = bytes;
        bad_opcode[HEADER_SIZE] = 7;
        assert_eq!(
            CompiledListModel::from_bytes(&bad_opcode),
            Err(DecodeError::UnknownOpcode { position: 0, opcode: 7 })
        );
    }
}
