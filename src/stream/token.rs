//! Token contract shared by the parser and the generator.

/// Structural and scalar events of a token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    FieldName,
    ValueString,
    ValueNumber,
    ValueBoolean,
    ValueNull,
    ValueBinary,
    EndOfStream,
}

impl Token {
    /// Whether the token carries a scalar value.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Token::ValueString
                | Token::ValueNumber
                | Token::ValueBoolean
                | Token::ValueNull
                | Token::ValueBinary
        )
    }

    pub fn is_struct_start(&self) -> bool {
        matches!(self, Token::StartObject | Token::StartArray)
    }
}

/// A numeric scalar in the width the schema declared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Number {
    /// The value as i64, if it is integral and in range.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Number::Int(v) => Some(v as i64),
            Number::Long(v) => Some(v),
            Number::Float(_) | Number::Double(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int(v) => v as f64,
            Number::Long(v) => v as f64,
            Number::Float(v) => v as f64,
            Number::Double(v) => v,
        }
    }
}

/// A token together with its payload.
///
/// Used where tokens are queued or forwarded rather than pulled: default values and
/// custom-encoded values replayed by the parser, subtrees captured by the generator, and
/// the datum helpers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    FieldName(String),
    String(String),
    Number(Number),
    Boolean(bool),
    Null,
    Binary(Vec<u8>),
}

impl Event {
    pub fn token(&self) -> Token {
        match self {
            Event::StartObject => Token::StartObject,
            Event::EndObject => Token::EndObject,
            Event::StartArray => Token::StartArray,
            Event::EndArray => Token::EndArray,
            Event::FieldName(_) => Token::FieldName,
            Event::String(_) => Token::ValueString,
            Event::Number(_) => Token::ValueNumber,
            Event::Boolean(_) => Token::ValueBoolean,
            Event::Null => Token::ValueNull,
            Event::Binary(_) => Token::ValueBinary,
        }
    }
}
