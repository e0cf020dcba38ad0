//! Token streams over the Avro binary encoding.
//!
//! [`AvroParser`] turns bytes into [`Token`]s one at a time; [`AvroGenerator`] turns tokens
//! back into bytes. Both walk the schema through a context stack so that client code only
//! ever sees objects, arrays and scalars.

mod config;
mod context;
mod generator;
mod parser;
mod token;

pub use config::{ContainerOptions, GeneratorConfig, ParserConfig, DEFAULT_SYNC_INTERVAL};
pub use context::{
    FieldCursor, FieldState, FrameKind, ReadContextStack, ReadFrame, WriteContextStack, WriteFrame,
};
pub use generator::AvroGenerator;
pub use parser::AvroParser;
pub use token::{Event, Number, Token};
