pub mod parser;
pub mod segment;

pub use parser::{MapParseError, parse_map};
pub use segment::{MappingKind, Permissions, RecordError, Segment};
