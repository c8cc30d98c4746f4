pub mod lines;

pub use lines::{ndjson_line_stream, LineSplitter};
