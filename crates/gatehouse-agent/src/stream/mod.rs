pub mod parser;

pub use parser::{ItemSink, PermissionProbe, ProbeOutcome, StreamEventParser, PLAN_REVIEW_TOOLS};
