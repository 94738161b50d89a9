//! Core types: call requests, call-file generation, schedule parsing

pub mod call;
pub mod callfile;
pub mod schedule;
pub mod tracing;

pub use call::{
    CallDefaults, CallRequest, CallRequestResolver, FieldLookup, ResolveError,
    decode_form_component, field, parse_form_pairs, parse_set_var,
};
pub use callfile::{CallFile, Directive};
pub use schedule::{Schedule, ScheduleParser, ScheduleResolver};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
