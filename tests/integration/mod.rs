//! Integration tests for intent resolution agents on a shared bus

mod cli_parse;
mod end_to_end;
mod line_pipeline;
mod support;
