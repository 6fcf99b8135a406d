//! Document generation pipeline for papermill.
//!
//! This crate turns a commissioned work item into finished text:
//! query formulation, source selection, outline and body generation for
//! generic content, the multi-chapter academic path, the orchestrating
//! [`pipeline::Pipeline`], bounded batch runs, order write-back and
//! read-only reporting.

pub mod academic;
pub mod batch;
pub mod completion;
pub mod content;
pub mod formulator;
pub mod labels;
pub mod order;
pub mod outline;
pub mod pipeline;
pub mod report;
pub mod selector;
pub mod sizing;

mod prompt;

#[cfg(test)]
mod testing;
