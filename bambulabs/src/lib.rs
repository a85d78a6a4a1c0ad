//! Typed view of the reports a Bambu Lab printer publishes on its
//! `device/<serial>/report` topic.
//!
//! Only the parts of the report stream needed to follow a print job are
//! modelled: status pushes and project-file (print start) notifications.
//! Everything else is kept around as raw JSON.

#![deny(missing_docs)]

pub mod message;
pub mod parser;
pub mod sequence_id;
