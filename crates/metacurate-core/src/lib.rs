//! Curation engine for scholarly metadata batches.
//!
//! Raw CSV-shaped rows come in; curated rows and a deterministic action log
//! come out. Along the way identifiers are validated and normalised, rows
//! that name the same entity are merged with each other and with the
//! existing graph, and fresh meta-ids are drawn from a persistent counter.

pub mod action;
pub mod curator;
pub mod entity;
pub mod error;
pub mod finder;
pub mod mention;
pub mod row;
pub mod union_find;

pub use action::{Action, Attributes};
pub use curator::{CuratedBatch, Curator};
pub use entity::{BrType, EntityClass, MetaId, Role};
pub use error::{CuratorError, Warning, WarningKind};
pub use finder::{memory::MemoryFinder, sparql::SparqlFinder, Finder, FinderError};
pub use mention::{AgentMention, IdToken, ParsedRow, VenueMention};
pub use row::Row;
