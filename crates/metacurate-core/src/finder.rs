//! Read-only lookups against the existing knowledge graph.
//!
//! The curation pipeline never talks SPARQL directly; it consumes this trait,
//! which keeps phases testable against [`memory::MemoryFinder`] while
//! production runs use [`sparql::SparqlFinder`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use metacurate_identifiers::Scheme;
use metacurate_sparql::SparqlError;

use crate::entity::{BrType, MetaId, Role};

pub mod memory;
pub mod sparql;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum FinderError {
    #[error("sparql transport: {0}")]
    Sparql(#[from] SparqlError),

    #[error("malformed query result: {0}")]
    Malformed(String),
}

/// A bibliographic resource as stored in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct BrRecord {
    pub meta_id: MetaId,
    pub title: String,
    pub kind: Option<BrType>,
    pub pub_date: String,
    /// External identifiers with the id entity that carries each one.
    pub ids: Vec<(Scheme, String, MetaId)>,
    pub part_of: Option<MetaId>,
    /// Sequence label when this record is a volume or an issue.
    pub sequence: Option<String>,
}

impl BrRecord {
    pub fn new(meta_id: MetaId) -> Self {
        Self {
            meta_id,
            title: String::new(),
            kind: None,
            pub_date: String::new(),
            ids: Vec::new(),
            part_of: None,
            sequence: None,
        }
    }
}

/// A responsible agent as stored in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct RaRecord {
    pub meta_id: MetaId,
    pub family: String,
    pub given: String,
    pub name: String,
    pub ids: Vec<(Scheme, String, MetaId)>,
}

impl RaRecord {
    pub fn new(meta_id: MetaId) -> Self {
        Self {
            meta_id,
            family: String::new(),
            given: String::new(),
            name: String::new(),
            ids: Vec::new(),
        }
    }
}

/// A resource embodiment (page range).
#[derive(Debug, Clone, PartialEq)]
pub struct ReRecord {
    pub meta_id: MetaId,
    pub pages: String,
}

/// One position in a role sequence: the binding entity and its agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ArEntry {
    pub ar: MetaId,
    pub ra: RaRecord,
}

/// A volume and the issues nested under it.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeEntry {
    pub meta_id: MetaId,
    pub issues: BTreeMap<String, MetaId>,
}

impl VolumeEntry {
    pub fn new(meta_id: MetaId) -> Self {
        Self {
            meta_id,
            issues: BTreeMap::new(),
        }
    }
}

/// The volume/issue tree below one venue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueStructure {
    /// Volumes keyed by sequence label.
    pub volumes: BTreeMap<String, VolumeEntry>,
    /// Issues hanging directly off the venue, keyed by sequence label.
    pub issues: BTreeMap<String, MetaId>,
}

/// Graph lookups needed by curation. Every method is a point read; bulk
/// behaviour comes from the caller batching and from implementation-side
/// memoisation.
pub trait Finder: Send + Sync {
    /// Resource carrying the given external identifier, if any.
    fn br_by_identifier<'a>(
        &'a self,
        scheme: Scheme,
        value: &'a str,
    ) -> BoxFuture<'a, Result<Option<BrRecord>, FinderError>>;

    /// Agent carrying the given external identifier, if any.
    fn ra_by_identifier<'a>(
        &'a self,
        scheme: Scheme,
        value: &'a str,
    ) -> BoxFuture<'a, Result<Option<RaRecord>, FinderError>>;

    /// Resource by meta-id. `None` means the omid does not exist.
    fn br<'a>(&'a self, meta_id: &'a MetaId)
        -> BoxFuture<'a, Result<Option<BrRecord>, FinderError>>;

    /// Agent by meta-id. `None` means the omid does not exist.
    fn ra<'a>(&'a self, meta_id: &'a MetaId)
        -> BoxFuture<'a, Result<Option<RaRecord>, FinderError>>;

    /// Volume/issue tree below a venue.
    fn venue_structure<'a>(
        &'a self,
        venue: &'a MetaId,
    ) -> BoxFuture<'a, Result<VenueStructure, FinderError>>;

    /// Current embodiment of a resource.
    fn re_for_br<'a>(
        &'a self,
        br: &'a MetaId,
    ) -> BoxFuture<'a, Result<Option<ReRecord>, FinderError>>;

    /// Ordered role sequence of a resource for one role.
    fn ar_sequence<'a>(
        &'a self,
        br: &'a MetaId,
        role: Role,
    ) -> BoxFuture<'a, Result<Vec<ArEntry>, FinderError>>;
}
