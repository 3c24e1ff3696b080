//! In-memory [`Finder`] over a pre-built graph snapshot, used by tests and
//! dry runs.

use std::collections::HashMap;

use metacurate_identifiers::Scheme;

use crate::entity::{MetaId, Role};
use crate::finder::{
    ArEntry, BoxFuture, BrRecord, Finder, FinderError, RaRecord, ReRecord, VenueStructure,
    VolumeEntry,
};

#[derive(Debug, Default)]
pub struct MemoryFinder {
    brs: HashMap<MetaId, BrRecord>,
    ras: HashMap<MetaId, RaRecord>,
    br_ids: HashMap<(Scheme, String), MetaId>,
    ra_ids: HashMap<(Scheme, String), MetaId>,
    structures: HashMap<MetaId, VenueStructure>,
    res: HashMap<MetaId, ReRecord>,
    ars: HashMap<(MetaId, Role), Vec<(MetaId, MetaId)>>,
}

impl MemoryFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource and index its external identifiers.
    pub fn add_br(&mut self, record: BrRecord) -> &mut Self {
        for (scheme, value, _) in &record.ids {
            self.br_ids
                .insert((*scheme, value.clone()), record.meta_id.clone());
        }
        self.brs.insert(record.meta_id.clone(), record);
        self
    }

    /// Insert an agent and index its external identifiers.
    pub fn add_ra(&mut self, record: RaRecord) -> &mut Self {
        for (scheme, value, _) in &record.ids {
            self.ra_ids
                .insert((*scheme, value.clone()), record.meta_id.clone());
        }
        self.ras.insert(record.meta_id.clone(), record);
        self
    }

    /// Register a volume under a venue, creating the record too.
    pub fn add_volume(&mut self, venue: &MetaId, sequence: &str, volume: MetaId) -> &mut Self {
        let mut record = BrRecord::new(volume.clone());
        record.part_of = Some(venue.clone());
        record.sequence = Some(sequence.to_string());
        self.brs.insert(volume.clone(), record);
        self.structures
            .entry(venue.clone())
            .or_default()
            .volumes
            .insert(sequence.to_string(), VolumeEntry::new(volume));
        self
    }

    /// Register an issue under a venue, nested in a volume when given.
    pub fn add_issue(
        &mut self,
        venue: &MetaId,
        volume_sequence: Option<&str>,
        sequence: &str,
        issue: MetaId,
    ) -> &mut Self {
        let mut record = BrRecord::new(issue.clone());
        record.sequence = Some(sequence.to_string());
        let structure = self.structures.entry(venue.clone()).or_default();
        match volume_sequence {
            Some(vol) => {
                record.part_of = structure.volumes.get(vol).map(|v| v.meta_id.clone());
                if let Some(entry) = structure.volumes.get_mut(vol) {
                    entry.issues.insert(sequence.to_string(), issue.clone());
                }
            }
            None => {
                record.part_of = Some(venue.clone());
                structure.issues.insert(sequence.to_string(), issue.clone());
            }
        }
        self.brs.insert(issue.clone(), record);
        self
    }

    pub fn add_re(&mut self, br: &MetaId, re: MetaId, pages: &str) -> &mut Self {
        self.res.insert(
            br.clone(),
            ReRecord {
                meta_id: re,
                pages: pages.to_string(),
            },
        );
        self
    }

    /// Append one position to a role sequence.
    pub fn add_ar(&mut self, br: &MetaId, role: Role, ar: MetaId, ra: MetaId) -> &mut Self {
        self.ars
            .entry((br.clone(), role))
            .or_default()
            .push((ar, ra));
        self
    }
}

impl Finder for MemoryFinder {
    fn br_by_identifier<'a>(
        &'a self,
        scheme: Scheme,
        value: &'a str,
    ) -> BoxFuture<'a, Result<Option<BrRecord>, FinderError>> {
        Box::pin(async move {
            Ok(self
                .br_ids
                .get(&(scheme, value.to_string()))
                .and_then(|id| self.brs.get(id))
                .cloned())
        })
    }

    fn ra_by_identifier<'a>(
        &'a self,
        scheme: Scheme,
        value: &'a str,
    ) -> BoxFuture<'a, Result<Option<RaRecord>, FinderError>> {
        Box::pin(async move {
            Ok(self
                .ra_ids
                .get(&(scheme, value.to_string()))
                .and_then(|id| self.ras.get(id))
                .cloned())
        })
    }

    fn br<'a>(
        &'a self,
        meta_id: &'a MetaId,
    ) -> BoxFuture<'a, Result<Option<BrRecord>, FinderError>> {
        Box::pin(async move { Ok(self.brs.get(meta_id).cloned()) })
    }

    fn ra<'a>(
        &'a self,
        meta_id: &'a MetaId,
    ) -> BoxFuture<'a, Result<Option<RaRecord>, FinderError>> {
        Box::pin(async move { Ok(self.ras.get(meta_id).cloned()) })
    }

    fn venue_structure<'a>(
        &'a self,
        venue: &'a MetaId,
    ) -> BoxFuture<'a, Result<VenueStructure, FinderError>> {
        Box::pin(async move { Ok(self.structures.get(venue).cloned().unwrap_or_default()) })
    }

    fn re_for_br<'a>(
        &'a self,
        br: &'a MetaId,
    ) -> BoxFuture<'a, Result<Option<ReRecord>, FinderError>> {
        Box::pin(async move { Ok(self.res.get(br).cloned()) })
    }

    fn ar_sequence<'a>(
        &'a self,
        br: &'a MetaId,
        role: Role,
    ) -> BoxFuture<'a, Result<Vec<ArEntry>, FinderError>> {
        Box::pin(async move {
            let entries = match self.ars.get(&(br.clone(), role)) {
                Some(entries) => entries,
                None => return Ok(Vec::new()),
            };
            Ok(entries
                .iter()
                .map(|(ar, ra)| ArEntry {
                    ar: ar.clone(),
                    ra: self
                        .ras
                        .get(ra)
                        .cloned()
                        .unwrap_or_else(|| RaRecord::new(ra.clone())),
                })
                .collect())
        })
    }
}
