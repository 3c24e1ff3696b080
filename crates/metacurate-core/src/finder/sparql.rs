//! [`Finder`] backed by a live SPARQL endpoint holding an OCDM-shaped graph.
//!
//! Every lookup is memoised per instance, so one batch touches the endpoint
//! at most once per distinct identifier, entity or venue.

use std::collections::HashMap;

use dashmap::DashMap;

use metacurate_identifiers::Scheme;
use metacurate_sparql::{iri, literal, Row as SparqlRow, SparqlClient};

use crate::entity::{BrType, EntityClass, MetaId, Role};
use crate::finder::{
    ArEntry, BoxFuture, BrRecord, Finder, FinderError, RaRecord, ReRecord, VenueStructure,
    VolumeEntry,
};

const BASE: &str = "https://w3id.org/oc/meta/";

const PREFIXES: &str = "\
PREFIX datacite: <http://purl.org/spar/datacite/>
PREFIX literal: <http://www.essepuntato.it/2010/06/literalreification/>
PREFIX fabio: <http://purl.org/spar/fabio/>
PREFIX frbr: <http://purl.org/vocab/frbr/core#>
PREFIX pro: <http://purl.org/spar/pro/>
PREFIX prism: <http://prismstandard.org/namespaces/basic/2.0/>
PREFIX dcterms: <http://purl.org/dc/terms/>
PREFIX foaf: <http://xmlns.com/foaf/0.1/>
PREFIX oco: <https://w3id.org/oc/ontology/>
";

fn entity_iri(meta_id: &MetaId) -> String {
    format!("{BASE}{}/{}", meta_id.class, meta_id.number)
}

fn parse_entity_iri(value: &str) -> Option<MetaId> {
    MetaId::parse(value.strip_prefix(BASE)?)
}

fn scheme_iri(scheme: Scheme) -> String {
    format!("http://purl.org/spar/datacite/{scheme}")
}

fn parse_scheme_iri(value: &str) -> Option<Scheme> {
    value
        .strip_prefix("http://purl.org/spar/datacite/")
        .and_then(Scheme::parse)
}

fn fabio_iri(kind: BrType) -> &'static str {
    match kind {
        BrType::JournalArticle => "http://purl.org/spar/fabio/JournalArticle",
        BrType::JournalVolume => "http://purl.org/spar/fabio/JournalVolume",
        BrType::JournalIssue => "http://purl.org/spar/fabio/JournalIssue",
        BrType::Journal => "http://purl.org/spar/fabio/Journal",
        BrType::Book => "http://purl.org/spar/fabio/Book",
        BrType::BookChapter => "http://purl.org/spar/fabio/BookChapter",
        BrType::BookPart => "http://purl.org/spar/fabio/Part",
        BrType::BookSection => "http://purl.org/spar/fabio/ExpressionCollection",
        BrType::BookSeries => "http://purl.org/spar/fabio/BookSeries",
        BrType::BookSet => "http://purl.org/spar/fabio/BookSet",
        BrType::EditedBook => "http://purl.org/spar/fabio/EditedBook",
        BrType::ReferenceBook => "http://purl.org/spar/fabio/ReferenceBook",
        BrType::ReferenceEntry => "http://purl.org/spar/fabio/ReferenceEntry",
        BrType::Proceedings => "http://purl.org/spar/fabio/AcademicProceedings",
        BrType::ProceedingsArticle => "http://purl.org/spar/fabio/ProceedingsPaper",
        BrType::ProceedingsSeries => "http://purl.org/spar/fabio/Series",
        BrType::Report => "http://purl.org/spar/fabio/ReportDocument",
        BrType::ReportSeries => "http://purl.org/spar/fabio/Series",
        BrType::Standard => "http://purl.org/spar/fabio/SpecificationDocument",
        BrType::StandardSeries => "http://purl.org/spar/fabio/Series",
        BrType::Series => "http://purl.org/spar/fabio/Series",
        BrType::Dissertation => "http://purl.org/spar/fabio/Thesis",
        BrType::Dataset => "http://purl.org/spar/fabio/DataFile",
        BrType::PeerReview => "http://purl.org/spar/fabio/Review",
        BrType::WebContent => "http://purl.org/spar/fabio/WebContent",
        BrType::ArchivalDocument => "http://purl.org/spar/fabio/ArchivalDocument",
    }
}

fn parse_fabio_iri(value: &str) -> Option<BrType> {
    Some(match value.strip_prefix("http://purl.org/spar/fabio/")? {
        "JournalArticle" => BrType::JournalArticle,
        "JournalVolume" => BrType::JournalVolume,
        "JournalIssue" => BrType::JournalIssue,
        "Journal" => BrType::Journal,
        "Book" => BrType::Book,
        "BookChapter" => BrType::BookChapter,
        "Part" => BrType::BookPart,
        "ExpressionCollection" => BrType::BookSection,
        "BookSeries" => BrType::BookSeries,
        "BookSet" => BrType::BookSet,
        "EditedBook" => BrType::EditedBook,
        "ReferenceBook" => BrType::ReferenceBook,
        "ReferenceEntry" => BrType::ReferenceEntry,
        "AcademicProceedings" => BrType::Proceedings,
        "ProceedingsPaper" => BrType::ProceedingsArticle,
        "ReportDocument" => BrType::Report,
        "SpecificationDocument" => BrType::Standard,
        "Series" => BrType::Series,
        "Thesis" => BrType::Dissertation,
        "DataFile" => BrType::Dataset,
        "Review" => BrType::PeerReview,
        "WebContent" => BrType::WebContent,
        "ArchivalDocument" => BrType::ArchivalDocument,
        _ => return None,
    })
}

fn role_iri(role: Role) -> &'static str {
    match role {
        Role::Author => "http://purl.org/spar/pro/author",
        Role::Editor => "http://purl.org/spar/pro/editor",
        Role::Publisher => "http://purl.org/spar/pro/publisher",
    }
}

fn term(row: &SparqlRow, var: &str) -> Option<String> {
    row.get(var).map(|t| t.value.clone())
}

/// The store keeps each entity class in its own named graph under [`BASE`].
fn graph_iri(class: EntityClass) -> String {
    format!("<{BASE}{class}/>")
}

fn identifier_query(class: EntityClass, class_pattern: &str, scheme: Scheme, value: &str) -> String {
    format!(
        "{PREFIXES}SELECT ?entity WHERE {{\n\
         GRAPH {id_graph} {{ ?identifier datacite:usesIdentifierScheme {scheme_term} ;\n\
         literal:hasLiteralValue {value_term} }}\n\
         GRAPH {entity_graph} {{ ?entity datacite:hasIdentifier ?identifier ;\n\
         a {class_pattern} }}\n}} LIMIT 1",
        id_graph = graph_iri(EntityClass::Id),
        entity_graph = graph_iri(class),
        scheme_term = iri(&scheme_iri(scheme)),
        value_term = literal(value),
    )
}

fn br_query(subject: &str) -> String {
    format!(
        "{PREFIXES}SELECT ?title ?type ?date ?partOf ?seq ?idEntity ?schemeIri ?idValue\n\
         WHERE {{\n\
         GRAPH {br_graph} {{\n\
         {subject} a fabio:Expression .\n\
         OPTIONAL {{ {subject} dcterms:title ?title }}\n\
         OPTIONAL {{ {subject} a ?type . FILTER(?type != fabio:Expression) }}\n\
         OPTIONAL {{ {subject} prism:publicationDate ?date }}\n\
         OPTIONAL {{ {subject} frbr:partOf ?partOf }}\n\
         OPTIONAL {{ {subject} fabio:hasSequenceIdentifier ?seq }}\n\
         OPTIONAL {{ {subject} datacite:hasIdentifier ?idEntity }}\n}}\n\
         OPTIONAL {{ GRAPH {id_graph} {{\n\
         ?idEntity datacite:usesIdentifierScheme ?schemeIri ;\n\
         literal:hasLiteralValue ?idValue }} }}\n}}",
        br_graph = graph_iri(EntityClass::Br),
        id_graph = graph_iri(EntityClass::Id),
    )
}

fn ra_query(subject: &str) -> String {
    format!(
        "{PREFIXES}SELECT ?family ?given ?name ?idEntity ?schemeIri ?idValue WHERE {{\n\
         GRAPH {ra_graph} {{\n\
         {subject} a foaf:Agent .\n\
         OPTIONAL {{ {subject} foaf:familyName ?family }}\n\
         OPTIONAL {{ {subject} foaf:givenName ?given }}\n\
         OPTIONAL {{ {subject} foaf:name ?name }}\n\
         OPTIONAL {{ {subject} datacite:hasIdentifier ?idEntity }}\n}}\n\
         OPTIONAL {{ GRAPH {id_graph} {{\n\
         ?idEntity datacite:usesIdentifierScheme ?schemeIri ;\n\
         literal:hasLiteralValue ?idValue }} }}\n}}",
        ra_graph = graph_iri(EntityClass::Ra),
        id_graph = graph_iri(EntityClass::Id),
    )
}

fn structure_query(subject: &str) -> String {
    format!(
        "{PREFIXES}SELECT ?volume ?volumeSeq ?issue ?issueSeq WHERE {{\n\
         GRAPH {br_graph} {{\n\
         {{ ?volume a fabio:JournalVolume ; frbr:partOf {subject} ;\n\
         fabio:hasSequenceIdentifier ?volumeSeq .\n\
         OPTIONAL {{ ?issue a fabio:JournalIssue ; frbr:partOf ?volume ;\n\
         fabio:hasSequenceIdentifier ?issueSeq }} }}\n\
         UNION\n\
         {{ ?issue a fabio:JournalIssue ; frbr:partOf {subject} ;\n\
         fabio:hasSequenceIdentifier ?issueSeq }}\n}}\n}}",
        br_graph = graph_iri(EntityClass::Br),
    )
}

fn re_query(subject: &str) -> String {
    format!(
        "{PREFIXES}SELECT ?re ?start ?end WHERE {{\n\
         GRAPH {br_graph} {{ {subject} frbr:embodiment ?re }}\n\
         OPTIONAL {{ GRAPH {re_graph} {{ ?re prism:startingPage ?start }} }}\n\
         OPTIONAL {{ GRAPH {re_graph} {{ ?re prism:endingPage ?end }} }}\n}} LIMIT 1",
        br_graph = graph_iri(EntityClass::Br),
        re_graph = graph_iri(EntityClass::Re),
    )
}

fn ar_query(subject: &str, role: Role) -> String {
    format!(
        "{PREFIXES}SELECT ?ar ?next ?ra ?family ?given ?name ?idEntity ?schemeIri ?idValue\n\
         WHERE {{\n\
         GRAPH {br_graph} {{ {subject} pro:isDocumentContextFor ?ar }}\n\
         GRAPH {ar_graph} {{\n\
         ?ar pro:withRole {role_term} ; pro:isHeldBy ?ra .\n\
         OPTIONAL {{ ?ar oco:hasNext ?next }} }}\n\
         OPTIONAL {{ GRAPH {ra_graph} {{ ?ra foaf:familyName ?family }} }}\n\
         OPTIONAL {{ GRAPH {ra_graph} {{ ?ra foaf:givenName ?given }} }}\n\
         OPTIONAL {{ GRAPH {ra_graph} {{ ?ra foaf:name ?name }} }}\n\
         OPTIONAL {{ GRAPH {ra_graph} {{ ?ra datacite:hasIdentifier ?idEntity }}\n\
         GRAPH {id_graph} {{ ?idEntity datacite:usesIdentifierScheme ?schemeIri ;\n\
         literal:hasLiteralValue ?idValue }} }}\n}}",
        br_graph = graph_iri(EntityClass::Br),
        ar_graph = graph_iri(EntityClass::Ar),
        ra_graph = graph_iri(EntityClass::Ra),
        id_graph = graph_iri(EntityClass::Id),
        role_term = iri(role_iri(role)),
    )
}

pub struct SparqlFinder {
    client: SparqlClient,
    br_by_id: DashMap<(Scheme, String), Option<MetaId>>,
    ra_by_id: DashMap<(Scheme, String), Option<MetaId>>,
    brs: DashMap<MetaId, Option<BrRecord>>,
    ras: DashMap<MetaId, Option<RaRecord>>,
    structures: DashMap<MetaId, VenueStructure>,
}

impl SparqlFinder {
    pub fn new(client: SparqlClient) -> Self {
        Self {
            client,
            br_by_id: DashMap::new(),
            ra_by_id: DashMap::new(),
            brs: DashMap::new(),
            ras: DashMap::new(),
            structures: DashMap::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    /// Resolve the entity carrying an external identifier to its meta-id.
    async fn entity_by_identifier(
        &self,
        class: EntityClass,
        class_pattern: &str,
        scheme: Scheme,
        value: &str,
    ) -> Result<Option<MetaId>, FinderError> {
        let query = identifier_query(class, class_pattern, scheme, value);
        let rows = self.client.select(&query).await?;
        match rows.first().and_then(|row| term(row, "entity")) {
            Some(entity) => parse_entity_iri(&entity)
                .map(Some)
                .ok_or_else(|| FinderError::Malformed(format!("unexpected entity iri {entity}"))),
            None => Ok(None),
        }
    }

    /// Collect `(scheme, value, id entity)` triples out of folded rows.
    fn fold_ids(rows: &[SparqlRow], out: &mut Vec<(Scheme, String, MetaId)>) {
        for row in rows {
            let (entity, scheme, value) = match (
                term(row, "idEntity"),
                term(row, "schemeIri"),
                term(row, "idValue"),
            ) {
                (Some(e), Some(s), Some(v)) => (e, s, v),
                _ => continue,
            };
            let (scheme, id) = match (parse_scheme_iri(&scheme), parse_entity_iri(&entity)) {
                (Some(scheme), Some(id)) => (scheme, id),
                _ => continue,
            };
            if !out.iter().any(|(s, v, _)| *s == scheme && *v == value) {
                out.push((scheme, value, id));
            }
        }
    }

    async fn fetch_br(&self, meta_id: &MetaId) -> Result<Option<BrRecord>, FinderError> {
        let query = br_query(&iri(&entity_iri(meta_id)));
        let rows = self.client.select(&query).await?;
        let first = match rows.first() {
            Some(first) => first,
            None => return Ok(None),
        };
        let mut record = BrRecord::new(meta_id.clone());
        record.title = term(first, "title").unwrap_or_default();
        record.pub_date = term(first, "date").unwrap_or_default();
        record.sequence = term(first, "seq");
        record.part_of = term(first, "partOf").and_then(|v| parse_entity_iri(&v));
        record.kind = rows
            .iter()
            .filter_map(|row| term(row, "type"))
            .find_map(|v| parse_fabio_iri(&v));
        Self::fold_ids(&rows, &mut record.ids);
        Ok(Some(record))
    }

    async fn fetch_ra(&self, meta_id: &MetaId) -> Result<Option<RaRecord>, FinderError> {
        let query = ra_query(&iri(&entity_iri(meta_id)));
        let rows = self.client.select(&query).await?;
        let first = match rows.first() {
            Some(first) => first,
            None => return Ok(None),
        };
        let mut record = RaRecord::new(meta_id.clone());
        record.family = term(first, "family").unwrap_or_default();
        record.given = term(first, "given").unwrap_or_default();
        record.name = term(first, "name").unwrap_or_default();
        Self::fold_ids(&rows, &mut record.ids);
        Ok(Some(record))
    }

    async fn fetch_structure(&self, venue: &MetaId) -> Result<VenueStructure, FinderError> {
        let query = structure_query(&iri(&entity_iri(venue)));
        let rows = self.client.select(&query).await?;
        let mut structure = VenueStructure::default();
        for row in &rows {
            let volume = term(row, "volume").and_then(|v| parse_entity_iri(&v));
            let issue = term(row, "issue").and_then(|v| parse_entity_iri(&v));
            match (volume, term(row, "volumeSeq")) {
                (Some(volume), Some(seq)) => {
                    let entry = structure
                        .volumes
                        .entry(seq)
                        .or_insert_with(|| VolumeEntry::new(volume));
                    if let (Some(issue), Some(issue_seq)) = (issue.clone(), term(row, "issueSeq")) {
                        entry.issues.insert(issue_seq, issue);
                    }
                }
                _ => {
                    if let (Some(issue), Some(issue_seq)) = (issue, term(row, "issueSeq")) {
                        structure.issues.insert(issue_seq, issue);
                    }
                }
            }
        }
        Ok(structure)
    }

    async fn fetch_re(&self, br: &MetaId) -> Result<Option<ReRecord>, FinderError> {
        let query = re_query(&iri(&entity_iri(br)));
        let rows = self.client.select(&query).await?;
        let row = match rows.first() {
            Some(row) => row,
            None => return Ok(None),
        };
        let re = term(row, "re")
            .and_then(|v| parse_entity_iri(&v))
            .ok_or_else(|| FinderError::Malformed("embodiment without meta iri".into()))?;
        let start = term(row, "start").unwrap_or_default();
        let end = term(row, "end").unwrap_or_default();
        let pages = match (start.is_empty(), end.is_empty(), start == end) {
            (true, true, _) => String::new(),
            (false, true, _) => start,
            (true, false, _) => end,
            (false, false, true) => start,
            (false, false, false) => format!("{start}-{end}"),
        };
        Ok(Some(ReRecord { meta_id: re, pages }))
    }

    async fn fetch_ar_sequence(
        &self,
        br: &MetaId,
        role: Role,
    ) -> Result<Vec<ArEntry>, FinderError> {
        let query = ar_query(&iri(&entity_iri(br)), role);
        let rows = self.client.select(&query).await?;

        // Fold the multiplied rows per ar, then order by the hasNext chain.
        let mut entries: HashMap<MetaId, (ArEntry, Option<MetaId>)> = HashMap::new();
        for row in &rows {
            let ar = match term(row, "ar").and_then(|v| parse_entity_iri(&v)) {
                Some(ar) => ar,
                None => continue,
            };
            let entry = entries.entry(ar.clone()).or_insert_with(|| {
                let ra_meta = term(row, "ra")
                    .and_then(|v| parse_entity_iri(&v))
                    .unwrap_or_else(|| MetaId::new(EntityClass::Ra, "0"));
                let mut ra = RaRecord::new(ra_meta);
                ra.family = term(row, "family").unwrap_or_default();
                ra.given = term(row, "given").unwrap_or_default();
                ra.name = term(row, "name").unwrap_or_default();
                (
                    ArEntry { ar, ra },
                    term(row, "next").and_then(|v| parse_entity_iri(&v)),
                )
            });
            Self::fold_ids(std::slice::from_ref(row), &mut entry.0.ra.ids);
        }

        let mut ordered = Vec::with_capacity(entries.len());
        let head = entries
            .keys()
            .find(|ar| !entries.values().any(|(_, next)| next.as_ref() == Some(*ar)))
            .cloned();
        let mut cursor = head;
        while let Some(ar) = cursor {
            match entries.remove(&ar) {
                Some((entry, next)) => {
                    ordered.push(entry);
                    cursor = next;
                }
                None => break,
            }
        }
        if !entries.is_empty() {
            // Broken or cyclic chain: append leftovers in meta-id order so
            // the result is still deterministic.
            let mut rest: Vec<_> = entries.into_values().map(|(entry, _)| entry).collect();
            rest.sort_by(|a, b| a.ar.cmp(&b.ar));
            ordered.extend(rest);
        }
        Ok(ordered)
    }
}

impl Finder for SparqlFinder {
    fn br_by_identifier<'a>(
        &'a self,
        scheme: Scheme,
        value: &'a str,
    ) -> BoxFuture<'a, Result<Option<BrRecord>, FinderError>> {
        Box::pin(async move {
            let key = (scheme, value.to_string());
            let meta = match self.br_by_id.get(&key) {
                Some(hit) => hit.clone(),
                None => {
                    let found = self
                        .entity_by_identifier(EntityClass::Br, "fabio:Expression", scheme, value)
                        .await?;
                    self.br_by_id.insert(key, found.clone());
                    found
                }
            };
            match meta {
                Some(meta) => self.br(&meta).await,
                None => Ok(None),
            }
        })
    }

    fn ra_by_identifier<'a>(
        &'a self,
        scheme: Scheme,
        value: &'a str,
    ) -> BoxFuture<'a, Result<Option<RaRecord>, FinderError>> {
        Box::pin(async move {
            let key = (scheme, value.to_string());
            let meta = match self.ra_by_id.get(&key) {
                Some(hit) => hit.clone(),
                None => {
                    let found = self
                        .entity_by_identifier(EntityClass::Ra, "foaf:Agent", scheme, value)
                        .await?;
                    self.ra_by_id.insert(key, found.clone());
                    found
                }
            };
            match meta {
                Some(meta) => self.ra(&meta).await,
                None => Ok(None),
            }
        })
    }

    fn br<'a>(
        &'a self,
        meta_id: &'a MetaId,
    ) -> BoxFuture<'a, Result<Option<BrRecord>, FinderError>> {
        Box::pin(async move {
            if let Some(hit) = self.brs.get(meta_id) {
                return Ok(hit.clone());
            }
            let record = self.fetch_br(meta_id).await?;
            self.brs.insert(meta_id.clone(), record.clone());
            Ok(record)
        })
    }

    fn ra<'a>(
        &'a self,
        meta_id: &'a MetaId,
    ) -> BoxFuture<'a, Result<Option<RaRecord>, FinderError>> {
        Box::pin(async move {
            if let Some(hit) = self.ras.get(meta_id) {
                return Ok(hit.clone());
            }
            let record = self.fetch_ra(meta_id).await?;
            self.ras.insert(meta_id.clone(), record.clone());
            Ok(record)
        })
    }

    fn venue_structure<'a>(
        &'a self,
        venue: &'a MetaId,
    ) -> BoxFuture<'a, Result<VenueStructure, FinderError>> {
        Box::pin(async move {
            if let Some(hit) = self.structures.get(venue) {
                return Ok(hit.clone());
            }
            let structure = self.fetch_structure(venue).await?;
            self.structures.insert(venue.clone(), structure.clone());
            Ok(structure)
        })
    }

    fn re_for_br<'a>(
        &'a self,
        br: &'a MetaId,
    ) -> BoxFuture<'a, Result<Option<ReRecord>, FinderError>> {
        Box::pin(async move { self.fetch_re(br).await })
    }

    fn ar_sequence<'a>(
        &'a self,
        br: &'a MetaId,
        role: Role,
    ) -> BoxFuture<'a, Result<Vec<ArEntry>, FinderError>> {
        Box::pin(async move { self.fetch_ar_sequence(br, role).await })
    }
}
