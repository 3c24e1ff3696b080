//! The curation pipeline.
//!
//! A batch of raw rows goes through normalisation, identifier validation,
//! batch-local coreference, resolution against the existing graph, meta-id
//! allocation and attribute merging, and comes out as curated rows plus a
//! deterministic action log for the downstream writer. The batch either
//! completes in full or aborts with a [`CuratorError`]; no partial log is
//! ever returned.

use std::collections::{HashMap, HashSet};

use metacurate_counter::Counter;
use metacurate_identifiers::{Registry, Scheme};

use crate::action::{Action, Attributes};
use crate::entity::{BrType, EntityClass, MetaId, Role};
use crate::error::{CuratorError, Warning, WarningKind};
use crate::finder::{BrRecord, Finder, RaRecord, VenueStructure};
use crate::mention::{parse_row, AgentMention, IdToken, ParsedRow};
use crate::row::Row;
use crate::union_find::UnionFind;

/// Result of a completed batch.
#[derive(Debug)]
pub struct CuratedBatch {
    /// The surviving rows in input order, rewritten in canonical form with
    /// `omid:` tokens leading every identifier list.
    pub rows: Vec<Row>,
    /// Ordered action log. Byte-identical across runs given the same rows,
    /// graph snapshot and counter state.
    pub actions: Vec<Action>,
    pub warnings: Vec<Warning>,
}

pub struct Curator<'a> {
    finder: &'a dyn Finder,
    counter: &'a dyn Counter,
    registry: &'a Registry,
    prefix: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BrSlot {
    Main,
    Venue,
}

struct BrMention {
    row: usize,
    slot: BrSlot,
    ids: Vec<IdToken>,
    omid: Option<MetaId>,
}

struct RaMention {
    row: usize,
    role: Role,
    pos: usize,
    ids: Vec<IdToken>,
    omid: Option<MetaId>,
}

/// Coreference input: the identifying marks of one mention.
struct MentionKey {
    ids: Vec<IdToken>,
    omid: Option<MetaId>,
    /// Batch-local fallback key for mentions without identifiers
    /// (venue titles).
    local: Option<String>,
}

#[derive(Default)]
struct Component {
    mentions: Vec<usize>,
    /// Distinct pre-existing meta-ids linked into this component, in
    /// discovery order.
    existing: Vec<MetaId>,
}

struct BrEntity {
    meta_id: MetaId,
    is_new: bool,
    existing: Option<BrRecord>,
    victims: Vec<MetaId>,
    /// Original row index used in error and warning context.
    anchor_row: usize,
    /// Parsed-row positions whose main mention landed here, ascending.
    rows: Vec<usize>,
    /// Full identifier set for display (mentions plus stored ids).
    ids: Vec<IdToken>,
    /// Identifiers the store does not have yet.
    new_ids: Vec<IdToken>,
    title: String,
    pub_date: String,
    kind: Option<BrType>,
    pages: String,
    has_main: bool,
    delta: Attributes,
}

struct RaEntity {
    meta_id: MetaId,
    is_new: bool,
    victims: Vec<MetaId>,
    ids: Vec<IdToken>,
    new_ids: Vec<IdToken>,
    family: String,
    given: String,
    name: String,
    delta: Attributes,
}

impl RaEntity {
    fn display_name(&self) -> String {
        if self.family.is_empty() {
            self.name.clone()
        } else if self.given.is_empty() {
            format!("{},", self.family)
        } else {
            format!("{}, {}", self.family, self.given)
        }
    }
}

/// True for a lone letter optionally followed by a dot ("J", "J.").
fn is_initial(token: &str) -> bool {
    let bare = token.trim_end_matches('.');
    bare.chars().count() == 1 && bare.chars().all(char::is_alphabetic)
}

/// Whether two given names can denote the same person: paired tokens must
/// share a first letter, and two spelled-out tokens must be equal.
fn given_compatible(a: &str, b: &str) -> bool {
    for (ta, tb) in a.split_whitespace().zip(b.split_whitespace()) {
        let first = |t: &str| t.chars().next().map(|c| c.to_lowercase().to_string());
        if first(ta) != first(tb) {
            return false;
        }
        if !is_initial(ta)
            && !is_initial(tb)
            && !ta
                .trim_end_matches('.')
                .eq_ignore_ascii_case(tb.trim_end_matches('.'))
        {
            return false;
        }
    }
    true
}

/// Whether `candidate` should replace `current` (fills an empty or
/// initials-only given name with a compatible, more complete one).
fn fuller_given(current: &str, candidate: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    if current.is_empty() {
        return true;
    }
    given_compatible(current, candidate) && candidate.len() > current.len()
}

/// Merge two cleaned dates: the longer wins when one is a prefix of the
/// other; a year disagreement is fatal; any other divergence keeps `a`.
fn merge_dates(a: &str, b: &str, row: usize) -> Result<String, CuratorError> {
    if a.is_empty() {
        return Ok(b.to_string());
    }
    if b.is_empty() {
        return Ok(a.to_string());
    }
    if b.starts_with(a) {
        return Ok(b.to_string());
    }
    if a.starts_with(b) {
        return Ok(a.to_string());
    }
    if a.get(..4) != b.get(..4) {
        return Err(CuratorError::DataConflict {
            row,
            field: "pub_date",
            detail: format!("{a} vs {b}"),
        });
    }
    Ok(a.to_string())
}

fn contains_token(ids: &[IdToken], token: &IdToken) -> bool {
    ids.iter().any(|t| t == token)
}

fn has_orcid(ids: &[IdToken]) -> bool {
    ids.iter().any(|t| t.scheme == Scheme::Orcid)
}

fn record_ids(ids: &[(Scheme, String, MetaId)]) -> Vec<IdToken> {
    ids.iter()
        .map(|(scheme, value, _)| IdToken {
            scheme: *scheme,
            value: value.clone(),
        })
        .collect()
}

fn role_agents<'p>(parsed: &'p ParsedRow, role: Role) -> &'p [AgentMention] {
    match role {
        Role::Author => &parsed.authors,
        Role::Editor => &parsed.editors,
        Role::Publisher => &[],
    }
}

fn agent_of<'p>(parsed: &'p [ParsedRow], row: usize, role: Role, pos: usize) -> Option<&'p AgentMention> {
    match role {
        Role::Author => parsed[row].authors.get(pos),
        Role::Editor => parsed[row].editors.get(pos),
        Role::Publisher => parsed[row].publisher.as_ref(),
    }
}

/// Group mentions into coreference components via Union-Find: mentions
/// sharing any identifier, the same explicit meta-id, or the same local key
/// end up together, as do mentions whose identifiers resolve to the same
/// stored entity.
fn group_components(
    keys: &[MentionKey],
    resolved: &HashMap<(Scheme, String), MetaId>,
) -> (Vec<Component>, Vec<usize>) {
    let mut uf = UnionFind::new();
    let handles: Vec<usize> = keys.iter().map(|_| uf.push()).collect();
    let mut existing_handle: HashMap<MetaId, usize> = HashMap::new();
    let mut existing_order: Vec<MetaId> = Vec::new();
    let mut id_first: HashMap<(Scheme, String), usize> = HashMap::new();
    let mut local_first: HashMap<String, usize> = HashMap::new();

    for (i, key) in keys.iter().enumerate() {
        for id in &key.ids {
            let id_key = (id.scheme, id.value.clone());
            match id_first.get(&id_key) {
                Some(&first) => {
                    uf.union(handles[i], first);
                }
                None => {
                    id_first.insert(id_key.clone(), handles[i]);
                }
            }
            if let Some(meta) = resolved.get(&id_key) {
                let handle = *existing_handle.entry(meta.clone()).or_insert_with(|| {
                    existing_order.push(meta.clone());
                    uf.push()
                });
                uf.union(handles[i], handle);
            }
        }
        if let Some(meta) = &key.omid {
            let handle = *existing_handle.entry(meta.clone()).or_insert_with(|| {
                existing_order.push(meta.clone());
                uf.push()
            });
            uf.union(handles[i], handle);
        }
        if let Some(local) = &key.local {
            match local_first.get(local) {
                Some(&first) => {
                    uf.union(handles[i], first);
                }
                None => {
                    local_first.insert(local.clone(), handles[i]);
                }
            }
        }
    }

    let mut comp_index: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Component> = Vec::new();
    let mut comp_of_mention = vec![0usize; keys.len()];
    for (i, &handle) in handles.iter().enumerate() {
        let root = uf.find(handle);
        let idx = *comp_index.entry(root).or_insert_with(|| {
            components.push(Component::default());
            components.len() - 1
        });
        components[idx].mentions.push(i);
        comp_of_mention[i] = idx;
    }
    for meta in &existing_order {
        if let Some(&handle) = existing_handle.get(meta) {
            let root = uf.find(handle);
            if let Some(&idx) = comp_index.get(&root) {
                components[idx].existing.push(meta.clone());
            }
        }
    }
    (components, comp_of_mention)
}

/// Decide the surviving meta-id of a component. Two distinct stored entities
/// in one component abort the batch unless an `omid:` token names one of
/// them, in which case the named one survives and the rest become merge
/// victims.
fn resolve_component(
    component: &Component,
    comp_omids: &[MetaId],
    row: usize,
) -> Result<(Option<MetaId>, Vec<MetaId>), CuratorError> {
    match component.existing.len() {
        0 => Ok((None, Vec::new())),
        1 => Ok((Some(component.existing[0].clone()), Vec::new())),
        _ => {
            let survivor = component
                .existing
                .iter()
                .find(|meta| comp_omids.contains(meta));
            match survivor {
                Some(survivor) => {
                    let mut victims: Vec<MetaId> = component
                        .existing
                        .iter()
                        .filter(|meta| *meta != survivor)
                        .cloned()
                        .collect();
                    victims.sort();
                    Ok((Some(survivor.clone()), victims))
                }
                None => {
                    let mut named = component.existing.clone();
                    named.sort();
                    Err(CuratorError::MergeConflict {
                        row,
                        a: named[0].clone(),
                        b: named[1].clone(),
                    })
                }
            }
        }
    }
}

fn format_tokens(meta: &MetaId, ids: &[IdToken]) -> String {
    let mut parts = vec![format!("omid:{meta}")];
    parts.extend(ids.iter().map(|t| t.to_string()));
    parts.join(" ")
}

fn format_attributed(name: &str, meta: &MetaId, ids: &[IdToken]) -> String {
    let tokens = format_tokens(meta, ids);
    if name.is_empty() {
        format!("[{tokens}]")
    } else {
        format!("{name} [{tokens}]")
    }
}

impl<'a> Curator<'a> {
    pub fn new(
        finder: &'a dyn Finder,
        counter: &'a dyn Counter,
        registry: &'a Registry,
        supplier_prefix: impl Into<String>,
    ) -> Self {
        Self {
            finder,
            counter,
            registry,
            prefix: supplier_prefix.into(),
        }
    }

    fn mint(&self, class: EntityClass) -> Result<MetaId, CuratorError> {
        let value = self.counter.increment(class.as_str(), 1)?;
        Ok(MetaId::mint(class, &self.prefix, value))
    }

    /// Reuse the id entity carrying `(scheme, value)` or mint a new one.
    fn id_entity(
        &self,
        map: &mut HashMap<(Scheme, String), MetaId>,
        token: &IdToken,
    ) -> Result<MetaId, CuratorError> {
        let key = (token.scheme, token.value.clone());
        if let Some(meta) = map.get(&key) {
            return Ok(meta.clone());
        }
        let meta = self.mint(EntityClass::Id)?;
        map.insert(key, meta.clone());
        Ok(meta)
    }

    /// Run the full pipeline over one batch of raw rows.
    pub async fn curate(&self, input: &[Row]) -> Result<CuratedBatch, CuratorError> {
        let mut warnings = Vec::new();

        // Normalise and prune.
        let mut parsed: Vec<ParsedRow> = Vec::with_capacity(input.len());
        for (index, row) in input.iter().enumerate() {
            if let Some(row) = parse_row(index, row, self.registry, &mut warnings).await? {
                parsed.push(row);
            }
        }
        tracing::debug!(input = input.len(), surviving = parsed.len(), "rows normalised");

        // Collect mentions.
        let mut br_mentions: Vec<BrMention> = Vec::new();
        let mut ra_mentions: Vec<RaMention> = Vec::new();
        let mut main_mention: Vec<Option<usize>> = vec![None; parsed.len()];
        let mut venue_mention: Vec<Option<usize>> = vec![None; parsed.len()];
        for (pi, p) in parsed.iter().enumerate() {
            if !p.is_pure_venue() {
                main_mention[pi] = Some(br_mentions.len());
                br_mentions.push(BrMention {
                    row: pi,
                    slot: BrSlot::Main,
                    ids: p.ids.clone(),
                    omid: p.omid.clone(),
                });
            }
            if let Some(venue) = &p.venue {
                venue_mention[pi] = Some(br_mentions.len());
                br_mentions.push(BrMention {
                    row: pi,
                    slot: BrSlot::Venue,
                    ids: venue.ids.clone(),
                    omid: venue.omid.clone(),
                });
            }
            for role in [Role::Author, Role::Editor, Role::Publisher] {
                let count = match role {
                    Role::Author => p.authors.len(),
                    Role::Editor => p.editors.len(),
                    Role::Publisher => usize::from(p.publisher.is_some()),
                };
                for pos in 0..count {
                    let Some(agent) = agent_of(&parsed, pi, role, pos) else { continue };
                    if agent.ids.is_empty() && agent.omid.is_none() {
                        continue;
                    }
                    ra_mentions.push(RaMention {
                        row: pi,
                        role,
                        pos,
                        ids: agent.ids.clone(),
                        omid: agent.omid.clone(),
                    });
                }
            }
        }

        // Resolve identifiers and explicit meta-ids against the graph.
        let mut br_resolved: HashMap<(Scheme, String), MetaId> = HashMap::new();
        let mut br_records: HashMap<MetaId, BrRecord> = HashMap::new();
        let mut seen: HashSet<(Scheme, String)> = HashSet::new();
        for m in &br_mentions {
            for id in &m.ids {
                let key = (id.scheme, id.value.clone());
                if !seen.insert(key.clone()) {
                    continue;
                }
                if let Some(rec) = self.finder.br_by_identifier(id.scheme, &id.value).await? {
                    br_resolved.insert(key, rec.meta_id.clone());
                    br_records.insert(rec.meta_id.clone(), rec);
                }
            }
            if let Some(omid) = &m.omid {
                if !br_records.contains_key(omid) {
                    match self.finder.br(omid).await? {
                        Some(rec) => {
                            br_records.insert(omid.clone(), rec);
                        }
                        None => {
                            return Err(CuratorError::UnknownOmid {
                                row: parsed[m.row].index,
                                omid: omid.clone(),
                            })
                        }
                    }
                }
            }
        }
        let mut ra_resolved: HashMap<(Scheme, String), MetaId> = HashMap::new();
        let mut ra_records: HashMap<MetaId, RaRecord> = HashMap::new();
        let mut seen: HashSet<(Scheme, String)> = HashSet::new();
        for m in &ra_mentions {
            for id in &m.ids {
                let key = (id.scheme, id.value.clone());
                if !seen.insert(key.clone()) {
                    continue;
                }
                if let Some(rec) = self.finder.ra_by_identifier(id.scheme, &id.value).await? {
                    ra_resolved.insert(key, rec.meta_id.clone());
                    ra_records.insert(rec.meta_id.clone(), rec);
                }
            }
            if let Some(omid) = &m.omid {
                if !ra_records.contains_key(omid) {
                    match self.finder.ra(omid).await? {
                        Some(rec) => {
                            ra_records.insert(omid.clone(), rec);
                        }
                        None => {
                            return Err(CuratorError::UnknownOmid {
                                row: parsed[m.row].index,
                                omid: omid.clone(),
                            })
                        }
                    }
                }
            }
        }

        // Batch coreference, br first then ra.
        let br_keys: Vec<MentionKey> = br_mentions
            .iter()
            .map(|m| MentionKey {
                ids: m.ids.clone(),
                omid: m.omid.clone(),
                local: match m.slot {
                    BrSlot::Venue => {
                        let title = parsed[m.row]
                            .venue
                            .as_ref()
                            .map(|v| v.title.to_lowercase())
                            .unwrap_or_default();
                        (!title.is_empty()).then_some(title)
                    }
                    BrSlot::Main => None,
                },
            })
            .collect();
        let (br_components, br_comp_of) = group_components(&br_keys, &br_resolved);

        let ra_keys: Vec<MentionKey> = ra_mentions
            .iter()
            .map(|m| MentionKey {
                ids: m.ids.clone(),
                omid: m.omid.clone(),
                local: None,
            })
            .collect();
        let (ra_components, ra_comp_of) = group_components(&ra_keys, &ra_resolved);

        // Allocate meta-ids and merge attributes.
        let br_entities =
            self.build_br_entities(&parsed, &br_mentions, &br_components, &br_records)?;
        let ra_entities =
            self.build_ra_entities(&parsed, &ra_mentions, &ra_components, &ra_records)?;

        let main_of = |pi: usize| main_mention[pi].map(|mi| br_comp_of[mi]);
        let venue_of = |pi: usize| venue_mention[pi].map(|mi| br_comp_of[mi]);
        let mut agent_entity: HashMap<(usize, Role, usize), usize> = HashMap::new();
        for (mi, m) in ra_mentions.iter().enumerate() {
            agent_entity.insert((m.row, m.role, m.pos), ra_comp_of[mi]);
        }

        // Seed the id-entity map from everything the store already carries.
        let mut id_entities: HashMap<(Scheme, String), MetaId> = HashMap::new();
        for rec in br_records.values() {
            for (scheme, value, meta) in &rec.ids {
                id_entities
                    .entry((*scheme, value.clone()))
                    .or_insert_with(|| meta.clone());
            }
        }
        for rec in ra_records.values() {
            for (scheme, value, meta) in &rec.ids {
                id_entities
                    .entry((*scheme, value.clone()))
                    .or_insert_with(|| meta.clone());
            }
        }

        let mut actions: Vec<Action> = Vec::new();

        // Merge directives for omid-tiebroken conflicts.
        for e in &br_entities {
            for victim in &e.victims {
                actions.push(Action::Merge {
                    survivor: e.meta_id.clone(),
                    victim: victim.clone(),
                });
            }
        }
        for e in &ra_entities {
            for victim in &e.victims {
                actions.push(Action::Merge {
                    survivor: e.meta_id.clone(),
                    victim: victim.clone(),
                });
            }
        }

        // Bibliographic resources.
        for e in &br_entities {
            if e.is_new {
                actions.push(Action::Create {
                    class: EntityClass::Br,
                    meta_id: e.meta_id.clone(),
                    attributes: Attributes {
                        title: (!e.title.is_empty()).then(|| e.title.clone()),
                        kind: e.kind,
                        pub_date: (!e.pub_date.is_empty()).then(|| e.pub_date.clone()),
                        ..Default::default()
                    },
                });
            } else if !e.delta.is_empty() {
                actions.push(Action::Update {
                    meta_id: e.meta_id.clone(),
                    delta: e.delta.clone(),
                });
            }
            for token in &e.new_ids {
                let id = self.id_entity(&mut id_entities, token)?;
                actions.push(Action::AddIdentifier {
                    meta_id: e.meta_id.clone(),
                    id,
                    scheme: token.scheme,
                    value: token.value.clone(),
                });
            }
        }

        // Responsible agents known through identifiers.
        for e in &ra_entities {
            if e.is_new {
                actions.push(Action::Create {
                    class: EntityClass::Ra,
                    meta_id: e.meta_id.clone(),
                    attributes: Attributes {
                        family: (!e.family.is_empty()).then(|| e.family.clone()),
                        given: (!e.given.is_empty()).then(|| e.given.clone()),
                        name: (!e.name.is_empty()).then(|| e.name.clone()),
                        ..Default::default()
                    },
                });
            } else if !e.delta.is_empty() {
                actions.push(Action::Update {
                    meta_id: e.meta_id.clone(),
                    delta: e.delta.clone(),
                });
            }
            for token in &e.new_ids {
                let id = self.id_entity(&mut id_entities, token)?;
                actions.push(Action::AddIdentifier {
                    meta_id: e.meta_id.clone(),
                    id,
                    scheme: token.scheme,
                    value: token.value.clone(),
                });
            }
        }

        // Venue, volume and issue containment.
        let mut new_volumes: HashMap<(MetaId, String), MetaId> = HashMap::new();
        let mut new_issues: HashMap<(MetaId, String), MetaId> = HashMap::new();
        let mut containers: HashMap<usize, MetaId> = HashMap::new();
        for (pi, p) in parsed.iter().enumerate() {
            let Some(vi) = venue_of(pi) else { continue };
            let venue_meta = br_entities[vi].meta_id.clone();
            let mut parent = venue_meta.clone();
            if !p.volume.is_empty() || !p.issue.is_empty() {
                let structure = if br_entities[vi].is_new {
                    VenueStructure::default()
                } else {
                    self.finder.venue_structure(&venue_meta).await?
                };
                if !p.volume.is_empty() {
                    let found = structure
                        .volumes
                        .get(&p.volume)
                        .map(|v| v.meta_id.clone())
                        .or_else(|| {
                            new_volumes
                                .get(&(venue_meta.clone(), p.volume.clone()))
                                .cloned()
                        });
                    parent = match found {
                        Some(meta) => meta,
                        None => {
                            let meta = self.mint(EntityClass::Br)?;
                            actions.push(Action::Create {
                                class: EntityClass::Br,
                                meta_id: meta.clone(),
                                attributes: Attributes {
                                    kind: Some(BrType::JournalVolume),
                                    sequence: Some(p.volume.clone()),
                                    part_of: Some(venue_meta.clone()),
                                    ..Default::default()
                                },
                            });
                            new_volumes
                                .insert((venue_meta.clone(), p.volume.clone()), meta.clone());
                            meta
                        }
                    };
                }
                if !p.issue.is_empty() {
                    let found = if p.volume.is_empty() {
                        structure.issues.get(&p.issue).cloned()
                    } else {
                        structure
                            .volumes
                            .get(&p.volume)
                            .and_then(|v| v.issues.get(&p.issue))
                            .cloned()
                    }
                    .or_else(|| new_issues.get(&(parent.clone(), p.issue.clone())).cloned());
                    parent = match found {
                        Some(meta) => meta,
                        None => {
                            let meta = self.mint(EntityClass::Br)?;
                            actions.push(Action::Create {
                                class: EntityClass::Br,
                                meta_id: meta.clone(),
                                attributes: Attributes {
                                    kind: Some(BrType::JournalIssue),
                                    sequence: Some(p.issue.clone()),
                                    part_of: Some(parent.clone()),
                                    ..Default::default()
                                },
                            });
                            new_issues.insert((parent.clone(), p.issue.clone()), meta.clone());
                            meta
                        }
                    };
                }
            }
            let Some(ei) = main_of(pi) else { continue };
            match containers.get(&ei) {
                Some(existing_parent) if *existing_parent != parent => {
                    return Err(CuratorError::DataConflict {
                        row: p.index,
                        field: "venue",
                        detail: format!(
                            "{} already contained by {existing_parent}, row names {parent}",
                            br_entities[ei].meta_id
                        ),
                    });
                }
                Some(_) => {}
                None => {
                    containers.insert(ei, parent.clone());
                    let e = &br_entities[ei];
                    let unlinked = e
                        .existing
                        .as_ref()
                        .map(|rec| rec.part_of.is_none())
                        .unwrap_or(true);
                    if e.is_new || unlinked {
                        actions.push(Action::Update {
                            meta_id: e.meta_id.clone(),
                            delta: Attributes {
                                part_of: Some(parent),
                                ..Default::default()
                            },
                        });
                    }
                }
            }
        }

        // Author, editor and publisher sequences.
        let mut agent_meta: HashMap<(usize, Role, usize), MetaId> = HashMap::new();
        for e in &br_entities {
            if !e.has_main {
                continue;
            }
            for role in [Role::Author, Role::Editor] {
                let Some(&pi) = e
                    .rows
                    .iter()
                    .find(|&&pi| !role_agents(&parsed[pi], role).is_empty())
                else {
                    continue;
                };
                self.curate_role(
                    e,
                    role,
                    pi,
                    parsed[pi].index,
                    role_agents(&parsed[pi], role),
                    &ra_entities,
                    &agent_entity,
                    &mut agent_meta,
                    &mut actions,
                    &mut warnings,
                )
                .await?;
            }
            if let Some(&pi) = e.rows.iter().find(|&&pi| parsed[pi].publisher.is_some()) {
                if let Some(agent) = parsed[pi].publisher.as_ref() {
                    self.curate_publisher(
                        e,
                        pi,
                        agent,
                        &ra_entities,
                        &agent_entity,
                        &mut agent_meta,
                        &mut actions,
                    )
                    .await?;
                }
            }
        }

        // Embodiments.
        for e in &br_entities {
            if !e.has_main || e.pages.is_empty() {
                continue;
            }
            let reusable = if e.is_new {
                false
            } else {
                match self.finder.re_for_br(&e.meta_id).await? {
                    Some(rec) => rec.pages == e.pages,
                    None => false,
                }
            };
            if !reusable {
                let re = self.mint(EntityClass::Re)?;
                actions.push(Action::Create {
                    class: EntityClass::Re,
                    meta_id: re.clone(),
                    attributes: Attributes {
                        pages: Some(e.pages.clone()),
                        ..Default::default()
                    },
                });
                actions.push(Action::SetEmbodiment {
                    br: e.meta_id.clone(),
                    re,
                });
            }
        }

        // Curated rows in canonical form.
        let mut rows = Vec::with_capacity(parsed.len());
        for (pi, p) in parsed.iter().enumerate() {
            let mut out = Row {
                volume: p.volume.clone(),
                issue: p.issue.clone(),
                ..Default::default()
            };
            if let Some(ei) = main_of(pi) {
                let e = &br_entities[ei];
                out.id = format_tokens(&e.meta_id, &e.ids);
                out.title = e.title.clone();
                out.pub_date = e.pub_date.clone();
                out.kind = e.kind.map(|k| k.as_str().to_string()).unwrap_or_default();
                out.page = e.pages.clone();
            }
            if let Some(vi) = venue_of(pi) {
                let e = &br_entities[vi];
                out.venue = format_attributed(&e.title, &e.meta_id, &e.ids);
            }
            out.author =
                self.format_agents(p, pi, Role::Author, &ra_entities, &agent_entity, &agent_meta);
            out.editor =
                self.format_agents(p, pi, Role::Editor, &ra_entities, &agent_entity, &agent_meta);
            out.publisher = self.format_agents(
                p,
                pi,
                Role::Publisher,
                &ra_entities,
                &agent_entity,
                &agent_meta,
            );
            rows.push(out);
        }

        tracing::info!(
            rows = rows.len(),
            actions = actions.len(),
            warnings = warnings.len(),
            "batch curated"
        );
        Ok(CuratedBatch {
            rows,
            actions,
            warnings,
        })
    }

    fn build_br_entities(
        &self,
        parsed: &[ParsedRow],
        mentions: &[BrMention],
        components: &[Component],
        records: &HashMap<MetaId, BrRecord>,
    ) -> Result<Vec<BrEntity>, CuratorError> {
        let mut entities = Vec::with_capacity(components.len());
        for component in components {
            let anchor_row = component
                .mentions
                .first()
                .map(|&mi| parsed[mentions[mi].row].index)
                .unwrap_or(0);
            let comp_omids: Vec<MetaId> = component
                .mentions
                .iter()
                .filter_map(|&mi| mentions[mi].omid.clone())
                .collect();
            let (existing_meta, victims) = resolve_component(component, &comp_omids, anchor_row)?;
            let existing = existing_meta.as_ref().and_then(|m| records.get(m)).cloned();

            let mut ids: Vec<IdToken> = Vec::new();
            let mut title = String::new();
            let mut pub_date = String::new();
            let mut kind: Option<BrType> = None;
            let mut pages = String::new();
            let mut rows: Vec<usize> = Vec::new();
            let mut has_main = false;
            let mut is_container = false;
            for &mi in &component.mentions {
                let m = &mentions[mi];
                let p = &parsed[m.row];
                for token in &m.ids {
                    if !contains_token(&ids, token) {
                        ids.push(token.clone());
                    }
                }
                match m.slot {
                    BrSlot::Main => {
                        has_main = true;
                        rows.push(m.row);
                        if title.is_empty() {
                            title = p.title.clone();
                        }
                        pub_date = merge_dates(&pub_date, &p.pub_date, p.index)?;
                        if kind.is_none() {
                            kind = p.kind;
                        }
                        if pages.is_empty() {
                            pages = p.page.clone();
                        }
                    }
                    BrSlot::Venue => {
                        is_container = true;
                        if title.is_empty() {
                            if let Some(venue) = &p.venue {
                                title = venue.title.clone();
                            }
                        }
                    }
                }
            }
            rows.sort_unstable();
            rows.dedup();

            let mut delta = Attributes::default();
            let mut new_ids = ids.clone();
            let (is_new, meta_id) = match existing_meta {
                Some(meta) => (false, meta),
                None => (true, self.mint(EntityClass::Br)?),
            };
            if let Some(rec) = &existing {
                if rec.title.is_empty() {
                    if !title.is_empty() {
                        delta.title = Some(title.clone());
                    }
                } else {
                    title = rec.title.clone();
                }
                let merged = merge_dates(&rec.pub_date, &pub_date, anchor_row)?;
                if merged != rec.pub_date && !merged.is_empty() {
                    delta.pub_date = Some(merged.clone());
                }
                pub_date = merged;
                match (rec.kind, kind) {
                    (Some(stored), _) => kind = Some(stored),
                    (None, Some(mentioned)) => delta.kind = Some(mentioned),
                    (None, None) => {}
                }
                let stored = record_ids(&rec.ids);
                new_ids.retain(|token| !contains_token(&stored, token));
                for token in stored {
                    if !contains_token(&ids, &token) {
                        ids.push(token);
                    }
                }
            }
            // Venues mentioned only as containers default to journals.
            if is_new && is_container && !has_main && kind.is_none() {
                kind = Some(BrType::Journal);
            }

            entities.push(BrEntity {
                meta_id,
                is_new,
                existing,
                victims,
                anchor_row,
                rows,
                ids,
                new_ids,
                title,
                pub_date,
                kind,
                pages,
                has_main,
                delta,
            });
        }
        Ok(entities)
    }

    fn build_ra_entities(
        &self,
        parsed: &[ParsedRow],
        mentions: &[RaMention],
        components: &[Component],
        records: &HashMap<MetaId, RaRecord>,
    ) -> Result<Vec<RaEntity>, CuratorError> {
        let mut entities = Vec::with_capacity(components.len());
        for component in components {
            let anchor_row = component
                .mentions
                .first()
                .map(|&mi| parsed[mentions[mi].row].index)
                .unwrap_or(0);
            let comp_omids: Vec<MetaId> = component
                .mentions
                .iter()
                .filter_map(|&mi| mentions[mi].omid.clone())
                .collect();
            let (existing_meta, victims) = resolve_component(component, &comp_omids, anchor_row)?;
            let existing = existing_meta.as_ref().and_then(|m| records.get(m)).cloned();

            let mut ids: Vec<IdToken> = Vec::new();
            let mut family = String::new();
            let mut given = String::new();
            let mut name = String::new();
            for &mi in &component.mentions {
                let m = &mentions[mi];
                let Some(agent) = agent_of(parsed, m.row, m.role, m.pos) else { continue };
                for token in &m.ids {
                    if !contains_token(&ids, token) {
                        ids.push(token.clone());
                    }
                }
                if !agent.family.is_empty() {
                    if family.is_empty() {
                        family = agent.family.clone();
                    } else if !family.eq_ignore_ascii_case(&agent.family) && has_orcid(&ids) {
                        return Err(CuratorError::DataConflict {
                            row: parsed[m.row].index,
                            field: "family name",
                            detail: format!("{family} vs {}", agent.family),
                        });
                    }
                }
                if fuller_given(&given, &agent.given) {
                    given = agent.given.clone();
                }
                if name.is_empty() {
                    name = agent.name.clone();
                }
            }
            if !family.is_empty() {
                name.clear();
            }

            let mut delta = Attributes::default();
            let mut new_ids = ids.clone();
            let (is_new, meta_id) = match existing_meta {
                Some(meta) => (false, meta),
                None => (true, self.mint(EntityClass::Ra)?),
            };
            if let Some(rec) = &existing {
                let stored = record_ids(&rec.ids);
                if !rec.family.is_empty() {
                    if !family.is_empty()
                        && !family.eq_ignore_ascii_case(&rec.family)
                        && ids.iter().any(|t| {
                            t.scheme == Scheme::Orcid && contains_token(&stored, t)
                        })
                    {
                        return Err(CuratorError::DataConflict {
                            row: anchor_row,
                            field: "family name",
                            detail: format!("{} vs {family}", rec.family),
                        });
                    }
                    family = rec.family.clone();
                } else if !family.is_empty() {
                    delta.family = Some(family.clone());
                }
                if fuller_given(&rec.given, &given) {
                    delta.given = Some(given.clone());
                } else {
                    given = rec.given.clone();
                }
                if rec.name.is_empty() {
                    if !name.is_empty() {
                        delta.name = Some(name.clone());
                    }
                } else if family.is_empty() {
                    name = rec.name.clone();
                }
                new_ids.retain(|token| !contains_token(&stored, token));
                for token in stored {
                    if !contains_token(&ids, &token) {
                        ids.push(token);
                    }
                }
            }

            entities.push(RaEntity {
                meta_id,
                is_new,
                victims,
                ids,
                new_ids,
                family,
                given,
                name,
                delta,
            });
        }
        Ok(entities)
    }

    /// Align one row's author or editor list with the stored role sequence:
    /// identifier matches first, then family plus compatible initials, then
    /// the first unmatched family match with a warning. Stored order is
    /// preserved; new agents are appended in row order.
    #[allow(clippy::too_many_arguments)]
    async fn curate_role(
        &self,
        entity: &BrEntity,
        role: Role,
        row: usize,
        row_index: usize,
        agents: &[AgentMention],
        ra_entities: &[RaEntity],
        agent_entity: &HashMap<(usize, Role, usize), usize>,
        agent_meta: &mut HashMap<(usize, Role, usize), MetaId>,
        actions: &mut Vec<Action>,
        warnings: &mut Vec<Warning>,
    ) -> Result<(), CuratorError> {
        let l_ts = if entity.is_new {
            Vec::new()
        } else {
            self.finder.ar_sequence(&entity.meta_id, role).await?
        };
        let mut taken = vec![false; l_ts.len()];
        let mut appended: Vec<MetaId> = Vec::new();

        for (pos, agent) in agents.iter().enumerate() {
            let key = (row, role, pos);
            if let Some(&ei) = agent_entity.get(&key) {
                let meta = ra_entities[ei].meta_id.clone();
                match l_ts
                    .iter()
                    .enumerate()
                    .position(|(ti, t)| !taken[ti] && t.ra.meta_id == meta)
                {
                    Some(ti) => taken[ti] = true,
                    None => appended.push(meta.clone()),
                }
                agent_meta.insert(key, meta);
                continue;
            }

            let is_org = agent.family.is_empty();
            let family_matches: Vec<usize> = l_ts
                .iter()
                .enumerate()
                .filter(|(ti, t)| {
                    !taken[*ti]
                        && if is_org {
                            !agent.name.is_empty() && t.ra.name.eq_ignore_ascii_case(&agent.name)
                        } else {
                            t.ra.family.eq_ignore_ascii_case(&agent.family)
                        }
                })
                .map(|(ti, _)| ti)
                .collect();
            let compatible: Vec<usize> = family_matches
                .iter()
                .copied()
                .filter(|&ti| given_compatible(&l_ts[ti].ra.given, &agent.given))
                .collect();
            let pick = if !compatible.is_empty() {
                if compatible.len() > 1 {
                    warnings.push(Warning {
                        row: row_index,
                        kind: WarningKind::AmbiguousAuthor,
                        message: format!(
                            "{role}: {} matches several stored agents, keeping the first",
                            agent.display_name()
                        ),
                    });
                }
                Some(compatible[0])
            } else if !family_matches.is_empty() {
                if family_matches.len() > 1 {
                    warnings.push(Warning {
                        row: row_index,
                        kind: WarningKind::AmbiguousAuthor,
                        message: format!(
                            "{role}: {} matches several stored agents, keeping the first",
                            agent.display_name()
                        ),
                    });
                }
                Some(family_matches[0])
            } else {
                None
            };

            match pick {
                Some(ti) => {
                    taken[ti] = true;
                    let stored = &l_ts[ti].ra;
                    let mut delta = Attributes::default();
                    if stored.family.is_empty() && !agent.family.is_empty() {
                        delta.family = Some(agent.family.clone());
                    }
                    if fuller_given(&stored.given, &agent.given) {
                        delta.given = Some(agent.given.clone());
                    }
                    if !delta.is_empty() {
                        actions.push(Action::Update {
                            meta_id: stored.meta_id.clone(),
                            delta,
                        });
                    }
                    agent_meta.insert(key, stored.meta_id.clone());
                }
                None => {
                    let meta = self.mint(EntityClass::Ra)?;
                    actions.push(Action::Create {
                        class: EntityClass::Ra,
                        meta_id: meta.clone(),
                        attributes: Attributes {
                            family: (!agent.family.is_empty()).then(|| agent.family.clone()),
                            given: (!agent.given.is_empty()).then(|| agent.given.clone()),
                            name: (!agent.name.is_empty()).then(|| agent.name.clone()),
                            ..Default::default()
                        },
                    });
                    appended.push(meta.clone());
                    agent_meta.insert(key, meta);
                }
            }
        }

        if !appended.is_empty() {
            let mut order: Vec<MetaId> = l_ts.iter().map(|t| t.ar.clone()).collect();
            let base = l_ts.len();
            for (i, ra) in appended.iter().enumerate() {
                let ar = self.mint(EntityClass::Ar)?;
                actions.push(Action::AddAr {
                    br: entity.meta_id.clone(),
                    ar: ar.clone(),
                    ra: ra.clone(),
                    role,
                    position: base + i + 1,
                });
                order.push(ar);
            }
            if base > 0 {
                actions.push(Action::ReorderArs {
                    br: entity.meta_id.clone(),
                    role,
                    order,
                });
            }
        }
        Ok(())
    }

    /// The publisher role holds a single agent: reuse the stored binding
    /// when it names the same agent, otherwise bind the resolved one.
    #[allow(clippy::too_many_arguments)]
    async fn curate_publisher(
        &self,
        entity: &BrEntity,
        row: usize,
        agent: &AgentMention,
        ra_entities: &[RaEntity],
        agent_entity: &HashMap<(usize, Role, usize), usize>,
        agent_meta: &mut HashMap<(usize, Role, usize), MetaId>,
        actions: &mut Vec<Action>,
    ) -> Result<(), CuratorError> {
        let key = (row, Role::Publisher, 0);
        let l_ts = if entity.is_new {
            Vec::new()
        } else {
            self.finder
                .ar_sequence(&entity.meta_id, Role::Publisher)
                .await?
        };

        let resolved = match agent_entity.get(&key) {
            Some(&ei) => Some(ra_entities[ei].meta_id.clone()),
            None => l_ts
                .iter()
                .find(|t| {
                    (!agent.name.is_empty() && t.ra.name.eq_ignore_ascii_case(&agent.name))
                        || (!agent.family.is_empty()
                            && t.ra.family.eq_ignore_ascii_case(&agent.family))
                })
                .map(|t| t.ra.meta_id.clone()),
        };
        let meta = match resolved {
            Some(meta) => meta,
            None => {
                let meta = self.mint(EntityClass::Ra)?;
                actions.push(Action::Create {
                    class: EntityClass::Ra,
                    meta_id: meta.clone(),
                    attributes: Attributes {
                        family: (!agent.family.is_empty()).then(|| agent.family.clone()),
                        given: (!agent.given.is_empty()).then(|| agent.given.clone()),
                        name: (!agent.name.is_empty()).then(|| agent.name.clone()),
                        ..Default::default()
                    },
                });
                meta
            }
        };
        if !l_ts.iter().any(|t| t.ra.meta_id == meta) {
            let ar = self.mint(EntityClass::Ar)?;
            actions.push(Action::AddAr {
                br: entity.meta_id.clone(),
                ar: ar.clone(),
                ra: meta.clone(),
                role: Role::Publisher,
                position: 1,
            });
            // Single-valued role: a reorder down to the new ar alone tells
            // the writer the old binding is gone.
            if !l_ts.is_empty() {
                actions.push(Action::ReorderArs {
                    br: entity.meta_id.clone(),
                    role: Role::Publisher,
                    order: vec![ar],
                });
            }
        }
        agent_meta.insert(key, meta);
        Ok(())
    }

    fn format_agents(
        &self,
        p: &ParsedRow,
        pi: usize,
        role: Role,
        ra_entities: &[RaEntity],
        agent_entity: &HashMap<(usize, Role, usize), usize>,
        agent_meta: &HashMap<(usize, Role, usize), MetaId>,
    ) -> String {
        let count = match role {
            Role::Author => p.authors.len(),
            Role::Editor => p.editors.len(),
            Role::Publisher => usize::from(p.publisher.is_some()),
        };
        let mut parts = Vec::with_capacity(count);
        for pos in 0..count {
            let Some(agent) = (match role {
                Role::Author => p.authors.get(pos),
                Role::Editor => p.editors.get(pos),
                Role::Publisher => p.publisher.as_ref(),
            }) else {
                continue;
            };
            let key = (pi, role, pos);
            let (display, ids) = match agent_entity.get(&key) {
                Some(&ei) => {
                    let e = &ra_entities[ei];
                    (e.display_name(), e.ids.as_slice())
                }
                None => (agent.display_name(), agent.ids.as_slice()),
            };
            let mut tokens: Vec<String> = Vec::new();
            if let Some(meta) = agent_meta.get(&key) {
                tokens.push(format!("omid:{meta}"));
            }
            tokens.extend(ids.iter().map(|t| t.to_string()));
            parts.push(if tokens.is_empty() {
                display
            } else if display.is_empty() {
                format!("[{}]", tokens.join(" "))
            } else {
                format!("{display} [{}]", tokens.join(" "))
            });
        }
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initials_detected() {
        assert!(is_initial("J"));
        assert!(is_initial("J."));
        assert!(!is_initial("Jo"));
        assert!(!is_initial("5."));
    }

    #[test]
    fn given_compatibility() {
        assert!(given_compatible("J.", "John"));
        assert!(given_compatible("John", "J."));
        assert!(given_compatible("John H.", "John Henry"));
        assert!(given_compatible("", "John"));
        assert!(!given_compatible("Jane", "John"));
        assert!(!given_compatible("J. R.", "John Kenneth"));
    }

    #[test]
    fn fuller_given_fills_initials() {
        assert!(fuller_given("", "John"));
        assert!(fuller_given("J.", "John"));
        assert!(!fuller_given("John", "J."));
        assert!(!fuller_given("John", "John"));
        assert!(!fuller_given("Jane", "John"));
    }

    #[test]
    fn date_merge_prefers_longer_prefix() {
        assert_eq!(merge_dates("2020", "2020-05", 0).unwrap(), "2020-05");
        assert_eq!(merge_dates("2020-05-01", "2020", 0).unwrap(), "2020-05-01");
        assert_eq!(merge_dates("", "2020", 0).unwrap(), "2020");
        // Same year, diverging month: first wins.
        assert_eq!(merge_dates("2020-05", "2020-07", 0).unwrap(), "2020-05");
    }

    #[test]
    fn date_merge_rejects_year_conflict() {
        let err = merge_dates("2020-05", "2021", 7).unwrap_err();
        assert_eq!(err.kind(), "data_conflict");
    }

    #[test]
    fn token_formatting() {
        let meta = MetaId::new(EntityClass::Br, "0601");
        let ids = vec![IdToken {
            scheme: Scheme::Doi,
            value: "10.1/a".into(),
        }];
        assert_eq!(format_tokens(&meta, &ids), "omid:br/0601 doi:10.1/a");
        assert_eq!(
            format_attributed("Acta", &meta, &ids),
            "Acta [omid:br/0601 doi:10.1/a]"
        );
    }
}
