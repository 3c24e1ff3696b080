//! Parsed, cleaned row mentions: the output of the normalise-and-prune
//! pass and the working unit of everything the curator does afterwards.

use metacurate_cleaner::{clean_date, clean_name, clean_pages, clean_title, normalize_hyphens,
    normalize_spaces};
use metacurate_identifiers::{Registry, Scheme};

use crate::entity::{BrType, EntityClass, MetaId};
use crate::error::{CuratorError, Warning, WarningKind};
use crate::row::{parse_bracketed, parse_id_tokens, split_agents, RawToken, Row};

/// A validated external identifier in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdToken {
    pub scheme: Scheme,
    pub value: String,
}

impl std::fmt::Display for IdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scheme, self.value)
    }
}

/// One person or organisation mention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentMention {
    /// Family name, when the source used `Family, Given`.
    pub family: String,
    pub given: String,
    /// Free-form name for organisations and uncommaed people.
    pub name: String,
    pub ids: Vec<IdToken>,
    pub omid: Option<MetaId>,
}

impl AgentMention {
    pub fn orcid(&self) -> Option<&str> {
        self.ids
            .iter()
            .find(|t| t.scheme == Scheme::Orcid)
            .map(|t| t.value.as_str())
    }

    /// Display name in row syntax: `Family, Given` or the free-form name.
    pub fn display_name(&self) -> String {
        if self.family.is_empty() {
            self.name.clone()
        } else if self.given.is_empty() {
            format!("{},", self.family)
        } else {
            format!("{}, {}", self.family, self.given)
        }
    }
}

/// The container mention of a row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueMention {
    pub title: String,
    pub ids: Vec<IdToken>,
    pub omid: Option<MetaId>,
}

/// A cleaned and validated row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRow {
    /// Zero-based position in the input batch.
    pub index: usize,
    pub ids: Vec<IdToken>,
    pub omid: Option<MetaId>,
    pub title: String,
    pub authors: Vec<AgentMention>,
    pub editors: Vec<AgentMention>,
    pub pub_date: String,
    pub venue: Option<VenueMention>,
    pub volume: String,
    pub issue: String,
    pub page: String,
    pub kind: Option<BrType>,
    pub publisher: Option<AgentMention>,
}

impl ParsedRow {
    /// A row that only describes its venue (no title, no resource ids).
    pub fn is_pure_venue(&self) -> bool {
        self.title.is_empty()
            && self.ids.is_empty()
            && self.omid.is_none()
            && self.venue.is_some()
    }
}

/// Validate raw tokens against the registry; invalid ones are dropped with
/// an `invalid_identifier` warning. Returns `(valid ids, explicit omid)`.
async fn validate_tokens(
    row: usize,
    field: &str,
    tokens: Vec<RawToken>,
    expected_class: EntityClass,
    registry: &Registry,
    warnings: &mut Vec<Warning>,
) -> (Vec<IdToken>, Option<MetaId>) {
    let mut ids = Vec::new();
    let mut omid = None;
    for token in tokens {
        match token {
            RawToken::External { scheme, value } => {
                if registry.is_valid(scheme, &value).await {
                    // is_valid implies normalise succeeds
                    if let Some(canonical) = registry.normalise(scheme, &value, false) {
                        let token = IdToken {
                            scheme,
                            value: canonical,
                        };
                        if !ids.contains(&token) {
                            ids.push(token);
                        }
                    }
                } else {
                    warnings.push(Warning {
                        row,
                        kind: WarningKind::InvalidIdentifier,
                        message: format!("{field}: dropped invalid {scheme}:{value}"),
                    });
                }
            }
            RawToken::Omid(meta) if meta.class == expected_class => {
                omid = Some(meta);
            }
            RawToken::Omid(meta) => {
                warnings.push(Warning {
                    row,
                    kind: WarningKind::InvalidIdentifier,
                    message: format!("{field}: omid:{meta} has the wrong entity class"),
                });
            }
            RawToken::Unrecognised(raw) => {
                warnings.push(Warning {
                    row,
                    kind: WarningKind::InvalidIdentifier,
                    message: format!("{field}: unrecognised token {raw}"),
                });
            }
        }
    }
    (ids, omid)
}

/// Parse one agent entry (`Family, Given [ids]` or `Name [ids]`).
async fn parse_agent(
    row: usize,
    field: &str,
    entry: &str,
    registry: &Registry,
    warnings: &mut Vec<Warning>,
) -> Option<AgentMention> {
    let (name_part, tokens) = parse_bracketed(entry);
    let (ids, omid) = validate_tokens(row, field, tokens, EntityClass::Ra, registry, warnings).await;

    let name_part = normalize_spaces(&name_part);
    let name_part = name_part.trim();
    let lowered = name_part.trim_end_matches('.').to_lowercase();
    if lowered == "et al" {
        return None;
    }
    let mut mention = AgentMention {
        ids,
        omid,
        ..Default::default()
    };
    if let Some((family, given)) = name_part.split_once(',') {
        mention.family = clean_name(family.trim());
        mention.given = clean_name(given.trim());
    } else {
        mention.name = clean_name(name_part);
    }
    if mention.family.is_empty()
        && mention.name.is_empty()
        && mention.ids.is_empty()
        && mention.omid.is_none()
    {
        return None;
    }
    Some(mention)
}

/// Normalise and prune a single row: clean every field, validate every
/// identifier, and decide whether the row survives.
///
/// Returns `Ok(None)` when the row is pruned.
pub async fn parse_row(
    index: usize,
    row: &Row,
    registry: &Registry,
    warnings: &mut Vec<Warning>,
) -> Result<Option<ParsedRow>, CuratorError> {
    let id_field = normalize_hyphens(&normalize_spaces(&row.id));
    let (ids, omid) = validate_tokens(
        index,
        "id",
        parse_id_tokens(&id_field),
        EntityClass::Br,
        registry,
        warnings,
    )
    .await;

    let mut authors = Vec::new();
    for entry in split_agents(&normalize_spaces(&row.author)) {
        if let Some(agent) = parse_agent(index, "author", &entry, registry, warnings).await {
            authors.push(agent);
        }
    }
    let mut editors = Vec::new();
    for entry in split_agents(&normalize_spaces(&row.editor)) {
        if let Some(agent) = parse_agent(index, "editor", &entry, registry, warnings).await {
            editors.push(agent);
        }
    }

    let venue_field = normalize_spaces(&row.venue);
    let venue = if venue_field.trim().is_empty() {
        None
    } else {
        let (venue_title, tokens) = parse_bracketed(&venue_field);
        let (venue_ids, venue_omid) =
            validate_tokens(index, "venue", tokens, EntityClass::Br, registry, warnings).await;
        let venue_title = clean_title(&venue_title);
        if venue_title.is_empty() && venue_ids.is_empty() && venue_omid.is_none() {
            None
        } else {
            Some(VenueMention {
                title: venue_title,
                ids: venue_ids,
                omid: venue_omid,
            })
        }
    };

    let publisher_field = normalize_spaces(&row.publisher);
    let publisher = if publisher_field.trim().is_empty() {
        None
    } else {
        parse_agent(index, "publisher", &publisher_field, registry, warnings).await
    };

    let volume = normalize_spaces(&row.volume).trim().to_string();
    let issue = normalize_spaces(&row.issue).trim().to_string();
    if (!volume.is_empty() || !issue.is_empty()) && venue.is_none() {
        return Err(CuratorError::VenueRequired { row: index });
    }

    let parsed = ParsedRow {
        index,
        ids,
        omid,
        title: clean_title(&normalize_spaces(&row.title)),
        authors,
        editors,
        pub_date: clean_date(&normalize_hyphens(&normalize_spaces(&row.pub_date))),
        venue,
        volume,
        issue,
        page: clean_pages(&normalize_hyphens(&normalize_spaces(&row.page))),
        kind: BrType::parse(row.kind.trim()),
        publisher,
    };

    if parsed.title.is_empty()
        && parsed.ids.is_empty()
        && parsed.omid.is_none()
        && !parsed.is_pure_venue()
    {
        tracing::debug!(row = index, "pruned row with no title, ids or venue");
        return Ok(None);
    }
    Ok(Some(parsed))
}
