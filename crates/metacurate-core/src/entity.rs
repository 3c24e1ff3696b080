//! Entity classes, meta-ids and the controlled resource-type vocabulary.

use serde::{Deserialize, Serialize, Serializer};

/// The five curated entity classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    /// Bibliographic resource (article, book, journal, volume, issue, ...).
    Br,
    /// Responsible agent (person or organisation).
    Ra,
    /// Resource embodiment (page range).
    Re,
    /// Agent role: the (br, ra, role) binding with a position.
    Ar,
    /// External identifier literal.
    Id,
}

impl EntityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Br => "br",
            EntityClass::Ra => "ra",
            EntityClass::Re => "re",
            EntityClass::Ar => "ar",
            EntityClass::Id => "id",
        }
    }

    pub fn parse(s: &str) -> Option<EntityClass> {
        match s {
            "br" => Some(EntityClass::Br),
            "ra" => Some(EntityClass::Ra),
            "re" => Some(EntityClass::Re),
            "ar" => Some(EntityClass::Ar),
            "id" => Some(EntityClass::Id),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stable internal identifier: `<class>/<supplier-prefix><counter>`.
///
/// The numeric part is kept as the literal digit string (prefix included)
/// so a meta-id survives round-trips byte-identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaId {
    pub class: EntityClass,
    pub number: String,
}

impl MetaId {
    pub fn new(class: EntityClass, number: impl Into<String>) -> Self {
        Self {
            class,
            number: number.into(),
        }
    }

    /// Compose a meta-id from a supplier prefix and a counter value.
    pub fn mint(class: EntityClass, prefix: &str, counter: u64) -> Self {
        Self {
            class,
            number: format!("{prefix}{counter}"),
        }
    }

    /// Parse `br/0601` or `omid:br/0601`.
    pub fn parse(s: &str) -> Option<MetaId> {
        let s = s.strip_prefix("omid:").unwrap_or(s);
        let (class, number) = s.split_once('/')?;
        let class = EntityClass::parse(class)?;
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(MetaId::new(class, number))
    }
}

impl std::fmt::Display for MetaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.class, self.number)
    }
}

impl Serialize for MetaId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Roles an agent can hold on a bibliographic resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Author,
    Editor,
    Publisher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Author => "author",
            Role::Editor => "editor",
            Role::Publisher => "publisher",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controlled vocabulary of bibliographic resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BrType {
    JournalArticle,
    JournalVolume,
    JournalIssue,
    Journal,
    Book,
    BookChapter,
    BookPart,
    BookSection,
    BookSeries,
    BookSet,
    EditedBook,
    ReferenceBook,
    ReferenceEntry,
    Proceedings,
    ProceedingsArticle,
    ProceedingsSeries,
    Report,
    ReportSeries,
    Standard,
    StandardSeries,
    Series,
    Dissertation,
    Dataset,
    PeerReview,
    WebContent,
    ArchivalDocument,
}

impl BrType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrType::JournalArticle => "journal article",
            BrType::JournalVolume => "journal volume",
            BrType::JournalIssue => "journal issue",
            BrType::Journal => "journal",
            BrType::Book => "book",
            BrType::BookChapter => "book chapter",
            BrType::BookPart => "book part",
            BrType::BookSection => "book section",
            BrType::BookSeries => "book series",
            BrType::BookSet => "book set",
            BrType::EditedBook => "edited book",
            BrType::ReferenceBook => "reference book",
            BrType::ReferenceEntry => "reference entry",
            BrType::Proceedings => "proceedings",
            BrType::ProceedingsArticle => "proceedings article",
            BrType::ProceedingsSeries => "proceedings series",
            BrType::Report => "report",
            BrType::ReportSeries => "report series",
            BrType::Standard => "standard",
            BrType::StandardSeries => "standard series",
            BrType::Series => "series",
            BrType::Dissertation => "dissertation",
            BrType::Dataset => "dataset",
            BrType::PeerReview => "peer_review",
            BrType::WebContent => "web content",
            BrType::ArchivalDocument => "archival document",
        }
    }

    /// Case-sensitive parse of the controlled vocabulary.
    pub fn parse(s: &str) -> Option<BrType> {
        Some(match s {
            "journal article" => BrType::JournalArticle,
            "journal volume" => BrType::JournalVolume,
            "journal issue" => BrType::JournalIssue,
            "journal" => BrType::Journal,
            "book" => BrType::Book,
            "book chapter" => BrType::BookChapter,
            "book part" => BrType::BookPart,
            "book section" => BrType::BookSection,
            "book series" => BrType::BookSeries,
            "book set" => BrType::BookSet,
            "edited book" => BrType::EditedBook,
            "reference book" => BrType::ReferenceBook,
            "reference entry" => BrType::ReferenceEntry,
            "proceedings" => BrType::Proceedings,
            "proceedings article" => BrType::ProceedingsArticle,
            "proceedings series" => BrType::ProceedingsSeries,
            "report" => BrType::Report,
            "report series" => BrType::ReportSeries,
            "standard" => BrType::Standard,
            "standard series" => BrType::StandardSeries,
            "series" => BrType::Series,
            "dissertation" => BrType::Dissertation,
            "dataset" => BrType::Dataset,
            "peer_review" => BrType::PeerReview,
            "web content" => BrType::WebContent,
            "archival document" => BrType::ArchivalDocument,
            _ => return None,
        })
    }

    /// Container types the CSV emitter refuses as stand-alone leaf rows.
    pub fn forbidden_as_leaf(&self) -> bool {
        matches!(
            self,
            BrType::JournalIssue
                | BrType::JournalVolume
                | BrType::Journal
                | BrType::BookSet
                | BrType::BookSeries
                | BrType::BookPart
                | BrType::BookSection
        )
    }

    /// Whether this type can contain journal volumes and issues.
    pub fn is_venue(&self) -> bool {
        matches!(self, BrType::Journal | BrType::Series | BrType::BookSeries)
    }
}

impl std::fmt::Display for BrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BrType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_id_round_trip() {
        let id = MetaId::parse("br/0601").unwrap();
        assert_eq!(id.class, EntityClass::Br);
        assert_eq!(id.to_string(), "br/0601");
    }

    #[test]
    fn meta_id_accepts_omid_prefix() {
        assert_eq!(MetaId::parse("omid:ra/06012"), Some(MetaId::new(EntityClass::Ra, "06012")));
    }

    #[test]
    fn meta_id_rejects_garbage() {
        assert_eq!(MetaId::parse("br/"), None);
        assert_eq!(MetaId::parse("xx/12"), None);
        assert_eq!(MetaId::parse("br/12a"), None);
        assert_eq!(MetaId::parse("br12"), None);
    }

    #[test]
    fn mint_concatenates_prefix() {
        assert_eq!(MetaId::mint(EntityClass::Br, "060", 11).to_string(), "br/06011");
    }

    #[test]
    fn br_type_round_trip() {
        for s in ["journal article", "peer_review", "archival document"] {
            assert_eq!(BrType::parse(s).unwrap().as_str(), s);
        }
        assert_eq!(BrType::parse("Journal Article"), None);
    }

    #[test]
    fn forbidden_leaf_set() {
        assert!(BrType::Journal.forbidden_as_leaf());
        assert!(BrType::BookPart.forbidden_as_leaf());
        assert!(!BrType::JournalArticle.forbidden_as_leaf());
        assert!(!BrType::Book.forbidden_as_leaf());
    }
}
