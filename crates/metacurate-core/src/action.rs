//! The deterministic action log emitted for the downstream graph writer.

use serde::Serialize;

use metacurate_identifiers::Scheme;

use crate::entity::{BrType, EntityClass, MetaId, Role};

/// Attribute bag used by create and update records. Only the set fields are
/// serialised, so a delta stays minimal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<BrType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_of: Option<MetaId>,
    /// Volume or issue sequence identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Attributes {
    pub fn is_empty(&self) -> bool {
        *self == Attributes::default()
    }
}

/// One typed record in the action log.
///
/// The log is ordered and deterministic: identical input rows, triplestore
/// snapshot and counter state produce a byte-identical sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Action {
    Create {
        class: EntityClass,
        meta_id: MetaId,
        attributes: Attributes,
    },
    Update {
        meta_id: MetaId,
        delta: Attributes,
    },
    AddIdentifier {
        meta_id: MetaId,
        id: MetaId,
        scheme: Scheme,
        value: String,
    },
    AddAr {
        br: MetaId,
        ar: MetaId,
        ra: MetaId,
        role: Role,
        position: usize,
    },
    ReorderArs {
        br: MetaId,
        role: Role,
        order: Vec<MetaId>,
    },
    SetEmbodiment {
        br: MetaId,
        re: MetaId,
    },
    /// Emitted, never performed: the writer merges `victim` into `survivor`.
    Merge {
        survivor: MetaId,
        victim: MetaId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_serialises_tagged() {
        let action = Action::Create {
            class: EntityClass::Br,
            meta_id: MetaId::new(EntityClass::Br, "0601"),
            attributes: Attributes {
                title: Some("Hello".into()),
                kind: Some(BrType::JournalArticle),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(
            json,
            r#"{"op":"create","class":"br","meta_id":"br/0601","attributes":{"title":"Hello","type":"journal article"}}"#
        );
    }

    #[test]
    fn add_identifier_serialises_scheme() {
        let action = Action::AddIdentifier {
            meta_id: MetaId::new(EntityClass::Br, "0601"),
            id: MetaId::new(EntityClass::Id, "0609"),
            scheme: Scheme::Doi,
            value: "10.1/a".into(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains(r#""op":"add-identifier""#));
        assert!(json.contains(r#""scheme":"doi""#));
    }

    #[test]
    fn empty_delta_detected() {
        assert!(Attributes::default().is_empty());
        assert!(!Attributes {
            given: Some("John".into()),
            ..Default::default()
        }
        .is_empty());
    }
}
