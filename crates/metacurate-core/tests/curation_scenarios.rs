//! End-to-end curation runs against an in-memory graph snapshot and counter.

use metacurate_core::finder::{BrRecord, RaRecord};
use metacurate_core::{
    Action, CuratedBatch, Curator, CuratorError, EntityClass, MemoryFinder, MetaId, Role, Row,
    WarningKind,
};
use metacurate_counter::{Counter, InMemoryCounter};
use metacurate_identifiers::{Registry, Scheme};

const ORCID_A: &str = "0000-0002-1825-0097";
const ORCID_B: &str = "0000-0002-1694-233X";
const ISSN: &str = "0378-5955";

fn br(n: &str) -> MetaId {
    MetaId::new(EntityClass::Br, n)
}

fn ra(n: &str) -> MetaId {
    MetaId::new(EntityClass::Ra, n)
}

fn id(n: &str) -> MetaId {
    MetaId::new(EntityClass::Id, n)
}

fn ar(n: &str) -> MetaId {
    MetaId::new(EntityClass::Ar, n)
}

async fn curate(
    finder: &MemoryFinder,
    counter: &dyn Counter,
    rows: &[Row],
) -> Result<CuratedBatch, CuratorError> {
    let registry = Registry::new();
    Curator::new(finder, counter, &registry, "060")
        .curate(rows)
        .await
}

fn creates_of_class(actions: &[Action], class: EntityClass) -> Vec<&Action> {
    actions
        .iter()
        .filter(|a| matches!(a, Action::Create { class: c, .. } if *c == class))
        .collect()
}

#[tokio::test]
async fn fresh_row_builds_full_containment_chain() {
    let finder = MemoryFinder::new();
    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "doi:10.1234/x".into(),
        title: "Hello".into(),
        kind: "journal article".into(),
        venue: format!("Acta [issn:{ISSN}]"),
        volume: "3".into(),
        issue: "1".into(),
        pub_date: "2020-05".into(),
        ..Default::default()
    }];
    let batch = curate(&finder, &counter, &rows).await.unwrap();

    let expected = [
        ("create", "br/0601"),      // article
        ("add-identifier", "br/0601"),
        ("create", "br/0602"),      // venue
        ("add-identifier", "br/0602"),
        ("create", "br/0603"),      // volume 3
        ("create", "br/0604"),      // issue 1
        ("update", "br/0601"),      // article partOf issue
    ];
    assert_eq!(batch.actions.len(), expected.len());
    for (action, (op, meta)) in batch.actions.iter().zip(expected) {
        match action {
            Action::Create { meta_id, .. } => {
                assert_eq!(op, "create");
                assert_eq!(meta_id.to_string(), meta);
            }
            Action::AddIdentifier { meta_id, .. } => {
                assert_eq!(op, "add-identifier");
                assert_eq!(meta_id.to_string(), meta);
            }
            Action::Update { meta_id, .. } => {
                assert_eq!(op, "update");
                assert_eq!(meta_id.to_string(), meta);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
    match &batch.actions[4] {
        Action::Create { attributes, .. } => {
            assert_eq!(attributes.sequence.as_deref(), Some("3"));
            assert_eq!(attributes.part_of, Some(br("0602")));
        }
        other => panic!("unexpected {other:?}"),
    }
    match &batch.actions[6] {
        Action::Update { delta, .. } => assert_eq!(delta.part_of, Some(br("0604"))),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(batch.rows[0].id, "omid:br/0601 doi:10.1234/x");
    assert!(batch.rows[0].venue.starts_with("Acta [omid:br/0602"));
}

fn snapshot_with_article_and_author() -> MemoryFinder {
    let mut finder = MemoryFinder::new();
    let mut article = BrRecord::new(br("01"));
    article.title = "Stored Title".into();
    article.ids.push((Scheme::Doi, "10.1234/a".into(), id("01")));
    finder.add_br(article);
    let mut smith = RaRecord::new(ra("01"));
    smith.family = "Smith".into();
    smith.given = "J.".into();
    smith.ids.push((Scheme::Orcid, ORCID_A.into(), id("02")));
    finder.add_ra(smith);
    finder.add_ar(&br("01"), Role::Author, ar("01"), ra("01"));
    finder
}

#[tokio::test]
async fn existing_doi_fills_author_given_name() {
    let finder = snapshot_with_article_and_author();
    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "doi:10.1234/a".into(),
        author: format!("Smith, John [orcid:{ORCID_A}]"),
        ..Default::default()
    }];
    let batch = curate(&finder, &counter, &rows).await.unwrap();

    assert_eq!(batch.actions.len(), 1);
    match &batch.actions[0] {
        Action::Update { meta_id, delta } => {
            assert_eq!(*meta_id, ra("01"));
            assert_eq!(delta.given.as_deref(), Some("John"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(batch.rows[0].author.starts_with("Smith, John [omid:ra/01"));
}

#[tokio::test]
async fn shared_orcid_creates_one_agent_across_rows() {
    let finder = MemoryFinder::new();
    let counter = InMemoryCounter::new();
    let rows = vec![
        Row {
            id: "doi:10.1234/x1".into(),
            title: "First".into(),
            author: format!("Doe, Jane [orcid:{ORCID_A}]"),
            ..Default::default()
        },
        Row {
            id: "doi:10.1234/x2".into(),
            title: "Second".into(),
            author: format!("Doe, Jane [orcid:{ORCID_A}]"),
            ..Default::default()
        },
    ];
    let batch = curate(&finder, &counter, &rows).await.unwrap();

    let ras = creates_of_class(&batch.actions, EntityClass::Ra);
    assert_eq!(ras.len(), 1);
    let shared = match ras[0] {
        Action::Create { meta_id, .. } => meta_id.clone(),
        other => panic!("unexpected {other:?}"),
    };
    let ar_ras: Vec<MetaId> = batch
        .actions
        .iter()
        .filter_map(|a| match a {
            Action::AddAr { ra, .. } => Some(ra.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ar_ras, vec![shared.clone(), shared]);
}

fn snapshot_with_two_articles() -> MemoryFinder {
    let mut finder = MemoryFinder::new();
    let mut first = BrRecord::new(br("01"));
    first.ids.push((Scheme::Doi, "10.1234/a".into(), id("01")));
    finder.add_br(first);
    let mut second = BrRecord::new(br("02"));
    second.ids.push((Scheme::Pmid, "123".into(), id("02")));
    finder.add_br(second);
    finder
}

#[tokio::test]
async fn conflicting_identifiers_abort_without_tiebreaker() {
    let finder = snapshot_with_two_articles();
    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "doi:10.1234/a pmid:123".into(),
        title: "T".into(),
        ..Default::default()
    }];
    let err = curate(&finder, &counter, &rows).await.unwrap_err();
    match err {
        CuratorError::MergeConflict { row, a, b } => {
            assert_eq!(row, 0);
            assert_eq!(a, br("01"));
            assert_eq!(b, br("02"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn omid_tiebreaker_emits_merge() {
    let finder = snapshot_with_two_articles();
    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "doi:10.1234/a pmid:123 omid:br/01".into(),
        title: "T".into(),
        ..Default::default()
    }];
    let batch = curate(&finder, &counter, &rows).await.unwrap();
    assert!(batch.actions.iter().any(|a| matches!(
        a,
        Action::Merge { survivor, victim } if *survivor == br("01") && *victim == br("02")
    )));
    assert!(batch.rows[0].id.starts_with("omid:br/01 "));
}

#[tokio::test]
async fn volume_reused_across_batches() {
    let mut venue = BrRecord::new(br("010"));
    venue.title = "Acta Medica".into();
    venue.ids.push((Scheme::Issn, ISSN.into(), id("010")));

    let row = Row {
        venue: format!("Acta Medica [issn:{ISSN}]"),
        volume: "3".into(),
        ..Default::default()
    };

    let mut finder = MemoryFinder::new();
    finder.add_br(venue.clone());
    let counter = InMemoryCounter::new().seed("br", 10);
    let batch = curate(&finder, &counter, &[row.clone()]).await.unwrap();
    assert_eq!(batch.actions.len(), 1);
    match &batch.actions[0] {
        Action::Create { meta_id, attributes, .. } => {
            assert_eq!(*meta_id, br("06011"));
            assert_eq!(attributes.sequence.as_deref(), Some("3"));
            assert_eq!(attributes.part_of, Some(br("010")));
        }
        other => panic!("unexpected {other:?}"),
    }

    // Second batch sees the volume in the snapshot and allocates nothing.
    let mut finder = MemoryFinder::new();
    finder.add_br(venue);
    finder.add_volume(&br("010"), "3", br("06011"));
    let counter = InMemoryCounter::new().seed("br", 11);
    let batch = curate(&finder, &counter, &[row]).await.unwrap();
    assert!(batch.actions.is_empty());
}

#[tokio::test]
async fn unknown_omid_aborts() {
    let finder = MemoryFinder::new();
    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "omid:br/99".into(),
        title: "T".into(),
        ..Default::default()
    }];
    let err = curate(&finder, &counter, &rows).await.unwrap_err();
    assert_eq!(err.kind(), "unknown_omid");
}

#[tokio::test]
async fn action_log_is_deterministic() {
    let rows = vec![
        Row {
            id: "doi:10.1234/x".into(),
            title: "Hello".into(),
            kind: "journal article".into(),
            venue: format!("Acta [issn:{ISSN}]"),
            volume: "3".into(),
            issue: "1".into(),
            author: format!("Doe, Jane [orcid:{ORCID_A}]; Smith, John"),
            pub_date: "2020-05".into(),
            page: "12-34".into(),
            ..Default::default()
        },
        Row {
            id: "doi:10.1234/y".into(),
            title: "World".into(),
            venue: format!("Acta [issn:{ISSN}]"),
            volume: "3".into(),
            ..Default::default()
        },
    ];
    let mut logs = Vec::new();
    for _ in 0..2 {
        let finder = MemoryFinder::new();
        let counter = InMemoryCounter::new();
        let batch = curate(&finder, &counter, &rows).await.unwrap();
        logs.push(serde_json::to_string(&batch.actions).unwrap());
    }
    assert_eq!(logs[0], logs[1]);
}

#[tokio::test]
async fn counter_never_reuses_meta_ids_across_batches() {
    let counter = InMemoryCounter::new();
    let mut minted = Vec::new();
    for doi in ["10.1234/b1", "10.1234/b2", "10.1234/b3"] {
        let finder = MemoryFinder::new();
        let rows = vec![Row {
            id: format!("doi:{doi}"),
            title: "T".into(),
            author: "Doe, Jane".into(),
            ..Default::default()
        }];
        let batch = curate(&finder, &counter, &rows).await.unwrap();
        for action in &batch.actions {
            if let Action::Create { meta_id, .. } = action {
                minted.push(meta_id.clone());
            }
        }
    }
    let mut unique = minted.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), minted.len());
}

#[tokio::test]
async fn matching_sequence_stays_untouched() {
    let mut finder = MemoryFinder::new();
    let mut article = BrRecord::new(br("01"));
    article.title = "Stored".into();
    article.ids.push((Scheme::Doi, "10.1234/a".into(), id("01")));
    finder.add_br(article);
    let mut smith = RaRecord::new(ra("01"));
    smith.family = "Smith".into();
    smith.given = "J.".into();
    smith.ids.push((Scheme::Orcid, ORCID_A.into(), id("02")));
    finder.add_ra(smith);
    let mut doe = RaRecord::new(ra("02"));
    doe.family = "Doe".into();
    doe.given = "J.".into();
    doe.ids.push((Scheme::Orcid, ORCID_B.into(), id("03")));
    finder.add_ra(doe);
    finder.add_ar(&br("01"), Role::Author, ar("01"), ra("01"));
    finder.add_ar(&br("01"), Role::Author, ar("02"), ra("02"));

    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "doi:10.1234/a".into(),
        author: format!("Smith, J. [orcid:{ORCID_A}]; Doe, J. [orcid:{ORCID_B}]"),
        ..Default::default()
    }];
    let batch = curate(&finder, &counter, &rows).await.unwrap();
    assert!(batch.actions.is_empty());
}

#[tokio::test]
async fn venue_without_ids_deduplicated_by_title() {
    let finder = MemoryFinder::new();
    let counter = InMemoryCounter::new();
    let rows = vec![
        Row {
            id: "doi:10.1234/x1".into(),
            title: "First".into(),
            venue: "Acta Medica".into(),
            volume: "3".into(),
            ..Default::default()
        },
        Row {
            id: "doi:10.1234/x2".into(),
            title: "Second".into(),
            venue: "ACTA MEDICA".into(),
            volume: "3".into(),
            ..Default::default()
        },
    ];
    let batch = curate(&finder, &counter, &rows).await.unwrap();

    let volume_creates: Vec<_> = batch
        .actions
        .iter()
        .filter(|a| {
            matches!(a, Action::Create { attributes, .. } if attributes.sequence.is_some())
        })
        .collect();
    assert_eq!(volume_creates.len(), 1);
    let venue_creates: Vec<_> = batch
        .actions
        .iter()
        .filter(|a| {
            matches!(a, Action::Create { attributes, .. }
                if attributes.title.as_deref() == Some("Acta Medica"))
        })
        .collect();
    assert_eq!(venue_creates.len(), 1);
}

#[tokio::test]
async fn every_identifier_binds_one_entity() {
    let finder = MemoryFinder::new();
    let counter = InMemoryCounter::new();
    let rows = vec![
        Row {
            id: "doi:10.1234/x1".into(),
            title: "First".into(),
            author: format!("Doe, Jane [orcid:{ORCID_A}]"),
            ..Default::default()
        },
        Row {
            id: "doi:10.1234/x1 pmid:123".into(),
            title: "First again".into(),
            ..Default::default()
        },
    ];
    let batch = curate(&finder, &counter, &rows).await.unwrap();

    let mut owners: std::collections::HashMap<String, Vec<MetaId>> = Default::default();
    for action in &batch.actions {
        if let Action::AddIdentifier { meta_id, scheme, value, .. } = action {
            owners
                .entry(format!("{scheme}:{value}"))
                .or_default()
                .push(meta_id.clone());
        }
    }
    assert_eq!(owners.len(), 3);
    for (_, metas) in owners {
        assert_eq!(metas.len(), 1);
    }
}

#[tokio::test]
async fn differing_publisher_rebinds_single_slot() {
    let mut finder = MemoryFinder::new();
    let mut article = BrRecord::new(br("01"));
    article.title = "Stored".into();
    article.ids.push((Scheme::Doi, "10.1234/a".into(), id("01")));
    finder.add_br(article);
    let mut old_press = RaRecord::new(ra("01"));
    old_press.name = "Old Press".into();
    finder.add_ra(old_press);
    finder.add_ar(&br("01"), Role::Publisher, ar("01"), ra("01"));

    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "doi:10.1234/a".into(),
        publisher: "New Press".into(),
        ..Default::default()
    }];
    let batch = curate(&finder, &counter, &rows).await.unwrap();

    assert_eq!(batch.actions.len(), 3);
    match &batch.actions[0] {
        Action::Create { class, meta_id, attributes } => {
            assert_eq!(*class, EntityClass::Ra);
            assert_eq!(*meta_id, ra("0601"));
            assert_eq!(attributes.name.as_deref(), Some("New Press"));
        }
        other => panic!("unexpected {other:?}"),
    }
    match &batch.actions[1] {
        Action::AddAr { br: b, ar: a, ra: r, role, position } => {
            assert_eq!(*b, br("01"));
            assert_eq!(*a, ar("0601"));
            assert_eq!(*r, ra("0601"));
            assert_eq!(*role, Role::Publisher);
            assert_eq!(*position, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    // The reorder names only the new ar, so the old binding is dropped.
    match &batch.actions[2] {
        Action::ReorderArs { br: b, role, order } => {
            assert_eq!(*b, br("01"));
            assert_eq!(*role, Role::Publisher);
            assert_eq!(*order, vec![ar("0601")]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(batch.rows[0].publisher.starts_with("New Press [omid:ra/0601"));
}

#[tokio::test]
async fn matching_publisher_keeps_stored_binding() {
    let mut finder = MemoryFinder::new();
    let mut article = BrRecord::new(br("01"));
    article.title = "Stored".into();
    article.ids.push((Scheme::Doi, "10.1234/a".into(), id("01")));
    finder.add_br(article);
    let mut press = RaRecord::new(ra("01"));
    press.name = "Old Press".into();
    finder.add_ra(press);
    finder.add_ar(&br("01"), Role::Publisher, ar("01"), ra("01"));

    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "doi:10.1234/a".into(),
        publisher: "Old Press".into(),
        ..Default::default()
    }];
    let batch = curate(&finder, &counter, &rows).await.unwrap();
    assert!(batch.actions.is_empty());
}

#[tokio::test]
async fn ambiguous_author_falls_back_with_warning() {
    let mut finder = MemoryFinder::new();
    let mut article = BrRecord::new(br("01"));
    article.title = "Stored".into();
    article.ids.push((Scheme::Doi, "10.1234/a".into(), id("01")));
    finder.add_br(article);
    let mut first = RaRecord::new(ra("01"));
    first.family = "Smith".into();
    finder.add_ra(first);
    let mut second = RaRecord::new(ra("02"));
    second.family = "Smith".into();
    finder.add_ra(second);
    finder.add_ar(&br("01"), Role::Author, ar("01"), ra("01"));
    finder.add_ar(&br("01"), Role::Author, ar("02"), ra("02"));

    let counter = InMemoryCounter::new();
    let rows = vec![Row {
        id: "doi:10.1234/a".into(),
        author: "Smith, John".into(),
        ..Default::default()
    }];
    let batch = curate(&finder, &counter, &rows).await.unwrap();
    assert!(batch
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::AmbiguousAuthor));
    match &batch.actions[0] {
        Action::Update { meta_id, delta } => {
            assert_eq!(*meta_id, ra("01"));
            assert_eq!(delta.given.as_deref(), Some("John"));
        }
        other => panic!("unexpected {other:?}"),
    }
}
