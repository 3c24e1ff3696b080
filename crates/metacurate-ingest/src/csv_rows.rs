//! CSV reader and writer for the curation row schema.
//!
//! The header is mandatory; column order is free. The writer refuses rows
//! whose type belongs to the container subset, since those only ever appear
//! through the `venue`, `volume` and `issue` fields of a leaf row.

use std::fs::File;
use std::io;
use std::path::Path;

use metacurate_core::{BrType, Row};

use crate::IngestError;

const COLUMNS: [&str; 11] = [
    "id", "title", "author", "pub_date", "venue", "volume", "issue", "page", "type", "publisher",
    "editor",
];

/// Read all rows from CSV input. Fails when any required column is absent
/// from the header.
pub fn read_rows<R: io::Read>(input: R) -> Result<Vec<Row>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = reader.headers()?.clone();
    for column in COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(IngestError::MissingColumn(column));
        }
    }
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    tracing::debug!(rows = rows.len(), "CSV batch read");
    Ok(rows)
}

pub fn read_rows_from_path(path: &Path) -> Result<Vec<Row>, IngestError> {
    read_rows(File::open(path)?)
}

/// Write curated rows back out in canonical column order.
pub fn write_rows<W: io::Write>(output: W, rows: &[Row]) -> Result<(), IngestError> {
    for (i, row) in rows.iter().enumerate() {
        if let Some(kind) = BrType::parse(&row.kind) {
            if kind.forbidden_as_leaf() {
                return Err(IngestError::ForbiddenLeafType {
                    row: i,
                    kind: row.kind.clone(),
                });
            }
        }
    }
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(output);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_rows_to_path(path: &Path, rows: &[Row]) -> Result<(), IngestError> {
    write_rows(File::create(path)?, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_round_trip() {
        let input = "\
id,title,author,pub_date,venue,volume,issue,page,type,publisher,editor
doi:10.1234/x,Hello,\"Doe, Jane\",2020,Acta,3,1,12-34,journal article,,
";
        let rows = read_rows(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "doi:10.1234/x");
        assert_eq!(rows[0].author, "Doe, Jane");
        assert_eq!(rows[0].kind, "journal article");

        let mut out = Vec::new();
        write_rows(&mut out, &rows).unwrap();
        let again = read_rows(out.as_slice()).unwrap();
        assert_eq!(again, rows);
    }

    #[test]
    fn shuffled_header_accepted() {
        let input = "\
title,id,editor,publisher,type,page,issue,volume,venue,pub_date,author
Hello,doi:10.1234/x,,,,,,,,2020,
";
        let rows = read_rows(input.as_bytes()).unwrap();
        assert_eq!(rows[0].title, "Hello");
        assert_eq!(rows[0].pub_date, "2020");
    }

    #[test]
    fn missing_column_rejected() {
        let input = "id,title,author\ndoi:10.1/a,Hello,\n";
        let err = read_rows(input.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn("pub_date")));
    }

    #[test]
    fn container_types_rejected_as_leaf_rows() {
        let row = Row {
            title: "Acta".into(),
            kind: "journal".into(),
            ..Default::default()
        };
        let err = write_rows(Vec::new(), &[row]).unwrap_err();
        assert!(matches!(err, IngestError::ForbiddenLeafType { row: 0, .. }));
    }
}
