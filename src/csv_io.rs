//! CSV input and output for [`Table`], and the CSV append workflow.

use std::io::{Read, Write};
use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::client::Client;
use crate::enrich::{ColumnSelectors, EnrichOptions, EnrichReport};
use crate::error::{ClientError, Result};
use crate::table::Table;

/// Reads CSV with a header row. Every cell is a string; empty cells are null.
pub fn read_csv_from<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut table = Table::new(headers.iter())?;
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                }
            })
            .collect();
        table.push_row(row)?;
    }
    Ok(table)
}

pub fn read_csv(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    read_csv_from(file)
}

/// Writes the header and rows. Nulls become empty cells; non-string values are written as JSON.
pub fn write_csv_to<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(cell_to_csv))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv_to(table, file)
}

fn cell_to_csv(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Enriches every row of `input` and writes the widened table to `output`.
///
/// Refuses to run if `input` is missing or `output` already exists.
pub fn append_to_csv(
    client: &Client,
    input: &Path,
    output: &Path,
    selectors: &ColumnSelectors,
    options: &EnrichOptions,
) -> Result<EnrichReport> {
    if !input.is_file() {
        return Err(ClientError::Config(format!(
            "CSV file {} does not exist",
            input.display()
        )));
    }
    if output.exists() {
        return Err(ClientError::Config(format!(
            "Output file {} already exists",
            output.display()
        )));
    }
    let table = read_csv(input)?;
    let report = client.enrich_with(&table, selectors, options)?;
    write_csv(&report.table, output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows = report.table.len(),
        "wrote enriched CSV"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::{free_form_text, StubTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn client(stub: &Arc<StubTransport>) -> Client {
        Client::with_transport(
            ClientConfig::new("test-key").with_base_url("http://stub.local"),
            stub.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_read_csv_empty_cells_are_null() {
        let table = read_csv_from("name,address\nA,1 Elm St\nB,\n".as_bytes()).unwrap();
        assert_eq!(table.columns(), ["name", "address"]);
        assert_eq!(table.get(0, "address"), Some(&json!("1 Elm St")));
        assert_eq!(table.get(1, "address"), Some(&json!(null)));
    }

    #[test]
    fn test_read_csv_ragged_row_fails() {
        assert!(read_csv_from("a,b\n1,2,3\n".as_bytes()).is_err());
    }

    #[test]
    fn test_write_csv_formats_cells() {
        let mut table = Table::new(["s", "n", "b", "z"]).unwrap();
        table
            .push_row(vec![json!("Leon, FL"), json!(32301), json!(true), json!(null)])
            .unwrap();
        let mut out = Vec::new();
        write_csv_to(&table, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "s,n,b,z\n\"Leon, FL\",32301,true,\n");
    }

    #[test]
    fn test_append_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(
            &input,
            "id,free_form_query\n1,\"123 Main Street, Tallahassee, FL, 12345\"\n2,unknown place\n",
        )
        .unwrap();

        let stub = StubTransport::replying(|request| {
            if free_form_text(request) == "unknown place" {
                Err(ClientError::Service("NominatimQueryException".into()))
            } else {
                Ok(json!({"county": {"name": "Leon"}, "state": {"name": "Florida"}}))
            }
        });
        let report = append_to_csv(
            &client(&stub),
            &input,
            &output,
            &ColumnSelectors::free_form("free_form_query"),
            &EnrichOptions::default(),
        )
        .unwrap();
        assert_eq!(report.failures.len(), 1);

        let written = std::fs::read_to_string(&output).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("id,free_form_query,county.name,state.name"));
        assert_eq!(
            lines.next(),
            Some("1,\"123 Main Street, Tallahassee, FL, 12345\",Leon,Florida")
        );
        assert_eq!(lines.next(), Some("2,unknown place,,"));
    }

    #[test]
    fn test_append_to_csv_preconditions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        let stub = StubTransport::replying(|_| Ok(json!({})));
        let selectors = ColumnSelectors::free_form("address");

        let err = append_to_csv(&client(&stub), &input, &output, &selectors, &EnrichOptions::default())
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(m) if m.contains("does not exist")));

        std::fs::write(&input, "address\n1 Elm St\n").unwrap();
        std::fs::write(&output, "taken").unwrap();
        let err = append_to_csv(&client(&stub), &input, &output, &selectors, &EnrichOptions::default())
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(m) if m.contains("already exists")));
        assert_eq!(stub.call_count(), 0);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "taken");
    }
}
