//! CSV desired-state loading and directory export
//!
//! Layout:
//! - `email` (required): account identity
//! - standard Graph user properties such as `displayName` or `jobTitle`
//!   (matched case-insensitively); list properties are `;`-separated
//! - `manager` (optional): manager email; an empty cell removes the manager
//! - any other column is a custom field stored in a directory extension

use dirsync_graph::{standard_field, StandardField, STANDARD_FIELDS};
use dirsync_reconcile::{AttributeValue, DesiredRecord, DesiredState, ManagerRef, ObservedRecord};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{CliError, CliResult};

const EMAIL_COLUMN: &str = "email";
const MANAGER_COLUMN: &str = "manager";
const LIST_SEPARATOR: char = ';';
const LIST_JOINER: &str = "; ";

#[derive(Debug, Clone, PartialEq)]
enum Column {
    Email,
    Manager,
    Standard(&'static StandardField),
    Custom(String),
}

fn classify_headers(headers: &csv::StringRecord) -> CliResult<Vec<Column>> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(headers.len());

    for (index, raw) in headers.iter().enumerate() {
        let name = raw.trim();
        if name.is_empty() {
            return Err(CliError::Input(format!(
                "Column {} has an empty header",
                index + 1
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(CliError::Input(format!("Duplicate column '{name}'")));
        }

        let column = if name.eq_ignore_ascii_case(EMAIL_COLUMN) {
            Column::Email
        } else if name.eq_ignore_ascii_case(MANAGER_COLUMN) {
            Column::Manager
        } else if let Some(field) = standard_field(name) {
            Column::Standard(field)
        } else {
            Column::Custom(name.to_string())
        };
        columns.push(column);
    }

    if !columns.contains(&Column::Email) {
        return Err(CliError::Input(
            "CSV must have an 'email' column".to_string(),
        ));
    }
    Ok(columns)
}

fn parse_standard(field: &StandardField, cell: &str) -> AttributeValue {
    if field.multi_valued {
        AttributeValue::list(
            cell.split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        )
    } else {
        AttributeValue::scalar(cell)
    }
}

/// Reads a desired state from CSV data.
///
/// A present column always declares its attribute, so an empty cell clears the
/// remote value.
pub fn read_desired_state<R: Read>(reader: R) -> CliResult<DesiredState> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns = classify_headers(csv_reader.headers()?)?;
    let custom_fields: Vec<String> = columns
        .iter()
        .filter_map(|c| match c {
            Column::Custom(name) => Some(name.clone()),
            _ => None,
        })
        .collect();

    let mut records = Vec::new();
    for (index, row) in csv_reader.records().enumerate() {
        let row = row?;
        // Line 1 is the header.
        let line = index + 2;

        let mut email = String::new();
        let mut record = DesiredRecord::new("");
        for (column, cell) in columns.iter().zip(row.iter()) {
            match column {
                Column::Email => email = cell.to_string(),
                Column::Manager => record.manager = ManagerRef::from_cell(cell),
                Column::Standard(field) => {
                    record
                        .attributes
                        .insert(field.name.to_string(), parse_standard(field, cell));
                }
                Column::Custom(name) => {
                    record.custom.insert(name.clone(), cell.to_string());
                }
            }
        }

        if email.is_empty() {
            return Err(CliError::Input(format!("Row {line}: email is required")));
        }
        record.email = email;
        records.push(record);
    }

    Ok(DesiredState::new(records, custom_fields))
}

/// Loads the desired state from a CSV file.
pub fn load_desired_state(path: &Path) -> CliResult<DesiredState> {
    let file = File::open(path)
        .map_err(|e| CliError::Input(format!("Cannot open {}: {e}", path.display())))?;
    read_desired_state(file)
}

fn cell_text(value: Option<&AttributeValue>) -> String {
    match value {
        Some(AttributeValue::List(items)) => items.join(LIST_JOINER),
        Some(AttributeValue::Scalar(s)) => s.clone(),
        None => String::new(),
    }
}

/// Writes accounts in the loader's layout so the file can be re-imported.
pub fn write_accounts<W: Write>(
    writer: W,
    accounts: &[ObservedRecord],
    custom_fields: &[String],
) -> CliResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec![EMAIL_COLUMN.to_string()];
    header.extend(STANDARD_FIELDS.iter().map(|f| f.name.to_string()));
    header.push(MANAGER_COLUMN.to_string());
    header.extend(custom_fields.iter().cloned());
    csv_writer.write_record(&header)?;

    let mut sorted: Vec<&ObservedRecord> = accounts.iter().collect();
    sorted.sort_by_key(|a| a.key());

    for account in sorted {
        let mut row = vec![account.email.clone()];
        row.extend(
            STANDARD_FIELDS
                .iter()
                .map(|f| cell_text(account.attributes.get(f.name))),
        );
        row.push(account.manager_email.clone().unwrap_or_default());
        row.extend(
            custom_fields
                .iter()
                .map(|f| account.custom.get(f).cloned().unwrap_or_default()),
        );
        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Exports accounts to a CSV file.
pub fn export_accounts(
    path: &Path,
    accounts: &[ObservedRecord],
    custom_fields: &[String],
) -> CliResult<()> {
    let file = File::create(path)?;
    write_accounts(file, accounts, custom_fields)
}
