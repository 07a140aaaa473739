//! Contact Store: parses a tabular contact source into a normalized, typed
//! recipient list, with per-row diagnostics.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;

use crate::domain::Recipient;
use crate::domain::RecipientEmail;

/// Accepted header aliases, in resolution order, matched case-insensitively.
const EMAIL_ALIASES: &[&str] = &["email", "address"];
const FIRST_NAME_ALIASES: &[&str] = &["firstname", "first_name", "first name"];
const LAST_NAME_ALIASES: &[&str] = &["lastname", "last_name", "last name"];

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("contact source not found: {0}")]
    SourceNotFound(String),

    #[error("malformed contact source")]
    MalformedSource(#[from] csv::Error),
}

/// Ingestion output: every source row (valid or not, in source order), plus
/// the row-level errors and warnings collected along the way.
#[derive(Debug)]
pub struct ContactList {
    pub contacts: Vec<Recipient>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ContactList {
    pub fn total(&self) -> usize { self.contacts.len() }

    pub fn valid_count(&self) -> usize { self.contacts.iter().filter(|c| c.valid).count() }

    pub fn invalid_count(&self) -> usize { self.total() - self.valid_count() }

    pub fn valid(&self) -> impl Iterator<Item = &Recipient> {
        self.contacts.iter().filter(|c| c.valid)
    }

    /// Materialize only the valid subset in the four-column normalized form,
    /// a clean intermediate artifact for downstream consumers. Round-trips
    /// through [`ingest_reader`] (`address` is an accepted email alias).
    pub fn write_normalized<W: std::io::Write>(
        &self,
        writer: W,
    ) -> Result<(), csv::Error> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(["address", "firstname", "lastname", "company"])?;
        for c in self.valid() {
            w.write_record([
                c.email.as_str(),
                &c.first_name,
                &c.last_name,
                c.company.as_deref().unwrap_or(""),
            ])?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Read and validate a contact file. Fatal errors (missing file, broken
/// tabular structure) mean no contacts were parsed; row-level problems are
/// collected in the returned [`ContactList`] instead.
pub fn ingest(path: impl AsRef<Path>) -> Result<ContactList, IngestError> {
    let path = path.as_ref();
    let file =
        File::open(path).map_err(|_| IngestError::SourceNotFound(path.display().to_string()))?;
    ingest_reader(file)
}

/// Same as [`ingest`], over any byte stream; tests feed in-memory CSV here.
pub fn ingest_reader<R: Read>(source: R) -> Result<ContactList, IngestError> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader.headers()?.clone();

    let mut contacts = Vec::new();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // the header occupies line 1; data rows start at 2
    for (i, record) in reader.records().enumerate() {
        let line = i + 2;
        let record = record?;

        let raw: HashMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();

        let email = lookup(&raw, EMAIL_ALIASES).unwrap_or_default();
        let (first_name, last_name) = resolve_names(&raw);
        let company = lookup(&raw, &["company"]);

        let valid = if email.is_empty() {
            errors.push(format!("Line {line}: Missing email address"));
            false
        } else if RecipientEmail::parse(email.clone()).is_err() {
            errors.push(format!("Line {line}: Invalid email format: {email}"));
            false
        } else {
            if first_name.is_empty() {
                warnings.push(format!("Line {line}: Missing first name for {email}"));
            }
            true
        };

        // invalid rows are kept too, preserving line numbering for
        // diagnostics downstream
        contacts.push(Recipient {
            email,
            first_name,
            last_name,
            company,
            line_number: line,
            valid,
            raw_fields: raw,
        });
    }

    Ok(ContactList {
        contacts,
        errors,
        warnings,
    })
}

/// Case-insensitive column lookup over an ordered alias list. Empty values
/// count as absent.
fn lookup(
    raw: &HashMap<String, String>,
    aliases: &[&str],
) -> Option<String> {
    for alias in aliases {
        let hit = raw
            .iter()
            .find(|(header, value)| header.to_lowercase() == *alias && !value.is_empty());
        if let Some((_, value)) = hit {
            return Some(value.clone());
        }
    }
    None
}

/// First/last from their aliased columns; when both are absent, fall back to
/// a single `name` column split on the first space. No name signal at all is
/// not an error.
fn resolve_names(raw: &HashMap<String, String>) -> (String, String) {
    let first = lookup(raw, FIRST_NAME_ALIASES);
    let last = lookup(raw, LAST_NAME_ALIASES);

    if first.is_none() && last.is_none() {
        if let Some(full) = lookup(raw, &["name"]) {
            return match full.split_once(' ') {
                Some((head, rest)) => (head.to_string(), rest.trim().to_string()),
                None => (full, String::new()),
            };
        }
    }

    (first.unwrap_or_default(), last.unwrap_or_default())
}
