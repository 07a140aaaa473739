use std::collections::HashMap;

/// One row of the contact source, normalized. Created once during ingestion
/// and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,

    /// Origin line in the contact source, for diagnostics.
    pub line_number: usize,

    /// True iff `email` is non-empty and well-formed. Missing name fields
    /// never block validity; they only produce ingestion warnings.
    pub valid: bool,

    /// The row's original header -> value mapping.
    pub raw_fields: HashMap<String, String>,
}

impl Recipient {
    /// First and last name joined by a single space; either side may be
    /// empty, so the result is trimmed.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
