/// Failures reading or writing the tabular files.
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("column '{column}' not found in input; available columns: {}", available.join(", "))]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },
}

/// Why a single field could not be extracted from a detail page.
#[derive(thiserror::Error, Debug)]
pub enum FieldError {
    #[error("element not found: {0}")]
    MissingElement(&'static str),

    #[error("attribute '{attr}' missing on {element}")]
    MissingAttribute {
        element: &'static str,
        attr: &'static str,
    },

    #[error("invalid number {text:?}: {source}")]
    InvalidNumber {
        text: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid JSON in {element}: {source}")]
    InvalidJson {
        element: &'static str,
        source: serde_json::Error,
    },

    #[error("no candidates in {0}")]
    Empty(&'static str),
}
