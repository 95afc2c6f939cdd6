use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Application '{id}' not found")]
    ApplicationNotFound { id: String },

    #[error("Source plan lookup failed for '{source_id}': {source}")]
    Lookup {
        source_id: String,
        #[source]
        source: Box<ReconError>,
    },

    #[error("financing_type update failed for application '{application_id}': {source}")]
    Write {
        application_id: String,
        #[source]
        source: Box<ReconError>,
    },

    #[error("Invalid timestamp '{value}' in column {column}")]
    InvalidTimestamp { column: &'static str, value: String },

    #[error("Store connection lock poisoned")]
    LockPoisoned,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReconError {
    /// Wrap a store error raised while resolving a SourcePlan.
    pub fn lookup(source_id: &str, err: ReconError) -> Self {
        ReconError::Lookup {
            source_id: source_id.to_string(),
            source: Box::new(err),
        }
    }

    /// Wrap a store error raised while writing financing_type.
    pub fn write(application_id: &str, err: ReconError) -> Self {
        ReconError::Write {
            application_id: application_id.to_string(),
            source: Box::new(err),
        }
    }
}

pub type ReconResult<T> = Result<T, ReconError>;
