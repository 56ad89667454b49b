use thiserror::Error;

use crate::id::DocId;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error("revision failed schema validation: {0}")]
    SchemaViolation(String),

    #[error("patch must be a JSON object or null")]
    RevisionActionNotValid,

    #[error("target document {0} not found during apply")]
    RevisionNotFound(DocId),

    #[error("insert for master {0} returned no id")]
    DocumentRevisionInsertFailed(DocId),

    #[error("delete for master {0} matched no rows")]
    DocumentRevisionDeleteFailed(DocId),

    #[error("revision {0} could not be marked processed: no matching row")]
    RevisionUpdateFailed(DocId),

    #[error("no revisions available for master {0}")]
    NoRevisionsAvailable(DocId),

    #[error("malformed identifier: {0}")]
    MalformedId(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
