use nl2sparql_ir::MalformedIrError;

/// Failure reported by one of the pluggable collaborators (synonyms, manual
/// resolution, confirmation).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} declined: {reason}")]
    Declined {
        collaborator: &'static str,
        reason: String,
    },
    #[error("{collaborator} failed: {message}")]
    Failed {
        collaborator: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnmappableQueryError {
    #[error("no schema entity for {}", .words.join(", "))]
    Unresolved { words: Vec<String> },
    #[error("`{word}` was mapped to `{entity}`, which the schema does not declare")]
    UnknownEntity { word: String, entity: String },
    #[error("mapping confirmation failed: {0}")]
    Collaborator(#[from] CollaboratorError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisconnectedSchemaError {
    #[error("no connected schema subgraph spans {}", .entities.join(", "))]
    Subgraph { entities: Vec<String> },
    #[error("no schema path from `{from}` to `{to}` (occurrence `{occurrence}`)")]
    Segment {
        occurrence: String,
        from: String,
        to: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Unmappable(#[from] UnmappableQueryError),
    #[error(transparent)]
    Disconnected(#[from] DisconnectedSchemaError),
    #[error(transparent)]
    MalformedIr(#[from] MalformedIrError),
}

pub type Result<T> = std::result::Result<T, CompileError>;
