use std::fmt;

/// Broad error categories used for HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The referenced entity or entity type does not exist.
    NotFound,
    /// The operation conflicts with existing data.
    Conflict,
    /// The request payload or parameters are invalid.
    Validation,
    /// An unexpected engine failure.
    Internal,
}

/// Errors raised by the storage engine and surfaced over the API.
///
/// Every variant carries the offending field, id, or type name, exposes a
/// stable `SY…` code, and maps to exactly one [`ErrorCategory`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DbError {
    /// Entity not found by type + id.
    EntityNotFound { entity_type: String, id: String },
    /// Entity type not found by name.
    EntityTypeNotFound { name: String },
    /// Entity type already registered under this name.
    EntityTypeExists { name: String },
    /// An entity type definition failed validation.
    InvalidEntityType { name: String, reason: String },
    /// A field value does not conform to the declared schema.
    MalformedData { field: String, reason: String },
    /// A required field (or a required id for the custom generator) is absent.
    RequiredFieldMissing { field: String },
    /// An id does not conform to the type's generator.
    InvalidId { id: String, reason: String },
    /// The request shape is invalid (e.g. mismatched names).
    InvalidRequest { reason: String },
    /// A query references an unknown field or operator.
    InvalidQuery { reason: String },
    /// A join specification is invalid or missing.
    InvalidJoin { reason: String },
    /// A unique constraint would be violated.
    UniqueConstraint { field: String, value: String },
    /// The id generator of an existing entity type may not change.
    IdGeneratorChange { name: String },
    /// Internal engine failure (WAL I/O, corrupted log, …).
    Internal { message: String },
}

impl DbError {
    /// Stable machine-readable code, reported as `db_code` in responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EntityNotFound { .. } => "SY001",
            Self::EntityTypeNotFound { .. } => "SY002",
            Self::EntityTypeExists { .. } => "SY003",
            Self::InvalidEntityType { .. } => "SY004",
            Self::MalformedData { .. } => "SY100",
            Self::RequiredFieldMissing { .. } => "SY101",
            Self::InvalidId { .. } => "SY102",
            Self::InvalidRequest { .. } => "SY103",
            Self::InvalidQuery { .. } => "SY104",
            Self::InvalidJoin { .. } => "SY105",
            Self::UniqueConstraint { .. } => "SY200",
            Self::IdGeneratorChange { .. } => "SY201",
            Self::Internal { .. } => "SY900",
        }
    }

    /// Snake_case kind string used as the `error` field of the envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntityNotFound { .. } => "entity_not_found",
            Self::EntityTypeNotFound { .. } => "entity_type_not_found",
            Self::EntityTypeExists { .. } => "entity_type_exists",
            Self::InvalidEntityType { .. } => "invalid_entity_type",
            Self::MalformedData { .. } => "malformed_data",
            Self::RequiredFieldMissing { .. } => "required_field_missing",
            Self::InvalidId { .. } => "invalid_id",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidQuery { .. } => "invalid_query",
            Self::InvalidJoin { .. } => "invalid_join",
            Self::UniqueConstraint { .. } => "unique_constraint",
            Self::IdGeneratorChange { .. } => "id_generator_change",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Category for HTTP status mapping.
    ///
    /// `IdGeneratorChange` is a validation failure (400) rather than a
    /// conflict, matching the documented API table.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EntityNotFound { .. } | Self::EntityTypeNotFound { .. } => {
                ErrorCategory::NotFound
            }
            Self::EntityTypeExists { .. } | Self::UniqueConstraint { .. } => {
                ErrorCategory::Conflict
            }
            Self::InvalidEntityType { .. }
            | Self::MalformedData { .. }
            | Self::RequiredFieldMissing { .. }
            | Self::InvalidId { .. }
            | Self::InvalidRequest { .. }
            | Self::InvalidQuery { .. }
            | Self::InvalidJoin { .. }
            | Self::IdGeneratorChange { .. } => ErrorCategory::Validation,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntityNotFound { entity_type, id } => {
                write!(f, "entity '{id}' not found in type '{entity_type}'")
            }
            Self::EntityTypeNotFound { name } => {
                write!(f, "entity type '{name}' not found")
            }
            Self::EntityTypeExists { name } => {
                write!(f, "entity type '{name}' already exists")
            }
            Self::InvalidEntityType { name, reason } => {
                write!(f, "invalid entity type '{name}': {reason}")
            }
            Self::MalformedData { field, reason } => {
                write!(f, "malformed data for field '{field}': {reason}")
            }
            Self::RequiredFieldMissing { field } => {
                write!(f, "required field '{field}' is missing")
            }
            Self::InvalidId { id, reason } => {
                write!(f, "invalid id '{id}': {reason}")
            }
            Self::InvalidRequest { reason } => {
                write!(f, "invalid request: {reason}")
            }
            Self::InvalidQuery { reason } => {
                write!(f, "invalid query: {reason}")
            }
            Self::InvalidJoin { reason } => {
                write!(f, "invalid join: {reason}")
            }
            Self::UniqueConstraint { field, value } => {
                write!(
                    f,
                    "unique constraint violated for field '{field}' with value {value}"
                )
            }
            Self::IdGeneratorChange { name } => {
                write!(
                    f,
                    "the id generator of entity type '{name}' cannot be changed"
                )
            }
            Self::Internal { message } => {
                write!(f, "internal error: {message}")
            }
        }
    }
}

impl std::error::Error for DbError {}
