use std::{error::Error as StdError, fmt};

/// A cap enforced across the entire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalLimitKind {
    PartCount,
    FieldCount,
    FileCount,
    FileFieldCount,
}

impl TotalLimitKind {
    /// Name of the `UploadLimits` knob this cap comes from.
    pub fn as_str(&self) -> &'static str {
        match *self {
            TotalLimitKind::PartCount => "max_total_part_count",
            TotalLimitKind::FieldCount => "max_total_field_count",
            TotalLimitKind::FileCount => "max_total_file_count",
            TotalLimitKind::FileFieldCount => "max_total_file_field_count",
        }
    }
}

/// A cap enforced per form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLimitKind {
    FieldKeyByteLength,
    FieldValueByteLength,
    FileByteLength,
    FileCountPerField,
}

impl FieldLimitKind {
    pub fn as_str(&self) -> &'static str {
        match *self {
            FieldLimitKind::FieldKeyByteLength => "max_field_key_byte_length",
            FieldLimitKind::FieldValueByteLength => "max_field_value_byte_length",
            FieldLimitKind::FileByteLength => "max_file_byte_length",
            FieldLimitKind::FileCountPerField => "max_file_count_per_field",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A request-wide count cap was exceeded.
    TotalLimit {
        kind: TotalLimitKind,
        configured: u64,
    },
    /// A per-field cap was exceeded.
    FieldLimit {
        kind: FieldLimitKind,
        field: String,
        configured: u64,
    },
    /// The wire parser reported malformed multipart data.
    Upstream(String),
    /// The request was released; no further events are accepted or produced.
    Cancelled,
}

impl Error {
    pub(crate) fn total(kind: TotalLimitKind, configured: u64) -> Self {
        Error::TotalLimit { kind, configured }
    }

    pub(crate) fn field_limit<S: Into<String>>(
        kind: FieldLimitKind,
        field: S,
        configured: u64,
    ) -> Self {
        Error::FieldLimit {
            kind,
            field: field.into(),
            configured,
        }
    }

    pub(crate) fn upstream<E: fmt::Display>(e: E) -> Self {
        Error::Upstream(format!("{}", e))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::TotalLimit { kind, configured } => {
                write!(f, "Exceeded limit {} = {}", kind.as_str(), configured)
            }
            Error::FieldLimit {
                kind,
                ref field,
                configured,
            } => write!(
                f,
                "Exceeded limit {} = {} on field {:?}",
                kind.as_str(),
                configured,
                field
            ),
            Error::Upstream(ref e) => write!(f, "Upstream parser: {}", e),
            Error::Cancelled => write!(f, "Upload was cancelled"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        None
    }
}
