use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdError>;

/// Failures while interpreting component identifiers and property keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("component id must be a string or an object, got {found}")]
    InvalidIdType { found: &'static str },

    #[error("component id must not be empty")]
    EmptyId,

    #[error("dict id key {key:?} holds a non-scalar value")]
    NonScalarValue { key: String },

    #[error("dict id key {key:?} holds a non-finite number")]
    NonFiniteNumber { key: String },

    #[error("unknown wildcard {name:?} under key {key:?}")]
    UnknownWildcard { key: String, name: String },

    #[error("wildcard under key {key:?} is not allowed in a concrete id")]
    WildcardInConcreteId { key: String },

    #[error("property key {key:?} has no '.' separating id and property")]
    MissingProperty { key: String },

    #[error("invalid JSON in id {text:?}: {message}")]
    InvalidJson { text: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::IdError;

    #[test]
    fn messages_name_the_offending_key() {
        let err = IdError::UnknownWildcard {
            key: "index".into(),
            name: "ANY".into(),
        };
        assert_eq!(
            err.to_string(),
            "unknown wildcard \"ANY\" under key \"index\""
        );
    }
}
