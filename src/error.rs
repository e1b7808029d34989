use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no {table} entry for {key}")]
    Configuration { table: &'static str, key: String },

    #[error("{field} out of range: {value} (expected {expected})")]
    OutOfRange {
        field: String,
        value: f64,
        expected: &'static str,
    },

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid input for {subject}: {message}")]
    Input { subject: String, message: String },
}

impl EngineError {
    pub fn configuration(table: &'static str, key: impl ToString) -> Self {
        Self::Configuration {
            table,
            key: key.to_string(),
        }
    }

    pub fn out_of_range(field: impl Into<String>, value: f64, expected: &'static str) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value,
            expected,
        }
    }

    pub fn input(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Input {
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::OutOfRange { .. } => "out_of_range",
            Self::InvalidPolicy(_) => "invalid_policy",
            Self::Input { .. } => "input",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            EngineError::configuration("prescriptions", "documentation").kind(),
            "configuration"
        );
        assert_eq!(
            EngineError::out_of_range("rate", 1.5, "0..=1").kind(),
            "out_of_range"
        );
        assert_eq!(EngineError::InvalidPolicy("x".into()).kind(), "invalid_policy");
        assert_eq!(EngineError::input("agent-1", "bad").kind(), "input");
    }

    #[test]
    fn configuration_message_names_table_and_key() {
        let err = EngineError::configuration("sla targets", "aht");
        assert_eq!(err.to_string(), "no sla targets entry for aht");
    }
}
