use std::fmt;

/// Errors surfaced by configuration loading and the command-line front end.
///
/// Analysis itself never fails: malformed events are dropped and `tick`
/// always returns a well-formed result.
#[derive(Debug)]
pub enum EngineError {
    ConfigIo(std::io::Error),
    ConfigParse(serde_json::Error),
    InvalidConfig(String),
    InvalidInput { line: usize, reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigIo(e) => write!(f, "Failed to read config: {}", e),
            Self::ConfigParse(e) => write!(f, "Failed to parse config: {}", e),
            Self::InvalidConfig(reason) => write!(f, "Invalid config: {}", reason),
            Self::InvalidInput { line, reason } => {
                write!(f, "Invalid input on line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigIo(e) => Some(e),
            Self::ConfigParse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::ConfigIo(e)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::ConfigParse(e)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = EngineError::InvalidInput {
            line: 3,
            reason: "missing ts".into(),
        };
        assert_eq!(e.to_string(), "Invalid input on line 3: missing ts");
        let e = EngineError::InvalidConfig("horizon_secs must be positive".into());
        assert!(e.to_string().contains("horizon_secs"));
    }

    #[test]
    fn test_parse_error_converts() {
        let err: EngineError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, EngineError::ConfigParse(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
