use env_logger::{Builder, Target, WriteStyle};
use log::{error, info, warn, LevelFilter};
use std::fs::OpenOptions;
use std::path::Path;
use std::str::FromStr;

/// Initialize the logging system, writing to `log_file` when given and to
/// stderr otherwise
pub fn initialize_logging(level: &str, log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder
        .filter_level(filter)
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Auto);

    // RUST_LOG still wins over LOG_LEVEL for per-module tuning
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    info!("Logging system initialized at level {}", filter);
    Ok(())
}

/// Helper function to format sensitive data for logging
pub fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Structured logging for account events
pub fn log_auth_event(event_type: &str, account: &str, success: bool, details: Option<&str>) {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    if success {
        info!(
            "Auth event: type={}, user={}, success=true, timestamp={}, details={:?}",
            event_type,
            format_sensitive(account),
            timestamp,
            details
        );
    } else {
        warn!(
            "Auth event: type={}, user={}, success=false, timestamp={}, details={:?}",
            event_type,
            format_sensitive(account),
            timestamp,
            details
        );
    }
}

/// What happened to a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    Issued,
    Accepted,
    Rejected,
}

impl TokenAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenAction::Issued => "issued",
            TokenAction::Accepted => "accepted",
            TokenAction::Rejected => "rejected",
        }
    }
}

/// Token issuance and checks. Never pass the token itself.
pub fn log_token_event(purpose: &str, account: &str, action: TokenAction) {
    let message = format!(
        "Token event: purpose={}, user={}, action={}",
        purpose,
        format_sensitive(account),
        action.as_str()
    );
    match action {
        TokenAction::Rejected => warn!("{}", message),
        TokenAction::Issued | TokenAction::Accepted => info!("{}", message),
    }
}

/// Store writes and mail delivery failures
pub fn log_data_operation(operation: &str, account: &str, resource: &str, success: bool, details: Option<&str>) {
    if success {
        info!(
            "Data operation: op={}, user={}, resource={}, success=true, details={:?}",
            operation,
            format_sensitive(account),
            resource,
            details
        );
    } else {
        error!(
            "Data operation: op={}, user={}, resource={}, success=false, details={:?}",
            operation,
            format_sensitive(account),
            resource,
            details
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sensitive_data_formatting() {
        assert_eq!(format_sensitive("password"), "pa***rd");
        assert_eq!(format_sensitive("key"), "***");
        assert_eq!(format_sensitive("ada@example.com"), "ad***om");
        assert_eq!(format_sensitive(""), "");
        assert_eq!(format_sensitive("ñandú@x.io"), "ña***io");
    }

    #[test]
    fn test_token_action_names() {
        assert_eq!(TokenAction::Issued.as_str(), "issued");
        assert_eq!(TokenAction::Accepted.as_str(), "accepted");
        assert_eq!(TokenAction::Rejected.as_str(), "rejected");
        log_token_event("password_reset", "ada@example.com", TokenAction::Rejected);
    }

    #[test]
    fn test_logging_initialization() {
        let log_file = NamedTempFile::new().unwrap();

        let result = initialize_logging("debug", Some(log_file.path()));

        // Another test may already have installed a logger
        assert!(
            result.is_ok()
                || result
                    .unwrap_err()
                    .to_string()
                    .contains("already")
        );
    }
}
