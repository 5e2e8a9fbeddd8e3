use crate::error::FailureCause;

/// Map an octocrab error onto the stage failure taxonomy.
pub fn failure_cause(err: octocrab::Error) -> FailureCause {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            let details = source
                .errors
                .as_deref()
                .unwrap_or_default()
                .iter()
                .filter_map(|e| e["message"].as_str())
                .collect::<Vec<_>>();

            let message = if details.is_empty() {
                source.message.clone()
            } else {
                format!("{} ({})", source.message, details.join("; "))
            };

            FailureCause::Rejected {
                status: source.status_code.as_u16(),
                message,
            }
        }
        err @ (octocrab::Error::Serde { .. } | octocrab::Error::Json { .. }) => {
            FailureCause::MalformedResponse(err.to_string())
        }
        err => FailureCause::Transport(err.to_string()),
    }
}

/// Whether a rejection means the ref being created is already there.
pub fn is_already_exists(cause: &FailureCause) -> bool {
    matches!(
        cause,
        FailureCause::Rejected { status: 422, message } if message.contains("already exists")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_already_exists() {
        assert!(is_already_exists(&FailureCause::Rejected {
            status: 422,
            message: "Reference already exists".to_string(),
        }));
        assert!(!is_already_exists(&FailureCause::Rejected {
            status: 422,
            message: "Validation Failed".to_string(),
        }));
        assert!(!is_already_exists(&FailureCause::Rejected {
            status: 409,
            message: "Reference already exists".to_string(),
        }));
    }
}
