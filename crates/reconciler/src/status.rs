//! Projection of an observed remote issue into record status.

use ghissue_github::RemoteIssue;

use crate::types::RecordStatus;

/// Copy the remote issue's state and last update instant into status fields.
pub fn project(issue: &RemoteIssue) -> RecordStatus {
    RecordStatus {
        state: issue.state.to_string(),
        last_update_timestamp: issue.updated_at_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use ghissue_github::IssueState;

    use super::*;

    #[test]
    fn test_project_copies_state_and_timestamp() {
        let issue = RemoteIssue {
            number: 3,
            title: "T1".to_string(),
            body: "d1".to_string(),
            state: IssueState::Closed,
            updated_at: DateTime::from_timestamp(1_704_067_201, 0).unwrap_or_default(),
        };

        let status = project(&issue);

        assert_eq!(status.state, "closed");
        assert_eq!(status.last_update_timestamp, "2024-01-01T00:00:01Z");
    }
}
