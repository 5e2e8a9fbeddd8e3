use async_trait::async_trait;

use crate::error::{FailureCause, StageError, StageResult};
use crate::platform::types::{PullRequestDraft, PullRequestRef};
use crate::platform::StageAdapter;
use crate::workflow::types::Stage;

use super::client::{GitHubClient, NewPullRequest};

/// Opens a pull request from the freshly created branch.
pub struct PullRequestCreator {
    github: GitHubClient,
}

impl PullRequestCreator {
    pub fn new(github: GitHubClient) -> Self {
        Self { github }
    }

    async fn open(&self, draft: &PullRequestDraft) -> Result<PullRequestRef, FailureCause> {
        if draft.head_branch == draft.base_branch {
            return Err(FailureCause::IdenticalBranches(draft.head_branch.clone()));
        }

        let session = self.github.session(&draft.access_token)?;
        let created = session
            .create_pull_request(
                &draft.repository,
                &NewPullRequest {
                    title: &draft.title,
                    body: &draft.body,
                    head: &draft.head_branch,
                    base: &draft.base_branch,
                },
            )
            .await?;

        Ok(PullRequestRef {
            number: created.number,
            url: created.html_url,
        })
    }
}

#[async_trait]
impl StageAdapter for PullRequestCreator {
    type Request = PullRequestDraft;
    type Payload = PullRequestRef;

    async fn execute(&self, draft: PullRequestDraft) -> StageResult<PullRequestRef> {
        self.open(&draft)
            .await
            .map_err(|cause| StageError::new(Stage::CreateRequest, cause))
    }
}
