use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::{FailureCause, StageError, StageResult};
use crate::platform::github::{BranchMutator, GitHubClient, PullRequestCreator};
use crate::platform::greptile::GreptileClient;
use crate::platform::types::{AnalyzeRequest, MutateRequest, PullRequestDraft};
use crate::platform::{AnalyzeAdapter, CreateRequestAdapter, MutateAdapter};
use crate::workflow::events::{EventKind, PipelineEvent, PipelineObserver, TracingObserver};
use crate::workflow::parse::parse_change_set;
use crate::workflow::prompt;
use crate::workflow::types::{PipelineOutcome, Stage, Submission};

/// Returned when a submission arrives while another run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a submission is already in progress")]
pub struct PipelineBusy;

/// Runs analyze -> mutate -> create-request for one submission at a time.
///
/// Stages run strictly in order, each under its own timeout, and the first
/// failure ends the run. Nothing is retried: stage 2 and 3 have visible side
/// effects (a branch, a pull request) that a blind retry could duplicate.
///
/// Dropping the future returned by [`Orchestrator::run`] abandons the run.
/// A remote call already sent may still complete on the server; its result
/// is discarded with the future and never reaches the caller.
pub struct Orchestrator {
    analyze: Arc<AnalyzeAdapter>,
    mutate: Arc<MutateAdapter>,
    create_request: Arc<CreateRequestAdapter>,
    observer: Arc<dyn PipelineObserver>,
    stage_timeout: Duration,
    gate: Mutex<()>,
    runs: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        analyze: Arc<AnalyzeAdapter>,
        mutate: Arc<MutateAdapter>,
        create_request: Arc<CreateRequestAdapter>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            analyze,
            mutate,
            create_request,
            observer: Arc::new(TracingObserver),
            stage_timeout,
            gate: Mutex::new(()),
            runs: AtomicU64::new(0),
        }
    }

    /// Wire the Greptile and GitHub adapters from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let github = GitHubClient::new(&config.github);
        Self::new(
            Arc::new(GreptileClient::new(&config.greptile)),
            Arc::new(BranchMutator::new(github.clone())),
            Arc::new(PullRequestCreator::new(github)),
            config.pipeline.stage_timeout(),
        )
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Run the whole pipeline for one submission.
    ///
    /// Yields exactly one [`PipelineOutcome`] per accepted submission; a
    /// submission that overlaps a running one is turned away with
    /// [`PipelineBusy`] and nothing is sent anywhere.
    pub async fn run(&self, submission: &Submission) -> Result<PipelineOutcome, PipelineBusy> {
        let _guard = self.gate.try_lock().map_err(|_| PipelineBusy)?;
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::info!(
            run,
            repo = %submission.context.repository,
            source_branch = %submission.context.source_branch,
            new_branch = %submission.change_request.new_branch,
            "Pipeline started"
        );

        let outcome = self.run_stages(run, submission).await;
        self.emit(
            run,
            EventKind::Finished {
                status: outcome.status(),
            },
        );

        Ok(outcome)
    }

    async fn run_stages(&self, run: u64, submission: &Submission) -> PipelineOutcome {
        let context = &submission.context;
        let params = &submission.change_request;

        // Stage 1: analysis, decoded into a change set before it counts as a success.
        let analyze_request = AnalyzeRequest {
            api_key: context.analysis_credential.clone(),
            access_token: context.repo_access_token.clone(),
            repository: context.repository.clone(),
            branch: context.source_branch.clone(),
            query: prompt::analysis_query(
                &context.repository,
                &context.source_branch,
                submission.query.as_str(),
            ),
        };
        let changes = match self
            .stage(run, Stage::Analyze, async {
                let response = self.analyze.execute(analyze_request).await?;
                parse_change_set(&response).map_err(|cause| StageError::new(Stage::Analyze, cause))
            })
            .await
        {
            Ok(changes) => changes,
            Err(failure) => return PipelineOutcome::aborted(failure),
        };

        if changes.is_empty() {
            tracing::info!(run, "Analysis proposed no changes, skipping branch and pull request");
            return PipelineOutcome::NoChanges;
        }
        tracing::info!(run, files = changes.len(), "Analysis proposed changes");

        // Stage 2: the parsed change set moves into the request untouched.
        let mutate_request = MutateRequest {
            access_token: context.repo_access_token.clone(),
            repository: context.repository.clone(),
            source_branch: context.source_branch.clone(),
            new_branch: params.new_branch.clone(),
            commit_message: params.commit_message.clone(),
            changes,
        };
        let branch = match self
            .stage(run, Stage::Mutate, self.mutate.execute(mutate_request))
            .await
        {
            Ok(branch) => branch,
            Err(failure) => return PipelineOutcome::aborted(failure),
        };

        // Stage 3: head is the branch stage 2 created, base the original source branch.
        let draft = PullRequestDraft {
            access_token: context.repo_access_token.clone(),
            repository: context.repository.clone(),
            head_branch: branch.branch.clone(),
            base_branch: context.source_branch.clone(),
            title: params.title.clone(),
            body: params.body.clone(),
        };
        match self
            .stage(run, Stage::CreateRequest, self.create_request.execute(draft))
            .await
        {
            Ok(pull_request) => PipelineOutcome::Completed(pull_request),
            Err(failure) => {
                tracing::warn!(
                    run,
                    branch = %branch.branch,
                    commit = %branch.commit_sha,
                    "Branch was created but no pull request was opened"
                );
                PipelineOutcome::Aborted {
                    failure,
                    branch: Some(branch),
                }
            }
        }
    }

    /// Await one stage under the stage timeout, reporting its transitions.
    async fn stage<T, F>(&self, run: u64, stage: Stage, fut: F) -> StageResult<T>
    where
        F: Future<Output = StageResult<T>>,
    {
        self.emit(run, EventKind::StageStarted { stage });
        let started = Instant::now();

        let result = match tokio::time::timeout(self.stage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StageError::new(
                stage,
                FailureCause::Timeout {
                    secs: self.stage_timeout.as_secs(),
                },
            )),
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(_) => self.emit(run, EventKind::StageSucceeded { stage, elapsed }),
            Err(error) => self.emit(
                run,
                EventKind::StageFailed {
                    stage,
                    error: error.clone(),
                    elapsed,
                },
            ),
        }
        result
    }

    fn emit(&self, run: u64, kind: EventKind) {
        self.observer.on_event(&PipelineEvent {
            run,
            at: chrono::Utc::now(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::platform::types::{AnalysisResponse, BranchCommit, PullRequestRef};
    use crate::platform::StageAdapter;
    use crate::workflow::types::{
        AnalysisQuery, ChangeRequestParameters, ChangeSet, FileChange, OutcomeStatus,
        WorkflowContext,
    };

    /// Scripted adapter: pops one canned result per call and records requests.
    struct Scripted<Req, Out> {
        responses: StdMutex<VecDeque<StageResult<Out>>>,
        calls: StdMutex<Vec<Req>>,
        delay: Option<Duration>,
    }

    impl<Req, Out> Scripted<Req, Out> {
        fn new(responses: Vec<StageResult<Out>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                calls: StdMutex::new(Vec::new()),
                delay: None,
            })
        }

        fn slow(responses: Vec<StageResult<Out>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                calls: StdMutex::new(Vec::new()),
                delay: Some(delay),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl<Req, Out> StageAdapter for Scripted<Req, Out>
    where
        Req: Send + Sync + 'static,
        Out: Send + 'static,
    {
        type Request = Req;
        type Payload = Out;

        async fn execute(&self, request: Req) -> StageResult<Out> {
            self.calls.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("adapter called more often than scripted")
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: StdMutex<Vec<PipelineEvent>>,
    }

    impl PipelineObserver for RecordingObserver {
        fn on_event(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl RecordingObserver {
        fn kinds(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| match &e.kind {
                    EventKind::StageStarted { stage } => format!("started:{}", stage.as_str()),
                    EventKind::StageSucceeded { stage, .. } => format!("ok:{}", stage.as_str()),
                    EventKind::StageFailed { stage, .. } => format!("failed:{}", stage.as_str()),
                    EventKind::Finished { status } => format!("finished:{}", status.as_str()),
                })
                .collect()
        }
    }

    type Analyze = Scripted<AnalyzeRequest, AnalysisResponse>;
    type Mutate = Scripted<MutateRequest, BranchCommit>;
    type Create = Scripted<PullRequestDraft, PullRequestRef>;

    struct Harness {
        analyze: Arc<Analyze>,
        mutate: Arc<Mutate>,
        create: Arc<Create>,
        observer: Arc<RecordingObserver>,
        orchestrator: Orchestrator,
    }

    fn harness(analyze: Arc<Analyze>, mutate: Arc<Mutate>, create: Arc<Create>) -> Harness {
        harness_with_timeout(analyze, mutate, create, Duration::from_secs(5))
    }

    fn harness_with_timeout(
        analyze: Arc<Analyze>,
        mutate: Arc<Mutate>,
        create: Arc<Create>,
        timeout: Duration,
    ) -> Harness {
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = Orchestrator::new(
            analyze.clone(),
            mutate.clone(),
            create.clone(),
            timeout,
        )
        .with_observer(observer.clone());
        Harness {
            analyze,
            mutate,
            create,
            observer,
            orchestrator,
        }
    }

    fn submission() -> Submission {
        Submission {
            context: WorkflowContext::new("grep-key", "ghp_token", "org/repo", "main").unwrap(),
            query: AnalysisQuery::new("fix the bug").unwrap(),
            change_request: ChangeRequestParameters::new(
                "fix-123",
                "fix bug",
                "Fix bug",
                "Automated fix",
            )
            .unwrap(),
        }
    }

    fn two_changes() -> AnalysisResponse {
        AnalysisResponse(json!({
            "message": "```json\n{\"changes\": [{\"path\": \"src/b.rs\", \"content\": \"b\"}, {\"path\": \"src/a.rs\", \"content\": \"a\"}]}\n```",
            "sources": []
        }))
    }

    fn commit() -> BranchCommit {
        BranchCommit {
            branch: "fix-123".to_string(),
            commit_sha: "abc123".to_string(),
        }
    }

    fn pull_42() -> PullRequestRef {
        PullRequestRef {
            number: 42,
            url: "https://github.com/org/repo/pull/42".to_string(),
        }
    }

    fn fail(stage: Stage, cause: FailureCause) -> StageError {
        StageError::new(stage, cause)
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let h = harness(
            Analyze::new(vec![Ok(two_changes())]),
            Mutate::new(vec![Ok(commit())]),
            Create::new(vec![Ok(pull_42())]),
        );

        let outcome = h.orchestrator.run(&submission()).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::Completed(pull_42()));
        assert_eq!(outcome.status(), OutcomeStatus::Completed);
        assert_eq!(h.analyze.call_count(), 1);
        assert_eq!(h.mutate.call_count(), 1);
        assert_eq!(h.create.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stage_inputs_are_threaded_through() {
        let h = harness(
            Analyze::new(vec![Ok(two_changes())]),
            Mutate::new(vec![Ok(commit())]),
            Create::new(vec![Ok(pull_42())]),
        );

        h.orchestrator.run(&submission()).await.unwrap();

        let analyze_calls = h.analyze.calls.lock().unwrap();
        assert_eq!(analyze_calls[0].api_key.expose(), "grep-key");
        assert_eq!(analyze_calls[0].access_token.expose(), "ghp_token");
        assert_eq!(analyze_calls[0].repository.to_string(), "org/repo");
        assert_eq!(analyze_calls[0].branch, "main");
        assert!(analyze_calls[0].query.contains("fix the bug"));

        let mutate_calls = h.mutate.calls.lock().unwrap();
        let expected = ChangeSet::new(vec![
            FileChange {
                path: "src/b.rs".to_string(),
                content: "b".to_string(),
            },
            FileChange {
                path: "src/a.rs".to_string(),
                content: "a".to_string(),
            },
        ])
        .unwrap();
        assert_eq!(mutate_calls[0].changes, expected);
        assert_eq!(mutate_calls[0].source_branch, "main");
        assert_eq!(mutate_calls[0].new_branch, "fix-123");
        assert_eq!(mutate_calls[0].commit_message, "fix bug");

        let create_calls = h.create.calls.lock().unwrap();
        assert_eq!(create_calls[0].head_branch, "fix-123");
        assert_eq!(create_calls[0].base_branch, "main");
        assert_eq!(create_calls[0].title, "Fix bug");
        assert_eq!(create_calls[0].body, "Automated fix");
    }

    #[tokio::test]
    async fn test_analysis_failure_stops_pipeline() {
        let h = harness(
            Analyze::new(vec![Err(fail(
                Stage::Analyze,
                FailureCause::Rejected {
                    status: 500,
                    message: "boom".to_string(),
                },
            ))]),
            Mutate::new(vec![]),
            Create::new(vec![]),
        );

        let outcome = h.orchestrator.run(&submission()).await.unwrap();

        assert_eq!(outcome.failed_stage(), Some(Stage::Analyze));
        assert_eq!(h.mutate.call_count(), 0);
        assert_eq!(h.create.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_change_list_is_stage_one_failure() {
        let h = harness(
            Analyze::new(vec![Ok(AnalysisResponse(json!({
                "message": "{\"summary\": \"looks fine\"}",
                "sources": []
            })))]),
            Mutate::new(vec![]),
            Create::new(vec![]),
        );

        let outcome = h.orchestrator.run(&submission()).await.unwrap();

        match outcome {
            PipelineOutcome::Aborted {
                failure: StageError::Analysis(FailureCause::MalformedResponse(_)),
                branch: None,
            } => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.mutate.call_count(), 0);
        assert_eq!(h.create.call_count(), 0);
    }

    #[tokio::test]
    async fn test_branch_exists_stops_before_pull_request() {
        let h = harness(
            Analyze::new(vec![Ok(two_changes())]),
            Mutate::new(vec![Err(fail(
                Stage::Mutate,
                FailureCause::BranchExists("fix-123".to_string()),
            ))]),
            Create::new(vec![]),
        );

        let outcome = h.orchestrator.run(&submission()).await.unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::aborted(StageError::Mutation(FailureCause::BranchExists(
                "fix-123".to_string()
            )))
        );
        assert_eq!(h.create.call_count(), 0);
    }

    #[tokio::test]
    async fn test_pull_request_failure_reports_leftover_branch() {
        let h = harness(
            Analyze::new(vec![Ok(two_changes())]),
            Mutate::new(vec![Ok(commit())]),
            Create::new(vec![Err(fail(
                Stage::CreateRequest,
                FailureCause::Transport("connection reset".to_string()),
            ))]),
        );

        let outcome = h.orchestrator.run(&submission()).await.unwrap();

        match outcome {
            PipelineOutcome::Aborted { failure, branch } => {
                assert_eq!(failure.stage(), Stage::CreateRequest);
                assert_eq!(branch, Some(commit()));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_change_list_short_circuits() {
        let h = harness(
            Analyze::new(vec![Ok(AnalysisResponse(json!({
                "message": "{\"changes\": []}",
                "sources": []
            })))]),
            Mutate::new(vec![]),
            Create::new(vec![]),
        );

        let outcome = h.orchestrator.run(&submission()).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::NoChanges);
        assert_eq!(h.mutate.call_count(), 0);
        assert_eq!(h.create.call_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_analysis_failure_classified_identically() {
        let cause = FailureCause::Rejected {
            status: 404,
            message: "repository not indexed".to_string(),
        };
        let h = harness(
            Analyze::new(vec![
                Err(fail(Stage::Analyze, cause.clone())),
                Err(fail(Stage::Analyze, cause)),
            ]),
            Mutate::new(vec![]),
            Create::new(vec![]),
        );

        let first = h.orchestrator.run(&submission()).await.unwrap();
        let second = h.orchestrator.run(&submission()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.mutate.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stage_timeout_is_stage_failure() {
        let h = harness_with_timeout(
            Analyze::new(vec![Ok(two_changes())]),
            Mutate::slow(vec![Ok(commit())], Duration::from_millis(500)),
            Create::new(vec![]),
            Duration::from_millis(50),
        );

        let outcome = h.orchestrator.run(&submission()).await.unwrap();

        match outcome {
            PipelineOutcome::Aborted {
                failure: StageError::Mutation(FailureCause::Timeout { .. }),
                branch: None,
            } => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.create.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_submission_is_rejected() {
        let h = harness(
            Analyze::slow(vec![Ok(two_changes())], Duration::from_millis(200)),
            Mutate::new(vec![Ok(commit())]),
            Create::new(vec![Ok(pull_42())]),
        );
        let submission = submission();

        let (first, second) = tokio::join!(h.orchestrator.run(&submission), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.orchestrator.run(&submission).await
        });

        assert_eq!(first.unwrap(), PipelineOutcome::Completed(pull_42()));
        assert_eq!(second.unwrap_err(), PipelineBusy);
        assert_eq!(h.analyze.call_count(), 1);
        assert!(!h.orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_running_submission_is_reported_at_shutdown() {
        let h = harness(
            Analyze::slow(vec![Ok(two_changes())], Duration::from_millis(200)),
            Mutate::new(vec![Ok(commit())]),
            Create::new(vec![Ok(pull_42())]),
        );
        let submission = submission();

        let (outcome, in_flight) = tokio::join!(h.orchestrator.run(&submission), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            crate::shutdown::report_in_flight(&h.orchestrator)
        });

        assert!(in_flight);
        assert_eq!(outcome.unwrap(), PipelineOutcome::Completed(pull_42()));
        assert!(!crate::shutdown::report_in_flight(&h.orchestrator));
    }

    #[tokio::test]
    async fn test_events_follow_stage_order() {
        let h = harness(
            Analyze::new(vec![Ok(two_changes())]),
            Mutate::new(vec![Err(fail(
                Stage::Mutate,
                FailureCause::BranchExists("fix-123".to_string()),
            ))]),
            Create::new(vec![]),
        );

        h.orchestrator.run(&submission()).await.unwrap();

        assert_eq!(
            h.observer.kinds(),
            [
                "started:analyze",
                "ok:analyze",
                "started:mutate",
                "failed:mutate",
                "finished:aborted",
            ]
        );
        let events = h.observer.events.lock().unwrap();
        assert!(events.iter().all(|e| e.run == 1));
    }

    #[tokio::test]
    async fn test_full_run_emits_every_stage() {
        let h = harness(
            Analyze::new(vec![Ok(two_changes())]),
            Mutate::new(vec![Ok(commit())]),
            Create::new(vec![Ok(pull_42())]),
        );

        h.orchestrator.run(&submission()).await.unwrap();

        let kinds = h.observer.kinds();
        for stage in Stage::ALL {
            assert!(kinds.contains(&format!("started:{}", stage.as_str())));
            assert!(kinds.contains(&format!("ok:{}", stage.as_str())));
        }
        assert_eq!(kinds.last().map(String::as_str), Some("finished:completed"));
    }
}
