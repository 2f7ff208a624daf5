//! Submission lifecycle coordinator
//!
//! Drives `save`, `test`, `submit` and `reset` on a student's submission:
//!
//! ```text
//! Empty --save/test--> Draft --submit (visible gate passed)--> Complete
//!   ^                    |
//!   +------reset---------+
//! ```
//!
//! Every action runs with an explicit [`ActionContext`] under a lock keyed
//! by (student, assignment). Sandboxes are released before anything is
//! persisted, and finalisation is a single compare-and-set transaction in
//! the store, so a submission is graded at most once.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::locks::KeyedLocks;
use crate::{
    constants::{MAX_SOURCE_CODE_SIZE, SUBMISSIONS_PER_PAGE},
    db::SubmissionStore,
    error::{AppError, AppResult},
    handlers::submissions::response::{
        DraftView, JudgementView, SubmissionSummary, SubmissionView, SubmissionsListResponse,
        TestRunView,
    },
    middleware::auth::AuthenticatedUser,
    models::{Assignment, Language, LanguageSummary, Submission, SubmissionDraft, SubmissionState},
    runner::{
        all_passed, total_runtime, CompilationResult, EvaluationAction, ExecutionBackend,
        Runner, RunnerLimits, TestRunResult,
    },
    utils::validation::validate_filename,
};

/// Source file uploaded with an action
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedSource {
    pub filename: String,
    pub content: String,
}

/// Raw action payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionInput {
    pub language_id: Option<Uuid>,
    pub source: Option<String>,
    pub filename: Option<String>,
    /// Overrides `source` and `filename`
    pub upload: Option<UploadedSource>,
}

impl SubmissionInput {
    /// Nothing was sent; the action uses the stored draft
    pub fn is_empty(&self) -> bool {
        self.language_id.is_none() && self.source.is_none() && self.upload.is_none()
    }
}

/// Validated payload
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInput {
    pub language: Language,
    pub source: String,
    pub filename: String,
}

/// Extract language, source and filename from an action payload.
///
/// All-or-nothing: any failure returns a validation error and nothing is
/// applied.
pub fn parse_input(
    assignment: &Assignment,
    known_languages: &[Language],
    student_id: &Uuid,
    input: &SubmissionInput,
) -> AppResult<ParsedInput> {
    let language_id = input
        .language_id
        .ok_or_else(|| AppError::Validation("No language selected".to_string()))?;

    let language = match assignment.allowed_language(&language_id) {
        Some(language) => language.clone(),
        None => {
            let known = known_languages
                .iter()
                .find(|l| l.id == language_id)
                .ok_or_else(|| AppError::Validation("No language selected".to_string()))?;
            return Err(AppError::Validation(format!(
                "The language {} is not allowed for this assignment",
                known.name
            )));
        }
    };

    let (source, filename) = match &input.upload {
        Some(upload) => (upload.content.clone(), upload.filename.clone()),
        None => {
            let source = input.source.clone().unwrap_or_default();
            let filename = input
                .filename
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| {
                    format!("{}_{}.{}", student_id, assignment.id, language.extension_src)
                });
            (source, filename)
        }
    };

    if source.trim().is_empty() {
        return Err(AppError::Validation(
            "Source code is empty, not submitting".to_string(),
        ));
    }
    if source.contains('\0') {
        return Err(AppError::Validation(
            "Source code must not contain NUL bytes".to_string(),
        ));
    }
    if source.len() > MAX_SOURCE_CODE_SIZE {
        return Err(AppError::Validation(format!(
            "Source code exceeds {} bytes",
            MAX_SOURCE_CODE_SIZE
        )));
    }
    validate_filename(&filename).map_err(AppError::Validation)?;

    Ok(ParsedInput {
        language,
        source,
        filename,
    })
}

/// Which submission an action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTarget {
    /// The caller's open draft for an assignment, created on demand
    Assignment(Uuid),
    /// A specific submission owned by the caller
    Submission(Uuid),
}

/// Everything an action needs, resolved up front
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub student: AuthenticatedUser,
    pub assignment: Assignment,
    pub submission: Option<Submission>,
}

/// Kind of action performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Save,
    Test,
    Submit,
    Reset,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Test => "test",
            Self::Submit => "submit",
            Self::Reset => "reset",
        }
    }
}

impl From<EvaluationAction> for ActionKind {
    fn from(action: EvaluationAction) -> Self {
        match action {
            EvaluationAction::Test => Self::Test,
            EvaluationAction::Submit => Self::Submit,
        }
    }
}

/// Transition applied by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Preconditions unmet; nothing happened
    Unchanged,
    Saved,
    CompilationFailed,
    /// A visible test failed; submitting is blocked
    TestsFailed,
    TestsPassed,
    Submitted,
    Reset,
    ResetFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Ok,
    Info,
    Error,
}

/// Flash-style notice for the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

impl Message {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Ok,
            text: text.into(),
        }
    }

    fn info(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }
}

/// Structured result of an action
#[derive(Debug, Serialize)]
pub struct ActionOutcome {
    pub action: ActionKind,
    pub status: ActionStatus,
    pub state: SubmissionState,
    pub messages: Vec<Message>,
    pub compilation: Option<CompilationResult>,
    pub testruns: Vec<TestRunView>,
    pub runtime_secs: Option<f64>,
    pub submission: Option<SubmissionSummary>,
    pub redirect: Option<String>,
}

impl ActionOutcome {
    fn new(action: ActionKind, status: ActionStatus, submission: Option<&Submission>) -> Self {
        Self {
            action,
            status,
            state: SubmissionState::of(submission),
            messages: Vec::new(),
            compilation: None,
            testruns: Vec::new(),
            runtime_secs: None,
            submission: submission.map(SubmissionSummary::from),
            redirect: None,
        }
    }

    fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }
}

/// What the sandbox produced before anything is persisted
enum Evaluation {
    CompilationFailed(CompilationResult),
    GateFailed {
        compilation: Option<CompilationResult>,
        visible: Vec<TestRunResult>,
    },
    GatePassed {
        compilation: Option<CompilationResult>,
        visible: Vec<TestRunResult>,
        /// Every test, only for submit
        full: Option<Vec<TestRunResult>>,
    },
}

/// Coordinates the submission lifecycle
pub struct SubmissionService {
    store: Arc<dyn SubmissionStore>,
    backend: Arc<dyn ExecutionBackend>,
    limits: RunnerLimits,
    locks: KeyedLocks<(Uuid, Uuid)>,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        backend: Arc<dyn ExecutionBackend>,
        limits: RunnerLimits,
    ) -> Self {
        Self {
            store,
            backend,
            limits,
            locks: KeyedLocks::new(),
        }
    }

    /// Store the payload as the current draft without running anything
    pub async fn save(
        &self,
        student: &AuthenticatedUser,
        target: ActionTarget,
        input: SubmissionInput,
    ) -> AppResult<ActionOutcome> {
        let assignment_id = self.assignment_of(student, target).await?;
        let _guard = self.locks.lock((student.id, assignment_id)).await;
        let ctx = self.context(student, target).await?;

        if let Some(outcome) = Self::refuse_complete(&ctx, ActionKind::Save) {
            return Ok(outcome);
        }
        Self::ensure_active(&ctx.assignment)?;

        let submission = self.apply_input(&ctx, &input).await?;
        let Some(submission) = submission.or(ctx.submission) else {
            return Ok(ActionOutcome::new(ActionKind::Save, ActionStatus::Unchanged, None)
                .with_message(Message::info("Nothing to save")));
        };

        tracing::info!(
            submission_id = %submission.id,
            assignment_id = %assignment_id,
            student_id = %student.id,
            action = "save",
            "Draft saved"
        );

        Ok(ActionOutcome::new(ActionKind::Save, ActionStatus::Saved, Some(&submission))
            .with_message(Message::ok("Saved")))
    }

    /// Compile and run the visible tests; nothing is persisted but the draft
    pub async fn test(
        &self,
        student: &AuthenticatedUser,
        target: ActionTarget,
        input: SubmissionInput,
    ) -> AppResult<ActionOutcome> {
        self.evaluate(student, target, input, EvaluationAction::Test).await
    }

    /// Pass the visible gate, run every test and grade the submission once
    pub async fn submit(
        &self,
        student: &AuthenticatedUser,
        target: ActionTarget,
        input: SubmissionInput,
    ) -> AppResult<ActionOutcome> {
        self.evaluate(student, target, input, EvaluationAction::Submit).await
    }

    /// Discard an incomplete submission
    pub async fn reset(
        &self,
        student: &AuthenticatedUser,
        target: ActionTarget,
    ) -> AppResult<ActionOutcome> {
        let assignment_id = self.assignment_of(student, target).await?;
        let _guard = self.locks.lock((student.id, assignment_id)).await;
        let ctx = self.context(student, target).await?;

        let Some(submission) = &ctx.submission else {
            return Ok(ActionOutcome::new(ActionKind::Reset, ActionStatus::Unchanged, None)
                .with_message(Message::info("Nothing to reset")));
        };
        if submission.complete {
            return Ok(
                ActionOutcome::new(ActionKind::Reset, ActionStatus::Unchanged, Some(submission))
                    .with_message(Message::error("A completed submission cannot be reset")),
            );
        }
        Self::ensure_active(&ctx.assignment)?;

        let redirect = Some(format!("/assignments/{}/submission", assignment_id));
        let outcome = match self.store.delete_draft(submission.id).await {
            Ok(true) => {
                tracing::info!(
                    submission_id = %submission.id,
                    assignment_id = %assignment_id,
                    student_id = %student.id,
                    action = "reset",
                    "Submission reset"
                );
                ActionOutcome::new(ActionKind::Reset, ActionStatus::Reset, None)
                    .with_message(Message::ok("Resetted"))
            }
            Ok(false) => {
                tracing::warn!(
                    submission_id = %submission.id,
                    "Reset matched no incomplete submission"
                );
                ActionOutcome::new(ActionKind::Reset, ActionStatus::ResetFailed, Some(submission))
                    .with_message(Message::error("Reset failed"))
            }
            Err(e) => {
                tracing::warn!(submission_id = %submission.id, error = %e, "Reset failed");
                ActionOutcome::new(ActionKind::Reset, ActionStatus::ResetFailed, Some(submission))
                    .with_message(Message::error("Reset failed"))
            }
        };

        Ok(ActionOutcome { redirect, ..outcome })
    }

    /// Permanent read view. Students see their own submissions only and
    /// never the output of hidden tests.
    pub async fn show(
        &self,
        viewer: &AuthenticatedUser,
        submission_id: Uuid,
    ) -> AppResult<SubmissionView> {
        let submission = self
            .store
            .find_submission(submission_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

        let privileged = viewer.is_privileged();
        if submission.student_id != viewer.id && !privileged {
            return Err(AppError::Forbidden(
                "You may only view your own submissions".to_string(),
            ));
        }

        let assignment = self.load_assignment(submission.assignment_id).await?;
        let testruns = submission
            .testruns
            .iter()
            .map(|run| {
                let test = assignment.tests.iter().find(|t| t.id == run.test_id);
                TestRunView::from_run(run, test, privileged)
            })
            .collect();

        let language = match assignment
            .allowed_languages
            .iter()
            .find(|l| l.id == submission.language_id)
        {
            Some(language) => Some(LanguageSummary::from(language)),
            None => self
                .store
                .list_languages()
                .await?
                .iter()
                .find(|l| l.id == submission.language_id)
                .map(LanguageSummary::from),
        };

        let judgement = self
            .store
            .find_judgement(submission.id)
            .await?
            .map(|j| JudgementView::new(&j, &submission.source));

        Ok(SubmissionView {
            submission: SubmissionSummary::from(&submission),
            assignment_name: assignment.name.clone(),
            language,
            editable: submission.is_editable(&assignment),
            source: submission.source,
            testruns,
            judgement,
        })
    }

    /// The caller's draft for an assignment
    pub async fn current(
        &self,
        student: &AuthenticatedUser,
        assignment_id: Uuid,
    ) -> AppResult<DraftView> {
        let assignment = self.load_assignment(assignment_id).await?;
        let draft = self.store.find_draft(student.id, assignment_id).await?;

        let location = draft.as_ref().map(|s| {
            if s.is_editable(&assignment) {
                format!("/assignments/{}/submission", assignment_id)
            } else {
                format!("/submissions/{}", s.id)
            }
        });

        Ok(DraftView {
            assignment_id,
            assignment_name: assignment.name.clone(),
            state: SubmissionState::of(draft.as_ref()),
            editable: assignment.is_active(),
            allowed_languages: assignment
                .allowed_languages
                .iter()
                .map(LanguageSummary::from)
                .collect(),
            submission: draft.as_ref().map(SubmissionSummary::from),
            source: draft.map(|s| s.source),
            location,
        })
    }

    /// Page through submissions, newest first. Students only see their own.
    pub async fn list(
        &self,
        viewer: &AuthenticatedUser,
        assignment_id: Option<Uuid>,
        student_id: Option<Uuid>,
        page: u32,
    ) -> AppResult<SubmissionsListResponse> {
        let page = page.max(1);
        let per_page = SUBMISSIONS_PER_PAGE;
        let offset = ((page - 1) * per_page) as i64;

        let student_filter = if viewer.is_privileged() {
            student_id
        } else {
            Some(viewer.id)
        };

        let (submissions, total) = self
            .store
            .list_submissions(student_filter, assignment_id, offset, per_page as i64)
            .await?;

        Ok(SubmissionsListResponse {
            submissions: submissions.iter().map(SubmissionSummary::from).collect(),
            total,
            page,
            per_page,
        })
    }

    async fn evaluate(
        &self,
        student: &AuthenticatedUser,
        target: ActionTarget,
        input: SubmissionInput,
        action: EvaluationAction,
    ) -> AppResult<ActionOutcome> {
        let kind = ActionKind::from(action);
        let assignment_id = self.assignment_of(student, target).await?;
        let _guard = self.locks.lock((student.id, assignment_id)).await;
        let ctx = self.context(student, target).await?;

        if let Some(outcome) = Self::refuse_complete(&ctx, kind) {
            return Ok(outcome);
        }
        Self::ensure_active(&ctx.assignment)?;

        let saved = self.apply_input(&ctx, &input).await?;
        let submission = match saved.or_else(|| ctx.submission.clone()) {
            Some(s) if !s.source.trim().is_empty() => s,
            other => {
                return Ok(ActionOutcome::new(kind, ActionStatus::Unchanged, other.as_ref())
                    .with_message(Message::error("Source code is empty, not submitting")));
            }
        };

        let language = ctx
            .assignment
            .allowed_language(&submission.language_id)
            .cloned()
            .ok_or_else(|| {
                AppError::Validation(
                    "The language of this submission is not allowed for this assignment"
                        .to_string(),
                )
            })?;

        tracing::info!(
            submission_id = %submission.id,
            assignment_id = %assignment_id,
            student_id = %student.id,
            action = kind.as_str(),
            "Evaluating submission"
        );

        let mut runner =
            Runner::acquire(self.backend.as_ref(), &submission, &language, self.limits).await?;
        let evaluation = Self::run_evaluation(&mut runner, &ctx.assignment, action).await;
        if let Err(e) = runner.release().await {
            tracing::warn!(
                submission_id = %submission.id,
                error = %e,
                "Failed to release sandbox"
            );
        }
        let evaluation = evaluation?;

        let reveal_hidden = student.is_privileged();
        let views = |results: &[TestRunResult]| -> Vec<TestRunView> {
            results
                .iter()
                .map(|r| {
                    let test = ctx.assignment.tests.iter().find(|t| t.id == r.test_id);
                    TestRunView::from_result(r, test, reveal_hidden)
                })
                .collect()
        };

        let outcome = match evaluation {
            Evaluation::CompilationFailed(compilation) => {
                tracing::info!(
                    submission_id = %submission.id,
                    returncode = compilation.returncode,
                    timed_out = compilation.timed_out,
                    "Compilation failed"
                );
                let mut outcome =
                    ActionOutcome::new(kind, ActionStatus::CompilationFailed, Some(&submission))
                        .with_message(Message::error("Compilation failed, see below"));
                outcome.compilation = Some(compilation);
                outcome
            }
            Evaluation::GateFailed { compilation, visible } => {
                let mut outcome =
                    ActionOutcome::new(kind, ActionStatus::TestsFailed, Some(&submission))
                        .with_message(Message::error(
                            "Test run did not run successfully, you may not submit",
                        ));
                outcome.compilation = compilation;
                outcome.runtime_secs = Some(total_runtime(&visible));
                outcome.testruns = views(&visible);
                outcome
            }
            Evaluation::GatePassed { compilation, visible, full: None } => {
                let runtime = total_runtime(&visible);
                let mut outcome =
                    ActionOutcome::new(kind, ActionStatus::TestsPassed, Some(&submission))
                        .with_message(Message::ok(format!(
                            "Tests successfully run in {:.6}",
                            runtime
                        )));
                outcome.compilation = compilation;
                outcome.runtime_secs = Some(runtime);
                outcome.testruns = views(&visible);
                outcome
            }
            Evaluation::GatePassed { compilation, full: Some(full), .. } => {
                let runtime = total_runtime(&full);
                let result = all_passed(&full);
                let runs: Vec<_> = full.iter().map(TestRunResult::to_new_test_run).collect();

                let graded = self.store.finalize(submission.id, &runs, result).await?;
                tracing::info!(
                    submission_id = %graded.id,
                    assignment_id = %assignment_id,
                    student_id = %student.id,
                    result,
                    testruns = runs.len(),
                    runtime_secs = runtime,
                    "Submission graded"
                );

                let message = if result {
                    Message::ok(format!("All tests completed. Runtime: {:.6}", runtime))
                } else {
                    Message::error(format!("Tests failed. Runtime: {:.6}", runtime))
                };
                let mut outcome = ActionOutcome::new(kind, ActionStatus::Submitted, Some(&graded))
                    .with_message(message);
                outcome.compilation = compilation;
                outcome.runtime_secs = Some(runtime);
                outcome.testruns = views(&full);
                outcome.redirect = Some(format!("/submissions/{}", graded.id));
                outcome
            }
        };

        Ok(outcome)
    }

    /// Compile, gate on the visible tests and, for submit, run everything
    async fn run_evaluation(
        runner: &mut Runner,
        assignment: &Assignment,
        action: EvaluationAction,
    ) -> AppResult<Evaluation> {
        let compilation = runner.compile().await?;
        if let Some(result) = &compilation {
            if !result.succeeded() {
                return Ok(Evaluation::CompilationFailed(result.clone()));
            }
        }

        let visible = runner.test_visible(assignment).await?;
        if !all_passed(&visible) {
            return Ok(Evaluation::GateFailed {
                compilation,
                visible,
            });
        }

        let full = match action {
            EvaluationAction::Test => None,
            EvaluationAction::Submit => Some(runner.test(assignment).await?),
        };

        Ok(Evaluation::GatePassed {
            compilation,
            visible,
            full,
        })
    }

    /// Parse and store the payload; `None` if the payload was empty
    async fn apply_input(
        &self,
        ctx: &ActionContext,
        input: &SubmissionInput,
    ) -> AppResult<Option<Submission>> {
        if input.is_empty() {
            return Ok(None);
        }

        let known = if input
            .language_id
            .is_some_and(|id| ctx.assignment.allowed_language(&id).is_none())
        {
            self.store.list_languages().await?
        } else {
            Vec::new()
        };

        let parsed = parse_input(&ctx.assignment, &known, &ctx.student.id, input)?;
        let draft = SubmissionDraft {
            id: ctx.submission.as_ref().map(|s| s.id),
            student_id: ctx.student.id,
            assignment_id: ctx.assignment.id,
            language_id: parsed.language.id,
            source: parsed.source,
            filename: parsed.filename,
        };

        Ok(Some(self.store.save_draft(&draft).await?))
    }

    /// Outcome for actions on a graded submission
    fn refuse_complete(ctx: &ActionContext, kind: ActionKind) -> Option<ActionOutcome> {
        let submission = ctx.submission.as_ref().filter(|s| s.complete)?;
        Some(
            ActionOutcome::new(kind, ActionStatus::Unchanged, Some(submission)).with_message(
                Message::info("This submission is complete and can no longer be changed"),
            ),
        )
    }

    fn ensure_active(assignment: &Assignment) -> AppResult<()> {
        if assignment.is_active() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Assignment is not active".to_string()))
        }
    }

    async fn load_assignment(&self, id: Uuid) -> AppResult<Assignment> {
        self.store
            .load_assignment(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))
    }

    /// Assignment an action target belongs to, checking ownership
    async fn assignment_of(
        &self,
        student: &AuthenticatedUser,
        target: ActionTarget,
    ) -> AppResult<Uuid> {
        match target {
            ActionTarget::Assignment(id) => Ok(id),
            ActionTarget::Submission(id) => {
                Ok(self.owned_submission(student, id).await?.assignment_id)
            }
        }
    }

    /// Resolve the context; called with the lock held
    async fn context(
        &self,
        student: &AuthenticatedUser,
        target: ActionTarget,
    ) -> AppResult<ActionContext> {
        let (assignment_id, submission) = match target {
            ActionTarget::Assignment(id) => (id, self.store.find_draft(student.id, id).await?),
            ActionTarget::Submission(id) => {
                let submission = self.owned_submission(student, id).await?;
                (submission.assignment_id, Some(submission))
            }
        };

        Ok(ActionContext {
            student: student.clone(),
            assignment: self.load_assignment(assignment_id).await?,
            submission,
        })
    }

    async fn owned_submission(
        &self,
        student: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<Submission> {
        let submission = self
            .store
            .find_submission(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

        if submission.student_id != student.id {
            return Err(AppError::Forbidden(
                "You may only change your own submissions".to_string(),
            ));
        }
        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::constants::{roles, TIMEOUT_EXIT_CODE};
    use crate::db::store::MockSubmissionStore;
    use crate::runner::ProcessBackend;
    use crate::test_utils::{fixtures, MemoryStore, RecordingBackend};

    struct Harness {
        store: Arc<MemoryStore>,
        backend: Arc<RecordingBackend<ProcessBackend>>,
        service: Arc<SubmissionService>,
        assignment: Assignment,
        _dir: TempDir,
    }

    fn harness(assignment: Assignment) -> Harness {
        harness_with_limits(assignment, fixtures::limits())
    }

    fn harness_with_limits(assignment: Assignment, limits: RunnerLimits) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.add_assignment(assignment.clone());
        let backend = Arc::new(RecordingBackend::new(fixtures::process_backend(dir.path())));
        let service = Arc::new(SubmissionService::new(
            store.clone(),
            backend.clone(),
            limits,
        ));
        Harness {
            store,
            backend,
            service,
            assignment,
            _dir: dir,
        }
    }

    fn input(source: &str) -> SubmissionInput {
        SubmissionInput {
            language_id: Some(fixtures::SHELL_LANGUAGE_ID),
            source: Some(source.to_string()),
            ..Default::default()
        }
    }

    /// Two visible tests and one hidden test, all expecting 42
    fn answer_assignment() -> Assignment {
        fixtures::assignment(vec![
            fixtures::test_case(1, "a\n", "42", true),
            fixtures::test_case(2, "b\n", "42", true),
            fixtures::test_case(3, "c\n", "42", false),
        ])
    }

    fn target(h: &Harness) -> ActionTarget {
        ActionTarget::Assignment(h.assignment.id)
    }

    #[tokio::test]
    async fn test_then_submit_correct_solution() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let outcome = h.service.test(&student, target(&h), input("echo 42")).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::TestsPassed);
        assert_eq!(outcome.state, SubmissionState::Draft);
        assert_eq!(outcome.testruns.len(), 2);
        assert!(outcome.messages[0].text.starts_with("Tests successfully run in"));
        assert_eq!(h.store.testrun_count(), 0);

        let outcome = h
            .service
            .submit(&student, target(&h), SubmissionInput::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, ActionStatus::Submitted);
        assert_eq!(outcome.testruns.len(), 3);

        let id = outcome.submission.as_ref().unwrap().id;
        assert_eq!(outcome.redirect, Some(format!("/submissions/{}", id)));

        let stored = h.store.submission(id).unwrap();
        assert!(stored.complete);
        assert_eq!(stored.result, Some(true));
        assert_eq!(stored.testruns.len(), 3);
        assert_eq!(stored.derive_result(&h.assignment.tests), Some(true));

        let recording = h.backend.recording();
        assert_eq!(recording.acquired, 2);
        assert_eq!(recording.released, 2);
    }

    #[tokio::test]
    async fn test_failing_visible_test_blocks_submit() {
        let h = harness(answer_assignment());
        let student = fixtures::student();
        let source = "read x\nif [ \"$x\" = b ]; then echo 41; else echo 42; fi\n";

        let outcome = h.service.test(&student, target(&h), input(source)).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::TestsFailed);
        assert_eq!(
            outcome.messages[0].text,
            "Test run did not run successfully, you may not submit"
        );

        let outcome = h
            .service
            .submit(&student, target(&h), SubmissionInput::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, ActionStatus::TestsFailed);
        assert_eq!(outcome.state, SubmissionState::Draft);
        assert_eq!(h.store.testrun_count(), 0);
        assert!(h.store.submissions().iter().all(|s| !s.complete));

        let hidden = h.assignment.tests[2].id;
        assert!(!h.backend.recording().executed.contains(&hidden));
    }

    #[tokio::test]
    async fn test_hidden_failure_fails_grade_but_completes() {
        let mut assignment = answer_assignment();
        assignment.tests[2].output_data = "43".to_string();
        let h = harness(assignment);
        let student = fixtures::student();

        let outcome = h.service.submit(&student, target(&h), input("echo 42")).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::Submitted);
        assert!(outcome.messages[0].text.starts_with("Tests failed. Runtime:"));
        assert_eq!(outcome.submission.as_ref().unwrap().result, Some(false));

        // Students learn the hidden test failed, not what it printed
        let hidden = outcome.testruns.iter().find(|r| !r.visible).unwrap();
        assert!(!hidden.passed);
        assert_eq!(hidden.output_data, None);
        assert_eq!(hidden.expected_output, None);
    }

    #[tokio::test]
    async fn test_disallowed_language_is_rejected_without_state_change() {
        let h = harness(answer_assignment());
        let other = fixtures::other_language();
        h.store.add_language(other.clone());
        let student = fixtures::student();

        let payload = SubmissionInput {
            language_id: Some(other.id),
            ..input("+++.")
        };
        let err = h.service.test(&student, target(&h), payload).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "The language Brainfuck is not allowed for this assignment"
        );
        assert!(h.store.submissions().is_empty());
        assert_eq!(h.backend.recording().acquired, 0);

        // An existing draft keeps its source
        h.service.save(&student, target(&h), input("echo 42")).await.unwrap();
        let payload = SubmissionInput {
            language_id: Some(other.id),
            ..input("+++.")
        };
        assert!(h.service.submit(&student, target(&h), payload).await.is_err());
        let drafts = h.store.submissions();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].source, "echo 42");
        assert!(!drafts[0].complete);
    }

    #[tokio::test]
    async fn test_missing_language_and_empty_source() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let payload = SubmissionInput {
            language_id: None,
            ..input("echo 42")
        };
        let err = h.service.test(&student, target(&h), payload).await.unwrap_err();
        assert_eq!(err.to_string(), "No language selected");

        let err = h.service.test(&student, target(&h), input("  \n")).await.unwrap_err();
        assert_eq!(err.to_string(), "Source code is empty, not submitting");

        let outcome = h
            .service
            .test(&student, target(&h), SubmissionInput::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, ActionStatus::Unchanged);
        assert!(h.store.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_assignment_without_tests_passes_vacuously() {
        let h = harness(fixtures::assignment(vec![]));
        let student = fixtures::student();

        let outcome = h.service.test(&student, target(&h), input("echo hi")).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::TestsPassed);

        let outcome = h
            .service
            .submit(&student, target(&h), SubmissionInput::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, ActionStatus::Submitted);
        assert_eq!(outcome.submission.unwrap().result, Some(true));
        assert_eq!(h.store.testrun_count(), 0);
    }

    #[tokio::test]
    async fn test_compilation_failure_runs_nothing() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let outcome = h
            .service
            .submit(&student, target(&h), input("if then fi (\n"))
            .await
            .unwrap();
        assert_eq!(outcome.status, ActionStatus::CompilationFailed);
        assert_eq!(outcome.messages[0].text, "Compilation failed, see below");
        assert!(!outcome.compilation.unwrap().succeeded());
        assert!(outcome.testruns.is_empty());

        let recording = h.backend.recording();
        assert!(recording.executed.is_empty());
        assert_eq!(recording.released, recording.acquired);
        assert_eq!(h.store.testrun_count(), 0);
    }

    #[tokio::test]
    async fn test_compile_timeout_is_a_compilation_failure() {
        let mut assignment = answer_assignment();
        assignment.allowed_languages[0].compile_command = Some("sleep 5".to_string());
        let limits = RunnerLimits {
            compile_timeout: std::time::Duration::from_millis(300),
            ..fixtures::limits()
        };
        let h = harness_with_limits(assignment, limits);
        let student = fixtures::student();

        let started = std::time::Instant::now();
        let outcome = h.service.submit(&student, target(&h), input("echo 42")).await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(4));

        assert_eq!(outcome.status, ActionStatus::CompilationFailed);
        let compilation = outcome.compilation.unwrap();
        assert!(compilation.timed_out);
        assert_eq!(compilation.returncode, TIMEOUT_EXIT_CODE);
        assert!(outcome.testruns.is_empty());

        let recording = h.backend.recording();
        assert!(recording.executed.is_empty());
        assert_eq!(recording.released, recording.acquired);
        assert_eq!(h.store.testrun_count(), 0);
        assert!(h.store.submissions().iter().all(|s| !s.complete));
    }

    #[tokio::test]
    async fn test_nul_bytes_in_source_are_rejected() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let err = h.service.test(&student, target(&h), input("echo 4\02")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "Source code must not contain NUL bytes");

        let payload = SubmissionInput {
            filename: Some("a\0.sh".to_string()),
            ..input("echo 42")
        };
        let err = h.service.save(&student, target(&h), payload).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert!(h.store.submissions().is_empty());
        assert_eq!(h.backend.recording().acquired, 0);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failing_result() {
        let mut assignment = fixtures::assignment(vec![fixtures::test_case(1, "", "42", true)]);
        assignment.timeout_secs = Some(0.3);
        let h = harness(assignment);
        let student = fixtures::student();

        let outcome = h
            .service
            .test(&student, target(&h), input("sleep 5\necho 42\n"))
            .await
            .unwrap();
        assert_eq!(outcome.status, ActionStatus::TestsFailed);
        assert!(outcome.testruns[0].timed_out);
        assert!(!outcome.testruns[0].passed);
    }

    #[tokio::test]
    async fn test_complete_submission_is_frozen() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let outcome = h.service.submit(&student, target(&h), input("echo 42")).await.unwrap();
        let id = outcome.submission.unwrap().id;
        let runs_before = h.store.testrun_count();

        for result in [
            h.service.test(&student, ActionTarget::Submission(id), input("echo 1")).await,
            h.service.submit(&student, ActionTarget::Submission(id), input("echo 1")).await,
            h.service.save(&student, ActionTarget::Submission(id), input("echo 1")).await,
            h.service.reset(&student, ActionTarget::Submission(id)).await,
        ] {
            assert_eq!(result.unwrap().status, ActionStatus::Unchanged);
        }

        let stored = h.store.submission(id).unwrap();
        assert_eq!(stored.source, "echo 42");
        assert!(stored.complete);
        assert_eq!(h.store.testrun_count(), runs_before);
    }

    #[tokio::test]
    async fn test_reset_discards_draft() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let saved = h.service.save(&student, target(&h), input("echo 42")).await.unwrap();
        assert_eq!(saved.status, ActionStatus::Saved);

        let outcome = h.service.reset(&student, target(&h)).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::Reset);
        assert_eq!(outcome.state, SubmissionState::Empty);
        assert_eq!(outcome.messages[0].text, "Resetted");
        assert!(h.store.submissions().is_empty());

        let outcome = h.service.reset(&student, target(&h)).await.unwrap();
        assert_eq!(outcome.status, ActionStatus::Unchanged);

        // Same source after a reset grades the same
        let outcome = h.service.submit(&student, target(&h), input("echo 42")).await.unwrap();
        assert_eq!(outcome.submission.unwrap().result, Some(true));
    }

    #[tokio::test]
    async fn test_reset_failure_is_reported_not_fatal() {
        let assignment = answer_assignment();
        let student = fixtures::student();
        let draft = fixtures::submission(student.id, assignment.id, "echo 42");

        let mut store = MockSubmissionStore::new();
        let loaded = assignment.clone();
        store
            .expect_load_assignment()
            .returning(move |_| Ok(Some(loaded.clone())));
        let found = draft.clone();
        store
            .expect_find_draft()
            .returning(move |_, _| Ok(Some(found.clone())));
        store
            .expect_delete_draft()
            .times(1)
            .returning(|_| Err(AppError::Database("connection reset".to_string())));

        let dir = tempfile::tempdir().unwrap();
        let service = SubmissionService::new(
            Arc::new(store),
            Arc::new(fixtures::process_backend(dir.path())),
            fixtures::limits(),
        );

        let outcome = service
            .reset(&student, ActionTarget::Assignment(assignment.id))
            .await
            .unwrap();
        assert_eq!(outcome.status, ActionStatus::ResetFailed);
        assert_eq!(outcome.messages[0].level, MessageLevel::Error);
        assert!(outcome.redirect.is_some());
    }

    #[tokio::test]
    async fn test_finalize_conflict_rolls_back_and_releases_sandbox() {
        let assignment = answer_assignment();
        let student = fixtures::student();
        let draft = fixtures::submission(student.id, assignment.id, "echo 42");

        let mut store = MockSubmissionStore::new();
        let loaded = assignment.clone();
        store
            .expect_load_assignment()
            .returning(move |_| Ok(Some(loaded.clone())));
        let found = draft.clone();
        store
            .expect_find_draft()
            .returning(move |_, _| Ok(Some(found.clone())));
        store.expect_save_draft().never();
        store
            .expect_finalize()
            .times(1)
            .returning(|_, runs, _| {
                assert_eq!(runs.len(), 3);
                Err(AppError::Conflict("Submission is already complete".to_string()))
            });

        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(RecordingBackend::new(fixtures::process_backend(dir.path())));
        let service = SubmissionService::new(Arc::new(store), backend.clone(), fixtures::limits());

        let err = service
            .submit(&student, ActionTarget::Assignment(assignment.id), SubmissionInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let recording = backend.recording();
        assert_eq!(recording.acquired, 1);
        assert_eq!(recording.released, 1);
    }

    #[tokio::test]
    async fn test_concurrent_submits_grade_once() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let saved = h.service.save(&student, target(&h), input("echo 42")).await.unwrap();
        let id = saved.submission.unwrap().id;

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let service = h.service.clone();
                let student = student.clone();
                tokio::spawn(async move {
                    service
                        .submit(&student, ActionTarget::Submission(id), SubmissionInput::default())
                        .await
                })
            })
            .collect();

        let mut statuses = Vec::new();
        for task in tasks {
            statuses.push(task.await.unwrap().unwrap().status);
        }

        assert_eq!(statuses.iter().filter(|s| **s == ActionStatus::Submitted).count(), 1);
        assert_eq!(statuses.iter().filter(|s| **s == ActionStatus::Unchanged).count(), 2);
        assert_eq!(h.store.finalize_calls(), 1);
        assert_eq!(h.store.testrun_count(), 3);
    }

    #[tokio::test]
    async fn test_closed_assignment_is_forbidden() {
        let mut assignment = answer_assignment();
        assignment.end_time = Some(Utc::now() - chrono::Duration::hours(1));
        let h = harness(assignment);
        let student = fixtures::student();

        let err = h.service.test(&student, target(&h), input("echo 42")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(h.store.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_other_students_submission_is_off_limits() {
        let h = harness(answer_assignment());
        let owner = fixtures::student();
        let intruder = fixtures::student();

        let saved = h.service.save(&owner, target(&h), input("echo 42")).await.unwrap();
        let id = saved.submission.unwrap().id;

        let err = h
            .service
            .submit(&intruder, ActionTarget::Submission(id), SubmissionInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = h.service.show(&intruder, id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let teacher = fixtures::user(roles::TEACHER);
        let view = h.service.show(&teacher, id).await.unwrap();
        assert!(view.editable);
        assert_eq!(view.source, "echo 42");
    }

    #[tokio::test]
    async fn test_show_redacts_hidden_output_for_students() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let outcome = h.service.submit(&student, target(&h), input("echo 42")).await.unwrap();
        let id = outcome.submission.unwrap().id;

        let view = h.service.show(&student, id).await.unwrap();
        assert!(!view.editable);
        assert_eq!(view.testruns.len(), 3);
        let positions: Vec<_> = view.testruns.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![Some(1), Some(2), Some(3)]);
        assert!(view.testruns[0].output_data.is_some());
        assert_eq!(view.testruns[2].output_data, None);
        assert_eq!(view.language.unwrap().name, "Shell");

        let teacher = fixtures::user(roles::TEACHER);
        let view = h.service.show(&teacher, id).await.unwrap();
        assert_eq!(view.testruns[2].output_data.as_deref().map(str::trim), Some("42"));
        assert_eq!(view.judgement, None);
    }

    #[tokio::test]
    async fn test_show_includes_judgement_with_diff() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let mut submission = fixtures::submission(student.id, h.assignment.id, "echo 41\n");
        submission.complete = true;
        submission.result = Some(false);
        let id = submission.id;
        h.store.insert_submission(submission);
        h.store.add_judgement(fixtures::judgement(id, Some("echo 42\n")));

        let view = h.service.show(&student, id).await.unwrap();
        let judgement = view.judgement.unwrap();
        assert_eq!(judgement.comment.as_deref(), Some("Mind the edge cases"));
        assert_eq!(judgement.corrected_source.as_deref(), Some("echo 42\n"));
        let diff = judgement.diff.unwrap();
        assert!(diff.contains("--- your source"));
        assert!(diff.contains("-echo 41"));
        assert!(diff.contains("+echo 42"));
    }

    #[tokio::test]
    async fn test_list_is_paginated_and_scoped() {
        let h = harness(answer_assignment());
        let student = fixtures::student();
        let other = fixtures::student();

        for i in 0..12 {
            let mut s = fixtures::submission(student.id, h.assignment.id, "echo 42");
            s.complete = true;
            s.created_at = Utc::now() - chrono::Duration::minutes(i);
            h.store.insert_submission(s);
        }
        h.store
            .insert_submission(fixtures::submission(other.id, h.assignment.id, "echo 1"));

        let first = h.service.list(&student, None, None, 1).await.unwrap();
        assert_eq!(first.total, 12);
        assert_eq!(first.submissions.len(), 10);
        assert_eq!(first.per_page, 10);
        assert!(first.submissions.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let second = h.service.list(&student, None, None, 2).await.unwrap();
        assert_eq!(second.submissions.len(), 2);

        // Students cannot widen the filter to someone else
        let scoped = h.service.list(&student, None, Some(other.id), 0).await.unwrap();
        assert_eq!(scoped.page, 1);
        assert_eq!(scoped.total, 12);

        let teacher = fixtures::user(roles::TEACHER);
        let all = h.service.list(&teacher, Some(h.assignment.id), None, 1).await.unwrap();
        assert_eq!(all.total, 13);
    }

    #[tokio::test]
    async fn test_current_draft_view() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let view = h.service.current(&student, h.assignment.id).await.unwrap();
        assert_eq!(view.state, SubmissionState::Empty);
        assert!(view.editable);
        assert_eq!(view.allowed_languages.len(), 1);
        assert_eq!(view.location, None);

        h.service.save(&student, target(&h), input("echo 42")).await.unwrap();
        let view = h.service.current(&student, h.assignment.id).await.unwrap();
        assert_eq!(view.state, SubmissionState::Draft);
        assert_eq!(view.source.as_deref(), Some("echo 42"));
        assert_eq!(
            view.location,
            Some(format!("/assignments/{}/submission", h.assignment.id))
        );

        let err = h.service.current(&student, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_parse_input_defaults_and_upload() {
        let assignment = answer_assignment();
        let student_id = Uuid::new_v4();

        let parsed = parse_input(&assignment, &[], &student_id, &input("echo 42")).unwrap();
        assert_eq!(parsed.filename, format!("{}_{}.sh", student_id, assignment.id));
        assert_eq!(parsed.language.id, fixtures::SHELL_LANGUAGE_ID);

        let payload = SubmissionInput {
            filename: Some("answer.sh".to_string()),
            upload: Some(UploadedSource {
                filename: "upload.sh".to_string(),
                content: "echo 42".to_string(),
            }),
            ..input("")
        };
        let parsed = parse_input(&assignment, &[], &student_id, &payload).unwrap();
        assert_eq!(parsed.filename, "upload.sh");
        assert_eq!(parsed.source, "echo 42");

        let payload = SubmissionInput {
            filename: Some("../escape.sh".to_string()),
            ..input("echo 42")
        };
        assert!(matches!(
            parse_input(&assignment, &[], &student_id, &payload),
            Err(AppError::Validation(_))
        ));

        let unknown = SubmissionInput {
            language_id: Some(Uuid::new_v4()),
            ..input("echo 42")
        };
        assert_eq!(
            parse_input(&assignment, &[], &student_id, &unknown)
                .unwrap_err()
                .to_string(),
            "No language selected"
        );
    }

    #[tokio::test]
    async fn test_repeated_test_is_idempotent() {
        let h = harness(answer_assignment());
        let student = fixtures::student();

        let first = h.service.test(&student, target(&h), input("echo 42")).await.unwrap();
        let second = h
            .service
            .test(&student, target(&h), SubmissionInput::default())
            .await
            .unwrap();
        assert_eq!(first.status, second.status);
        let passed = |o: &ActionOutcome| o.testruns.iter().map(|r| r.passed).collect::<Vec<_>>();
        assert_eq!(passed(&first), passed(&second));
        assert_eq!(h.store.testrun_count(), 0);
        assert_eq!(h.store.submissions().len(), 1);
    }
}
