//! Step records, statuses, and the finished test record handed to observers.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use stepwise_policy::{ScreenshotOverrides, ScreenshotPreference};

use crate::context::ContextId;
use crate::outcome::StepOutcome;

/// Execution status of a step or an aggregated test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepStatus {
    /// The step has not run.
    NotExecuted,
    /// The step is currently executing.
    Running,
    /// The step completed successfully.
    Success,
    /// An assertion in the step failed.
    Failure,
    /// The step raised an unexpected error.
    Error,
    /// The step was not run because an earlier step failed.
    Skipped,
    /// The step was deliberately ignored.
    Ignored,
    /// The step is not implemented yet.
    Pending,
}

impl StepStatus {
    /// Returns `true` once the status can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::NotExecuted | Self::Running)
    }

    /// Returns `true` for [`Failure`](Self::Failure) and [`Error`](Self::Error).
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failure | Self::Error)
    }

    /// Returns the lowercase label for the status.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotExecuted => "not executed",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Ignored => "ignored",
            Self::Pending => "pending",
        }
    }

    const fn failure_rank(self) -> u8 {
        match self {
            Self::Error => 2,
            Self::Failure => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identifier of a step within one execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub(crate) u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Step-definition type that declares a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOwner {
    type_name: String,
    screenshots: Option<ScreenshotPreference>,
}

impl StepOwner {
    /// Creates an owner with no screenshot declaration.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            screenshots: None,
        }
    }

    /// Declares a screenshot level for every step of this type.
    #[must_use]
    pub fn with_screenshots(mut self, level: impl Into<ScreenshotPreference>) -> Self {
        self.screenshots = Some(level.into());
        self
    }

    /// Returns the declaring type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the type-level screenshot declaration.
    #[must_use]
    pub const fn screenshots(&self) -> Option<ScreenshotPreference> {
        self.screenshots
    }
}

/// Description of a step about to start.
///
/// # Examples
///
/// ```
/// use stepwise::{StepDescriptor, StepOwner};
/// use stepwise_policy::{ScreenshotOverrides, ScreenshotPreference};
///
/// let descriptor = StepDescriptor::new("the user logs in")
///     .owned_by(StepOwner::new("LoginSteps"))
///     .with_screenshots(ScreenshotPreference::ForFailures);
/// assert_eq!(descriptor.name(), "the user logs in");
/// assert_eq!(descriptor.owner().map(|o| o.type_name()), Some("LoginSteps"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepDescriptor {
    name: String,
    owner: Option<StepOwner>,
    screenshots: Option<ScreenshotPreference>,
}

impl StepDescriptor {
    /// Creates a descriptor for a step with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            screenshots: None,
        }
    }

    /// Records the step-definition type declaring this step.
    #[must_use]
    pub fn owned_by(mut self, owner: StepOwner) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Declares a screenshot level for this step method.
    #[must_use]
    pub fn with_screenshots(mut self, level: impl Into<ScreenshotPreference>) -> Self {
        self.screenshots = Some(level.into());
        self
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declaring type, if known.
    #[must_use]
    pub fn owner(&self) -> Option<&StepOwner> {
        self.owner.as_ref()
    }

    /// Returns the method-level screenshot declaration.
    #[must_use]
    pub const fn screenshots(&self) -> Option<ScreenshotPreference> {
        self.screenshots
    }

    /// Returns the screenshot overrides this step declares.
    #[must_use]
    pub fn screenshot_overrides(&self) -> ScreenshotOverrides<'_> {
        let overrides = ScreenshotOverrides {
            method: self.screenshots,
            ..ScreenshotOverrides::default()
        };
        self.owner.as_ref().map_or(overrides, |owner| {
            overrides.with_declaring_type(&owner.type_name, owner.screenshots)
        })
    }
}

impl From<&str> for StepDescriptor {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StepDescriptor {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Failure message with the chain of underlying causes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureDetail {
    message: String,
    causes: Vec<String>,
}

impl FailureDetail {
    /// Creates a detail with no causes.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Captures an error's message and its `source()` chain.
    ///
    /// # Examples
    ///
    /// ```
    /// use stepwise::FailureDetail;
    ///
    /// let io = std::io::Error::other("disk full");
    /// let detail = FailureDetail::from_error(&io);
    /// assert_eq!(detail.message(), "disk full");
    /// assert!(detail.causes().is_empty());
    /// ```
    #[must_use]
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let causes = std::iter::successors(error.source(), |cause| (*cause).source())
            .map(ToString::to_string)
            .collect();
        Self {
            message: error.to_string(),
            causes,
        }
    }

    /// Returns the top-level message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns cause messages, outermost first.
    #[must_use]
    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Reference to a screenshot captured by an observer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenshotRef {
    path: PathBuf,
    taken_at: SystemTime,
}

impl ScreenshotRef {
    /// Creates a reference to a screenshot stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            taken_at: SystemTime::now(),
        }
    }

    /// Returns where the screenshot was stored.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Returns when the screenshot was captured.
    #[must_use]
    pub const fn taken_at(&self) -> SystemTime {
        self.taken_at
    }
}

/// A step in the test's step tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    id: StepId,
    descriptor: StepDescriptor,
    children: Vec<Step>,
    status: StepStatus,
    started_at: SystemTime,
    finished_at: Option<SystemTime>,
    screenshots: Vec<ScreenshotRef>,
    failure: Option<FailureDetail>,
}

impl Step {
    pub(crate) fn start(id: StepId, descriptor: StepDescriptor) -> Self {
        Self {
            id,
            descriptor,
            children: Vec::new(),
            status: StepStatus::Running,
            started_at: SystemTime::now(),
            finished_at: None,
            screenshots: Vec::new(),
            failure: None,
        }
    }

    /// Closes the step with `outcome`.
    ///
    /// A successful outcome over a failed child inherits the child's failure
    /// so the tree never reports a passing parent above a failing step.
    pub(crate) fn close(&mut self, outcome: StepOutcome) {
        let (status, failure) = outcome.into_parts();
        let worst_child = self
            .children
            .iter()
            .filter(|child| child.status.is_failure())
            .max_by_key(|child| child.status.failure_rank());
        match (status, worst_child) {
            (StepStatus::Success, Some(child)) => {
                self.status = child.status;
                self.failure = child.failure.clone();
            }
            _ => {
                self.status = status;
                self.failure = failure;
            }
        }
        self.finished_at = Some(SystemTime::now());
    }

    pub(crate) fn push_child(&mut self, child: Self) {
        self.children.push(child);
    }

    pub(crate) fn attach_screenshot(&mut self, screenshot: ScreenshotRef) {
        self.screenshots.push(screenshot);
    }

    /// Returns the step identifier.
    #[must_use]
    pub const fn id(&self) -> StepId {
        self.id
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Returns the descriptor the step was started with.
    #[must_use]
    pub fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    /// Returns nested steps in execution order.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> StepStatus {
        self.status
    }

    /// Returns when the step started.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Returns when the step finished, if it has.
    #[must_use]
    pub const fn finished_at(&self) -> Option<SystemTime> {
        self.finished_at
    }

    /// Returns screenshots captured during the step.
    #[must_use]
    pub fn screenshots(&self) -> &[ScreenshotRef] {
        &self.screenshots
    }

    /// Returns the failure detail for failed or errored steps.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureDetail> {
        self.failure.as_ref()
    }

    /// Iterates over this step and all descendants, depth first.
    pub fn walk(&self) -> impl Iterator<Item = &Self> + '_ {
        let mut pending = vec![self];
        std::iter::from_fn(move || {
            let next = pending.pop()?;
            pending.extend(next.children.iter().rev());
            Some(next)
        })
    }
}

/// A finished test as delivered to observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestRecord {
    name: String,
    context: ContextId,
    steps: Vec<Step>,
    result: StepStatus,
    started_at: SystemTime,
    finished_at: SystemTime,
}

impl TestRecord {
    pub(crate) fn new(
        name: String,
        context: ContextId,
        steps: Vec<Step>,
        started_at: SystemTime,
    ) -> Self {
        let result = aggregate_result(&steps);
        Self {
            name,
            context,
            steps,
            result,
            started_at,
            finished_at: SystemTime::now(),
        }
    }

    /// Returns the test name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the context the test ran in.
    #[must_use]
    pub const fn context(&self) -> ContextId {
        self.context
    }

    /// Returns the top-level steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the aggregated result.
    #[must_use]
    pub const fn result(&self) -> StepStatus {
        self.result
    }

    /// Returns when the test started.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Returns when the test finished.
    #[must_use]
    pub const fn finished_at(&self) -> SystemTime {
        self.finished_at
    }

    /// Iterates over every step in the tree, depth first.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> + '_ {
        self.steps.iter().flat_map(Step::walk)
    }

    /// Returns the first failure detail in execution order.
    #[must_use]
    pub fn first_failure(&self) -> Option<&FailureDetail> {
        self.all_steps().find_map(Step::failure)
    }
}

/// Aggregates step statuses into a test result.
///
/// Any error, failure, or pending step decides the result in that order.
/// Otherwise a tree made only of ignored (or only of skipped) steps takes
/// that status, and anything else is a success.
fn aggregate_result(steps: &[Step]) -> StepStatus {
    let statuses: Vec<StepStatus> = steps
        .iter()
        .flat_map(Step::walk)
        .map(Step::status)
        .collect();
    for decisive in [StepStatus::Error, StepStatus::Failure, StepStatus::Pending] {
        if statuses.contains(&decisive) {
            return decisive;
        }
    }
    for uniform in [StepStatus::Ignored, StepStatus::Skipped] {
        if !statuses.is_empty() && statuses.iter().all(|status| *status == uniform) {
            return uniform;
        }
    }
    StepStatus::Success
}
