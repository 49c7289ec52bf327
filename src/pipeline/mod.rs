//! Ordered, fail-fast step pipeline.
//!
//! A [`Pipeline`] threads one [`StepContext`] through its steps in order. The
//! first step that returns an error stops the run; the error names the step and
//! the context is handed back as that step left it. Every run owns its context,
//! so concurrent runs of the same pipeline share nothing mutable.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{PipelineError, StepError};

/// Request a session step will send
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
        }
    }
}

/// Response captured by a request step, body already read
#[derive(Debug, Clone)]
pub struct InboundResponse {
    pub status: StatusCode,
    /// Final URL after redirects
    pub url: Url,
    pub body: Bytes,
}

/// Mutable carrier for one pipeline run
#[derive(Debug)]
pub struct StepContext<T> {
    pub client: Option<Client>,
    pub request: OutboundRequest,
    pub response: Option<InboundResponse>,
    /// Typed result, set by whichever step produces it
    pub output: Option<T>,
}

impl<T> StepContext<T> {
    pub fn new(request: OutboundRequest) -> Self {
        Self {
            client: None,
            request,
            response: None,
            output: None,
        }
    }
}

/// A single stage of a pipeline, e.g. session setup, the HTTP request or parsing
#[async_trait]
pub trait Step<T>: Send + Sync {
    /// Stable name used in errors and logs
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut StepContext<T>) -> Result<(), StepError>;
}

pub type BeforeHook<T> = Arc<dyn Fn(&StepContext<T>) + Send + Sync>;
pub type AfterHook<T> = Arc<dyn Fn(&StepContext<T>, Option<&StepError>) + Send + Sync>;

/// A step plus optional observers called around it
pub struct RoutineStep<T> {
    step: Box<dyn Step<T>>,
    before: Option<BeforeHook<T>>,
    after: Option<AfterHook<T>>,
}

impl<T> RoutineStep<T> {
    pub fn new(step: impl Step<T> + 'static) -> Self {
        Self {
            step: Box::new(step),
            before: None,
            after: None,
        }
    }

    #[must_use]
    pub fn before(mut self, hook: impl Fn(&StepContext<T>) + Send + Sync + 'static) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn after(
        mut self,
        hook: impl Fn(&StepContext<T>, Option<&StepError>) + Send + Sync + 'static,
    ) -> Self {
        self.after = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &'static str {
        self.step.name()
    }
}

/// A failed run: the tagged error and the context as the failing step left it
pub struct PipelineFailure<T> {
    pub error: PipelineError,
    pub context: StepContext<T>,
}

impl<T> fmt::Debug for PipelineFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineFailure")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

pub struct Pipeline<T> {
    steps: Vec<RoutineStep<T>>,
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<T: Send> Pipeline<T> {
    pub fn new(steps: Vec<RoutineStep<T>>) -> Self {
        Self { steps }
    }

    pub fn add_step(&mut self, step: impl Step<T> + 'static) {
        self.steps.push(RoutineStep::new(step));
    }

    pub fn add_routine_step(&mut self, step: RoutineStep<T>) {
        self.steps.push(step);
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(RoutineStep::name).collect()
    }

    /// Runs every step in order, stopping at the first failure.
    pub async fn run(&self, mut ctx: StepContext<T>) -> Result<StepContext<T>, PipelineFailure<T>> {
        for (index, routine) in self.steps.iter().enumerate() {
            let name = routine.name();

            if let Some(before) = &routine.before {
                before(&ctx);
            }

            debug!("Running step {} ({})", index, name);
            let result = routine.step.run(&mut ctx).await;

            if let Some(after) = &routine.after {
                after(&ctx, result.as_ref().err());
            }

            if let Err(source) = result {
                debug!("Step {} ({}) failed: {}", index, name, source);
                return Err(PipelineFailure {
                    error: PipelineError::Step {
                        index,
                        step: name,
                        source,
                    },
                    context: ctx,
                });
            }
        }

        Ok(ctx)
    }

    /// Runs the pipeline and returns its typed output.
    pub async fn run_to_output(&self, ctx: StepContext<T>) -> Result<T, PipelineError> {
        match self.run(ctx).await {
            Ok(ctx) => ctx.output.ok_or(PipelineError::NoOutput),
            Err(failure) => Err(failure.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Step<u32> for Record {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, ctx: &mut StepContext<u32>) -> Result<(), StepError> {
            self.log.lock().unwrap().push(self.name);
            *ctx.output.get_or_insert(0) += 1;
            if self.fail {
                return Err(StepError::Other(format!("{} broke", self.name)));
            }
            Ok(())
        }
    }

    fn context() -> StepContext<u32> {
        StepContext::new(OutboundRequest::get(
            Url::parse("https://www.amazon.com/dp/B000").unwrap(),
        ))
    }

    fn pipeline(log: &Arc<Mutex<Vec<&'static str>>>, failing: Option<&'static str>) -> Pipeline<u32> {
        let mut pipeline = Pipeline::default();
        for name in ["session", "request", "extract"] {
            pipeline.add_step(Record {
                name,
                log: Arc::clone(log),
                fail: failing == Some(name),
            });
        }
        pipeline
    }

    #[tokio::test]
    async fn runs_all_steps_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(&log, None);

        let output = pipeline.run_to_output(context()).await.unwrap();

        assert_eq!(output, 3);
        assert_eq!(*log.lock().unwrap(), vec!["session", "request", "extract"]);
        assert_eq!(pipeline.step_names(), vec!["session", "request", "extract"]);
    }

    #[tokio::test]
    async fn failing_step_stops_the_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(&log, Some("request"));

        let failure = pipeline.run(context()).await.unwrap_err();

        assert_eq!(*log.lock().unwrap(), vec!["session", "request"]);
        assert!(matches!(
            failure.error,
            PipelineError::Step { index: 1, step: "request", .. }
        ));
        assert_eq!(failure.error.step(), Some("request"));
        // context keeps what the failing step already did
        assert_eq!(failure.context.output, Some(2));
    }

    #[tokio::test]
    async fn missing_output_is_an_error() {
        let pipeline: Pipeline<u32> = Pipeline::default();
        let result = pipeline.run_to_output(context()).await;
        assert!(matches!(result, Err(PipelineError::NoOutput)));
    }

    #[tokio::test]
    async fn hooks_observe_without_changing_flow() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let before_seen = Arc::clone(&seen);
        let after_seen = Arc::clone(&seen);
        let step = RoutineStep::new(Record {
            name: "request",
            log: Arc::clone(&log),
            fail: true,
        })
        .before(move |ctx| before_seen.lock().unwrap().push(format!("before {:?}", ctx.output)))
        .after(move |ctx, err| {
            after_seen
                .lock()
                .unwrap()
                .push(format!("after {:?} failed={}", ctx.output, err.is_some()));
        });

        let pipeline = Pipeline::new(vec![step]);
        let failure = pipeline.run(context()).await.unwrap_err();

        assert_eq!(failure.error.step(), Some("request"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["before None".to_string(), "after Some(1) failed=true".to_string()]
        );
    }
}
