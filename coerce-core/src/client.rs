//! Structured clients
//!
//! [`StructuredClient`] drives an async [`Transport`] and
//! [`BlockingStructuredClient`] a [`BlockingTransport`]. Both run the same
//! [`RetryState`] transitions; only the way they wait differs.

use crate::config::{ClientConfig, ConfigError, ConfigValidator, SafeLogging};
use crate::dsl::{IterableAdapter, ParallelAdapter, PartialAdapter};
use crate::error::CoerceError;
use crate::http::OpenAiHttpTransport;
use crate::modes::{self, Mode, Target};
use crate::protocol::{ChatRequest, RawResponse, StreamChunk};
use crate::retry::{RetryState, Step};
use crate::schema::{SchemaAdapter, SchemaDoc, Structured, ValidationContext};
use crate::transport::{BlockingTransport, ChunkIter, Transport, TransportError};
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

/// Stream of parsed items from a streamed call
pub type CoerceStream<T> = Pin<Box<dyn Stream<Item = Result<T, CoerceError>> + Send>>;

/// A target shape for `create`
pub trait ResponseModel: Send + Sync {
    type Output: Send;

    /// Schemas to declare; `None` sends the request unchanged
    fn target(&self) -> Option<Target<'_>>;

    fn parse(
        &self,
        raw: Arc<RawResponse>,
        mode: Mode,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<Self::Output, CoerceError>;
}

impl<T: DeserializeOwned + Send + 'static> ResponseModel for SchemaAdapter<T> {
    type Output = Structured<T>;

    fn target(&self) -> Option<Target<'_>> {
        Some(Target::One(self.describe()))
    }

    fn parse(
        &self,
        raw: Arc<RawResponse>,
        mode: Mode,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<Self::Output, CoerceError> {
        SchemaAdapter::parse(self, raw, mode, validation_context, strict)
    }
}

impl<T: DeserializeOwned + Send + 'static> ResponseModel for IterableAdapter<T> {
    type Output = Structured<Vec<T>>;

    fn target(&self) -> Option<Target<'_>> {
        Some(Target::One(self.describe()))
    }

    fn parse(
        &self,
        raw: Arc<RawResponse>,
        mode: Mode,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<Self::Output, CoerceError> {
        IterableAdapter::parse(self, raw, mode, validation_context, strict)
    }
}

impl<U: Send + 'static> ResponseModel for ParallelAdapter<U> {
    type Output = Structured<Vec<U>>;

    fn target(&self) -> Option<Target<'_>> {
        Some(Target::AnyOf(self.docs()))
    }

    fn parse(
        &self,
        raw: Arc<RawResponse>,
        mode: Mode,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<Self::Output, CoerceError> {
        ParallelAdapter::parse(self, raw, mode, validation_context, strict)
    }
}

/// Returns the raw response untouched; never re-asks
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ResponseModel for PassThrough {
    type Output = Arc<RawResponse>;

    fn target(&self) -> Option<Target<'_>> {
        None
    }

    fn parse(
        &self,
        raw: Arc<RawResponse>,
        _mode: Mode,
        _validation_context: Option<&ValidationContext>,
        _strict: bool,
    ) -> Result<Self::Output, CoerceError> {
        Ok(raw)
    }
}

/// Per-call overrides of the client configuration
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub mode: Option<Mode>,
    pub max_retries: Option<u32>,
    pub validation_context: Option<ValidationContext>,
    pub strict: Option<bool>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_validation_context(mut self, context: ValidationContext) -> Self {
        self.validation_context = Some(context);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }
}

/// Call settings after applying overrides
struct CallPlan {
    mode: Mode,
    max_retries: u32,
    strict: bool,
    request: ChatRequest,
}

fn validated(config: ClientConfig) -> Result<ClientConfig, CoerceError> {
    ConfigValidator::new()
        .validate(&config)
        .map_err(|e| CoerceError::Config(ConfigError::from(e)))?;
    debug!(config = %config.safe_for_logging(), "structured client configured");
    Ok(config)
}

fn plan(
    config: &ClientConfig,
    request: &ChatRequest,
    target: Option<Target<'_>>,
    options: &CreateOptions,
) -> Result<CallPlan, CoerceError> {
    let mode = options.mode.unwrap_or_else(|| config.effective_mode());
    if !config.provider.supports(mode) {
        return Err(CoerceError::precondition(format!(
            "mode {} is not available for provider {:?}",
            mode, config.provider
        )));
    }

    let mut request = request.clone();
    // Gemini binds the model to the client, never to the request
    if request.model.is_none() && mode != Mode::GeminiJson {
        request.model = config.model.clone();
    }

    let request = match target {
        Some(target) => modes::apply(mode, &request, target)?,
        None => request,
    };

    Ok(CallPlan {
        mode,
        max_retries: options.max_retries.unwrap_or(config.max_retries),
        strict: options.strict.unwrap_or(config.strict),
        request,
    })
}

/// Plan for a streamed call; parallel tool calls only arrive whole
fn stream_plan(
    config: &ClientConfig,
    request: &ChatRequest,
    doc: &SchemaDoc,
    options: &CreateOptions,
) -> Result<CallPlan, CoerceError> {
    if options.mode.unwrap_or_else(|| config.effective_mode()) == Mode::ParallelTools {
        return Err(CoerceError::precondition("parallel_tools does not support streaming"));
    }
    plan(config, request, Some(Target::One(doc)), options)
}

fn reject_streaming(request: &ChatRequest) -> Result<(), CoerceError> {
    if request.is_streaming() {
        return Err(CoerceError::precondition(
            "streaming requests go through create_partial or create_iterable_stream",
        ));
    }
    Ok(())
}

fn stream_failed(source: TransportError) -> CoerceError {
    CoerceError::Transport {
        attempt: 1,
        failures: Vec::new(),
        source,
    }
}

/// Async structured-output client
#[derive(Debug, Clone)]
pub struct StructuredClient<X> {
    transport: X,
    config: ClientConfig,
}

impl StructuredClient<OpenAiHttpTransport> {
    /// Build the bundled HTTP transport from `config.transport`
    pub fn from_config(config: ClientConfig) -> Result<Self, CoerceError> {
        let transport_config = config
            .transport
            .as_ref()
            .ok_or_else(|| CoerceError::precondition("configuration has no transport section"))?;
        let transport = OpenAiHttpTransport::from_config(transport_config)
            .map_err(|e| CoerceError::precondition(format!("could not build transport: {}", e)))?;
        Self::new(transport, config)
    }
}

impl<X: Transport> StructuredClient<X> {
    pub fn new(transport: X, config: ClientConfig) -> Result<Self, CoerceError> {
        Ok(Self {
            transport,
            config: validated(config)?,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &X {
        &self.transport
    }

    /// Request a response matching `model`, re-asking on decode or
    /// validation failures
    pub async fn create<M: ResponseModel>(
        &self,
        request: &ChatRequest,
        model: &M,
        options: CreateOptions,
    ) -> Result<M::Output, CoerceError> {
        reject_streaming(request)?;
        let plan = plan(&self.config, request, model.target(), &options)?;
        let mode = plan.mode;
        let mut state = RetryState::new(mode, plan.max_retries, plan.request);
        info!(mode = %mode, max_retries = plan.max_retries, "structured call");

        loop {
            state.begin_attempt();
            let raw = match self.transport.invoke(state.request()).await {
                Ok(raw) => state.record_response(raw),
                Err(e) => return Err(state.transport_failed(e)),
            };

            let outcome = model.parse(Arc::clone(&raw), mode, options.validation_context.as_ref(), plan.strict);
            match state.resolve(raw, outcome)? {
                Step::Done(value) => return Ok(value),
                Step::Retry => {
                    let delay = state.delay(&self.config.retry);
                    if !delay.is_zero() {
                        debug!(delay_ms = delay.as_millis() as u64, "waiting before re-ask");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Stream progressively filled snapshots of `T`
    pub async fn create_partial<T>(
        &self,
        request: &ChatRequest,
        model: &PartialAdapter<T>,
        options: CreateOptions,
    ) -> Result<CoerceStream<T>, CoerceError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let plan = stream_plan(&self.config, request, model.describe(), &options)?;
        let mut state = model.stream_state(plan.mode, options.validation_context, plan.strict);
        let mut chunks = self
            .transport
            .invoke_stream(&streaming(plan.request))
            .await
            .map_err(stream_failed)?;

        Ok(Box::pin(stream! {
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(chunk) => {
                        if let Some(snapshot) = state.push(&chunk) {
                            yield Ok(snapshot);
                        }
                    }
                    Err(e) => {
                        yield Err(stream_failed(e));
                        return;
                    }
                }
            }
            if let Some(last) = state.finish() {
                yield last;
            }
        }))
    }

    /// Stream each element of an iterable as soon as it is complete
    pub async fn create_iterable_stream<T>(
        &self,
        request: &ChatRequest,
        model: &IterableAdapter<T>,
        options: CreateOptions,
    ) -> Result<CoerceStream<T>, CoerceError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let plan = stream_plan(&self.config, request, model.describe(), &options)?;
        let mut state = model.stream_state(plan.mode, options.validation_context, plan.strict);
        let mut chunks = self
            .transport
            .invoke_stream(&streaming(plan.request))
            .await
            .map_err(stream_failed)?;

        Ok(Box::pin(stream! {
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(chunk) => {
                        for element in state.push(&chunk) {
                            yield element;
                        }
                    }
                    Err(e) => {
                        yield Err(stream_failed(e));
                        return;
                    }
                }
            }
            for element in state.finish() {
                yield element;
            }
        }))
    }
}

fn streaming(mut request: ChatRequest) -> ChatRequest {
    request.stream = Some(true);
    request
}

/// Blocking structured-output client
#[derive(Debug, Clone)]
pub struct BlockingStructuredClient<X> {
    transport: X,
    config: ClientConfig,
}

impl<X: BlockingTransport> BlockingStructuredClient<X> {
    pub fn new(transport: X, config: ClientConfig) -> Result<Self, CoerceError> {
        Ok(Self {
            transport,
            config: validated(config)?,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn create<M: ResponseModel>(
        &self,
        request: &ChatRequest,
        model: &M,
        options: CreateOptions,
    ) -> Result<M::Output, CoerceError> {
        reject_streaming(request)?;
        let plan = plan(&self.config, request, model.target(), &options)?;
        let mode = plan.mode;
        let mut state = RetryState::new(mode, plan.max_retries, plan.request);
        info!(mode = %mode, max_retries = plan.max_retries, "structured call (blocking)");

        loop {
            state.begin_attempt();
            let raw = match self.transport.invoke(state.request()) {
                Ok(raw) => state.record_response(raw),
                Err(e) => return Err(state.transport_failed(e)),
            };

            let outcome = model.parse(Arc::clone(&raw), mode, options.validation_context.as_ref(), plan.strict);
            match state.resolve(raw, outcome)? {
                Step::Done(value) => return Ok(value),
                Step::Retry => {
                    let delay = state.delay(&self.config.retry);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }

    pub fn create_partial<T>(
        &self,
        request: &ChatRequest,
        model: &PartialAdapter<T>,
        options: CreateOptions,
    ) -> Result<impl Iterator<Item = Result<T, CoerceError>>, CoerceError>
    where
        T: DeserializeOwned,
    {
        let plan = stream_plan(&self.config, request, model.describe(), &options)?;
        let state = model.stream_state(plan.mode, options.validation_context, plan.strict);
        let chunks = self
            .transport
            .invoke_stream(&streaming(plan.request))
            .map_err(stream_failed)?;

        Ok(drain(
            chunks,
            state,
            |state, chunk| state.push(chunk).into_iter().map(Ok).collect(),
            |state| state.finish().into_iter().collect(),
        ))
    }

    pub fn create_iterable_stream<T>(
        &self,
        request: &ChatRequest,
        model: &IterableAdapter<T>,
        options: CreateOptions,
    ) -> Result<impl Iterator<Item = Result<T, CoerceError>>, CoerceError>
    where
        T: DeserializeOwned,
    {
        let plan = stream_plan(&self.config, request, model.describe(), &options)?;
        let state = model.stream_state(plan.mode, options.validation_context, plan.strict);
        let chunks = self
            .transport
            .invoke_stream(&streaming(plan.request))
            .map_err(stream_failed)?;

        Ok(drain(chunks, state, |state, chunk| state.push(chunk), |state| state.finish()))
    }
}

type Items<O> = Vec<Result<O, CoerceError>>;

/// Pull chunks through a stream state, yielding its items in order
fn drain<S, O, P, F>(chunks: ChunkIter, mut state: S, mut push: P, mut finish: F) -> impl Iterator<Item = Result<O, CoerceError>>
where
    P: FnMut(&mut S, &StreamChunk) -> Items<O>,
    F: FnMut(&mut S) -> Items<O>,
{
    let mut chunks = Some(chunks);
    let mut pending: VecDeque<Result<O, CoerceError>> = VecDeque::new();

    std::iter::from_fn(move || loop {
        if let Some(item) = pending.pop_front() {
            return Some(item);
        }
        let source = chunks.as_mut()?;
        match source.next() {
            Some(Ok(chunk)) => pending.extend(push(&mut state, &chunk)),
            Some(Err(e)) => {
                chunks = None;
                return Some(Err(stream_failed(e)));
            }
            None => {
                chunks = None;
                pending.extend(finish(&mut state));
            }
        }
    })
}
