//! Heterogeneous tool calls mapped onto a caller-defined union

use super::nest_error;
use crate::error::{CoerceError, ValidationError};
use crate::modes::Mode;
use crate::protocol::RawResponse;
use crate::schema::extract::tool_calls;
use crate::schema::{SchemaAdapter, SchemaDoc, Structured, ValidationContext};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type MemberDecoder<U> =
    Arc<dyn Fn(Value, Option<&ValidationContext>, bool) -> Result<U, CoerceError> + Send + Sync>;

/// Declares every member as a tool and decodes each returned call into `U`
///
/// ```ignore
/// enum Action { Weather(Weather), Search(Search) }
///
/// let actions = ParallelAdapter::new()
///     .member(Action::Weather)?
///     .member(Action::Search)?;
/// ```
pub struct ParallelAdapter<U> {
    docs: Vec<SchemaDoc>,
    decoders: Vec<MemberDecoder<U>>,
}

impl<U> Default for ParallelAdapter<U> {
    fn default() -> Self {
        Self {
            docs: Vec::new(),
            decoders: Vec::new(),
        }
    }
}

impl<U> Clone for ParallelAdapter<U> {
    fn clone(&self) -> Self {
        Self {
            docs: self.docs.clone(),
            decoders: self.decoders.clone(),
        }
    }
}

impl<U> fmt::Debug for ParallelAdapter<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelAdapter")
            .field("members", &self.docs.iter().map(|d| d.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl<U: 'static> ParallelAdapter<U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add member `T`, wrapped into the union by `ctor`
    pub fn member<T, F>(self, ctor: F) -> Result<Self, CoerceError>
    where
        T: JsonSchema + DeserializeOwned + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Ok(self.with_member(SchemaAdapter::<T>::new()?, ctor))
    }

    /// Add a prebuilt member adapter
    pub fn with_member<T, F>(mut self, adapter: SchemaAdapter<T>, ctor: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.docs.push(adapter.describe().clone());
        self.decoders.push(Arc::new(move |value: Value, ctx: Option<&ValidationContext>, strict: bool| {
            adapter.validate_value(value, ctx, strict).map(&ctor)
        }));
        self
    }

    /// Member schemas in declaration order
    pub fn docs(&self) -> &[SchemaDoc] {
        &self.docs
    }

    /// Decode every tool call, in order, into the union
    pub fn parse(
        &self,
        raw: Arc<RawResponse>,
        mode: Mode,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<Structured<Vec<U>>, CoerceError> {
        if self.docs.is_empty() {
            return Err(CoerceError::precondition("parallel response model has no members"));
        }

        let items = tool_calls(&raw, mode)?
            .into_iter()
            .enumerate()
            .map(|(i, (name, args))| {
                let index = self.docs.iter().position(|doc| doc.name == name).ok_or_else(|| {
                    ValidationError::payload(name.clone(), format!("`{}` is not a member of the union", name))
                })?;
                self.decoders[index](args, validation_context, strict)
                    .map_err(|e| nest_error(e, &format!("/{}", i)))
            })
            .collect::<Result<Vec<_>, CoerceError>>()?;

        Ok(Structured::new(items, raw))
    }
}
