//! Token usage summed across the attempts of one call

use crate::protocol::{CompletionUsage, RawResponse};

/// Running totals for one logical call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageAccumulator {
    total: CompletionUsage,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, usage: CompletionUsage) {
        self.total += usage;
    }

    pub fn total(&self) -> CompletionUsage {
        self.total
    }

    /// Add the response's usage and overwrite it with the running total
    ///
    /// Responses without usage metadata are left untouched.
    pub fn absorb(&mut self, response: &mut RawResponse) {
        if let Some(usage) = response.usage() {
            self.add(usage);
            response.set_usage(self.total);
        }
    }
}
