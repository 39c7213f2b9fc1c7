//! Token-budgeted message queue.
//!
//! Every provider call goes out as a [`MessageQueue`]. Messages carry the
//! estimate taken when they were built; the queue sums those and can trim
//! itself to fit a [`TokenBudget`]:
//!
//! - System messages are pinned and never dropped.
//! - The most recent non-system message is never dropped either; without
//!   it there is nothing to answer.
//! - Everything else goes oldest first until the estimate fits.
//! - A message shorter than `shortest_message` is glue ("ok", "thanks")
//!   and leaves together with its neighbouring turn rather than on its own.
//!
//! Trimming is greedy. It does not search for the subset that keeps the
//! most context.

use std::fmt;
use std::sync::Arc;

use lens_core::config::LlmConfig;
use lens_core::error::{ProviderFailure, ProviderResult};
use tracing::debug;

use crate::tokens::{HeuristicEstimator, MESSAGE_OVERHEAD, TokenEstimator};
use crate::types::{LlmMessage, Role};

/// Size limits for one provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Upper bound on the estimated conversation size.
    pub max_tokens: usize,
    /// Messages estimated below this are glue.
    pub shortest_message: usize,
    /// Added to every message's estimate.
    pub per_message_overhead: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_tokens: 16_000,
            shortest_message: 50,
            per_message_overhead: MESSAGE_OVERHEAD,
        }
    }
}

impl From<&LlmConfig> for TokenBudget {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            shortest_message: config.shortest_message,
            per_message_overhead: config.per_message_overhead,
        }
    }
}

/// Ordered conversation with a token budget.
#[derive(Clone)]
pub struct MessageQueue {
    budget: TokenBudget,
    estimator: Arc<dyn TokenEstimator>,
    entries: Vec<LlmMessage>,
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue")
            .field("budget", &self.budget)
            .field("messages", &self.entries.len())
            .field("estimated_tokens", &self.estimated_tokens())
            .finish()
    }
}

impl MessageQueue {
    /// Empty queue using the heuristic estimator.
    #[must_use]
    pub fn new(budget: TokenBudget) -> Self {
        Self::with_estimator(budget, Arc::new(HeuristicEstimator))
    }

    /// Empty queue with a custom estimator, used by the `push_*` helpers.
    #[must_use]
    pub fn with_estimator(budget: TokenBudget, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            budget,
            estimator,
            entries: Vec::new(),
        }
    }

    /// The budget this queue trims to.
    #[must_use]
    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Append a message, keeping the estimate it was built with.
    ///
    /// # Errors
    /// `BudgetExceeded` if the message alone, plus room for one short
    /// reply, cannot fit the budget.
    pub fn push(&mut self, message: LlmMessage) -> ProviderResult<()> {
        let tokens = message.estimated_tokens();
        if tokens + self.budget.shortest_message > self.budget.max_tokens {
            return Err(ProviderFailure::budget_exceeded(format!(
                "{} message of ~{tokens} tokens cannot fit a {}-token budget",
                message.role, self.budget.max_tokens
            )));
        }
        self.entries.push(message);
        Ok(())
    }

    /// Append a system message.
    ///
    /// # Errors
    /// See [`MessageQueue::push`].
    pub fn push_system(&mut self, content: impl Into<String>) -> ProviderResult<()> {
        self.push(self.message(Role::System, content))
    }

    /// Append a user message.
    ///
    /// # Errors
    /// See [`MessageQueue::push`].
    pub fn push_user(&mut self, content: impl Into<String>) -> ProviderResult<()> {
        self.push(self.message(Role::User, content))
    }

    /// Append an assistant message.
    ///
    /// # Errors
    /// See [`MessageQueue::push`].
    pub fn push_assistant(&mut self, content: impl Into<String>) -> ProviderResult<()> {
        self.push(self.message(Role::Assistant, content))
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages in order.
    pub fn iter(&self) -> impl Iterator<Item = &LlmMessage> {
        self.entries.iter()
    }

    /// Copy of the messages, ready to serialize.
    #[must_use]
    pub fn messages(&self) -> Vec<LlmMessage> {
        self.iter().cloned().collect()
    }

    /// Estimated size of the whole conversation.
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        self.entries.iter().map(|e| self.cost(e)).sum()
    }

    /// Whether the conversation fits the budget as is.
    #[must_use]
    pub fn fits(&self) -> bool {
        self.estimated_tokens() <= self.budget.max_tokens
    }

    /// Drop old turns until the conversation fits. Returns how many
    /// messages were removed.
    ///
    /// # Errors
    /// `BudgetExceeded` when the system messages plus the latest message
    /// do not fit on their own. The queue is left untouched in that case.
    pub fn fit_to_budget(&mut self) -> ProviderResult<usize> {
        let mut total = self.estimated_tokens();
        if total <= self.budget.max_tokens {
            return Ok(0);
        }

        let last = self.entries.iter().rposition(|e| e.role != Role::System);
        let floor: usize = self
            .entries
            .iter()
            .enumerate()
            .filter(|(i, e)| e.role == Role::System || Some(*i) == last)
            .map(|(_, e)| self.cost(e))
            .sum();
        if floor > self.budget.max_tokens {
            return Err(ProviderFailure::budget_exceeded(format!(
                "pinned messages need ~{floor} tokens, budget is {}",
                self.budget.max_tokens
            )));
        }

        let mut keep = vec![true; self.entries.len()];
        let droppable: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].role != Role::System && Some(i) != last)
            .collect();

        let mut cursor = 0;
        while total > self.budget.max_tokens && cursor < droppable.len() {
            let oldest = droppable[cursor];
            let mut unit = vec![oldest];
            cursor += 1;

            // Glue never stays behind on its own, and never leaves alone.
            if let Some(&next) = droppable.get(cursor) {
                if self.is_glue(oldest) || self.is_glue(next) {
                    unit.push(next);
                    cursor += 1;
                }
            }

            for i in unit {
                keep[i] = false;
                total -= self.cost(&self.entries[i]);
            }
        }

        let before = self.entries.len();
        let mut flags = keep.into_iter();
        self.entries.retain(|_| flags.next().unwrap_or(true));
        let dropped = before - self.entries.len();

        debug!(
            dropped,
            remaining = self.entries.len(),
            estimated_tokens = total,
            max_tokens = self.budget.max_tokens,
            "Trimmed conversation to budget"
        );
        Ok(dropped)
    }

    fn message(&self, role: Role, content: impl Into<String>) -> LlmMessage {
        LlmMessage::with_estimator(role, content, self.estimator.as_ref())
    }

    fn cost(&self, message: &LlmMessage) -> usize {
        message.estimated_tokens() + self.budget.per_message_overhead
    }

    fn is_glue(&self, index: usize) -> bool {
        self.entries[index].estimated_tokens() < self.budget.shortest_message
    }
}
