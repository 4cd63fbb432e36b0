//! Admission control: structural validation and deadline feasibility.
//!
//! The controller keeps a ledger of the estimated runtime of every admitted,
//! not-yet-terminal task keyed by `(deadline, seq)`. The workload that must run
//! before a new task under EDF is the sum of the ledger up to and including the
//! new task's deadline. Spread over the configured concurrency, plus the task's
//! own estimate, that gives its earliest plausible completion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::Rejection;
use crate::core::task::{ScheduledTask, TaskDescriptor};
use crate::util::clock::secs_to_ms;

/// What to do with a task whose deadline looks infeasible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Admit anyway and flag the task as at-risk.
    BestEffort,
    /// Reject with reason `infeasible`.
    Strict,
}

/// Result of the feasibility estimate for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feasibility {
    /// Estimated work (ms) scheduled at or before the candidate's deadline.
    pub workload_ahead_ms: u128,
    /// `now + workload_ahead / concurrency + own estimate`.
    pub earliest_completion_ms: u128,
    /// Whether the earliest completion meets the deadline.
    pub feasible: bool,
}

/// Positive admission outcome, before the task is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Validated absolute deadline.
    pub deadline_ms: u128,
    /// Admitted despite an infeasible estimate.
    pub at_risk: bool,
    /// The estimate that produced the verdict.
    pub feasibility: Feasibility,
}

/// Validates submissions and estimates whether their deadlines can be met.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    policy: AdmissionPolicy,
    concurrency: u32,
    ledger: BTreeMap<(u128, u64), u128>,
}

impl AdmissionController {
    /// Create a controller for a pool of `concurrency` execution slots.
    pub fn new(policy: AdmissionPolicy, concurrency: u32) -> Self {
        Self {
            policy,
            concurrency: concurrency.max(1),
            ledger: BTreeMap::new(),
        }
    }

    /// Active feasibility policy.
    pub const fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Number of admitted tasks that have not reached a terminal state.
    pub fn outstanding(&self) -> usize {
        self.ledger.len()
    }

    /// Structural and deadline checks. Returns the validated deadline.
    pub fn validate(descriptor: &TaskDescriptor, now_ms: u128) -> Result<u128, Rejection> {
        if descriptor.name.trim().is_empty() {
            return Err(Rejection::malformed("name must not be empty"));
        }
        if descriptor.work_reference.trim().is_empty() {
            return Err(Rejection::malformed("script_path must not be empty"));
        }
        if !descriptor.est_runtime_secs.is_finite() || descriptor.est_runtime_secs <= 0.0 {
            return Err(Rejection::malformed("est_runtime must be a positive number of seconds"));
        }
        if secs_to_ms(descriptor.est_runtime_secs).is_none() {
            return Err(Rejection::malformed(format!(
                "est_runtime {} is out of range",
                descriptor.est_runtime_secs
            )));
        }
        let Some(deadline_ms) = descriptor.deadline_ms else {
            return Err(Rejection::malformed("deadline missing or not a valid timestamp"));
        };
        if deadline_ms <= now_ms {
            return Err(Rejection::deadline_passed(deadline_ms, now_ms));
        }
        Ok(deadline_ms)
    }

    /// Estimate the earliest completion of a task with the given deadline and runtime.
    pub fn estimate(&self, deadline_ms: u128, est_ms: u128, now_ms: u128) -> Feasibility {
        let workload_ahead_ms: u128 = self
            .ledger
            .range(..=(deadline_ms, u64::MAX))
            .fold(0u128, |acc, (_, est)| acc.saturating_add(*est));
        let per_slot = workload_ahead_ms.div_ceil(u128::from(self.concurrency));
        let earliest_completion_ms = now_ms.saturating_add(per_slot).saturating_add(est_ms);
        Feasibility {
            workload_ahead_ms,
            earliest_completion_ms,
            feasible: earliest_completion_ms <= deadline_ms,
        }
    }

    /// Validate, estimate, and apply the policy.
    pub fn assess(&self, descriptor: &TaskDescriptor, now_ms: u128) -> Result<Verdict, Rejection> {
        let deadline_ms = Self::validate(descriptor, now_ms)?;
        let feasibility = self.estimate(deadline_ms, runtime_ms(descriptor), now_ms);
        if feasibility.feasible {
            return Ok(Verdict {
                deadline_ms,
                at_risk: false,
                feasibility,
            });
        }
        match self.policy {
            AdmissionPolicy::BestEffort => Ok(Verdict {
                deadline_ms,
                at_risk: true,
                feasibility,
            }),
            AdmissionPolicy::Strict => Err(Rejection::infeasible(
                feasibility.earliest_completion_ms,
                deadline_ms,
            )),
        }
    }

    /// Account an admitted task's estimate until it reaches a terminal state.
    pub fn commit(&mut self, task: &ScheduledTask) {
        self.ledger
            .insert((task.deadline_ms, task.seq), runtime_ms(&task.descriptor));
    }

    /// Drop a task from the ledger once it is terminal.
    pub fn release(&mut self, deadline_ms: u128, seq: u64) {
        self.ledger.remove(&(deadline_ms, seq));
    }
}

// Only called on descriptors that passed `validate`.
fn runtime_ms(descriptor: &TaskDescriptor) -> u128 {
    secs_to_ms(descriptor.est_runtime_secs).unwrap_or(u128::MAX)
}
