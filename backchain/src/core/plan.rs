//! Backward chain and forward plan containers.
//!
//! The backward chain only grows by appending, in oracle-call order. The forward
//! plan is its exact reversal and is frozen once created.

use crate::core::step_parser::has_reached_initial_state;
use crate::core::types::Step;

/// Steps ordered from closest-to-goal (index 0) to closest-to-initial-state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackwardChain {
    steps: Vec<Step>,
}

impl BackwardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Append steps in the given order. Duplicates are kept.
    pub fn extend(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.steps.extend(steps);
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn reached_initial_state(&self) -> bool {
        has_reached_initial_state(&self.steps)
    }

    /// Tool identifiers across all steps, in chain order.
    pub fn tools_required(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.tools_needed.iter().map(String::as_str))
            .collect()
    }
}

impl FromIterator<Step> for BackwardChain {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

/// Execution order: the backward chain reversed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardPlan {
    steps: Vec<Step>,
}

impl ForwardPlan {
    pub fn from_chain(chain: &BackwardChain) -> Self {
        Self {
            steps: chain.steps().iter().rev().cloned().collect(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Steps from `index` to the end; empty when `index` is past the end.
    pub fn suffix(&self, index: usize) -> &[Step] {
        self.steps.get(index..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(descriptions: &[&str]) -> BackwardChain {
        descriptions.iter().map(|d| Step::new(*d)).collect()
    }

    #[test]
    fn forward_plan_is_exact_reversal() {
        let backward = chain(&["A", "B", "C"]);
        let plan = ForwardPlan::from_chain(&backward);

        let order: Vec<&str> = plan
            .steps()
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(order, vec!["C", "B", "A"]);

        let back: BackwardChain = plan.steps().iter().rev().cloned().collect();
        assert_eq!(back, backward);
    }

    #[test]
    fn extend_keeps_duplicates_in_order() {
        let mut backward = chain(&["A"]);
        backward.extend(vec![Step::new("A"), Step::new("B")]);
        assert_eq!(backward.len(), 3);
        assert_eq!(backward.last().map(|s| s.description.as_str()), Some("B"));
    }

    #[test]
    fn suffix_past_end_is_empty() {
        let plan = ForwardPlan::from_chain(&chain(&["A", "B"]));
        assert_eq!(plan.suffix(1).len(), 1);
        assert!(plan.suffix(2).is_empty());
        assert!(plan.suffix(7).is_empty());
    }

    #[test]
    fn tools_required_flattens_in_chain_order() {
        let mut first = Step::new("A");
        first.tools_needed = vec!["browser".to_string()];
        let mut second = Step::new("B");
        second.tools_needed = vec!["cli".to_string(), "git".to_string()];
        let backward: BackwardChain = vec![first, second].into_iter().collect();

        assert_eq!(backward.tools_required(), vec!["browser", "cli", "git"]);
    }
}
