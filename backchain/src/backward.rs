//! Backward planning: grow the chain from the goal toward the initial state.

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::core::plan::BackwardChain;
use crate::core::step_parser::parse_backward_steps;
use crate::io::oracle::{Oracle, OracleContext};
use crate::io::prompt::{BackwardPrompt, PromptEngine};

/// Progress summary sent with the first backward query.
pub const INITIAL_PROGRESS: &str = "No progress yet.";

/// Why backward planning stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The last step's prerequisites mention the initial/current state.
    InitialStateReached,
    /// The chain holds `max_steps` steps or more.
    StepCap,
    /// `max_steps` oracle rounds ran without reaching either condition above.
    RoundCap,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::InitialStateReached => "initial_state_reached",
            Termination::StepCap => "step_cap",
            Termination::RoundCap => "round_cap",
        }
    }
}

/// Result of one backward oracle round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Raw oracle response.
    pub response: String,
    /// Steps parsed from this response and appended to the chain.
    pub new_steps: usize,
    pub termination: Option<Termination>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackwardPlanner {
    goal: String,
    chain: BackwardChain,
    rounds: usize,
    max_steps: usize,
    termination: Option<Termination>,
}

impl BackwardPlanner {
    pub fn new(max_steps: usize) -> Self {
        Self {
            goal: String::new(),
            chain: BackwardChain::new(),
            rounds: 0,
            max_steps,
            termination: None,
        }
    }

    /// Begin planning for `goal`, discarding any previous chain.
    ///
    /// The first round always reports back; termination is only checked from
    /// [`Self::continue_backward`], though this round counts toward the cap.
    #[instrument(skip_all, fields(max_steps = self.max_steps))]
    pub fn start<O: Oracle>(
        &mut self,
        goal: &str,
        oracle: &mut OracleContext<'_, O>,
        prompts: &PromptEngine,
    ) -> Result<RoundOutcome> {
        info!(goal, "starting backward planning");
        self.goal = goal.to_string();
        self.chain.clear();
        self.rounds = 0;
        self.termination = None;
        let (response, new_steps) = self.round(INITIAL_PROGRESS, oracle, prompts)?;
        Ok(RoundOutcome {
            response,
            new_steps,
            termination: None,
        })
    }

    /// Ask for the prerequisites of what is already known.
    #[instrument(skip_all, fields(chain_len = self.chain.len(), rounds = self.rounds))]
    pub fn continue_backward<O: Oracle>(
        &mut self,
        oracle: &mut OracleContext<'_, O>,
        prompts: &PromptEngine,
    ) -> Result<RoundOutcome> {
        let progress = format!("{} steps identified so far.", self.chain.len());
        let (response, new_steps) = self.round(&progress, oracle, prompts)?;
        self.termination = self.check_termination();
        if let Some(termination) = self.termination {
            info!(
                termination = termination.as_str(),
                chain_len = self.chain.len(),
                rounds = self.rounds,
                "backward planning terminated"
            );
        }
        Ok(RoundOutcome {
            response,
            new_steps,
            termination: self.termination,
        })
    }

    /// One oracle query; appends whatever steps the reply yields.
    fn round<O: Oracle>(
        &mut self,
        progress: &str,
        oracle: &mut OracleContext<'_, O>,
        prompts: &PromptEngine,
    ) -> Result<(String, usize)> {
        let prompt = prompts.working_backwards(&BackwardPrompt {
            goal: &self.goal,
            progress,
            known_steps: self.chain.steps(),
        })?;
        let response = oracle.ask(&prompt)?;

        let steps = parse_backward_steps(&response);
        let new_steps = steps.len();
        self.chain.extend(steps);
        self.rounds += 1;

        debug!(
            new_steps,
            chain_len = self.chain.len(),
            rounds = self.rounds,
            "backward round finished"
        );
        Ok((response, new_steps))
    }

    /// Termination policy, evaluated after every continued round.
    pub fn check_termination(&self) -> Option<Termination> {
        if self.chain.reached_initial_state() {
            Some(Termination::InitialStateReached)
        } else if self.chain.len() >= self.max_steps {
            Some(Termination::StepCap)
        } else if self.rounds >= self.max_steps {
            Some(Termination::RoundCap)
        } else {
            None
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn chain(&self) -> &BackwardChain {
        &self.chain
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::Conversation;
    use crate::test_support::{ScriptedOracle, backward_response, step};

    fn run_rounds(planner: &mut BackwardPlanner, oracle: &ScriptedOracle) -> Vec<RoundOutcome> {
        let prompts = PromptEngine::new();
        let mut conversation = Conversation::with_system("sys");
        let mut ctx = OracleContext::new(oracle, &mut conversation);
        let mut outcomes = vec![planner.start("ship it", &mut ctx, &prompts).expect("start")];
        while outcomes.last().and_then(|o| o.termination).is_none() {
            outcomes.push(
                planner
                    .continue_backward(&mut ctx, &prompts)
                    .expect("continue"),
            );
        }
        outcomes
    }

    #[test]
    fn stops_when_initial_state_is_reached() {
        let oracle = ScriptedOracle::new([
            backward_response(&[step("Deploy the release", &["ci"], &["release built"])]),
            backward_response(&[step("Build the release", &["cargo"], &["initial state"])]),
        ]);
        let mut planner = BackwardPlanner::new(10);

        let outcomes = run_rounds(&mut planner, &oracle);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            planner.termination(),
            Some(Termination::InitialStateReached)
        );
        let descriptions: Vec<&str> = planner
            .chain()
            .steps()
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["Deploy the release", "Build the release"]);
    }

    #[test]
    fn start_reports_back_even_when_initial_state_is_reached() {
        let oracle = ScriptedOracle::new([
            backward_response(&[step("Build", &["cargo"], &["initial state"])]),
            "Nothing further is needed.".to_string(),
        ]);
        let prompts = PromptEngine::new();
        let mut conversation = Conversation::default();
        let mut ctx = OracleContext::new(&oracle, &mut conversation);
        let mut planner = BackwardPlanner::new(5);

        let first = planner.start("ship", &mut ctx, &prompts).expect("start");
        assert_eq!(first.termination, None);
        assert_eq!(first.new_steps, 1);
        assert!(first.response.contains("Working backwards from the goal"));
        assert_eq!(planner.termination(), None);
        assert_eq!(planner.check_termination(), Some(Termination::InitialStateReached));

        let next = planner
            .continue_backward(&mut ctx, &prompts)
            .expect("continue");
        assert_eq!(next.termination, Some(Termination::InitialStateReached));
        assert_eq!(planner.chain().len(), 1);
    }

    #[test]
    fn start_round_counts_toward_round_cap() {
        let oracle = ScriptedOracle::new(["prose"]);
        let prompts = PromptEngine::new();
        let mut conversation = Conversation::default();
        let mut ctx = OracleContext::new(&oracle, &mut conversation);
        let mut planner = BackwardPlanner::new(1);

        let first = planner.start("ship", &mut ctx, &prompts).expect("start");
        assert_eq!(first.termination, None);
        assert_eq!(planner.rounds(), 1);
        assert_eq!(planner.check_termination(), Some(Termination::RoundCap));
    }

    #[test]
    fn round_cap_ends_planning_when_nothing_parses() {
        let oracle = ScriptedOracle::new(["prose", "more prose", "still prose", "unused"]);
        let mut planner = BackwardPlanner::new(3);

        let outcomes = run_rounds(&mut planner, &oracle);
        assert_eq!(outcomes.len(), 3);
        assert!(planner.chain().is_empty());
        assert_eq!(planner.termination(), Some(Termination::RoundCap));
        assert_eq!(oracle.calls(), 3);
    }

    #[test]
    fn step_cap_counts_chain_length() {
        let two = backward_response(&[step("A", &[], &["x"]), step("B", &[], &["y"])]);
        let oracle = ScriptedOracle::new([two.clone(), two]);
        let mut planner = BackwardPlanner::new(3);

        run_rounds(&mut planner, &oracle);
        assert_eq!(planner.chain().len(), 4);
        assert_eq!(planner.termination(), Some(Termination::StepCap));
    }

    #[test]
    fn progress_summary_reports_chain_size() {
        let oracle = ScriptedOracle::new([
            backward_response(&[step("A", &[], &["x"])]),
            "nothing".to_string(),
            "nothing".to_string(),
        ]);
        let mut planner = BackwardPlanner::new(3);
        run_rounds(&mut planner, &oracle);

        let prompts: Vec<String> = oracle
            .conversations()
            .iter()
            .filter_map(|c| c.last().map(|m| m.content.clone()))
            .collect();
        assert!(prompts[0].contains(INITIAL_PROGRESS));
        assert!(prompts[1].contains("1 steps identified so far."));
    }

    #[test]
    fn start_discards_previous_chain() {
        let oracle = ScriptedOracle::new([
            backward_response(&[step("Old", &[], &["initial state"])]),
            backward_response(&[step("New", &[], &["initial state"])]),
        ]);
        let prompts = PromptEngine::new();
        let mut conversation = Conversation::default();
        let mut ctx = OracleContext::new(&oracle, &mut conversation);
        let mut planner = BackwardPlanner::new(5);

        planner.start("first", &mut ctx, &prompts).expect("start");
        planner.start("second", &mut ctx, &prompts).expect("restart");
        assert_eq!(planner.goal(), "second");
        assert_eq!(planner.rounds(), 1);
        assert_eq!(planner.chain().len(), 1);
        assert_eq!(planner.chain().steps()[0].description, "New");
    }
}
