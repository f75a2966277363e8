//! Top-level planner state machine.
//!
//! [`GoalSeekAgent`] owns one goal's worth of state (conversation, backward
//! chain, forward plan and cursor) and routes each [`AgentEvent`] to the engine
//! that the current [`PlannerPhase`] expects. Events a phase does not expect are
//! answered with the execution status instead of an error.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::backward::BackwardPlanner;
use crate::core::conversation::Conversation;
use crate::core::cursor::ExecutionCursor;
use crate::core::intent::{IntentAnalysis, parse_intent_analysis};
use crate::core::plan::{BackwardChain, ForwardPlan};
use crate::core::status::{StatusView, numbered_steps, render_execution_status};
use crate::core::types::{AgentEvent, AgentRequest, PlannerPhase};
use crate::forward::ForwardExecutor;
use crate::io::oracle::{Oracle, OracleContext};
use crate::io::prompt::{PlanningPrompt, PromptEngine};

pub const GREETING: &str = "Hello! I plan by working backwards from your goal. \
     Tell me what you'd like to achieve, and I'll break it down into actionable steps.";

const ASK_FOR_GOAL: &str = "Please tell me what you'd like to achieve.";
const PLAN_PENDING: &str = "Plan is still being formulated.";

/// Knobs the agent reads; loaded from [`crate::io::config::BackchainConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub max_steps: usize,
    pub analyze_intent: bool,
    pub result_preview_chars: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            analyze_intent: true,
            result_preview_chars: 100,
        }
    }
}

/// Everything that belongs to the current goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub phase: PlannerPhase,
    pub goal: String,
    pub intent: Option<IntentAnalysis>,
    pub conversation: Conversation,
    pub backward: BackwardPlanner,
    pub forward: ForwardExecutor,
}

impl AgentState {
    fn fresh(system_prompt: &str, max_steps: usize) -> Self {
        Self {
            phase: PlannerPhase::AwaitingGoal,
            goal: String::new(),
            intent: None,
            conversation: Conversation::with_system(system_prompt),
            backward: BackwardPlanner::new(max_steps),
            forward: ForwardExecutor::default(),
        }
    }
}

pub struct GoalSeekAgent<O: Oracle> {
    oracle: O,
    prompts: PromptEngine,
    settings: AgentSettings,
    system_prompt: String,
    state: AgentState,
}

impl<O: Oracle> GoalSeekAgent<O> {
    pub fn new(oracle: O, settings: AgentSettings) -> Result<Self> {
        let prompts = PromptEngine::new();
        let system_prompt = prompts.system()?;
        let state = AgentState::fresh(&system_prompt, settings.max_steps);
        Ok(Self {
            oracle,
            prompts,
            settings,
            system_prompt,
            state,
        })
    }

    /// Opening message shown before any goal is given.
    pub fn greeting(&self) -> AgentRequest {
        AgentRequest::Message(GREETING.to_string())
    }

    /// Handle one event to completion.
    ///
    /// On error the agent is left exactly as it was before the event.
    #[instrument(skip_all, fields(phase = self.state.phase.as_str()))]
    pub fn handle_event(&mut self, event: AgentEvent) -> Result<AgentRequest> {
        let snapshot = self.state.clone();
        match self.dispatch(event) {
            Ok(request) => {
                info!(phase = self.state.phase.as_str(), "event handled");
                Ok(request)
            }
            Err(err) => {
                warn!(err = %err, "event failed, restoring state");
                self.state = snapshot;
                Err(err)
            }
        }
    }

    fn dispatch(&mut self, event: AgentEvent) -> Result<AgentRequest> {
        match (self.state.phase, event) {
            (PlannerPhase::AwaitingGoal, AgentEvent::Text(text)) => self.receive_goal(&text),
            (PlannerPhase::BackwardPlanning, AgentEvent::Text(_)) => self.continue_backward(),
            (PlannerPhase::ForwardPlanReady, AgentEvent::Text(_)) => self.start_execution(),
            (PlannerPhase::Executing, AgentEvent::Text(text)) => self.redirect_execution(&text),
            (PlannerPhase::Executing, AgentEvent::CommandOutput { command, output }) => {
                self.handle_command_output(&command, &output)
            }
            (PlannerPhase::Complete, AgentEvent::Text(text)) => {
                self.reset();
                self.receive_goal(&text)
            }
            (phase, AgentEvent::CommandOutput { .. }) => {
                info!(
                    phase = phase.as_str(),
                    "unexpected command output, reporting status"
                );
                Ok(self.status_message())
            }
        }
    }

    fn receive_goal(&mut self, text: &str) -> Result<AgentRequest> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(AgentRequest::Message(ASK_FOR_GOAL.to_string()));
        }
        self.state.conversation.push_user(text);

        if !self.settings.analyze_intent {
            return self.start(text);
        }

        let prompt = self.prompts.intent_analysis(text)?;
        let reply = OracleContext::new(&self.oracle, &mut self.state.conversation).ask(&prompt)?;
        let analysis = parse_intent_analysis(&reply);
        let goal = analysis.goal_or(text);
        let summary = format!(
            "I've analyzed your request and identified the following goal:\n\n\
             **Goal:** {goal}\n\n{}",
            analysis.visualize()
        );
        self.state.intent = Some(analysis);

        match self.start(&goal)? {
            AgentRequest::Message(message) => {
                Ok(AgentRequest::Message(format!("{summary}\n\n{message}")))
            }
            other => Ok(other),
        }
    }

    /// Begin backward planning for `goal`.
    ///
    /// Always answers with the oracle's first analysis; the chain is only
    /// checked for termination from the next round on.
    pub fn start(&mut self, goal: &str) -> Result<AgentRequest> {
        self.state.goal = goal.to_string();
        self.state.phase = PlannerPhase::BackwardPlanning;

        let mut ctx = OracleContext::new(&self.oracle, &mut self.state.conversation);
        let outcome = self.state.backward.start(goal, &mut ctx, &self.prompts)?;
        Ok(AgentRequest::Message(format!(
            "I've started working backwards from the goal. Here's my analysis:\n\n{}\n\n\
             I'll continue working backwards to create a complete plan.",
            outcome.response.trim()
        )))
    }

    /// Run one more backward round, moving to the forward plan once it terminates.
    pub fn continue_backward(&mut self) -> Result<AgentRequest> {
        let mut ctx = OracleContext::new(&self.oracle, &mut self.state.conversation);
        let outcome = self
            .state
            .backward
            .continue_backward(&mut ctx, &self.prompts)?;
        if outcome.termination.is_some() {
            return self.create_forward_plan();
        }
        Ok(AgentRequest::Message(format!(
            "I'm continuing to work backwards. Here's my latest analysis:\n\n{}\n\n\
             I've identified {} steps so far. I'll continue working backwards.",
            outcome.response.trim(),
            self.state.backward.chain().len()
        )))
    }

    /// Ask the oracle to review the finished chain, then reverse it into the
    /// forward plan.
    ///
    /// An empty chain skips the planning query.
    pub fn create_forward_plan(&mut self) -> Result<AgentRequest> {
        let notes = self.planning_notes()?;
        let plan = self
            .state
            .forward
            .create_forward_plan(self.state.backward.chain());
        let summary = if plan.is_empty() {
            "(no steps identified)".to_string()
        } else {
            numbered_steps(plan.steps(), 1)
        };
        let notes = notes
            .map(|notes| format!("{}\n\n", notes.trim()))
            .unwrap_or_default();
        let message = format!(
            "I've created a forward execution plan with {} steps:\n\n{summary}\n\n{notes}\
             I'll now start executing this plan step by step.",
            plan.len()
        );
        self.state.phase = PlannerPhase::ForwardPlanReady;
        Ok(AgentRequest::Message(message))
    }

    fn planning_notes(&mut self) -> Result<Option<String>> {
        let chain = self.state.backward.chain();
        if chain.is_empty() {
            return Ok(None);
        }
        let tools = chain.tools_required();
        let prompt = self.prompts.planning(&PlanningPrompt {
            goal: &self.state.goal,
            analysis: chain.steps(),
            tools: &tools,
        })?;
        let reply = OracleContext::new(&self.oracle, &mut self.state.conversation).ask(&prompt)?;
        Ok(Some(reply))
    }

    pub fn start_execution(&mut self) -> Result<AgentRequest> {
        self.state.phase = PlannerPhase::Executing;
        let mut ctx = OracleContext::new(&self.oracle, &mut self.state.conversation);
        let request =
            self.state
                .forward
                .start_execution(&self.state.goal, &mut ctx, &self.prompts)?;
        Ok(self.track_finish(request))
    }

    pub fn continue_execution(&mut self) -> Result<AgentRequest> {
        self.state.phase = PlannerPhase::Executing;
        let mut ctx = OracleContext::new(&self.oracle, &mut self.state.conversation);
        let request =
            self.state
                .forward
                .continue_execution(&self.state.goal, &mut ctx, &self.prompts)?;
        Ok(self.track_finish(request))
    }

    fn track_finish(&mut self, request: AgentRequest) -> AgentRequest {
        if request.is_finish() {
            info!(
                completed = self.state.forward.cursor().completed_steps().len(),
                "execution complete"
            );
            self.state.phase = PlannerPhase::Complete;
        }
        request
    }

    /// Record the current step as completed. No-op when there is nothing to complete.
    pub fn mark_step_completed(&mut self, result: &str) -> bool {
        self.state.forward.mark_step_completed(result)
    }

    /// Output for the pending command: log it, complete the step, move on.
    pub fn handle_command_output(&mut self, command: &str, output: &str) -> Result<AgentRequest> {
        if !self.state.forward.is_pending(command) {
            info!("command output does not match pending command, reporting status");
            return Ok(self.status_message());
        }
        self.state
            .conversation
            .push_user(format!("Command output:\n```\n{output}\n```"));
        self.state.forward.complete_command(
            command,
            output,
            self.settings.result_preview_chars,
        );
        self.continue_execution()
    }

    fn redirect_execution(&mut self, text: &str) -> Result<AgentRequest> {
        let text = text.trim();
        if !text.is_empty() {
            self.state.conversation.push_user(text);
        }
        self.state.forward.clear_pending();
        self.continue_execution()
    }

    /// Drop the current goal and everything derived from it.
    pub fn reset(&mut self) {
        info!("resetting planner state");
        self.state = AgentState::fresh(&self.system_prompt, self.settings.max_steps);
    }

    pub fn execution_status(&self) -> String {
        let forward = &self.state.forward;
        if !forward.plan_ready() {
            return PLAN_PENDING.to_string();
        }
        render_execution_status(&StatusView {
            goal: &self.state.goal,
            plan: forward.plan(),
            cursor: forward.cursor(),
            progress: forward.progress(),
        })
    }

    fn status_message(&self) -> AgentRequest {
        AgentRequest::Message(self.execution_status())
    }

    pub fn phase(&self) -> PlannerPhase {
        self.state.phase
    }

    pub fn goal(&self) -> &str {
        &self.state.goal
    }

    pub fn intent(&self) -> Option<&IntentAnalysis> {
        self.state.intent.as_ref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.state.conversation
    }

    pub fn chain(&self) -> &BackwardChain {
        self.state.backward.chain()
    }

    pub fn plan(&self) -> &ForwardPlan {
        self.state.forward.plan()
    }

    pub fn cursor(&self) -> &ExecutionCursor {
        self.state.forward.cursor()
    }

    pub fn pending_command(&self) -> Option<&str> {
        self.state.forward.pending_command()
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn settings(&self) -> AgentSettings {
        self.settings
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        PLAN_REVIEW, ScriptedOracle, backward_response, command_response, planned_replies, step,
    };

    fn settings(max_steps: usize) -> AgentSettings {
        AgentSettings {
            max_steps,
            analyze_intent: false,
            result_preview_chars: 100,
        }
    }

    fn text(s: &str) -> AgentEvent {
        AgentEvent::Text(s.to_string())
    }

    /// Goal text plus one continue: start, then the terminating round.
    fn plan_goal<O: Oracle>(agent: &mut GoalSeekAgent<O>, goal: &str) -> AgentRequest {
        agent.handle_event(text(goal)).expect("start");
        agent.handle_event(text("continue")).expect("plan")
    }

    #[test]
    fn empty_goal_asks_again_without_phase_change() {
        let mut agent = GoalSeekAgent::new(ScriptedOracle::default(), settings(3)).expect("agent");
        let request = agent.handle_event(text("   ")).expect("event");
        assert_eq!(request, AgentRequest::Message(ASK_FOR_GOAL.to_string()));
        assert_eq!(agent.phase(), PlannerPhase::AwaitingGoal);
        assert_eq!(agent.oracle().calls(), 0);
    }

    #[test]
    fn intent_analysis_supplies_the_goal() {
        let oracle = ScriptedOracle::new([
            "[Intent](Set up a blog)\n[Fixed User want intent] = Publish a static blog".to_string(),
            backward_response(&[step("Write posts", &[], &["initial state"])]),
        ]);
        let mut agent = GoalSeekAgent::new(
            &oracle,
            AgentSettings {
                analyze_intent: true,
                ..settings(5)
            },
        )
        .expect("agent");

        let request = agent.handle_event(text("i want a blog")).expect("event");
        assert_eq!(agent.goal(), "Publish a static blog");
        assert_eq!(agent.phase(), PlannerPhase::BackwardPlanning);
        let AgentRequest::Message(message) = request else {
            panic!("expected a message");
        };
        assert!(message.contains("**Goal:** Publish a static blog"));
        assert!(message.contains("I've started working backwards"));
        assert!(oracle.prompts()[1].contains("Publish a static blog"));
    }

    #[test]
    fn start_shows_analysis_even_when_initial_state_is_reached() {
        let oracle = ScriptedOracle::new(planned_replies(&[step(
            "Build the binary",
            &["cargo"],
            &["initial state"],
        )]));
        let mut agent = GoalSeekAgent::new(&oracle, settings(5)).expect("agent");

        let first = agent.handle_event(text("binary exists")).expect("start");
        assert_eq!(agent.phase(), PlannerPhase::BackwardPlanning);
        let AgentRequest::Message(message) = first else {
            panic!("expected analysis");
        };
        assert!(message.contains("Working backwards from the goal"));
        assert!(message.contains("1. Build the binary"));

        agent.handle_event(text("continue")).expect("plan");
        assert_eq!(agent.phase(), PlannerPhase::ForwardPlanReady);
        assert_eq!(agent.plan().len(), 1);
    }

    #[test]
    fn forward_plan_asks_for_a_planning_review() {
        let oracle = ScriptedOracle::new([
            backward_response(&[step("Deploy", &["ci"], &["artifact built"])]),
            backward_response(&[step("Build artifact", &["cargo", "make"], &["initial state"])]),
            PLAN_REVIEW.to_string(),
        ]);
        let mut agent = GoalSeekAgent::new(&oracle, settings(5)).expect("agent");

        let request = plan_goal(&mut agent, "service deployed");
        assert_eq!(agent.phase(), PlannerPhase::ForwardPlanReady);
        assert_eq!(oracle.calls(), 3);

        let planning_prompt = oracle.prompts().pop().expect("planning prompt");
        assert!(planning_prompt.contains("<goal>\nservice deployed\n</goal>"));
        assert!(planning_prompt.contains("1. Deploy\n2. Build artifact"));
        assert!(planning_prompt.contains("Tools required: ci, cargo, make"));

        let AgentRequest::Message(message) = request else {
            panic!("expected plan message");
        };
        assert!(message.contains("1. Build artifact\n2. Deploy"));
        assert!(message.contains(PLAN_REVIEW));
        assert_eq!(
            agent.conversation().last().map(|m| m.content.as_str()),
            Some(PLAN_REVIEW)
        );
    }

    #[test]
    fn failed_planning_review_rolls_back_the_round() {
        let oracle = ScriptedOracle::new([
            backward_response(&[step("Deploy", &[], &["artifact built"])]),
            backward_response(&[step("Build artifact", &[], &["initial state"])]),
        ]);
        let mut agent = GoalSeekAgent::new(&oracle, settings(5)).expect("agent");
        agent.handle_event(text("service deployed")).expect("start");
        let before = agent.state().clone();

        let err = agent.handle_event(text("continue")).unwrap_err();
        assert!(format!("{err:#}").contains("scripted oracle exhausted"));
        assert_eq!(agent.state(), &before);
        assert_eq!(agent.chain().len(), 1);
        assert!(!agent.state().forward.plan_ready());
    }

    #[test]
    fn empty_chain_skips_planning_review() {
        let oracle = ScriptedOracle::new(["prose", "more prose"]);
        let mut agent = GoalSeekAgent::new(&oracle, settings(2)).expect("agent");

        let request = plan_goal(&mut agent, "goal");
        assert_eq!(agent.phase(), PlannerPhase::ForwardPlanReady);
        assert_eq!(oracle.calls(), 2);
        let AgentRequest::Message(message) = request else {
            panic!("expected plan message");
        };
        assert!(message.contains("(no steps identified)\n\nI'll now start executing"));
    }

    #[test]
    fn unexpected_command_output_reports_status() {
        let oracle = ScriptedOracle::new(["nothing useful"]);
        let mut agent = GoalSeekAgent::new(&oracle, settings(3)).expect("agent");
        agent.handle_event(text("goal")).expect("start");
        assert_eq!(agent.phase(), PlannerPhase::BackwardPlanning);

        let request = agent
            .handle_event(AgentEvent::CommandOutput {
                command: "ls".to_string(),
                output: "x".to_string(),
            })
            .expect("status");
        assert_eq!(request, AgentRequest::Message(PLAN_PENDING.to_string()));
        assert_eq!(agent.phase(), PlannerPhase::BackwardPlanning);
        assert_eq!(agent.chain().len(), 0);
    }

    #[test]
    fn mismatched_command_output_is_a_status_query() {
        let oracle = ScriptedOracle::new(planned_replies(&[step("Build", &[], &["initial state"])]));
        oracle.push(command_response("make"));
        let mut agent = GoalSeekAgent::new(&oracle, settings(3)).expect("agent");
        plan_goal(&mut agent, "goal");
        agent.handle_event(text("continue")).expect("execute");
        assert_eq!(agent.pending_command(), Some("make"));

        let request = agent
            .handle_event(AgentEvent::CommandOutput {
                command: "make test".to_string(),
                output: "ok".to_string(),
            })
            .expect("status");
        let AgentRequest::Message(status) = request else {
            panic!("expected status");
        };
        assert!(status.contains("Currently executing step 1/1: Build"));
        assert_eq!(agent.cursor().current_step_index(), 0);
    }

    #[test]
    fn user_text_during_execution_re_asks_current_step() {
        let oracle = ScriptedOracle::new(planned_replies(&[step("Build", &[], &["initial state"])]));
        oracle.push(command_response("make"));
        oracle.push(command_response("make -j4"));
        let mut agent = GoalSeekAgent::new(&oracle, settings(3)).expect("agent");
        plan_goal(&mut agent, "goal");
        agent.handle_event(text("continue")).expect("execute");

        let request = agent.handle_event(text("use more jobs")).expect("redirect");
        assert_eq!(request, AgentRequest::RunCommand("make -j4".to_string()));
        assert_eq!(agent.pending_command(), Some("make -j4"));
        let last_query = oracle.conversations().pop().expect("query");
        assert!(
            last_query
                .messages()
                .iter()
                .any(|m| m.content == "use more jobs")
        );
    }

    #[test]
    fn complete_then_new_text_starts_a_fresh_goal() {
        let oracle =
            ScriptedOracle::new(planned_replies(&[step("Only step", &[], &["initial state"])]));
        oracle.push("Done without commands.");
        oracle.push(backward_response(&[step("Next goal step", &[], &["current state"])]));
        let mut agent = GoalSeekAgent::new(&oracle, settings(3)).expect("agent");
        plan_goal(&mut agent, "first goal");
        let finish = agent.handle_event(text("go")).expect("execute");
        assert!(finish.is_finish());
        assert_eq!(agent.phase(), PlannerPhase::Complete);

        agent.handle_event(text("second goal")).expect("restart");
        assert_eq!(agent.goal(), "second goal");
        assert_eq!(agent.phase(), PlannerPhase::BackwardPlanning);
        assert_eq!(agent.chain().len(), 1);
        assert_eq!(agent.chain().steps()[0].description, "Next goal step");
        assert!(!agent.state().forward.plan_ready());
        assert!(
            !agent
                .conversation()
                .messages()
                .iter()
                .any(|m| m.content == "first goal")
        );
    }

    #[test]
    fn greeting_and_pending_status() {
        let agent = GoalSeekAgent::new(ScriptedOracle::default(), settings(3)).expect("agent");
        assert_eq!(agent.greeting(), AgentRequest::Message(GREETING.to_string()));
        assert_eq!(agent.execution_status(), PLAN_PENDING);
    }
}
