//! Directed-graph runner: sequential stages, conditional routing, parallel
//! fan-out with a join barrier, and early exit to the terminal stage.
//!
//! The graph is declared with [`GraphBuilder`] and validated at
//! construction time: every conditional label must map to a registered
//! stage and every parallel fan-out must have a matching join, so routing
//! mistakes are configuration errors rather than runtime branches.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::stage::{Stage, StageError};
use crate::state::PipelineState;

/// Pure routing decision over the current state. Must only return labels
/// declared in the conditional's branch table.
pub type DecisionFn = Arc<dyn Fn(&PipelineState) -> &'static str + Send + Sync>;

#[derive(Clone)]
enum Next {
    Stage(String),
    Conditional {
        decide: DecisionFn,
        branches: HashMap<&'static str, String>,
    },
    Parallel {
        branches: Vec<String>,
        join: String,
    },
    Terminal,
}

#[derive(Debug, Error)]
pub enum GraphBuildError {
    #[error("no entry stage set")]
    NoEntry,

    #[error("no terminal stage set")]
    NoTerminal,

    #[error("duplicate stage registration '{0}'")]
    DuplicateStage(String),

    #[error("edge references unknown stage '{0}'")]
    UnknownStage(String),

    #[error("stage '{0}' has more than one outgoing edge")]
    ConflictingEdges(String),

    #[error("parallel fan-out from '{0}' has no matching join")]
    MissingJoin(String),

    #[error("terminal stage '{0}' must not have an outgoing edge")]
    TerminalEdge(String),

    #[error("stage '{0}' has no outgoing edge and is not the terminal")]
    DeadEnd(String),
}

/// A run that aborted in a non-parallel stage. Carries the partial state
/// so the caller can still assemble a response with the error log.
#[derive(Error)]
#[error("stage '{stage}' failed: {error}")]
pub struct RunFailure {
    pub stage: String,
    pub error: StageError,
    pub state: Box<PipelineState>,
}

impl std::fmt::Debug for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunFailure")
            .field("stage", &self.stage)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct GraphBuilder {
    stages: HashMap<String, Arc<dyn Stage>>,
    edges: HashMap<String, String>,
    conditionals: HashMap<String, (DecisionFn, HashMap<&'static str, String>)>,
    parallels: HashMap<String, Vec<String>>,
    joins: Vec<(Vec<String>, String)>,
    entry: Option<String>,
    terminal: Option<String>,
    duplicate: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under its own name
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        let name = stage.name().to_string();
        if self.stages.insert(name.clone(), Arc::new(stage)).is_some() {
            self.duplicate = Some(name);
        }
        self
    }

    /// Unconditional edge `from → to`
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.edges.insert(from.to_string(), to.to_string());
        self
    }

    /// Conditional edge: after `from`, route by the decision function's
    /// label through the declared branch table
    pub fn conditional<F>(mut self, from: &str, decide: F, branches: &[(&'static str, &str)]) -> Self
    where
        F: Fn(&PipelineState) -> &'static str + Send + Sync + 'static,
    {
        let table = branches
            .iter()
            .map(|(label, to)| (*label, to.to_string()))
            .collect();
        self.conditionals
            .insert(from.to_string(), (Arc::new(decide), table));
        self
    }

    /// Fan out from `from` into concurrently-executed branch stages
    pub fn parallel(mut self, from: &str, branches: &[&str]) -> Self {
        self.parallels.insert(
            from.to_string(),
            branches.iter().map(|b| b.to_string()).collect(),
        );
        self
    }

    /// Converge the given branch stages at `to` once all have completed
    pub fn join(mut self, from: &[&str], to: &str) -> Self {
        self.joins.push((
            from.iter().map(|f| f.to_string()).collect(),
            to.to_string(),
        ));
        self
    }

    pub fn entry(mut self, name: &str) -> Self {
        self.entry = Some(name.to_string());
        self
    }

    pub fn terminal(mut self, name: &str) -> Self {
        self.terminal = Some(name.to_string());
        self
    }

    /// Validate the declared topology and freeze it into a runnable graph
    pub fn build(self) -> Result<PipelineGraph, GraphBuildError> {
        if let Some(name) = self.duplicate {
            return Err(GraphBuildError::DuplicateStage(name));
        }
        let entry = self.entry.ok_or(GraphBuildError::NoEntry)?;
        let terminal = self.terminal.ok_or(GraphBuildError::NoTerminal)?;

        let known = |name: &str| self.stages.contains_key(name);
        for name in [entry.as_str(), terminal.as_str()] {
            if !known(name) {
                return Err(GraphBuildError::UnknownStage(name.to_string()));
            }
        }

        let mut next: HashMap<String, Next> = HashMap::new();
        let claim = |from: &String, spec: Next, next: &mut HashMap<String, Next>| {
            if next.insert(from.clone(), spec).is_some() {
                return Err(GraphBuildError::ConflictingEdges(from.clone()));
            }
            Ok(())
        };

        for (from, to) in &self.edges {
            if !known(from) {
                return Err(GraphBuildError::UnknownStage(from.clone()));
            }
            if !known(to) {
                return Err(GraphBuildError::UnknownStage(to.clone()));
            }
            claim(from, Next::Stage(to.clone()), &mut next)?;
        }

        for (from, (decide, branches)) in &self.conditionals {
            if !known(from) {
                return Err(GraphBuildError::UnknownStage(from.clone()));
            }
            for to in branches.values() {
                if !known(to) {
                    return Err(GraphBuildError::UnknownStage(to.clone()));
                }
            }
            claim(
                from,
                Next::Conditional {
                    decide: Arc::clone(decide),
                    branches: branches.clone(),
                },
                &mut next,
            )?;
        }

        for (from, branches) in &self.parallels {
            if !known(from) {
                return Err(GraphBuildError::UnknownStage(from.clone()));
            }
            for branch in branches {
                if !known(branch) {
                    return Err(GraphBuildError::UnknownStage(branch.clone()));
                }
            }
            let mut wanted = branches.clone();
            wanted.sort();
            let join = self
                .joins
                .iter()
                .find(|(froms, _)| {
                    let mut froms = froms.clone();
                    froms.sort();
                    froms == wanted
                })
                .map(|(_, to)| to.clone())
                .ok_or_else(|| GraphBuildError::MissingJoin(from.clone()))?;
            if !known(&join) {
                return Err(GraphBuildError::UnknownStage(join));
            }
            claim(
                from,
                Next::Parallel {
                    branches: branches.clone(),
                    join,
                },
                &mut next,
            )?;
        }

        if next.contains_key(&terminal) {
            return Err(GraphBuildError::TerminalEdge(terminal));
        }
        next.insert(terminal.clone(), Next::Terminal);

        // Parallel branch stages route through the join barrier, not edges
        let branch_stages: Vec<String> = self.parallels.values().flatten().cloned().collect();
        for name in self.stages.keys() {
            if !next.contains_key(name) && !branch_stages.contains(name) {
                return Err(GraphBuildError::DeadEnd(name.clone()));
            }
        }

        Ok(PipelineGraph {
            stages: self.stages,
            next,
            entry,
        })
    }
}

/// A validated, runnable stage graph. Construct with [`GraphBuilder`].
pub struct PipelineGraph {
    stages: HashMap<String, Arc<dyn Stage>>,
    next: HashMap<String, Next>,
    entry: String,
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("next", &self.next.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .finish()
    }
}


impl PipelineGraph {
    /// Execute the graph over the given state until the terminal stage
    /// completes. A non-parallel stage failure aborts the run and surfaces
    /// the partial state; parallel branch failures are absorbed as branch
    /// outcomes and never abort siblings.
    pub async fn run(&self, mut state: PipelineState) -> Result<PipelineState, RunFailure> {
        info!(request_id = %state.request_id, entry = %self.entry, "pipeline run starting");
        let mut current = self.entry.clone();

        loop {
            if let Err(error) = self.run_stage(&current, &mut state).await {
                state.push_error(&current, error.to_string());
                return Err(RunFailure {
                    stage: current,
                    error,
                    state: Box::new(state),
                });
            }

            match self.next.get(&current) {
                Some(Next::Terminal) => {
                    info!(request_id = %state.request_id, "pipeline run complete");
                    return Ok(state);
                }
                Some(Next::Stage(to)) => current = to.clone(),
                Some(Next::Conditional { decide, branches }) => {
                    let label = decide(&state);
                    match branches.get(label) {
                        Some(to) => {
                            debug!(from = %current, label, to = %to, "conditional route");
                            current = to.clone();
                        }
                        None => {
                            // Build-time validation covers declared labels; a
                            // decision function returning anything else is a
                            // configuration bug, fatal by contract.
                            let error = StageError::Execution(format!(
                                "conditional after '{current}' returned undeclared label '{label}'"
                            ));
                            state.push_error(&current, error.to_string());
                            return Err(RunFailure {
                                stage: current,
                                error,
                                state: Box::new(state),
                            });
                        }
                    }
                }
                Some(Next::Parallel { branches, join }) => {
                    self.run_parallel(branches, &mut state).await;
                    current = join.clone();
                }
                None => {
                    let error =
                        StageError::Execution(format!("stage '{current}' has no routing entry"));
                    state.push_error(&current, error.to_string());
                    return Err(RunFailure {
                        stage: current,
                        error,
                        state: Box::new(state),
                    });
                }
            }
        }
    }

    async fn run_stage(&self, name: &str, state: &mut PipelineState) -> Result<(), StageError> {
        let stage = self
            .stages
            .get(name)
            .ok_or_else(|| StageError::Execution(format!("stage '{name}' is not registered")))?;
        debug!(stage = name, "running stage");
        let start = Instant::now();
        let result = stage.run(state).await;
        state.set_metric(
            &format!("latency_ms.{name}"),
            start.elapsed().as_millis() as u64,
        );
        result
    }

    /// Run all branch stages concurrently on cloned state and merge every
    /// completion back in. All launched branches run to completion; a
    /// failing branch contributes an error entry instead of an abort.
    async fn run_parallel(&self, branches: &[String], state: &mut PipelineState) {
        let base_errors = state.errors.len();
        let mut tasks = JoinSet::new();

        for name in branches {
            let Some(stage) = self.stages.get(name).map(Arc::clone) else {
                state.push_error(name, "branch stage is not registered");
                continue;
            };
            let name = name.clone();
            let mut snapshot = state.clone();
            tasks.spawn(async move {
                let start = Instant::now();
                let result = stage.run(&mut snapshot).await;
                snapshot.set_metric(
                    &format!("latency_ms.{name}"),
                    start.elapsed().as_millis() as u64,
                );
                (name, result, snapshot)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()), snapshot)) => {
                    debug!(branch = %name, "branch complete");
                    state.absorb_branch(snapshot, base_errors);
                }
                Ok((name, Err(error), mut snapshot)) => {
                    warn!(branch = %name, %error, "branch failed; siblings unaffected");
                    snapshot.push_error(&name, error.to_string());
                    state.absorb_branch(snapshot, base_errors);
                }
                Err(join_error) => {
                    warn!(%join_error, "branch task aborted");
                    state.push_error("parallel", format!("branch task aborted: {join_error}"));
                }
            }
        }
    }
}
