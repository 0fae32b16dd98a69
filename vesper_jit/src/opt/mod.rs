//! The optimization pipeline.
//!
//! Phases run in dependency order, each to its own fixpoint where
//! applicable:
//!
//! 1. **Arithmetic flags**: what consumers demand of numeric results
//! 2. **Predictions**: type inference over the prediction lattice,
//!    interleaved with double-format voting
//! 3. **Fixup**: specialize generic opcodes on inferred predictions
//! 4. **Local CSE**: per-block redundancy and load elimination
//! 5. **Virtual registers**: scoreboard allocation
//! 6. **Global CFA**: forward flow analysis with block revisit flags
//!
//! The order is not negotiable: predictions consult flags, fixup
//! consults predictions, CSE consults fixup's opcodes and the
//! predictions, allocation consults the post-CSE reference counts, and
//! the flow analysis consults everything.

pub mod arith_flags;
pub mod cse;
pub mod fixup;
pub mod predictions;

pub use arith_flags::ArithFlagPropagation;
pub use cse::{LocalCse, DEFAULT_LOOKBACK_LIMIT};
pub use fixup::Fixup;
pub use predictions::PredictionPropagation;

use std::time::{Duration, Instant};

use crate::cfa::{self, TypeFlowState};
use crate::code_block::CodeBlock;
use crate::ir::graph::Graph;
use crate::regalloc::VirtualRegisterAllocation;

/// Sweep direction of a bidirectional fixpoint pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// In node order.
    Forward,
    /// In reverse node order.
    Backward,
}

/// A pipeline phase.
pub trait Phase {
    /// Short name for stats and logging.
    fn name(&self) -> &'static str;

    /// Run the phase. Returns whether anything changed.
    fn run(&mut self, graph: &mut Graph, code_block: &mut CodeBlock) -> bool;
}

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for the pipeline.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// How far back, in nodes, CSE scans for a candidate.
    pub cse_lookback_limit: u32,
    /// Collect per-phase wall times.
    pub collect_timing: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cse_lookback_limit: DEFAULT_LOOKBACK_LIMIT,
            collect_timing: true,
        }
    }
}

impl OptimizerConfig {
    /// Cheap configuration for compile-time-sensitive callers.
    pub fn minimal() -> Self {
        Self {
            cse_lookback_limit: 64,
            collect_timing: false,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Outcome of one phase.
#[derive(Debug, Clone)]
pub struct PhaseStat {
    /// Phase name.
    pub name: &'static str,
    /// Whether the phase changed the graph.
    pub changed: bool,
    /// Wall time, if timing collection is on.
    pub time: Duration,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct OptimizeStats {
    /// Per-phase outcomes, in run order.
    pub phases: Vec<PhaseStat>,
    /// Total wall time.
    pub total_time: Duration,
    /// Callee registers required after allocation.
    pub callee_registers: u32,
}

// =============================================================================
// Driver
// =============================================================================

/// Run the full pipeline with default configuration.
pub fn optimize(graph: &mut Graph, code_block: &mut CodeBlock) -> OptimizeStats {
    optimize_with_config(graph, code_block, &OptimizerConfig::default())
}

/// Run the full pipeline.
pub fn optimize_with_config(
    graph: &mut Graph,
    code_block: &mut CodeBlock,
    config: &OptimizerConfig,
) -> OptimizeStats {
    let start = Instant::now();
    let mut stats = OptimizeStats::default();

    log::debug!(
        "optimizing {} nodes in {} blocks",
        graph.len(),
        graph.blocks.len()
    );
    if log::log_enabled!(log::Level::Trace) {
        log::trace!("graph before optimization:\n{}", graph.dump());
    }
    debug_assert!(graph.verify().is_ok(), "{:?}", graph.verify());

    run_phase(
        &mut stats,
        config,
        graph,
        code_block,
        &mut ArithFlagPropagation::new(),
    );
    run_phase(
        &mut stats,
        config,
        graph,
        code_block,
        &mut PredictionPropagation::new(),
    );
    run_phase(&mut stats, config, graph, code_block, &mut Fixup::new());
    run_phase(
        &mut stats,
        config,
        graph,
        code_block,
        &mut LocalCse::new(config.cse_lookback_limit),
    );

    let mut allocation = VirtualRegisterAllocation::new();
    run_phase(&mut stats, config, graph, code_block, &mut allocation);
    stats.callee_registers = allocation.callee_registers;

    let cfa_start = Instant::now();
    let mut state = TypeFlowState::new(graph);
    cfa::global_cfa(graph, &mut state);
    stats.phases.push(PhaseStat {
        name: "global-cfa",
        changed: true,
        time: if config.collect_timing {
            cfa_start.elapsed()
        } else {
            Duration::ZERO
        },
    });

    if log::log_enabled!(log::Level::Trace) {
        log::trace!("graph after optimization:\n{}", graph.dump());
    }

    stats.total_time = start.elapsed();
    stats
}

fn run_phase(
    stats: &mut OptimizeStats,
    config: &OptimizerConfig,
    graph: &mut Graph,
    code_block: &mut CodeBlock,
    phase: &mut dyn Phase,
) {
    let start = Instant::now();
    let changed = phase.run(graph, code_block);
    let time = if config.collect_timing {
        start.elapsed()
    } else {
        Duration::ZERO
    };
    log::trace!("phase {}: changed={}", phase.name(), changed);
    stats.phases.push(PhaseStat {
        name: phase.name(),
        changed,
        time,
    });
}

// =============================================================================
// Tests
// =============================================================================
