//! Ensemble Core Library
//!
//! In-process coordination of autonomous agents: nine coordination patterns,
//! a message bus with shared memory, a team roster and a conflict resolver.
//! Re-exports the main components for programmatic access.

pub mod agent;
pub mod communication;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod fakes;
pub mod obs;
pub mod team;
pub mod telemetry;

pub use agent::{
    Agent, AgentAnalytics, AgentError, AgentHandle, AgentInput, AgentOutput, AgentResult,
    AgentStatus, HealthReport, Task, TaskPriority, TaskStatus,
};

pub use communication::{
    handler_fn, CommError, CommResult, CommStats, InterAgentCommunication, Message,
    MessageHandler, MessagePriority, MessageType,
};

pub use config::{ConfigError, EngineConfig};

pub use conflict::{
    Conflict, ConflictEntry, ConflictError, ConflictResolver, ConflictResult, ConflictStats,
    Resolution, ResolutionStrategy,
};

pub use engine::{
    AgenticWorkflowEngine, EngineError, EngineResult, FailurePolicy, IterationState,
    OptimizationLevel, PatternConfig, PatternKind, PatternMetrics, PatternResult,
    PerformanceReport, Scorer,
};

pub use team::{
    AgentTeamManager, Specialization, Team, TeamError, TeamResult, TeamSizeBounds, TeamStats,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
