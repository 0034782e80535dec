//! Retrieval-augmented question answering with grounded citations.
//!
//! The pipeline runs one request through a fixed sequence of stages:
//!
//! ```text
//! question -> Safety Gate -> Retriever Adapter -> Evidence Assembler
//!          -> Grounded Generator -> Groundedness Verifier -> AgentResponse
//! ```
//!
//! The [`Orchestrator`] drives the stages as an explicit state machine
//! ([`orchestrator::transition`]) and turns every failure into a [`Verdict`].
//! Retrieval and completion are consumed through the
//! [`ragent_knowledge::SearchBackend`] and [`ragent_llm::LlmClient`] traits.

pub mod audit;
pub mod citations;
pub mod evidence;
pub mod generator;
pub mod orchestrator;
pub mod safety;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod tests;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use citations::CitationSyntax;
pub use evidence::{assemble, EvidenceEntry, EvidenceSet};
pub use generator::{build_grounded_prompt, GeneratorOptions, GroundedGenerator};
pub use orchestrator::{transition, Orchestrator, OrchestratorOptions, PipelineEvent, PipelineState};
pub use safety::{SafetyAssessment, SafetyFinding, SafetyGate, SafetyVerdict, Severity};
pub use types::{AgentResponse, Answer, Citation, Question, Verdict};
pub use verifier::{GroundednessVerifier, Verification};
