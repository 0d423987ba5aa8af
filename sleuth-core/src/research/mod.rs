//! Research pipeline: state machine, search fan-out, and collaborators.
//!
//! A run moves through query generation, an initial search round, a bounded
//! reflection loop with follow-up searches, and finalization over the
//! quality-filtered sources.

pub mod collaborators;
pub mod controller;
pub mod fanout;
pub mod mock;
pub mod service;
pub mod sources;
pub mod state;

pub use collaborators::{
    Citation, Collaborators, FinalAnswer, Finalizer, QueryGenerator, QueryPlan, Reflection,
    Reflector, SearchOutput, WebSearcher,
};
pub use controller::{
    NoOpResearchCallback, ResearchCallback, ResearchController, ResearchOutcome, ResearchRequest,
};
pub use fanout::{FanoutReport, SearchFanout, SearchResponse, SearchStatus, SearchTask};
pub use service::ResearchService;
pub use sources::{Source, cites_link, dedupe_by_url, replace_link};
pub use state::{Message, ResearchPhase, ResearchState, Role, StageOutcome, StopReason};
