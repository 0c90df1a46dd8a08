pub mod candidates;
pub mod classifier;
pub mod engine;
pub mod ledger;
pub mod reconciler;

pub use candidates::{Candidate, CandidateGenerator, RecordWarning, ScoreBreakdown, VoucherCandidates};
pub use classifier::{Classified, MatchClassifier};
pub use engine::{EngineStats, IngestSummary, MatchEngine, MatchInfo, PassSummary, ProposalView};
pub use ledger::ProposalLedger;
pub use reconciler::{DecisionOutcome, Reconciler};
