//! Offline signing through the external wallet program

pub mod orchestrator;
pub mod scripted;
pub mod session;
pub mod transactions;

pub use orchestrator::{SigningOrchestrator, SigningReport, SigningState, StepFailure, TransactionOutcome};
pub use scripted::{ScriptedLauncher, SessionScript};
pub use session::{CommandLauncher, ProcessLauncher, ProcessSession, SessionOutput};
pub use transactions::{discover_unsigned, SignedTransactionResult, UnsignedTransaction};
