//! Type definitions for the loss-prevention pipeline

pub mod event;
pub mod record;

pub use event::{
    CandidateEvent, CandidateKind, ConfidenceTier, CorrelatedEvent, CorrelatedEvidence,
    CorrelatedKind, FinalEvent, Severity, STORE_FLOOR,
};
pub use record::{
    InventorySnapshot, PosTransaction, QueueObservation, RawEvent, RecognitionEvent, RfidReading,
};
