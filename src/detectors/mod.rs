//! Per-stream heuristic detectors. Each module exposes an `analyze` entry
//! point returning a typed report plus a uniform candidate-event view.

pub mod inventory;
pub mod pos;
pub mod queue;
pub mod recognition;
pub mod rfid;
