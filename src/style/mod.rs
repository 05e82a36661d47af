pub mod swap;

pub use swap::{RestoreOutcome, RestoreReport, StyleSwapManager, SwapPhase};
