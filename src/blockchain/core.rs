// core.rs splits chain responsibilities into submodules: block hashing and
// mining, per-branch difficulty, ledger reconstruction, block validation and
// the fork manager that ties them together.
pub mod block;
pub mod chain;
pub mod difficulty;
pub mod state;
pub mod validation;

pub use block::*;
pub use chain::*;
pub use difficulty::*;
pub use state::*;
pub use validation::*;
