#![forbid(unsafe_code)]

mod error;
mod checker;
mod constraint;
mod drops;
mod lower;
mod registry;
mod scope;
mod sigs;
mod types;

pub use error::{CheckFailure, LinearityError, RegistryError};
pub use checker::{FnAnalysis, VarMark, check_fn};
pub use constraint::{ConstraintEnv, TraitSolver, Witness};
pub use drops::{PlannedRelease, ReleaseTarget};
pub use lower::check_module;
pub use registry::{Linearity, TraitRegistry};
pub use scope::{Binding, BindingId, BindingState, ConsumeKind, ScopeStack, Snapshot};
pub use sigs::{FnSig, SigTable};
