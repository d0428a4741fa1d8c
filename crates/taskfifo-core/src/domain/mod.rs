//! Domain model (ids, status, rollback trigger, outcome, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod rollback;
pub mod state;

pub use self::errors::{ContextError, GroupError, SubmitError, TaskError};
pub use self::ids::GroupId;
pub use self::outcome::Outcome;
pub use self::rollback::{RollbackInfo, RollbackKind};
pub use self::state::GroupStatus;
