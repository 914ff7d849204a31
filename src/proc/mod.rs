//! Processes
//!
//! - `process`: descriptors and their register snapshots
//! - `table`: the shared registry of live and zombie processes
//! - `regs`: the register bank exposed to introspection
//! - `policy`: who may inspect whom

pub mod policy;
pub mod process;
pub mod regs;
pub mod table;

pub use policy::Verdict;
pub use process::{Pid, ProcState, Process, RegisterSnapshot};
pub use regs::{OutOfRange, RegIndex};
pub use table::{ProcessTable, TableError};
