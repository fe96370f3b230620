//! External tools driven by the judge.
//!
//! The reference generator produces the expected trace and the program
//! image; candidates turn that image into the trace under test.

pub mod isim;
pub mod logisim;
pub mod mars;
pub mod mock;
pub mod traits;

pub use isim::{ExecutableCandidate, ExecutableConfig};
pub use logisim::{LogisimCandidate, LogisimConfig};
pub use mars::{HANDLER_SEGMENT, MarsConfig, ReferenceGenerator};
pub use mock::MockCandidate;
pub use traits::{Candidate, SimulationRun};
