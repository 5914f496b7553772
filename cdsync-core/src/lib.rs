#![forbid(unsafe_code)]

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod archive;
pub mod chunker;
pub mod digest;
pub mod driver;
pub mod error;
pub mod index;
pub mod store;

pub use crate::archive::BaseMode;
pub use crate::digest::ObjectId;
pub use crate::driver::{Direction, PermMode, StepOutcome, SyncDriver};
pub use crate::error::{CdsyncError, Result};

pub mod prelude {
    pub use crate::archive::BaseMode;
    pub use crate::digest::ObjectId;
    pub use crate::driver::{Direction, PermMode, StepOutcome, SyncDriver};
    pub use crate::error::{CdsyncError, Result};
}
