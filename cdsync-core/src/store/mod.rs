//! The object store collaborator (design §6): put/get by [`ObjectId`],
//! constructed over a local directory.

mod fanin;
mod local;

pub use fanin::FanIn;
pub use local::LocalStore;

use crate::digest::ObjectId;
use crate::error::Result;

/// A content-addressed blob repository.
pub trait Store: Send + Sync {
    fn get(&self, id: &ObjectId) -> Result<Vec<u8>>;
    fn put(&self, id: &ObjectId, bytes: &[u8]) -> Result<()>;
}
