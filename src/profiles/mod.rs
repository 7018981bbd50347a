//! Profile persistence collaborators.
//!
//! The engine only consumes [`ProfileRepository`]: a stream of the active
//! profile plus activation writes. CRUD lives on the concrete repositories.

mod memory;
mod repository;
mod sqlite;

pub use memory::InMemoryProfileRepository;
pub use repository::ProfileRepository;
pub use sqlite::SqliteProfileRepository;
