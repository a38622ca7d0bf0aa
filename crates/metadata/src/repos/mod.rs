//! Repository traits for metadata operations.

pub mod artifacts;
pub mod auth;
pub mod users;

pub use artifacts::ArtifactRepo;
pub use auth::AuthRepo;
pub use users::UserRepo;
