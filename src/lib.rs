//! Certificate artifact intake, password gating, response validation and
//! tree inspection.

pub mod actor;
pub mod cli;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod intake;
pub mod password;
pub mod routes;
pub mod session;
pub mod state;
pub mod tree;
pub mod validate;
pub mod ws;

pub use actor::SessionHandle;
pub use collaborator::{HttpBackend, ParseBackend};
pub use error::{CollaboratorError, ParseFailure, ReadError, SessionError, ValidationError};
pub use session::{Session, Snapshot};
pub use validate::{CertificateBundle, validate};
