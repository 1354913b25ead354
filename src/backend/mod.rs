//! Session backend and identity collaborators

mod credentials;
mod http;
mod session;

pub use credentials::{CredentialProvider, StaticCredentials};
pub use http::HttpSessionBackend;
pub use session::{JoinGrant, SessionBackend, SessionSnapshot, UploadReceipt};
