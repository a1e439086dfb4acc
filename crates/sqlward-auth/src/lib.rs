//! sqlward-auth — who is calling, and may they.
//!
//! [`TokenAuthority`] issues and verifies HS256 bearer tokens and keeps one
//! live fingerprint per user, so re-issuing or revoking a token invalidates
//! the previous one. [`CredentialResolver`] turns a token into a
//! [`Credential`] using only published snapshots, and [`authorize`] checks
//! account status and role membership.

pub mod error;
pub mod gate;
pub mod resolver;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use gate::{Decision, DenyReason, Gate, authorize};
pub use resolver::{Credential, CredentialResolver};
pub use token::{Claims, IssuedToken, TokenAuthority};
