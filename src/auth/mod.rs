//! Anonymous identities: token issuing and request extraction.

pub mod extract;
pub mod token;

pub use extract::{OptionalUser, RequiredUser};
pub use token::{AuthError, IssuedToken, Principal, TokenIssuer};
