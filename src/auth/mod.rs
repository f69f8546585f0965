pub mod google;
pub mod handlers;
pub mod password;
pub mod provision;
pub mod token;
pub mod verifier;

pub use provision::{provision_user, ExternalProfile, ProvisionError};
pub use token::TokenKeys;
pub use verifier::verify_bearer;
