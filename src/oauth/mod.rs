//! Grant bookkeeping: authorization codes and recorded consent.

pub mod codes;
pub mod consent;

pub use codes::AuthorizationCodeStore;
pub use consent::ConsentStore;
