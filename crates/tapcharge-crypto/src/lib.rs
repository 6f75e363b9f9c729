pub mod error;
pub mod keys;
pub mod signing;
pub mod hashing;

pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey};
pub use signing::{sign, verify, Signature};
pub use hashing::{content_id, ContentId};
