pub mod signer;

pub use signer::{ObjectStoreSigner, UrlSigner};
