pub mod codec;
pub mod config;
pub mod error;
pub mod log;
pub mod runtime;
pub mod server;

pub use codec::*;
pub use config::*;
pub use error::*;
pub use log::*;
pub use runtime::*;
pub use server::*;

const CLIENT_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A short random client identifier, used as the `ClientId` a control
/// session hands out in `AuthResp` and every proxy connection tags itself
/// with in `RegProxy`.
pub fn random_client_id() -> String {
    (0..16)
        .map(|_| {
            let idx = rand::random::<usize>() % CLIENT_ID_ALPHABET.len();
            CLIENT_ID_ALPHABET[idx] as char
        })
        .collect()
}
