mod token_encryption;

pub use token_encryption::{AesTokenEncryption, EncryptionError};
