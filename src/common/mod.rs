pub mod encryptor;
pub mod error;
