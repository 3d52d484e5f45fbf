//! Symmetric primitives

pub mod aes;

pub use self::aes::{
    decrypt_join_accept, ecb_decrypt_in_place, ecb_encrypt_in_place, encrypt_block,
    encrypt_join_accept, BLOCK_SIZE,
};
