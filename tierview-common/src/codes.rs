//! Random code generation for entity ids and stored file names
//!
//! Codes are drawn from `[A-Za-z0-9]`, so they are safe as both URL path
//! segments and file names.

use rand::RngCore;
use sha2::{Digest, Sha256};

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Source of short random codes
///
/// Callers pass a seed describing what the code is for (owner, entity,
/// attempt index). Implementations may mix it in but must not rely on it
/// for uniqueness; collision checks belong to the caller.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, seed: &str, len: usize) -> String;
}

/// SHA-256 over the seed plus 16 bytes of OS randomness
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedRandomCodes;

impl CodeGenerator for HashedRandomCodes {
    fn generate(&self, seed: &str, len: usize) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut code = String::with_capacity(len);
        let mut block = 0u32;
        while code.len() < len {
            let mut hasher = Sha256::new();
            hasher.update(seed.as_bytes());
            hasher.update(nonce);
            hasher.update(block.to_le_bytes());
            for byte in hasher.finalize() {
                if code.len() == len {
                    break;
                }
                code.push(ALPHABET[byte as usize % ALPHABET.len()] as char);
            }
            block += 1;
        }
        code
    }
}

/// True when `s` is non-empty and consists only of code characters
pub fn is_code(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_length_and_alphabet() {
        let codes = HashedRandomCodes;
        for len in [1, 16, 32, 50] {
            let code = codes.generate("user1tier1_0", len);
            assert_eq!(code.len(), len);
            assert!(is_code(&code), "unexpected characters in {}", code);
        }
    }

    #[test]
    fn test_same_seed_gives_distinct_codes() {
        let codes = HashedRandomCodes;
        let a = codes.generate("seed", 16);
        let b = codes.generate("seed", 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_code() {
        assert!(is_code("abcXYZ019"));
        assert!(!is_code(""));
        assert!(!is_code("../etc"));
        assert!(!is_code("a_b"));
    }
}
