//! Handshake key exchange and the encrypted stream used for `Secret`
//! messages.
//!
//! Key exchange is X25519. Once both sides have a shared secret, messages
//! in the `Secret` category are wrapped in a running XChaCha20-Poly1305
//! stream: each push advances a counter folded into the nonce, so no two
//! messages in the stream ever reuse a nonce under the same key.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use subtle::ConstantTimeEq;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

/// Practical per-message plaintext limit for [`SecretStream::push`], mirroring
/// the "64 KiB minus tag" ballpark of the library this stream is modeled on.
pub const MAX_STREAM_MESSAGE_SIZE: usize = 64 * 1024 - 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    Encrypt,
    Decrypt,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::Encrypt => write!(f, "failed to encrypt message"),
            CryptoError::Decrypt => write!(f, "failed to decrypt or authenticate message"),
        }
    }
}

/// The server's long-term identity key. Reused across every client
/// handshake, unlike the client's per-connection ephemeral key.
pub struct ServerIdentity {
    secret: StaticSecret,
    pub public_key: [u8; 32],
}

impl ServerIdentity {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public_key = PublicKey::from(&secret).to_bytes();
        Self { secret, public_key }
    }

    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        self.secret
            .diffie_hellman(&PublicKey::from(*their_public))
            .to_bytes()
    }
}

/// The client's one-shot handshake key. Consumed after a single
/// Diffie-Hellman exchange, so a captured client nonce/key pair can never
/// be replayed to derive the same session key twice.
pub struct ClientHandshakeKey {
    secret: Option<EphemeralSecret>,
    pub public_key: [u8; 32],
}

impl ClientHandshakeKey {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
        let public_key = PublicKey::from(&secret).to_bytes();
        Self {
            secret: Some(secret),
            public_key,
        }
    }

    /// Consumes the ephemeral secret; can only be called once.
    pub fn diffie_hellman(&mut self, their_public: &[u8; 32]) -> Option<[u8; 32]> {
        let secret = self.secret.take()?;
        Some(secret.diffie_hellman(&PublicKey::from(*their_public)).to_bytes())
    }
}

/// A running, authenticated stream built from a shared secret. Both
/// directions of a `NetChannel` keep one of these each, seeded from the
/// same session key but with independent nonce counters.
pub struct SecretStream {
    cipher: XChaCha20Poly1305,
    base_nonce: [u8; 24],
    counter: u64,
}

impl SecretStream {
    pub fn new(session_key: [u8; 32], base_nonce: [u8; 24]) -> Self {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&session_key));
        Self {
            cipher,
            base_nonce,
            counter: 0,
        }
    }

    pub fn random_nonce() -> [u8; 24] {
        let mut nonce = [0u8; 24];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        nonce
    }

    fn nonce_for(&self, counter: u64) -> XNonce {
        let mut nonce = self.base_nonce;
        for (i, byte) in counter.to_le_bytes().iter().enumerate() {
            nonce[16 + i] ^= byte;
        }
        *XNonce::from_slice(&nonce)
    }

    /// Encrypts `plaintext` and advances the stream by one message.
    pub fn push(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.nonce_for(self.counter);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;
        self.counter += 1;
        Ok(ciphertext)
    }

    /// Decrypts the message at `counter`. The caller tracks the expected
    /// counter (messages in a category are delivered in order), so out of
    /// order or replayed ciphertexts fail authentication rather than being
    /// silently accepted under the wrong nonce.
    pub fn pull_at(&self, counter: u64, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.nonce_for(counter);
        self.cipher
            .decrypt(&nonce, ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

/// Constant-time comparison used when verifying a handshake token: timing
/// differences in a byte-by-byte compare would leak how many leading bytes
/// an attacker's guess got right.
pub fn tokens_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diffie_hellman_agrees_both_ways() {
        let server = ServerIdentity::generate();
        let mut client = ClientHandshakeKey::generate();

        let client_secret = client.diffie_hellman(&server.public_key).unwrap();
        let server_secret = server.diffie_hellman(&client.public_key);

        assert_eq!(client_secret, server_secret);
    }

    #[test]
    fn secret_stream_roundtrips_in_order() {
        let key = [7u8; 32];
        let nonce = SecretStream::random_nonce();
        let mut sender = SecretStream::new(key, nonce);
        let receiver = SecretStream::new(key, nonce);

        let a = sender.push(b"hello").unwrap();
        let b = sender.push(b"world").unwrap();

        assert_eq!(receiver.pull_at(0, &a).unwrap(), b"hello");
        assert_eq!(receiver.pull_at(1, &b).unwrap(), b"world");
    }

    #[test]
    fn secret_stream_rejects_tampering() {
        let key = [3u8; 32];
        let nonce = SecretStream::random_nonce();
        let mut sender = SecretStream::new(key, nonce);
        let receiver = SecretStream::new(key, nonce);

        let mut ciphertext = sender.push(b"hello").unwrap();
        *ciphertext.last_mut().unwrap() ^= 0xFF;

        assert!(receiver.pull_at(0, &ciphertext).is_err());
    }

    #[test]
    fn tokens_match_is_constant_time_equal() {
        assert!(tokens_match(b"abc", b"abc"));
        assert!(!tokens_match(b"abc", b"abd"));
        assert!(!tokens_match(b"abc", b"ab"));
    }
}
