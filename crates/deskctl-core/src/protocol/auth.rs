//! VNC authentication (RFB security type 2).
//!
//! The server sends a 16-byte random challenge.  The client encrypts it with
//! single DES in ECB mode, keyed by the first eight bytes of the password
//! (zero-padded).  VNC reverses the bit order of every key byte; every
//! server still expects this quirk of the first VNC release.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;

use crate::protocol::messages::VNC_AUTH_CHALLENGE_LEN;

/// Computes the response to a VNC authentication challenge.
pub fn vnc_auth_response(
    password: &str,
    challenge: &[u8; VNC_AUTH_CHALLENGE_LEN],
) -> [u8; VNC_AUTH_CHALLENGE_LEN] {
    let cipher = Des::new(&GenericArray::from(vnc_key(password)));

    let mut response = *challenge;
    for chunk in response.chunks_exact_mut(8) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    response
}

/// Builds the DES key: password truncated or zero-padded to eight bytes, each
/// byte bit-reversed.
fn vnc_key(password: &str) -> [u8; 8] {
    let mut key = [0u8; 8];
    for (slot, byte) in key.iter_mut().zip(password.bytes()) {
        *slot = byte.reverse_bits();
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vnc_key_reverses_bits_and_pads() {
        // 'a' = 0b0110_0001 reversed is 0b1000_0110
        assert_eq!(vnc_key("a"), [0x86, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_vnc_key_truncates_long_passwords() {
        assert_eq!(vnc_key("abcdefghij"), vnc_key("abcdefgh"));
    }

    #[test]
    fn test_response_is_deterministic_and_password_dependent() {
        let challenge = [7u8; VNC_AUTH_CHALLENGE_LEN];
        let a = vnc_auth_response("secret", &challenge);
        let b = vnc_auth_response("secret", &challenge);
        let c = vnc_auth_response("other", &challenge);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, challenge);
    }

    #[test]
    fn test_identical_challenge_halves_encrypt_identically() {
        // ECB mode: equal plaintext blocks give equal ciphertext blocks
        let challenge = [0x42u8; VNC_AUTH_CHALLENGE_LEN];
        let response = vnc_auth_response("pw", &challenge);
        assert_eq!(response[..8], response[8..]);
    }
}
