//! Wallet signature verification
//!
//! Recovers the signer of an EIP-191 `personal_sign` message from a
//! secp256k1 recoverable signature and compares it to a claimed address.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

use super::address::WalletAddress;

/// Errors that can occur during signature verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("Signature recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// Keccak-256 digest
pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Hash a message the way wallets do for `personal_sign`:
/// `keccak256("\x19Ethereum Signed Message:\n" + len(message) + message)`
pub fn hash_personal_message(message: &str) -> [u8; 32] {
    let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
    keccak256(prefixed.as_bytes())
}

/// Derive the wallet address controlled by a public key
pub fn address_from_verifying_key(key: &VerifyingKey) -> WalletAddress {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    WalletAddress::from_bytes(bytes)
}

/// Recover the address that produced `signature_hex` over `message`
///
/// # Arguments
/// * `message` - The exact text that was signed
/// * `signature_hex` - 65-byte `r || s || v` signature, hex encoded, `0x` optional
pub fn recover_signer(message: &str, signature_hex: &str) -> Result<WalletAddress, CryptoError> {
    let trimmed = signature_hex.trim();
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let sig_bytes =
        hex::decode(raw).map_err(|e| CryptoError::InvalidSignatureFormat(e.to_string()))?;

    if sig_bytes.len() != 65 {
        return Err(CryptoError::InvalidSignatureFormat(format!(
            "Signature must be 65 bytes, got {}",
            sig_bytes.len()
        )));
    }

    let (rs, v) = sig_bytes.split_at(64);
    let recovery_byte = match v[0] {
        0 | 27 => 0u8,
        1 | 28 => 1u8,
        other => {
            return Err(CryptoError::InvalidSignatureFormat(format!(
                "Invalid recovery id: {}",
                other
            )))
        }
    };

    let signature = Signature::from_slice(rs)
        .map_err(|e| CryptoError::InvalidSignatureFormat(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| CryptoError::InvalidSignatureFormat("Invalid recovery id".to_string()))?;

    let digest = hash_personal_message(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;

    Ok(address_from_verifying_key(&key))
}

/// Verify that `claimed` signed `message`
///
/// # Returns
/// * `Ok(true)` if the recovered signer is `claimed`
/// * `Ok(false)` if the signature is well-formed but belongs to another address
/// * `Err(CryptoError)` if the signature cannot be parsed or recovered
pub fn verify_wallet_signature(
    message: &str,
    signature_hex: &str,
    claimed: &WalletAddress,
) -> Result<bool, CryptoError> {
    let recovered = recover_signer(message, signature_hex)?;
    Ok(recovered == *claimed)
}

/// Produce a `personal_sign` signature (hex, `0x`-prefixed, `v` in {27, 28})
pub fn sign_personal_message(key: &SigningKey, message: &str) -> Result<String, CryptoError> {
    let digest = hash_personal_message(message);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    let mut bytes = Vec::with_capacity(65);
    bytes.extend_from_slice(&signature.to_bytes());
    bytes.push(recovery_id.to_byte() + 27);

    Ok(format!("0x{}", hex::encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_sign_and_recover() {
        let key = test_key(7);
        let address = address_from_verifying_key(key.verifying_key());
        let message = "Welcome to PsyFi!\n\nNonce: abc";

        let signature = sign_personal_message(&key, message).unwrap();
        assert_eq!(recover_signer(message, &signature).unwrap(), address);
        assert!(verify_wallet_signature(message, &signature, &address).unwrap());
    }

    #[test]
    fn test_known_private_key_address() {
        // Private key 0x...01 controls this well-known address
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = SigningKey::from_slice(&secret).unwrap();
        assert_eq!(
            address_from_verifying_key(key.verifying_key()).as_str(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_other_signer_is_mismatch_not_error() {
        let signer = test_key(7);
        let claimed = address_from_verifying_key(test_key(8).verifying_key());
        let message = "hello";

        let signature = sign_personal_message(&signer, message).unwrap();
        assert!(!verify_wallet_signature(message, &signature, &claimed).unwrap());
    }

    #[test]
    fn test_tampered_message_recovers_different_address() {
        let key = test_key(9);
        let address = address_from_verifying_key(key.verifying_key());
        let signature = sign_personal_message(&key, "original").unwrap();

        match recover_signer("tampered", &signature) {
            Ok(recovered) => assert_ne!(recovered, address),
            Err(e) => assert!(matches!(e, CryptoError::RecoveryFailed(_))),
        }
    }

    #[test]
    fn test_accepts_signature_without_prefix_and_raw_v() {
        let key = test_key(3);
        let address = address_from_verifying_key(key.verifying_key());
        let signature = sign_personal_message(&key, "msg").unwrap();

        let mut bytes = hex::decode(&signature[2..]).unwrap();
        bytes[64] -= 27;
        let raw = hex::encode(bytes);
        assert!(verify_wallet_signature("msg", &raw, &address).unwrap());
    }

    #[test]
    fn test_malformed_signatures() {
        assert!(matches!(
            recover_signer("msg", "0xnothex"),
            Err(CryptoError::InvalidSignatureFormat(_))
        ));
        assert!(matches!(
            recover_signer("msg", "0x1234"),
            Err(CryptoError::InvalidSignatureFormat(_))
        ));

        let mut bytes = vec![1u8; 64];
        bytes.push(5);
        assert!(matches!(
            recover_signer("msg", &hex::encode(bytes)),
            Err(CryptoError::InvalidSignatureFormat(_))
        ));
    }
}
