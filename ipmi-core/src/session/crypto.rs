//! RMCP+ cipher-suite algorithms and RAKP key derivation.
//!
//! Cipher suites pair an authentication algorithm (RAKP HMAC), an
//! integrity algorithm (per-message AuthCode), and a confidentiality
//! algorithm (payload encryption). Suites 0-3 are the HMAC-SHA1 family;
//! suite 17 is the HMAC-SHA256 equivalent of suite 3.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use hmac::{Hmac, Mac};
use md5::Md5;
use md5::digest::Digest;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::IpmiError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

// ── Algorithms ───────────────────────────────────────────────────

/// RAKP authentication algorithm (IPMI 13.28).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlgorithm {
    None,
    HmacSha1,
    HmacSha256,
}

impl AuthAlgorithm {
    pub const fn value(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::HmacSha1 => 0x01,
            Self::HmacSha256 => 0x03,
        }
    }

    /// Full digest length of the underlying hash.
    pub const fn digest_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::HmacSha1 => 20,
            Self::HmacSha256 => 32,
        }
    }
}

/// Session integrity algorithm (IPMI 13.28.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityAlgorithm {
    None,
    HmacSha1_96,
    HmacSha256_128,
}

impl IntegrityAlgorithm {
    pub const fn value(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::HmacSha1_96 => 0x01,
            Self::HmacSha256_128 => 0x04,
        }
    }

    /// Truncated AuthCode length carried on the wire.
    pub const fn mac_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::HmacSha1_96 => 12,
            Self::HmacSha256_128 => 16,
        }
    }
}

/// Session confidentiality algorithm (IPMI 13.28.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidentialityAlgorithm {
    None,
    AesCbc128,
}

impl ConfidentialityAlgorithm {
    pub const fn value(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::AesCbc128 => 0x01,
        }
    }
}

/// One of the standard cipher suites negotiated at Open Session time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuite {
    pub id: u8,
    pub auth: AuthAlgorithm,
    pub integrity: IntegrityAlgorithm,
    pub confidentiality: ConfidentialityAlgorithm,
}

impl CipherSuite {
    /// Look up a supported cipher-suite id (0, 1, 2, 3, or 17).
    pub fn from_id(id: u8) -> Result<Self, IpmiError> {
        let (auth, integrity, confidentiality) = match id {
            0 => (
                AuthAlgorithm::None,
                IntegrityAlgorithm::None,
                ConfidentialityAlgorithm::None,
            ),
            1 => (
                AuthAlgorithm::HmacSha1,
                IntegrityAlgorithm::None,
                ConfidentialityAlgorithm::None,
            ),
            2 => (
                AuthAlgorithm::HmacSha1,
                IntegrityAlgorithm::HmacSha1_96,
                ConfidentialityAlgorithm::None,
            ),
            3 => (
                AuthAlgorithm::HmacSha1,
                IntegrityAlgorithm::HmacSha1_96,
                ConfidentialityAlgorithm::AesCbc128,
            ),
            17 => (
                AuthAlgorithm::HmacSha256,
                IntegrityAlgorithm::HmacSha256_128,
                ConfidentialityAlgorithm::AesCbc128,
            ),
            other => {
                return Err(IpmiError::UnknownVariant {
                    type_name: "CipherSuite",
                    value: other as u64,
                });
            }
        };
        Ok(Self {
            id,
            auth,
            integrity,
            confidentiality,
        })
    }
}

// ── HMAC ─────────────────────────────────────────────────────────

fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Full-length HMAC under the suite's authentication algorithm.
pub fn auth_hmac(alg: AuthAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
    match alg {
        AuthAlgorithm::None => Vec::new(),
        AuthAlgorithm::HmacSha1 => hmac_sha1(key, data),
        AuthAlgorithm::HmacSha256 => hmac_sha256(key, data),
    }
}

/// Truncated per-message AuthCode under the suite's integrity
/// algorithm.
pub fn integrity_mac(alg: IntegrityAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut full = match alg {
        IntegrityAlgorithm::None => return Vec::new(),
        IntegrityAlgorithm::HmacSha1_96 => hmac_sha1(key, data),
        IntegrityAlgorithm::HmacSha256_128 => hmac_sha256(key, data),
    };
    full.truncate(alg.mac_len());
    full
}

/// Constant-time-agnostic comparison is not required here: a mismatch
/// tears the session down either way.
pub fn verify_integrity(
    alg: IntegrityAlgorithm,
    key: &[u8],
    data: &[u8],
    mac: &[u8],
) -> Result<(), IpmiError> {
    let expected = integrity_mac(alg, key, data);
    if expected != mac {
        return Err(IpmiError::IntegrityFailure("session AuthCode mismatch"));
    }
    Ok(())
}

// ── Key derivation ───────────────────────────────────────────────

/// Derive the Session Integrity Key from the RAKP nonces.
///
/// `kg` is the BMC key when one is provisioned, otherwise the
/// user password (K_uid).
pub fn derive_sik(
    alg: AuthAlgorithm,
    kg: &[u8],
    console_random: &[u8; 16],
    bmc_random: &[u8; 16],
    role: u8,
    username: &[u8],
) -> Vec<u8> {
    let mut input = Vec::with_capacity(34 + username.len());
    input.extend_from_slice(console_random);
    input.extend_from_slice(bmc_random);
    input.push(role);
    input.push(username.len() as u8);
    input.extend_from_slice(username);
    auth_hmac(alg, kg, &input)
}

/// Derive K1 (`constant` = 0x01, integrity) or K2 (`constant` = 0x02,
/// confidentiality) by hashing a constant byte pattern with the SIK.
pub fn derive_k(alg: AuthAlgorithm, sik: &[u8], constant: u8) -> Vec<u8> {
    let pattern = vec![constant; alg.digest_len()];
    auth_hmac(alg, sik, &pattern)
}

/// The RAKP 4 integrity check value: an HMAC under the SIK, truncated
/// to 12 bytes for SHA1 and 16 for SHA256.
pub fn rakp4_icv(alg: AuthAlgorithm, sik: &[u8], data: &[u8]) -> Vec<u8> {
    let mut full = auth_hmac(alg, sik, data);
    let len = match alg {
        AuthAlgorithm::None => 0,
        AuthAlgorithm::HmacSha1 => 12,
        AuthAlgorithm::HmacSha256 => 16,
    };
    full.truncate(len);
    full
}

// ── AES-CBC-128 confidentiality ──────────────────────────────────

const AES_BLOCK: usize = 16;

/// Encrypt `plaintext` under the first 16 bytes of K2 with a fresh
/// random IV. Output is IV || ciphertext; the confidentiality trailer
/// pads with 01, 02, 03, … and a final pad-length byte.
pub fn encrypt_aes_cbc(k2: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, IpmiError> {
    if k2.len() < AES_BLOCK {
        return Err(IpmiError::IntegrityFailure("confidentiality key too short"));
    }
    let iv: [u8; AES_BLOCK] = rand::random();

    let pad_len = (AES_BLOCK - (plaintext.len() + 1) % AES_BLOCK) % AES_BLOCK;
    let mut padded = Vec::with_capacity(plaintext.len() + pad_len + 1);
    padded.extend_from_slice(plaintext);
    for i in 0..pad_len {
        padded.push(i as u8 + 1);
    }
    padded.push(pad_len as u8);

    let cipher = Aes128CbcEnc::new_from_slices(&k2[..AES_BLOCK], &iv)
        .map_err(|_| IpmiError::IntegrityFailure("confidentiality key too short"))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(&padded);

    let mut out = Vec::with_capacity(AES_BLOCK + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt IV || ciphertext and strip the confidentiality trailer.
pub fn decrypt_aes_cbc(k2: &[u8], data: &[u8]) -> Result<Vec<u8>, IpmiError> {
    if k2.len() < AES_BLOCK {
        return Err(IpmiError::IntegrityFailure("confidentiality key too short"));
    }
    if data.len() < 2 * AES_BLOCK || (data.len() - AES_BLOCK) % AES_BLOCK != 0 {
        return Err(IpmiError::IntegrityFailure("ciphertext length not block-aligned"));
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK);

    let cipher = Aes128CbcDec::new_from_slices(&k2[..AES_BLOCK], iv)
        .map_err(|_| IpmiError::IntegrityFailure("confidentiality key too short"))?;
    let mut plaintext = cipher
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| IpmiError::IntegrityFailure("payload decryption failed"))?;

    let pad_len = *plaintext.last().ok_or(IpmiError::IntegrityFailure("empty plaintext"))? as usize;
    if pad_len + 1 > plaintext.len() {
        return Err(IpmiError::IntegrityFailure("confidentiality pad length"));
    }
    let body_len = plaintext.len() - pad_len - 1;
    for (i, &b) in plaintext[body_len..plaintext.len() - 1].iter().enumerate() {
        if b != i as u8 + 1 {
            return Err(IpmiError::IntegrityFailure("confidentiality pad bytes"));
        }
    }
    plaintext.truncate(body_len);
    Ok(plaintext)
}

// ── IPMI v1.5 MD5 AuthCode ───────────────────────────────────────

/// Pad or truncate a password to the fixed 16-byte v1.5 key field.
pub fn password_16(password: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    let n = password.len().min(16);
    out[..n].copy_from_slice(&password[..n]);
    out
}

/// The legacy MD5 AuthCode: MD5(password, session id, payload,
/// sequence, password).
pub fn md5_authcode(password: &[u8], session_id: u32, sequence: u32, payload: &[u8]) -> [u8; 16] {
    let key = password_16(password);
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(session_id.to_le_bytes());
    hasher.update(payload);
    hasher.update(sequence.to_le_bytes());
    hasher.update(key);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_suite_lookup() {
        let suite = CipherSuite::from_id(3).unwrap();
        assert_eq!(suite.auth, AuthAlgorithm::HmacSha1);
        assert_eq!(suite.integrity, IntegrityAlgorithm::HmacSha1_96);
        assert_eq!(suite.confidentiality, ConfidentialityAlgorithm::AesCbc128);

        let suite = CipherSuite::from_id(17).unwrap();
        assert_eq!(suite.auth, AuthAlgorithm::HmacSha256);
        assert_eq!(suite.integrity.mac_len(), 16);

        assert!(CipherSuite::from_id(9).is_err());
    }

    #[test]
    fn hmac_lengths() {
        assert_eq!(auth_hmac(AuthAlgorithm::HmacSha1, b"key", b"data").len(), 20);
        assert_eq!(
            auth_hmac(AuthAlgorithm::HmacSha256, b"key", b"data").len(),
            32
        );
        assert_eq!(
            integrity_mac(IntegrityAlgorithm::HmacSha1_96, b"key", b"data").len(),
            12
        );
        assert_eq!(
            integrity_mac(IntegrityAlgorithm::HmacSha256_128, b"key", b"data").len(),
            16
        );
    }

    #[test]
    fn integrity_verification() {
        let mac = integrity_mac(IntegrityAlgorithm::HmacSha1_96, b"k1", b"frame");
        assert!(verify_integrity(IntegrityAlgorithm::HmacSha1_96, b"k1", b"frame", &mac).is_ok());
        assert!(matches!(
            verify_integrity(IntegrityAlgorithm::HmacSha1_96, b"k1", b"tampered", &mac),
            Err(IpmiError::IntegrityFailure(_))
        ));
    }

    #[test]
    fn sik_depends_on_both_nonces() {
        let rm = [0x11u8; 16];
        let rc = [0x22u8; 16];
        let sik = derive_sik(AuthAlgorithm::HmacSha1, b"password", &rm, &rc, 0x14, b"admin");
        assert_eq!(sik.len(), 20);

        let other = derive_sik(
            AuthAlgorithm::HmacSha1,
            b"password",
            &rm,
            &[0x23u8; 16],
            0x14,
            b"admin",
        );
        assert_ne!(sik, other);
    }

    #[test]
    fn k1_k2_differ() {
        let sik = derive_sik(
            AuthAlgorithm::HmacSha1,
            b"kg",
            &[1u8; 16],
            &[2u8; 16],
            0x04,
            b"root",
        );
        let k1 = derive_k(AuthAlgorithm::HmacSha1, &sik, 0x01);
        let k2 = derive_k(AuthAlgorithm::HmacSha1, &sik, 0x02);
        assert_eq!(k1.len(), 20);
        assert_ne!(k1, k2);
    }

    #[test]
    fn aes_roundtrip_various_lengths() {
        let k2 = derive_k(AuthAlgorithm::HmacSha1, b"sik", 0x02);
        for len in [0usize, 1, 7, 15, 16, 17, 33] {
            let plaintext: Vec<u8> = (0..len as u8).collect();
            let sealed = encrypt_aes_cbc(&k2, &plaintext).unwrap();
            assert_eq!((sealed.len() - 16) % 16, 0);
            let opened = decrypt_aes_cbc(&k2, &sealed).unwrap();
            assert_eq!(opened, plaintext, "length {len}");
        }
    }

    #[test]
    fn aes_rejects_bad_ciphertext() {
        let k2 = derive_k(AuthAlgorithm::HmacSha1, b"sik", 0x02);
        assert!(matches!(
            decrypt_aes_cbc(&k2, &[0u8; 15]),
            Err(IpmiError::IntegrityFailure(_))
        ));
        assert!(matches!(
            decrypt_aes_cbc(&k2, &[0u8; 21]),
            Err(IpmiError::IntegrityFailure(_))
        ));
    }

    #[test]
    fn md5_authcode_is_16_bytes_and_keyed() {
        let a = md5_authcode(b"secret", 0x1234, 1, &[0xAA]);
        let b = md5_authcode(b"other", 0x1234, 1, &[0xAA]);
        assert_ne!(a, b);
    }

    #[test]
    fn password_padding() {
        assert_eq!(&password_16(b"abc")[..4], &[b'a', b'b', b'c', 0]);
        let long = password_16(b"0123456789abcdefXYZ");
        assert_eq!(&long[..], b"0123456789abcdef");
    }
}
