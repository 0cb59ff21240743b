use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use safe_authz_core::PortError;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const MAC_LEN: usize = 32;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES-256-CBC ciphertext with its HMAC-SHA256 over `data ‖ iv`, both keyed
/// by the shared session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub data: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub mac: [u8; MAC_LEN],
}

pub fn generate_iv() -> Result<[u8; IV_LEN], PortError> {
    let mut iv = [0u8; IV_LEN];
    getrandom::getrandom(&mut iv)
        .map_err(|e| PortError::Transport(format!("iv generation failed: {e}")))?;
    Ok(iv)
}

pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<SealedBox, PortError> {
    seal_with_iv(key, generate_iv()?, plaintext)
}

pub fn seal_with_iv(
    key: &[u8; KEY_LEN],
    iv: [u8; IV_LEN],
    plaintext: &[u8],
) -> Result<SealedBox, PortError> {
    let data = Aes256CbcEnc::new_from_slices(key, &iv)
        .map_err(|e| PortError::Validation(format!("aes-cbc init failed: {e}")))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mut mac = [0u8; MAC_LEN];
    mac.copy_from_slice(&authenticate(key, &data, &iv)?.finalize().into_bytes());
    Ok(SealedBox { data, iv, mac })
}

/// Checks the MAC before decrypting anything.
pub fn open(key: &[u8; KEY_LEN], sealed: &SealedBox) -> Result<Vec<u8>, PortError> {
    authenticate(key, &sealed.data, &sealed.iv)?
        .verify_slice(&sealed.mac)
        .map_err(|_| PortError::Validation("bridge payload hmac mismatch".to_owned()))?;
    Aes256CbcDec::new_from_slices(key, &sealed.iv)
        .map_err(|e| PortError::Validation(format!("aes-cbc init failed: {e}")))?
        .decrypt_padded_vec_mut::<Pkcs7>(&sealed.data)
        .map_err(|e| PortError::Validation(format!("aes-cbc decrypt failed: {e}")))
}

fn authenticate(key: &[u8; KEY_LEN], data: &[u8], iv: &[u8]) -> Result<HmacSha256, PortError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| PortError::Validation(format!("hmac init failed: {e}")))?;
    mac.update(data);
    mac.update(iv);
    Ok(mac)
}
