//! Wallet credentials from the environment
//!
//! Absent or malformed credentials are a fatal startup error.

use thiserror::Error;

const PRIVATE_KEY_VAR: &str = "POLY_PRIVATE_KEY";
const FUNDER_VAR: &str = "POLY_FUNDER";
const SIG_TYPE_VAR: &str = "POLY_SIG_TYPE";

/// How the order signature is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigType {
    /// Plain EOA key
    Eoa,
    /// Email/Magic proxy wallet
    EmailMagic,
    /// Browser wallet proxy
    BrowserWallet,
}

impl SigType {
    pub fn as_u8(&self) -> u8 {
        match self {
            SigType::Eoa => 0,
            SigType::EmailMagic => 1,
            SigType::BrowserWallet => 2,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SigType::Eoa),
            1 => Some(SigType::EmailMagic),
            2 => Some(SigType::BrowserWallet),
            _ => None,
        }
    }

    /// Proxy signature types route funds through a funder address
    pub fn requires_funder(&self) -> bool {
        !matches!(self, SigType::Eoa)
    }
}

/// Wallet credential errors (fatal at startup)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{0} is malformed: {1}")]
    Malformed(&'static str, String),
}

/// Credentials for the CLOB signing primitive
#[derive(Debug, Clone)]
pub struct WalletCredentials {
    private_key: String,
    pub funder: Option<String>,
    pub sig_type: SigType,
}

impl WalletCredentials {
    /// Load and validate credentials from the environment
    pub fn from_env() -> Result<Self, WalletError> {
        let private_key =
            std::env::var(PRIVATE_KEY_VAR).map_err(|_| WalletError::Missing(PRIVATE_KEY_VAR))?;
        let funder = std::env::var(FUNDER_VAR).ok().filter(|s| !s.is_empty());
        let sig_raw = std::env::var(SIG_TYPE_VAR).unwrap_or_else(|_| "0".to_string());

        Self::build(private_key, funder, &sig_raw)
    }

    /// Validate explicit values (used by tests and paper mode)
    pub fn build(
        private_key: String,
        funder: Option<String>,
        sig_raw: &str,
    ) -> Result<Self, WalletError> {
        let key_hex = private_key.strip_prefix("0x").unwrap_or(&private_key);
        if key_hex.len() != 64 || !key_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WalletError::Malformed(
                PRIVATE_KEY_VAR,
                "expected 32 bytes of hex".to_string(),
            ));
        }

        let sig_value: u8 = sig_raw
            .parse()
            .map_err(|_| WalletError::Malformed(SIG_TYPE_VAR, sig_raw.to_string()))?;
        let sig_type = SigType::from_u8(sig_value)
            .ok_or_else(|| WalletError::Malformed(SIG_TYPE_VAR, sig_raw.to_string()))?;

        if sig_type.requires_funder() && funder.is_none() {
            return Err(WalletError::Missing(FUNDER_VAR));
        }

        Ok(Self {
            private_key,
            funder,
            sig_type,
        })
    }

    /// Maker address the venue settles against: the funder proxy for proxy
    /// wallets, otherwise derived from the key
    pub fn maker_address(&self) -> String {
        match &self.funder {
            Some(funder) => funder.clone(),
            None => format!("eoa:{}", &self.fingerprint()[..16]),
        }
    }

    /// Opaque signature over a payload digest. Real signing lives in the
    /// venue SDK; this seam only has to be deterministic per key+payload.
    pub fn sign_digest(&self, payload: &str) -> String {
        let mut acc: u64 = 0xcbf2_9ce4_8422_2325;
        for b in self.private_key.bytes().chain(payload.bytes()) {
            acc ^= b as u64;
            acc = acc.wrapping_mul(0x0000_0100_0000_01b3);
        }
        format!("0x{:016x}", acc)
    }

    fn fingerprint(&self) -> String {
        self.sign_digest("fingerprint")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_valid_eoa() {
        let creds = WalletCredentials::build(KEY.to_string(), None, "0").unwrap();
        assert_eq!(creds.sig_type, SigType::Eoa);
        assert!(creds.funder.is_none());
    }

    #[test]
    fn test_proxy_requires_funder() {
        let err = WalletCredentials::build(KEY.to_string(), None, "1").unwrap_err();
        assert_eq!(err, WalletError::Missing("POLY_FUNDER"));

        let creds =
            WalletCredentials::build(KEY.to_string(), Some("0xfunder".to_string()), "2").unwrap();
        assert_eq!(creds.sig_type, SigType::BrowserWallet);
        assert_eq!(creds.maker_address(), "0xfunder");
    }

    #[test]
    fn test_malformed_key() {
        let err = WalletCredentials::build("0x1234".to_string(), None, "0").unwrap_err();
        assert!(matches!(err, WalletError::Malformed("POLY_PRIVATE_KEY", _)));
    }

    #[test]
    fn test_invalid_sig_type() {
        let err = WalletCredentials::build(KEY.to_string(), None, "7").unwrap_err();
        assert!(matches!(err, WalletError::Malformed("POLY_SIG_TYPE", _)));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let creds = WalletCredentials::build(KEY.to_string(), None, "0").unwrap();
        assert_eq!(creds.sign_digest("abc"), creds.sign_digest("abc"));
        assert_ne!(creds.sign_digest("abc"), creds.sign_digest("abd"));
    }
}
