use alloy::{primitives::B256, signers::local::PrivateKeySigner};
use anyhow::{Context, Result, anyhow, bail};
use std::fs::read_to_string;

/// Load the judge signer from an inline hex key, falling back to a key file.
pub fn load_signer(private_key: Option<&str>, key_path: Option<&str>) -> Result<PrivateKeySigner> {
    match (private_key, key_path) {
        (Some(key), _) => signer_from_hex(key),
        (None, Some(path)) => load_signer_from_file(path),
        (None, None) => bail!("no signing key configured"),
    }
}

/// Load signer from a file holding the hex-encoded secret key
pub fn load_signer_from_file(path: &str) -> Result<PrivateKeySigner> {
    let contents =
        read_to_string(path).with_context(|| format!("Failed to read key file: {}", path))?;
    signer_from_hex(&contents).with_context(|| format!("Invalid key in {}", path))
}

pub fn signer_from_hex(key: &str) -> Result<PrivateKeySigner> {
    let key = key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    let bytes = hex::decode(key).context("Failed to decode private key hex")?;

    // secp256k1 secret keys are 32 bytes
    if bytes.len() != 32 {
        bail!(
            "Invalid private key length: expected 32 bytes, got {}",
            bytes.len()
        );
    }

    PrivateKeySigner::from_bytes(&B256::from_slice(&bytes))
        .map_err(|e| anyhow!("Failed to create signer from key: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use std::io::Write;

    // Well-known development key, never funded on a real network.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn dev_address() -> Address {
        DEV_ADDRESS.parse::<Address>().unwrap()
    }

    #[test]
    fn derives_address_from_inline_key() {
        let signer = load_signer(Some(DEV_KEY), None).unwrap();
        assert_eq!(signer.address(), dev_address());
    }

    #[test]
    fn reads_key_file_with_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", &DEV_KEY[2..]).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let signer = load_signer(None, Some(&path)).unwrap();
        assert_eq!(signer.address(), dev_address());
    }

    #[test]
    fn inline_key_wins_over_file() {
        let signer = load_signer(Some(DEV_KEY), Some("/nonexistent/key")).unwrap();
        assert_eq!(signer.address(), dev_address());
    }

    #[test]
    fn rejects_missing_and_short_keys() {
        assert!(load_signer(None, None).is_err());
        let err = signer_from_hex("0x1234").unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes"));
    }
}
