//! 地址与密钥工具
//!
//! 系统内所有地址比较一律大小写不敏感（规范做法是按小写比较），
//! 捐赠人匹配、活动归属判断都走这里。

use anyhow::Result;

/// 验证EVM地址（支持EIP-55 Checksum）
pub fn validate_evm_address(address: &str) -> Result<bool> {
    // 1. 基本格式检查
    if !address.starts_with("0x") {
        return Ok(false);
    }

    if address.len() != 42 {
        return Ok(false);
    }

    // 2. 验证hex字符
    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(false);
    }

    // 3. EIP-55 Checksum验证（如果地址包含大写字母）
    if hex_part.chars().any(|c| c.is_uppercase()) {
        return verify_eip55_checksum(address);
    }

    Ok(true)
}

/// 验证EIP-55 Checksum
/// https://eips.ethereum.org/EIPS/eip-55
fn verify_eip55_checksum(address: &str) -> Result<bool> {
    use sha3::{Digest, Keccak256};

    let addr_lower = address[2..].to_lowercase();
    let mut hasher = Keccak256::new();
    hasher.update(addr_lower.as_bytes());
    let hash = hasher.finalize();

    let hex_chars = &address[2..];
    for (i, ch) in hex_chars.chars().enumerate() {
        if ch.is_alphabetic() {
            let hash_byte = hash[i / 2];
            let hash_nibble = if i % 2 == 0 {
                hash_byte >> 4
            } else {
                hash_byte & 0x0f
            };

            let should_be_uppercase = hash_nibble >= 8;
            if ch.is_uppercase() != should_be_uppercase {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

/// 大小写不敏感的地址比较
pub fn addresses_equal(a: &str, b: &str) -> bool {
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// 规范化私钥编码：去空白、补 `0x` 前缀，校验 64 位十六进制
pub fn normalize_private_key(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    if hex_part.len() != 64 {
        anyhow::bail!("private key must be 32 bytes (64 hex chars), got {}", hex_part.len());
    }
    if hex::decode(hex_part).is_err() {
        anyhow::bail!("private key contains non-hex characters");
    }

    Ok(format!("0x{}", hex_part))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hardhat 测试账户 #0
    const HARDHAT_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const HARDHAT_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_validate_lowercase_address() {
        assert!(validate_evm_address(&HARDHAT_ADDR.to_lowercase()).unwrap());
    }

    #[test]
    fn test_validate_checksummed_address() {
        assert!(validate_evm_address(HARDHAT_ADDR).unwrap());
    }

    #[test]
    fn test_validate_rejects_bad_checksum() {
        // 交换一个字母的大小写破坏 checksum
        let broken = "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        assert!(!validate_evm_address(broken).unwrap());
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(!validate_evm_address("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap());
        assert!(!validate_evm_address("0x1234").unwrap());
        assert!(!validate_evm_address("0xzz9Fd6e51aad88F6F4ce6aB8827279cffFb9226").unwrap());
    }

    #[test]
    fn test_addresses_equal_case_insensitive() {
        assert!(addresses_equal(HARDHAT_ADDR, &HARDHAT_ADDR.to_lowercase()));
        assert!(addresses_equal(HARDHAT_ADDR, &HARDHAT_ADDR.to_uppercase().replace("0X", "0x")));
        assert!(!addresses_equal("", ""));
        assert!(!addresses_equal(HARDHAT_ADDR, "0x0000000000000000000000000000000000000000"));
    }

    #[test]
    fn test_normalize_private_key_adds_prefix() {
        let normalized = normalize_private_key(HARDHAT_KEY).unwrap();
        assert_eq!(normalized, format!("0x{}", HARDHAT_KEY));
        // 已有前缀的保持不变
        assert_eq!(normalize_private_key(&normalized).unwrap(), normalized);
    }

    #[test]
    fn test_normalize_private_key_rejects_malformed() {
        assert!(normalize_private_key("0x1234").is_err());
        assert!(normalize_private_key(&"g".repeat(64)).is_err());
    }
}
