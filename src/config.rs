//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// RPC URL 中出现这些片段视为占位符，等同于未配置
const PLACEHOLDER_MARKERS: [&str; 3] = ["YOUR_API_KEY", "YOUR_PROJECT_ID", "<key>"];

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    #[serde(default)]
    pub cors_allow_origins: Option<String>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

/// 链网络配置
///
/// `rpc_url` 用于签名会话的读写访问；`read_only_rpc_url` 是未连接钱包时
/// 浏览数据用的只读端点（默认与 `rpc_url` 相同）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub read_only_rpc_url: String,
    pub chain_id: u64,
    /// 众筹合约的部署地址（外部协作方，本服务只消费其 ABI）
    pub contract_address: String,
    /// 区块浏览器交易链接模板，`{tx}` 会被替换为交易哈希
    pub explorer_tx_url: String,
}

/// 本地测试账户配置
///
/// 固定的一小组测试私钥，用于快速切换账户的开发流程；仅启动时加载，
/// 运行期不派生新密钥。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub test_private_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".into()),
            cors_allow_origins: std::env::var("CORS_ALLOW_ORIGINS").ok(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
            enable_file_logging: std::env::var("LOG_FILE_ENABLED")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let rpc_url = std::env::var("RPC_URL")
            .unwrap_or_else(|_| "https://ethereum-sepolia-rpc.publicnode.com".into());
        Self {
            read_only_rpc_url: std::env::var("READ_ONLY_RPC_URL")
                .unwrap_or_else(|_| rpc_url.clone()),
            rpc_url,
            chain_id: std::env::var("CHAIN_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(11155111), // Sepolia
            contract_address: std::env::var("CONTRACT_ADDRESS").unwrap_or_default(),
            explorer_tx_url: std::env::var("EXPLORER_TX_URL")
                .unwrap_or_else(|_| "https://sepolia.etherscan.io/tx/{tx}".into()),
        }
    }
}

impl NetworkConfig {
    /// 端点是否可用（非空且不是占位符）
    pub fn endpoint_configured(&self) -> bool {
        !self.rpc_url.is_empty() && !is_placeholder(&self.rpc_url)
    }

    /// 构造交易的区块浏览器深链
    pub fn explorer_link(&self, tx_hash: &str) -> String {
        self.explorer_tx_url.replace("{tx}", tx_hash)
    }
}

/// 判断 URL 是否包含未替换的占位符
pub fn is_placeholder(url: &str) -> bool {
    PLACEHOLDER_MARKERS.iter().any(|m| url.contains(m))
}

fn test_keys_from_env() -> Vec<String> {
    std::env::var("TEST_PRIVATE_KEYS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            network: NetworkConfig::default(),
            accounts: AccountsConfig {
                test_private_keys: test_keys_from_env(),
            },
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                let file_config = Self::from_file(path)?;
                config = file_config;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            anyhow::bail!("RPC_URL must be set");
        }
        if is_placeholder(&self.network.rpc_url) {
            anyhow::bail!("RPC_URL still contains a placeholder, replace it with a real endpoint");
        }

        // 合约地址：0x + 40 位十六进制
        let addr = &self.network.contract_address;
        if addr.is_empty() {
            anyhow::bail!("CONTRACT_ADDRESS must be set");
        }
        if !addr.starts_with("0x")
            || addr.len() != 42
            || !addr[2..].chars().all(|c| c.is_ascii_hexdigit())
        {
            anyhow::bail!("CONTRACT_ADDRESS must be a 0x-prefixed 20-byte hex address");
        }

        if !self.network.explorer_tx_url.contains("{tx}") {
            anyhow::bail!("EXPLORER_TX_URL must contain the {{tx}} placeholder");
        }

        // 测试私钥只做形状检查，不做曲线验证（留给 ethers 解析）
        for (i, key) in self.accounts.test_private_keys.iter().enumerate() {
            let hex_part = key.strip_prefix("0x").unwrap_or(key);
            if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
                anyhow::bail!("TEST_PRIVATE_KEYS entry #{} is not a 32-byte hex key", i);
            }
        }

        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::from_env().unwrap();
        config.network.contract_address =
            "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string();
        config.network.rpc_url = "http://127.0.0.1:8545".to_string();
        config.logging = LoggingConfig {
            level: "info".into(),
            format: "text".into(),
            enable_file_logging: false,
            log_file_path: None,
        };
        config
    }

    #[test]
    fn test_config_from_env_defaults() {
        let config = valid_config();
        assert!(config.network.explorer_tx_url.contains("{tx}"));
        assert!(config.network.endpoint_configured());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind_addr = "0.0.0.0:9090"

[logging]
level = "debug"
format = "text"
enable_file_logging = false

[network]
rpc_url = "http://127.0.0.1:8545"
read_only_rpc_url = "http://127.0.0.1:8545"
chain_id = 31337
contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
explorer_tx_url = "https://sepolia.etherscan.io/tx/{{tx}}"

[accounts]
test_private_keys = ["0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"]
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9090");
        assert_eq!(config.network.chain_id, 31337);
        assert_eq!(config.accounts.test_private_keys.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_placeholder_rpc() {
        let mut config = valid_config();
        config.network.rpc_url = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY".into();
        assert!(config.validate().is_err());
        assert!(!config.network.endpoint_configured());
    }

    #[test]
    fn test_validate_rejects_bad_contract_address() {
        let mut config = valid_config();
        config.network.contract_address = "not-an-address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_test_key() {
        let mut config = valid_config();
        config.accounts.test_private_keys = vec!["0x1234".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explorer_link() {
        let config = valid_config();
        let link = config.network.explorer_link("0xabc");
        assert_eq!(link, "https://sepolia.etherscan.io/tx/0xabc");
    }
}
