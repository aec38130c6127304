use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const SETTINGS_FILE_NAME: &str = "operator-settings.toml";

/// Top-level settings.
///
/// Written to the data dir with defaults on first start; secrets live in the
/// files the two `*_path` options point at, never in here directly (the tag
/// secret is the exception, it only authenticates invoice descriptions).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Base url of the chain account daemon.
    pub chain_rpc_url: String,
    /// File holding the credential presented to the chain account daemon.
    /// The daemon owns the actual signing key.
    pub operator_private_key_path: PathBuf,
    pub escrow_address: String,
    pub token_address: String,
    /// Decimal places of the escrowed token. 8 means one token unit per sat.
    #[serde(default = "defaults::token_decimals")]
    pub token_decimals: u32,

    /// Base url of the Core Lightning REST plugin.
    pub lightning_rest_url: String,
    /// File holding the rune sent with every node request.
    pub lightning_auth_token_path: PathBuf,

    /// HMAC-SHA256 key used to tag invoice descriptions. At least 16 bytes.
    pub tag_secret: String,

    #[serde(default = "defaults::max_fee_percent")]
    pub max_fee_percent: f64,
    #[serde(default = "defaults::pay_retry_for_seconds")]
    pub pay_retry_for_seconds: u64,
    #[serde(default = "defaults::invoice_expiry_seconds")]
    pub invoice_expiry_seconds: u64,

    #[serde(default = "defaults::invoice_monitor_interval_ms")]
    pub invoice_monitor_interval_ms: u64,
    #[serde(default = "defaults::invoice_monitor_retry_ms")]
    pub invoice_monitor_retry_ms: u64,
    #[serde(default = "defaults::invoice_monitor_stale_ms")]
    pub invoice_monitor_stale_ms: u64,

    /// The persisted json document. Relative paths resolve against the data
    /// dir.
    pub data_file_path: PathBuf,
    /// Port of the user-facing surface (served by a separate process).
    pub listen_port: u16,
    pub operator_service_port: u16,

    // Special parameter, where the settings file is located
    pub path: Option<PathBuf>,
}

mod defaults {
    pub fn token_decimals() -> u32 {
        8
    }

    pub fn max_fee_percent() -> f64 {
        0.5
    }

    pub fn pay_retry_for_seconds() -> u64 {
        30
    }

    pub fn invoice_expiry_seconds() -> u64 {
        3_600
    }

    pub fn invoice_monitor_interval_ms() -> u64 {
        15_000
    }

    pub fn invoice_monitor_retry_ms() -> u64 {
        60_000
    }

    pub fn invoice_monitor_stale_ms() -> u64 {
        300_000
    }
}

impl Settings {
    fn default() -> Self {
        // A throwaway tag secret so a fresh install starts up; deployments
        // are expected to replace it.
        let tag_secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        Self {
            chain_rpc_url: "http://localhost:5055".to_string(),
            operator_private_key_path: PathBuf::from("operator.key"),
            escrow_address: "0x0".to_string(),
            token_address: "0x0".to_string(),
            token_decimals: defaults::token_decimals(),
            lightning_rest_url: "http://localhost:3010".to_string(),
            lightning_auth_token_path: PathBuf::from("lightning.rune"),
            tag_secret,
            max_fee_percent: defaults::max_fee_percent(),
            pay_retry_for_seconds: defaults::pay_retry_for_seconds(),
            invoice_expiry_seconds: defaults::invoice_expiry_seconds(),
            invoice_monitor_interval_ms: defaults::invoice_monitor_interval_ms(),
            invoice_monitor_retry_ms: defaults::invoice_monitor_retry_ms(),
            invoice_monitor_stale_ms: defaults::invoice_monitor_stale_ms(),
            data_file_path: PathBuf::from("bridge.json"),
            listen_port: 8080,
            operator_service_port: 8090,
            path: None,
        }
    }

    pub async fn new(data_dir: &Path) -> Self {
        match read_settings(data_dir).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Unable to read {SETTINGS_FILE_NAME} file, using defaults: {e}");
                let new = Settings {
                    path: Some(data_dir.join(SETTINGS_FILE_NAME)),
                    ..Settings::default()
                };
                if let Err(e) = new.write_to_file().await {
                    tracing::error!("Unable to write default settings to file: {e}");
                } else {
                    tracing::info!("Default settings written to file");
                }
                new
            }
        }
    }

    pub async fn write_to_file(&self) -> Result<()> {
        let data =
            toml::to_string_pretty(&self).context("Unable to serialize settings to TOML format")?;

        let settings_path = self.path.as_ref().context("Settings path not set")?.clone();
        let mut file = fs::File::create(settings_path).await?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(8..=77).contains(&self.token_decimals) {
            bail!(
                "token_decimals must be within [8, 77], got {}",
                self.token_decimals
            );
        }
        if self.tag_secret.len() < 16 {
            bail!("tag_secret must be at least 16 bytes");
        }
        if self.max_fee_percent <= 0.0 {
            bail!("max_fee_percent must be positive");
        }
        if self.chain_rpc_url.is_empty() || self.lightning_rest_url.is_empty() {
            bail!("daemon urls must not be empty");
        }
        if self.escrow_address == "0x0" || self.token_address == "0x0" {
            bail!("escrow_address and token_address must be configured");
        }
        Ok(())
    }

    /// Resolves a possibly relative configured path against the data dir.
    pub fn resolve(&self, data_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.invoice_monitor_interval_ms)
    }

    pub fn monitor_retry_delay(&self) -> Duration {
        Duration::from_millis(self.invoice_monitor_retry_ms)
    }

    pub fn monitor_stale_after(&self) -> Duration {
        Duration::from_millis(self.invoice_monitor_stale_ms)
    }
}

async fn read_settings(data_dir: &Path) -> Result<Settings> {
    let settings_path = data_dir.join(SETTINGS_FILE_NAME);
    let data = fs::read_to_string(settings_path).await?;
    toml::from_str(&data).context("Unable to parse settings file")
}
