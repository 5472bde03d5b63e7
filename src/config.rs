use crate::error::{PipelineError, Result};
use crate::ratelimit::RateLimit;
use crate::resolver::CheckpointPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_POSTCODES_API: &str = "https://api.postcodes.io/postcodes";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub postcodes_api_url: String,
    pub timeout_seconds: u64,
    pub geocode: GeocodeSettings,
    pub enrich: EnrichSettings,
    pub upload: UploadSettings,
    pub coords: CoordsSettings,
}

/// 郵便番号ジオコーディング
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeSettings {
    /// 1リクエストあたりの郵便番号数（postcodes.ioの上限は100）
    pub batch_size: usize,
    pub rate: RateLimit,
    /// 失敗したチャンクの後の待機時間
    pub failure_backoff_ms: u64,
    pub checkpoint: CheckpointPolicy,
}

/// CQCエンリッチ
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichSettings {
    pub worklist_rpc: String,
    pub function_name: String,
    pub worklist_limit: usize,
    pub rate: RateLimit,
    /// 進捗表示の間隔（件数）
    pub report_every: usize,
}

/// 施設テーブルへのupsert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub table: String,
    pub batch_size: usize,
    /// バッチ失敗時に分割して再送するサイズ
    pub fallback_batch_size: usize,
}

/// 座標一括更新RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordsSettings {
    pub rpc: String,
    pub batch_size: usize,
    pub rate: RateLimit,
}

/// Supabase接続情報
#[derive(Debug, Clone)]
pub struct SupabaseCredentials {
    pub url: String,
    pub key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            postcodes_api_url: DEFAULT_POSTCODES_API.into(),
            timeout_seconds: 30,
            geocode: GeocodeSettings::default(),
            enrich: EnrichSettings::default(),
            upload: UploadSettings::default(),
            coords: CoordsSettings::default(),
        }
    }
}

impl Default for GeocodeSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            rate: RateLimit::per_second(10.0),
            failure_backoff_ms: 1000,
            checkpoint: CheckpointPolicy::EveryChunks(10),
        }
    }
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            worklist_rpc: "get_unenriched_care_homes".into(),
            function_name: "cqc-enrich-full".into(),
            worklist_limit: 15000,
            // CQCの推奨上限は10req/s
            rate: RateLimit::per_second(10.0),
            report_every: 100,
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            table: "facilities".into(),
            batch_size: 500,
            fallback_batch_size: 50,
        }
    }
}

impl Default for CoordsSettings {
    fn default() -> Self {
        Self {
            rpc: "bulk_update_facility_coords".into(),
            batch_size: 500,
            rate: RateLimit::every(Duration::from_millis(300)),
        }
    }
}

impl GeocodeSettings {
    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

impl Config {
    /// 設定ファイルを読み込み、環境変数で上書き
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// 件数系の設定は1以上
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("geocode.batch_size", self.geocode.batch_size),
            ("enrich.worklist_limit", self.enrich.worklist_limit),
            ("upload.batch_size", self.upload.batch_size),
            ("upload.fallback_batch_size", self.upload.fallback_batch_size),
            ("coords.batch_size", self.coords.batch_size),
        ];
        match counts.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(PipelineError::Config(format!("{} は1以上を指定してください", name))),
            None => Ok(()),
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| PipelineError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("carehome-pipeline").join("config.json"))
    }

    /// 環境変数を優先
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_blank("SUPABASE_URL") {
            self.supabase_url = Some(url);
        }
        if let Some(key) = non_blank("SUPABASE_KEY").or_else(|| non_blank("SUPABASE_SERVICE_ROLE_KEY")) {
            self.supabase_key = Some(key);
        }
        if let Some(url) = non_blank("POSTCODES_API_URL") {
            self.postcodes_api_url = url;
        }
    }

    pub fn supabase(&self) -> Result<SupabaseCredentials> {
        let url = self
            .supabase_url
            .clone()
            .ok_or(PipelineError::MissingCredential("SUPABASE_URL"))?;
        let key = self
            .supabase_key
            .clone()
            .ok_or(PipelineError::MissingCredential("SUPABASE_KEY"))?;

        Ok(SupabaseCredentials {
            url: url.trim_end_matches('/').to_string(),
            key,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn set_supabase_url(&mut self, url: String) -> Result<()> {
        self.supabase_url = Some(url);
        self.save()
    }

    pub fn set_supabase_key(&mut self, key: String) -> Result<()> {
        self.supabase_key = Some(key);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.geocode.batch_size, 100);
        assert_eq!(config.enrich.worklist_limit, 15000);
        assert_eq!(config.upload.fallback_batch_size, 50);
        assert!(config.supabase_key.is_none());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config {
            supabase_url: Some("https://file.example".into()),
            ..Default::default()
        };
        let env: HashMap<&str, &str> = [
            ("SUPABASE_URL", "https://env.example/"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
            ("POSTCODES_API_URL", "  "),
        ]
        .into_iter()
        .collect();

        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        let creds = config.supabase().unwrap();
        assert_eq!(creds.url, "https://env.example");
        assert_eq!(creds.key, "service-key");
        // 空白のみの値は無視
        assert_eq!(config.postcodes_api_url, DEFAULT_POSTCODES_API);
    }

    #[test]
    fn test_missing_credentials() {
        let config = Config::default();
        let err = config.supabase().unwrap_err();
        assert!(matches!(err, PipelineError::MissingCredential("SUPABASE_URL")));
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"timeout_seconds": 5, "geocode": {"checkpoint": {"every_seconds": 30}}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.geocode.batch_size, 100);
        assert_eq!(config.geocode.checkpoint, CheckpointPolicy::EverySeconds(30));
    }

    #[test]
    fn test_zero_worklist_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"enrich": {"worklist_limit": 0}}"#).unwrap();

        let err = Config::load_from(&path).unwrap_err();
        match err {
            PipelineError::Config(message) => assert!(message.contains("enrich.worklist_limit")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(Config::default().validate().is_ok());
    }
}
