use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("{0} が設定されていません。環境変数または `carehome config` で設定してください")]
    MissingCredential(&'static str),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("施設データがありません: {0}")]
    NoFacilities(String),

    #[error("キャッシュを読み込めません: {path}: {reason}（内容を確認するか削除してください）")]
    CacheUnreadable { path: String, reason: String },

    #[error("CSV読み込みエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("ワークブック読み込みエラー: {0}")]
    Workbook(String),

    #[error("Excel生成エラー: {0}")]
    ExcelGeneration(String),

    #[error("通信エラー: {0}")]
    Transport(String),

    #[error("レスポンス形式が不正: {0}")]
    MalformedResponse(String),

    #[error("リモートが拒否しました (HTTP {status}): {body}")]
    RemoteRejection { status: u16, body: String },

    #[error("外部APIに接続できません: {0}")]
    EndpointUnreachable(String),

    #[error("未処理リストの取得に失敗: {0}")]
    WorklistFetch(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] carehome_common::Error),
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PipelineError::MalformedResponse(e.to_string())
        } else {
            PipelineError::Transport(e.to_string())
        }
    }
}

impl PipelineError {
    /// 接続レベルの失敗か（HTTPステータスによる失敗は含まない）
    pub fn is_transport(&self) -> bool {
        matches!(self, PipelineError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
