use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "carehome")]
#[command(about = "介護施設CRM向けデータ移行・ジオコーディング・エンリッチツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// CQC評価エクスポート（CSV/xlsx）を施設JSONに変換
    Process {
        /// CQCエクスポートファイル
        #[arg(required = true)]
        input: PathBuf,

        /// 施設JSONの出力先
        #[arg(short, long, default_value = "data/facilities.json")]
        output: PathBuf,

        /// フィルタ候補JSONの出力先（デフォルト: 出力と同じフォルダのfilters.json）
        #[arg(long)]
        filters: Option<PathBuf>,

        /// 介護施設（Care Home? = Y）のみ出力
        #[arg(long)]
        care_homes_only: bool,
    },

    /// 郵便番号をジオコードして施設に座標を付与
    Geocode {
        /// 施設JSONファイル
        #[arg(required = true)]
        facilities: PathBuf,

        /// キャッシュファイル（デフォルト: 施設JSONと同じフォルダ）
        #[arg(long)]
        cache: Option<PathBuf>,

        /// 出力先（省略時は上書き）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 1リクエストあたりの郵便番号数（最大100）
        #[arg(short, long, value_parser = positive_count)]
        batch_size: Option<usize>,
    },

    /// 未エンリッチの施設がなくなるまでCQCエンリッチを実行
    Enrich {
        /// 1回に取得する件数
        #[arg(short, long, value_parser = positive_count)]
        limit: Option<usize>,

        /// 取得回数の上限
        #[arg(long, value_parser = positive_count)]
        max_batches: Option<usize>,
    },

    /// 施設JSONをリモートDBへupsert
    Upload {
        /// 施設JSONファイル
        #[arg(required = true)]
        facilities: PathBuf,

        /// 介護施設のみ
        #[arg(long)]
        care_homes_only: bool,

        /// 送信せずに件数とサンプルを表示
        #[arg(long)]
        dry_run: bool,

        /// 確認をスキップ
        #[arg(short, long)]
        yes: bool,

        /// バッチサイズ
        #[arg(short, long, value_parser = positive_count)]
        batch_size: Option<usize>,
    },

    /// ジオコード済みの座標をリモートDBへ一括反映
    PushCoords {
        /// 施設JSONファイル
        #[arg(required = true)]
        facilities: PathBuf,

        /// 送信せずに件数を表示
        #[arg(long)]
        dry_run: bool,
    },

    /// 施設一覧をExcelに出力
    Export {
        /// 施設JSONファイル
        #[arg(required = true)]
        input: PathBuf,

        /// 出力ファイル/ディレクトリ
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 設定を表示/編集
    Config {
        /// SupabaseのURLを設定
        #[arg(long)]
        set_supabase_url: Option<String>,

        /// Supabaseのキーを設定
        #[arg(long)]
        set_supabase_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },

    /// ジオコードキャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// 対象フォルダ（省略時は data）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}

/// 1以上の件数
fn positive_count(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("1以上を指定してください".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
