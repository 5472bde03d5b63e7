use carehome_common::{consolidate_rows, extract_filters, Facility, FacilityRow};
use carehome_pipeline::{
    cli, config, coords, enricher, error, export, http, normalizer, postcodes, ratelimit, resolver,
    source, supabase, upload,
};
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use dialoguer::Confirm;
use error::{PipelineError, Result};
use ratelimit::{Pacing, RateLimiter};
use resolver::GeocodeCache;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_DATA_DIR: &str = "data";

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ エラー: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Process { input, output, filters, care_homes_only } => {
            println!("📋 carehome - CQCデータ変換\n");

            println!("[1/3] エクスポートを読み込み中...");
            let rows = source::read_rows(&input)?;
            let consolidation = consolidate_rows(rows);
            println!(
                "✔ {}行を読み込み、{}施設に集約（ID空欄 {}行をスキップ）\n",
                consolidation.rows_read,
                consolidation.facilities.len(),
                consolidation.rows_skipped
            );

            let facilities = consolidation.facilities;
            if facilities.is_empty() {
                return Err(PipelineError::NoFacilities(input.display().to_string()));
            }
            let care_home_count = facilities.iter().filter(|f| f.is_care_home).count();

            println!("[2/3] フィルタ候補を抽出中...");
            let filter_options = extract_filters(&facilities);
            println!("  地域: {}件", filter_options.regions.len());
            println!("  自治体: {}件", filter_options.local_authorities.len());
            println!("  施設種別: {}件", filter_options.location_types.len());
            println!("  評価: {}件\n", filter_options.ratings.len());

            println!("[3/3] 結果を保存中...");
            let output_facilities: Vec<&Facility> = facilities
                .iter()
                .filter(|f| !care_homes_only || f.is_care_home)
                .collect();
            source::write_json(&output, &output_facilities)?;
            println!("✔ 施設を保存: {} ({}件)", output.display(), output_facilities.len());

            let filters_path = filters.unwrap_or_else(|| sibling(&output, "filters.json"));
            source::write_json(&filters_path, &filter_options)?;
            println!("✔ フィルタ候補を保存: {}", filters_path.display());

            println!("\n✅ 変換完了（全{}施設、うち介護施設{}件）", facilities.len(), care_home_count);
        }

        Commands::Geocode { facilities: facilities_path, cache, output, batch_size } => {
            println!("📍 carehome - 郵便番号ジオコーディング\n");
            run_geocode(&config, &facilities_path, cache, output, batch_size, cli.verbose).await?;
        }

        Commands::Enrich { limit, max_batches } => {
            println!("🔄 carehome - CQC一括エンリッチ（継続モード）\n");
            run_enrich(&config, limit, max_batches).await?;
        }

        Commands::Upload { facilities: facilities_path, care_homes_only, dry_run, yes, batch_size } => {
            println!("⬆️  carehome - 施設アップロード\n");

            let facilities = source::read_facilities(&facilities_path)?;
            let rows: Vec<FacilityRow> = facilities
                .iter()
                .filter(|f| !care_homes_only || f.is_care_home)
                .map(FacilityRow::from)
                .collect();
            println!("✔ {}件の行を作成", rows.len());

            if dry_run {
                println!("\nドライラン: {}件をアップロード予定", rows.len());
                if let Some(sample) = rows.first() {
                    println!("サンプル:\n{}", serde_json::to_string_pretty(sample)?);
                }
                return Ok(());
            }

            if !yes && !confirm(&format!("{}件を{}へupsertしますか？", rows.len(), config.upload.table))? {
                println!("中止しました");
                return Ok(());
            }

            let client = supabase::SupabaseClient::from_config(http::build_client(config.timeout())?, &config)?;
            let options = upload::UploadOptions {
                batch_size: batch_size.unwrap_or(config.upload.batch_size),
                fallback_batch_size: config.upload.fallback_batch_size,
                show_progress: true,
            };
            let stats = upload::upload_rows(&client, &rows, &options).await?;

            println!("\n✔ アップロード: {}件", stats.uploaded);
            if stats.failed_rows > 0 {
                println!("  失敗: {}件（分割再送 {}バッチ）", stats.failed_rows, stats.retried_batches);
            }
            println!("\n✅ アップロード完了");
        }

        Commands::PushCoords { facilities: facilities_path, dry_run } => {
            println!("🗺️  carehome - 座標一括反映\n");

            let facilities = source::read_facilities(&facilities_path)?;
            let updates = coords::collect_updates(&facilities);
            println!(
                "✔ 座標あり {}件 / 全{}件",
                updates.len(),
                facilities.len()
            );

            if dry_run || updates.is_empty() {
                println!("\n送信予定: {}件（{}件/バッチ）", updates.len(), config.coords.batch_size);
                return Ok(());
            }

            let client = supabase::SupabaseClient::from_config(http::build_client(config.timeout())?, &config)?;
            let mut limiter = RateLimiter::new(config.coords.rate, Pacing::tokio());
            let stats =
                coords::push_coordinates(&client, &updates, config.coords.batch_size, &mut limiter)
                    .await?;

            println!("\n✔ 反映: {}件（{}バッチ）", stats.sent, stats.batches);
            if stats.failed_batches > 0 {
                println!("  失敗: {}バッチ / {}件", stats.failed_batches, stats.failed_rows);
            }
            println!("\n✅ 座標反映完了");
        }

        Commands::Export { input, output } => {
            println!("📄 carehome - エクスポート\n");

            let facilities = source::read_facilities(&input)?;
            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
            export::export_facilities(&facilities, &output_dir)?;

            println!("\n✅ エクスポート完了");
        }

        Commands::Config { set_supabase_url, set_supabase_key, show } => {
            // 環境変数で上書きされていないファイルの値を編集する
            let mut file_config = Config::load_from(&Config::config_path()?)?;

            if let Some(url) = set_supabase_url {
                file_config.set_supabase_url(url)?;
                println!("✔ SupabaseのURLを設定しました");
            }

            if let Some(key) = set_supabase_key {
                file_config.set_supabase_key(key)?;
                println!("✔ Supabaseのキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  設定ファイル: {}", Config::config_path()?.display());
                println!("  Supabase URL: {}", config.supabase_url.as_deref().unwrap_or("未設定"));
                println!("  Supabaseキー: {}", if config.supabase_key.is_some() { "設定済み" } else { "未設定" });
                println!("  postcodes API: {}", config.postcodes_api_url);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  ジオコード: {}件/リクエスト, {:.1}req/s, 保存 {:?}",
                    config.geocode.batch_size,
                    config.geocode.rate.requests_per_second,
                    config.geocode.checkpoint);
                println!("  エンリッチ: {}件/取得, {:.1}req/s",
                    config.enrich.worklist_limit,
                    config.enrich.rate.requests_per_second);
                println!("  アップロード: {} ({}件/バッチ)", config.upload.table, config.upload.batch_size);
            }
        }

        Commands::Cache { clear, folder, info } => {
            let target = folder.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
            let cache_path = GeocodeCache::cache_path(&target);

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                if cache_path.exists() {
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    match GeocodeCache::load(&cache_path) {
                        Ok(cache) => {
                            println!("  件数: {}", cache.len());
                            println!("  座標あり: {}", cache.found_count());
                            println!("  該当なし: {}", cache.not_found_count());
                            if let Some(updated_at) = cache.updated_at() {
                                println!("  更新日時: {}", updated_at);
                            }
                        }
                        Err(e) => println!("  ⚠ {}", e),
                    }
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match GeocodeCache::clear(&cache_path) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}

/// 同じフォルダの別ファイル
fn sibling(path: &Path, file_name: &str) -> PathBuf {
    path.parent()
        .map(|p| p.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

fn confirm(prompt: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))
}

async fn run_geocode(
    config: &Config,
    facilities_path: &Path,
    cache: Option<PathBuf>,
    output: Option<PathBuf>,
    batch_size: Option<usize>,
    verbose: bool,
) -> Result<()> {
    println!("[1/4] 施設を読み込み中...");
    let mut facilities = source::read_facilities(facilities_path)?;
    let normalization = normalizer::normalize_facilities(&mut facilities);
    println!("✔ {}施設を読み込み（郵便番号を{}件正規化）", facilities.len(), normalization.corrections.len());

    let postcodes = normalizer::collect_postcodes(&facilities);
    println!("✔ 郵便番号 {}件（空欄 {}件）", postcodes.keys.len(), postcodes.blank);
    if !postcodes.invalid.is_empty() {
        println!("  ⚠ 形式外の郵便番号: {}件", postcodes.invalid.len());
        if verbose {
            for pc in postcodes.invalid.iter().take(10) {
                println!("    {}", pc);
            }
        }
    }
    println!();

    let cache_path = cache.unwrap_or_else(|| sibling(facilities_path, resolver::cache::CACHE_FILE_NAME));
    let mut geocode_cache = GeocodeCache::load(&cache_path)?;
    println!("[2/4] キャッシュ {}件を読み込み: {}\n", geocode_cache.len(), cache_path.display());

    println!("[3/4] ジオコード中...");
    let client = postcodes::PostcodesClient::new(
        http::build_client(config.timeout())?,
        config.postcodes_api_url.clone(),
    );
    let mut limiter = RateLimiter::new(config.geocode.rate, Pacing::tokio());
    let options = resolver::ResolveOptions {
        batch_size: batch_size
            .unwrap_or(config.geocode.batch_size)
            .clamp(1, postcodes::MAX_BATCH),
        failure_backoff: config.geocode.failure_backoff(),
        checkpoint: config.geocode.checkpoint,
        snapshot_path: cache_path.clone(),
        show_progress: true,
    };
    let stats = resolver::resolve(&postcodes.keys, &mut geocode_cache, &client, &mut limiter, &options).await?;

    println!("✔ 新規問い合わせ {}件（API呼び出し {}回）", stats.pending, stats.calls);
    println!("  座標あり: {} / 該当なし: {} / 不正応答: {}", stats.found, stats.not_found, stats.malformed);
    if stats.skipped_chunks > 0 {
        println!("  ⚠ スキップしたチャンク: {}（次回実行で再問い合わせ）", stats.skipped_chunks);
    }
    println!(
        "  キャッシュ合計: {}件（座標あり {} / 該当なし {}）\n",
        geocode_cache.len(),
        geocode_cache.found_count(),
        geocode_cache.not_found_count()
    );

    println!("[4/4] 施設に座標を反映中...");
    let applied = resolver::apply_coordinates(&mut facilities, &geocode_cache);
    let output_path = output.unwrap_or_else(|| facilities_path.to_path_buf());
    source::write_json(&output_path, &facilities)?;
    println!("✔ 座標あり {}件 / 座標なし {}件", applied.updated, applied.missing);
    println!("✔ 結果を保存: {}", output_path.display());

    println!("\n✅ ジオコード完了");
    Ok(())
}

async fn run_enrich(config: &Config, limit: Option<usize>, max_batches: Option<usize>) -> Result<()> {
    let client = supabase::SupabaseClient::from_config(http::build_client(config.timeout())?, config)?;
    let mut limiter = RateLimiter::new(config.enrich.rate, Pacing::tokio());
    let options = enricher::EnrichOptions {
        limit: limit.unwrap_or(config.enrich.worklist_limit),
        report_every: config.enrich.report_every,
        max_batches,
    };

    let summary = enricher::run_enrichment(&client, &client, &mut limiter, &options, |report| {
        println!("  {}", report);
    })
    .await?;

    for batch in &summary.batches {
        println!(
            "バッチ{}: 成功 {}件 / 失敗 {}件 / {:.1}分",
            batch.number,
            batch.succeeded,
            batch.failed,
            batch.elapsed.as_secs_f64() / 60.0
        );
    }

    println!("\n{}", "=".repeat(60));
    if summary.completed {
        println!("全施設のエンリッチが完了しました");
    } else {
        println!("取得回数の上限に達したため終了しました");
    }
    println!("成功: {}件", summary.succeeded);
    println!("失敗: {}件", summary.failed);
    println!("所要時間: {:.1}分", summary.elapsed.as_secs_f64() / 60.0);
    println!("{}", "=".repeat(60));

    Ok(())
}
