use lector::chunking::Chunker;
use lector::cli::{Cli, Commands, ConfigAction};
use lector::config::{Config, ConfigValidator};
use lector::embedding::{EmbeddingProvider, FastEmbedProvider};
use lector::error::{LectorError, Result};
use lector::generation::FallbackChain;
use lector::indexing::{DirectorySource, IndexBuilder};
use lector::retrieval::HitOrigin;
use lector::service::{AskOutcome, QaService, ServiceContext};
use lector::storage::{MetadataStore, StorageManager};
use std::path::PathBuf;
use std::sync::Arc;

const NO_RELEVANT_CONTENT: &str = "No relevant content found in the indexed documents.";

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Build { source, category } => {
            cmd_build(cli.config, cli.profile, source, category)?;
        }
        Commands::Query {
            query,
            top_k,
            keyword_k,
            json,
        } => {
            cmd_query(cli.config, cli.profile, &query, top_k, keyword_k, json)?;
        }
        Commands::Ask {
            question,
            offline,
            json,
        } => {
            cmd_ask(cli.config, cli.profile, &question, offline, json)?;
        }
        Commands::Status => {
            cmd_status(cli.config, cli.profile)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("lector=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lector=info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_build(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    source: PathBuf,
    category: Option<String>,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let chunker = Chunker::new(config.chunking.size, config.chunking.overlap)?;
    let provider = embedding_provider(&config)?;
    let storage = StorageManager::new(config.data_dir()?)?;

    let source = DirectorySource::new(source).with_category(category);
    let builder = IndexBuilder::new(provider, chunker, config.index.normalize)
        .with_batch_size(config.embedding.batch_size);

    let (generation, report) = builder.build(&source, &storage)?;

    println!("✓ Built index generation {}", generation.id);
    println!("  Documents indexed: {}", report.documents_indexed);
    println!("  Chunks indexed:    {}", report.chunks_indexed);
    println!("  Duration:          {}ms", report.duration_ms);

    if !report.skipped.is_empty() {
        println!("\nSkipped {} document(s):", report.documents_skipped());
        for skipped in &report.skipped {
            println!("  {} - {}", skipped.source_id, skipped.reason);
        }
    }

    let removed = storage.prune(config.storage.keep_generations)?;
    if removed > 0 {
        println!("\nRemoved {} old generation(s)", removed);
    }

    Ok(())
}

fn cmd_query(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    query: &str,
    top_k: Option<usize>,
    keyword_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let top_k_vector = top_k.unwrap_or(config.retrieval.top_k_vector);
    let top_k_keyword = keyword_k.unwrap_or(config.retrieval.top_k_keyword);

    let provider = embedding_provider(&config)?;
    let context = ServiceContext::open(config, provider)?;
    let hits = context
        .retriever()
        .retrieve_hits(query, top_k_vector, top_k_keyword)?;

    if json {
        let results: Vec<serde_json::Value> = hits
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "id": hit.chunk.id,
                    "position": hit.chunk.position,
                    "source_id": hit.chunk.source_id,
                    "chunk_index": hit.chunk.chunk_index,
                    "origin": hit.origin,
                    "text": hit.chunk.text,
                })
            })
            .collect();
        println!("{}", to_json(&results)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("{}", NO_RELEVANT_CONTENT);
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        let origin = match hit.origin {
            HitOrigin::Vector { distance } => format!("vector, distance {:.4}", distance),
            HitOrigin::Keyword => "keyword".to_string(),
        };
        println!(
            "{}. {} #{} ({})",
            rank + 1,
            hit.chunk.source_id,
            hit.chunk.chunk_index,
            origin
        );
        println!("   {}", hit.chunk.preview(200).replace('\n', " "));
    }

    Ok(())
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    question: &str,
    offline: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let chain = FallbackChain::from_config(&config.generation);
    if chain.is_empty() && !offline {
        tracing::warn!("No generation backends configured; answers will be degraded (try --offline)");
    }

    let provider = embedding_provider(&config)?;
    let context = ServiceContext::open(config, provider)?;
    let qa = QaService::new(&context, Arc::new(chain));

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| LectorError::io(e, "Failed to start async runtime"))?;

    if offline {
        let assembled = runtime.block_on(qa.context_for(question))?;
        match assembled {
            None if json => println!("{}", to_json(&AskOutcome::NoRelevantContent)?),
            None => println!("{}", NO_RELEVANT_CONTENT),
            Some(assembled) if json => println!("{}", to_json(&assembled)?),
            Some(assembled) => {
                println!("{}", assembled.context);
                print_sources(&assembled.sources);
            }
        }
        return Ok(());
    }

    let outcome = runtime.block_on(qa.ask(question))?;
    if json {
        println!("{}", to_json(&outcome)?);
        return Ok(());
    }

    match outcome {
        AskOutcome::NoRelevantContent => println!("{}", NO_RELEVANT_CONTENT),
        AskOutcome::Answered(response) => {
            println!("{}", response.answer);
            print_sources(&response.sources);
        }
    }

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let data_dir = config.data_dir()?;
    let storage = StorageManager::new(data_dir.clone())?;

    println!("Lector Status");
    println!("=============");
    println!("\nData directory: {}", data_dir.display());

    match storage.current_generation()? {
        Some(generation) => {
            let manifest = generation.manifest()?;
            println!("\nActive generation: {}", generation.id);
            println!(
                "  Built:     {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "  Model:     {} ({}D{})",
                manifest.model,
                manifest.dimension,
                if manifest.normalized { ", normalized" } else { "" }
            );
            println!(
                "  Chunking:  {} chars, {} overlap",
                manifest.chunk_size, manifest.chunk_overlap
            );
            println!(
                "  Contents:  {} documents, {} chunks",
                manifest.document_count, manifest.chunk_count
            );

            let stats = MetadataStore::open(&generation.db_path())?.stats()?;
            if stats.chunk_count != manifest.chunk_count {
                println!(
                    "  ⚠ Metadata store holds {} chunks from {} sources",
                    stats.chunk_count, stats.source_count
                );
            }
        }
        None => {
            println!("\nActive generation: none (run `lector build --source DIR`)");
        }
    }

    let generations = storage.list_generations()?;
    let size = StorageManager::dir_size(&storage.store_dir())?;
    println!(
        "\nGenerations on disk: {} ({})",
        generations.len(),
        StorageManager::format_size(size)
    );

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| LectorError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    LectorError::InvalidConfigValue {
                        path: section.clone(),
                        message: "No such configuration section".to_string(),
                    }
                })?,
                None => value,
            };

            println!("{}", to_json(&shown)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = match profile {
                Some(profile) => Config::load_with_profile(&path, &profile)?,
                None => Config::load(&path)?,
            };
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LectorError::io(e, format!("Failed to create config directory: {:?}", parent))
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'lector config init' to create one."
        );
        let mut config = Config::default();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(FastEmbedProvider::new(&config.embedding.model)?))
}

fn print_sources(sources: &[lector::retrieval::SourceCitation]) {
    if sources.is_empty() {
        return;
    }

    println!("\nSources:");
    for source in sources {
        match source.attributes.get("title").and_then(|t| t.as_str()) {
            Some(title) => println!("  - {} ({})", title, source.url),
            None => println!("  - {} ({})", source.source_id, source.url),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| LectorError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}
