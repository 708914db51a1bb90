//! Palace CLI - Command-line interface for codebase indexing and staleness
//! detection

use clap::{Parser, Subcommand};
use palace_core::{IndexStore, Scanner, Verify, VerifyMode, VerifyRequest};

#[derive(Parser)]
#[command(name = "palace")]
#[command(about = "Codebase indexing and staleness detection", long_about = None)]
struct Cli {
    /// Override repo root detection
    #[arg(long, global = true)]
    root: Option<std::path::PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .palace/ and config.toml
    Init,

    /// Full scan: index the whole workspace
    Index,

    /// Incremental scan: reindex only changed files
    Reindex,

    /// Check whether the index is stale without mutating it
    Verify {
        /// Restrict the check to a git diff range (e.g. main..HEAD)
        #[arg(long)]
        diff_range: Option<String>,

        /// Hash every candidate instead of trusting size/mtime
        #[arg(long)]
        strict: bool,
    },

    /// Full-text search over indexed chunk content
    Search {
        /// Search term (matched literally)
        query: String,

        /// Maximum number of hits
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Call sites targeting a symbol (or made by it, with --from)
    Calls {
        /// Symbol name
        symbol: String,

        /// Show calls made by the symbol defined in this file instead
        #[arg(long)]
        from: Option<String>,
    },

    /// All call relationships recorded for a file
    Graph {
        /// Relative file path
        file: String,
    },

    /// Show index stats
    Status,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => cmd_init(cli.root),
        Commands::Index => cmd_index(cli.root, cli.json),
        Commands::Reindex => cmd_reindex(cli.root, cli.json),
        Commands::Verify { diff_range, strict } => {
            cmd_verify(cli.root, diff_range, strict, cli.json)
        }
        Commands::Search { query, limit } => cmd_search(cli.root, &query, limit, cli.json),
        Commands::Calls { symbol, from } => {
            cmd_calls(cli.root, &symbol, from.as_deref(), cli.json)
        }
        Commands::Graph { file } => cmd_graph(cli.root, &file, cli.json),
        Commands::Status => cmd_status(cli.root, cli.json),
    };

    if let Err(e) = result {
        if cli.json {
            let error_json = serde_json::json!({ "error": e.to_string() });
            eprintln!("{}", serde_json::to_string_pretty(&error_json).unwrap());
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn cmd_init(root: Option<std::path::PathBuf>) -> palace_core::Result<()> {
    use colored::Colorize;

    let repo_root = detect_repo_root(root)?;
    IndexStore::init(&repo_root)?;

    println!("{} .palace/config.toml", "Created".green());
    println!("{} .palace/ to .gitignore", "Added".green());
    Ok(())
}

fn cmd_index(root: Option<std::path::PathBuf>, json: bool) -> palace_core::Result<()> {
    use colored::Colorize;

    let repo_root = detect_repo_root(root)?;
    let summary = Scanner::new(&repo_root)?.run_full()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {} files, {} chunks, {} symbols",
            "Indexed".green(),
            summary.file_count,
            summary.chunk_count,
            summary.symbol_count
        );
        println!("{}: {}", "Scan hash".blue(), summary.scan_hash);
        println!("{}: .palace/index/scan.json", "Audit".blue());
    }
    Ok(())
}

fn cmd_reindex(root: Option<std::path::PathBuf>, json: bool) -> palace_core::Result<()> {
    use colored::Colorize;

    let repo_root = detect_repo_root(root)?;
    let summary = Scanner::new(&repo_root)?.run_incremental()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {} added, {} modified, {} deleted ({} unchanged, {} ms)",
            "Reindexed".green(),
            summary.added,
            summary.modified,
            summary.deleted,
            summary.unchanged,
            summary.duration_ms
        );
    }
    Ok(())
}

fn cmd_verify(
    root: Option<std::path::PathBuf>,
    diff_range: Option<String>,
    strict: bool,
    json: bool,
) -> palace_core::Result<()> {
    use colored::Colorize;

    let repo_root = detect_repo_root(root)?;
    let store = IndexStore::open_existing(&repo_root)?;
    let report = Verify::run(
        &store,
        &VerifyRequest {
            root: &repo_root,
            diff_range: diff_range.as_deref(),
            mode: if strict {
                VerifyMode::Strict
            } else {
                VerifyMode::Fast
            },
        },
    )?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "fresh": report.is_fresh(),
                "stale": report.stale,
                "source": report.source,
                "candidates": report.candidate_count,
            }))?
        );
    } else if report.is_fresh() {
        println!(
            "{}: {} candidates checked",
            "Fresh".green(),
            report.candidate_count
        );
    } else {
        for entry in &report.stale {
            println!("{}: {}", "Stale".red(), entry);
        }
        println!("({} stale)", report.stale.len());
    }

    if !report.is_fresh() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_search(
    root: Option<std::path::PathBuf>,
    query: &str,
    limit: usize,
    json: bool,
) -> palace_core::Result<()> {
    use colored::Colorize;

    let repo_root = detect_repo_root(root)?;
    let store = IndexStore::open_existing(&repo_root)?;
    let hits = store.search_chunks(query, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        for hit in &hits {
            println!(
                "{}:{}-{} {}",
                hit.path.cyan(),
                hit.start_line,
                hit.end_line,
                preview(&hit.content)
            );
        }
        println!("({} hits)", hits.len());
    }
    Ok(())
}

fn cmd_calls(
    root: Option<std::path::PathBuf>,
    symbol: &str,
    from: Option<&str>,
    json: bool,
) -> palace_core::Result<()> {
    let repo_root = detect_repo_root(root)?;
    let store = IndexStore::open_existing(&repo_root)?;
    let sites = match from {
        Some(file) => store.outgoing_calls(symbol, file)?,
        None => store.incoming_calls(symbol)?,
    };
    print_call_sites(&sites, json)
}

fn cmd_graph(
    root: Option<std::path::PathBuf>,
    file: &str,
    json: bool,
) -> palace_core::Result<()> {
    let repo_root = detect_repo_root(root)?;
    let store = IndexStore::open_existing(&repo_root)?;
    let sites = store.call_graph(file)?;
    print_call_sites(&sites, json)
}

fn print_call_sites(sites: &[palace_core::CallSite], json: bool) -> palace_core::Result<()> {
    use colored::Colorize;

    if json {
        println!("{}", serde_json::to_string_pretty(&sites)?);
    } else {
        for site in sites {
            let caller = site.caller.as_deref().unwrap_or("<top level>");
            println!(
                "{}:{} {} -> {} ({})",
                site.source_file.cyan(),
                site.line,
                caller,
                site.callee,
                site.kind
            );
        }
        println!("({} call sites)", sites.len());
    }
    Ok(())
}

fn cmd_status(root: Option<std::path::PathBuf>, json: bool) -> palace_core::Result<()> {
    use colored::Colorize;

    let repo_root = detect_repo_root(root)?;
    let store = IndexStore::open_existing(&repo_root)?;
    let (files, chunks, symbols, relationships, db_size) = store.counts()?;
    let scan = store.latest_scan()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "files": files,
                "chunks": chunks,
                "symbols": symbols,
                "relationships": relationships,
                "db_size_bytes": db_size,
                "last_scan_id": scan.id,
                "last_scan_hash": scan.scan_hash,
                "last_completed_at": scan.completed_at,
            }))?
        );
    } else {
        println!(
            "{}: .palace/index/palace.db ({:.1} MB)",
            "Index".blue(),
            db_size as f64 / 1_000_000.0
        );
        println!("{}: {} indexed", "Files".blue(), files);
        println!(
            "{}: {} chunks, {} symbols, {} relationships",
            "Rows".blue(),
            chunks,
            symbols,
            relationships
        );
        if scan.id > 0 {
            println!(
                "{}: #{} ({})",
                "Last scan".blue(),
                scan.id,
                &scan.scan_hash[..12.min(scan.scan_hash.len())]
            );
        } else {
            println!("{}: none", "Last scan".blue());
        }
    }
    Ok(())
}

fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or("").trim();
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(80).collect::<String>())
    } else {
        line.to_string()
    }
}

fn detect_repo_root(
    override_path: Option<std::path::PathBuf>,
) -> palace_core::Result<std::path::PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    // Walk up from current directory looking for .palace or .git
    let mut current = std::env::current_dir()?;
    loop {
        if current.join(".palace").exists() || current.join(".git").exists() {
            return Ok(current);
        }
        if !current.pop() {
            // No parent, use current directory
            return Ok(std::env::current_dir()?);
        }
    }
}
