use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qsuggest::config::Settings;
use qsuggest::dump::{write_clustering, write_hierarchy};
use qsuggest::log::{read_click_log, read_query_log};
use qsuggest::persist::{load_search_indexes, save_search_index, IndexPaths};
use qsuggest::search::strip_stop_substring;
use qsuggest::tokenizer::TokenizerKind;
use qsuggest::{
    Condition, Field, HierarchicalGrouper, IncrementalClusterer, ScoreKind, SearchConfig, SearchIndexBuilder,
    SearchRanker,
};
use rayon::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Cluster query logs and build query-suggestion indexes", long_about = None)]
struct Cli {
    /// Settings file (TOML); QSUGGEST_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one search index per tokenizer from `query<TAB>freq` logs
    Build {
        /// Input path (file or directory of .txt/.tsv logs)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Skip queries seen fewer times than this
        #[arg(long)]
        min_freq: Option<u64>,
        /// Tokenizers to build for (word, word-stem, bigram, <n>gram)
        #[arg(long, value_delimiter = ',')]
        tokenizer: Vec<TokenizerKind>,
    },
    /// Cluster a click log by clicks, then group each cluster by tokens
    Cluster {
        /// Click log: query<TAB>freq|pid<TAB>pos<TAB>freq...
        #[arg(long)]
        input: PathBuf,
        /// Prefix for dump files (defaults to the input path)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Click-pass bounds, comma separated
        #[arg(long, value_delimiter = ',')]
        diameters: Vec<f64>,
        /// Token-pass bounds, comma separated
        #[arg(long, value_delimiter = ',')]
        group_diameters: Vec<f64>,
        /// Only write the click clusters
        #[arg(long, default_value_t = false)]
        no_groups: bool,
    },
    /// Run every configured ranker over a file of queries, writing FILE.search
    Search {
        /// Index directory written by `build`
        #[arg(long)]
        index: String,
        /// One query per line
        #[arg(long)]
        queries: PathBuf,
        /// Restrict to these rankers
        #[arg(long, value_delimiter = ',')]
        ranker: Vec<String>,
        /// Add an ad-hoc ranker with this condition (segmented, ngram, subset)
        #[arg(long)]
        condition: Option<Condition>,
        /// Score factors of the ad-hoc ranker (tf, bm25, token_jaccard, char_jaccard, subset)
        #[arg(long, value_delimiter = ',', requires = "condition")]
        scores: Vec<ScoreKind>,
        /// Tokenizer of the ad-hoc ranker (default: word)
        #[arg(long, requires = "condition")]
        tokenizer: Option<TokenizerKind>,
    },
    /// Write the effective settings as TOML
    InitConfig {
        #[arg(long, default_value = "qsuggest.toml")]
        output: PathBuf,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { input, output, min_freq, tokenizer } => {
            build_indexes(&settings, &input, &output, min_freq, tokenizer)
        }
        Commands::Cluster { input, output, diameters, group_diameters, no_groups } => {
            let output = output.unwrap_or_else(|| input.clone());
            let diameters = if diameters.is_empty() { settings.cluster.diameters.clone() } else { diameters };
            let group_diameters = if no_groups {
                Vec::new()
            } else if group_diameters.is_empty() {
                settings.cluster.group_diameters.clone()
            } else {
                group_diameters
            };
            cluster_log(&settings, &input, &output, &diameters, &group_diameters)
        }
        Commands::Search { index, queries, ranker, condition, scores, tokenizer } => {
            let mut configs = select_rankers(&settings, &ranker)?;
            if let Some(condition) = condition {
                let tokenizer = tokenizer.unwrap_or(TokenizerKind::Word);
                configs.push(SearchConfig { name: "custom".into(), tokenizer, condition, scores });
            }
            search_file(&settings, &index, &queries, &configs)
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                bail!("{} already exists, pass --force to overwrite", output.display());
            }
            settings.save(&output)?;
            tracing::info!(path = %output.display(), "settings written");
            Ok(())
        }
    }
}

fn collect_inputs(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "txt" | "tsv" | "log") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn build_indexes(
    settings: &Settings,
    input: &str,
    output: &str,
    min_freq: Option<u64>,
    tokenizers: Vec<TokenizerKind>,
) -> Result<()> {
    let files = collect_inputs(Path::new(input));
    if files.is_empty() {
        bail!("no query logs found under {input}");
    }
    let mut rows = Vec::new();
    for file in &files {
        let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
        rows.extend(read_query_log(BufReader::new(f)).with_context(|| format!("reading {}", file.display()))?);
    }
    tracing::info!(files = files.len(), queries = rows.len(), "read query logs");

    let min_freq = min_freq.unwrap_or(settings.index.min_freq);
    let kinds = if tokenizers.is_empty() { settings.index.tokenizers.clone() } else { tokenizers };
    let paths = IndexPaths::new(output);
    for kind in kinds {
        let mut builder =
            SearchIndexBuilder::with_stop_tokens(kind, settings.index.stop_tokens.clone())?.min_freq(min_freq);
        for (query, freq) in &rows {
            builder.add(query, *freq);
        }
        save_search_index(&paths, &builder.build(), min_freq)?;
    }
    tracing::info!(output, "index build complete");
    Ok(())
}

fn dump_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn cluster_log(
    settings: &Settings,
    input: &Path,
    output: &Path,
    diameters: &[f64],
    group_diameters: &[f64],
) -> Result<()> {
    let tokenizer = TokenizerKind::Word.build_with_stop_tokens(settings.index.stop_tokens.iter().cloned())?;
    let f = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let corpus = read_click_log(BufReader::new(f), &settings.log, tokenizer.as_ref())?;

    // Sweeps share only the read-only corpus.
    diameters.par_iter().try_for_each(|&max_c| -> Result<()> {
        let mut clusterer = IncrementalClusterer::new(&corpus, Field::Clicks, max_c)?;
        clusterer.extend(corpus.ids())?;
        let clustering = clusterer.finish();

        let out = dump_path(output, &format!("_cluster_Dmax{max_c}"));
        let mut w = BufWriter::new(File::create(&out).with_context(|| format!("creating {}", out.display()))?);
        let clusters = write_clustering(&mut w, &corpus, &clustering)?;
        w.flush()?;
        tracing::info!(max_c, clusters, path = %out.display(), "click clusters written");

        for &max_g in group_diameters {
            let grouper = HierarchicalGrouper::new(max_c, max_g)?;
            let hierarchy = grouper.regroup(&corpus, &clustering)?;
            let out2 = dump_path(&out, &format!("_group_Dmax{max_g}"));
            let mut w =
                BufWriter::new(File::create(&out2).with_context(|| format!("creating {}", out2.display()))?);
            let groups = write_hierarchy(&mut w, &corpus, &hierarchy)?;
            w.flush()?;
            tracing::info!(max_c, max_g, groups, path = %out2.display(), "token groups written");
        }
        Ok(())
    })
}

/// Configured rankers, all of them or only the named ones.
fn select_rankers(settings: &Settings, only: &[String]) -> Result<Vec<SearchConfig>> {
    if only.is_empty() {
        return Ok(settings.search.rankers.clone());
    }
    let configs = only
        .iter()
        .map(|name| settings.search.ranker(name).cloned())
        .collect::<qsuggest::Result<Vec<_>>>()?;
    Ok(configs)
}

/// `printf("%g")`: six significant digits, trailing zeros dropped.
fn format_score(score: f64) -> String {
    if score == 0.0 || !score.is_finite() {
        return score.to_string();
    }
    let exp = score.abs().log10().floor() as i32;
    if !(-4..6).contains(&exp) {
        let s = format!("{score:.5e}");
        return match s.split_once('e') {
            Some((mantissa, e)) => format!("{}e{e}", trim_zeros(mantissa)),
            None => s,
        };
    }
    let decimals = (5 - exp).max(0) as usize;
    trim_zeros(&format!("{score:.decimals$}")).to_string()
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn search_file(settings: &Settings, index: &str, queries: &Path, configs: &[SearchConfig]) -> Result<()> {
    let paths = IndexPaths::new(index);
    let indexes = load_search_indexes(&paths, configs.iter().map(|c| c.tokenizer))?;
    let rankers = SearchRanker::from_configs(configs, &indexes, &settings.search.eligibility())?;

    let reader = BufReader::new(File::open(queries).with_context(|| format!("opening {}", queries.display()))?);
    let out = dump_path(queries, ".search");
    let mut w = BufWriter::new(File::create(&out).with_context(|| format!("creating {}", out.display()))?);
    let mut count = 0usize;
    for line in reader.lines() {
        let line = line?;
        let q = line.trim();
        writeln!(w, "[{q}]")?;
        if let Some(stripped) = strip_stop_substring(q, &settings.search.strip_substrings) {
            writeln!(w, "{stripped}")?;
        }
        for ranker in &rankers {
            writeln!(w, "{}", "-".repeat(14))?;
            if let Some(hit) = ranker.search(q) {
                writeln!(w, "{:<14}{}", format_score(hit.score), hit.text)?;
            }
        }
        writeln!(w, "\n")?;
        count += 1;
    }
    w.flush()?;
    tracing::info!(queries = count, path = %out.display(), "search report written");
    Ok(())
}
