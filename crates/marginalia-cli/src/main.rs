use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use marginalia_common::config::FileStore;
use marginalia_common::telemetry::{self, TelemetryConfig};
use marginalia_editor_core::{
    DecorationEngine, DecorationKind, EditorContext, EditorRope, EngineConfig, HostEvent,
    NodeKind, Resolution, Selection, SyntaxTree, TableModel, TextBuffer, TitleMap, wikilink,
};
use miette::{IntoDiagnostic, Result, WrapErr};

mod vault;

use vault::Vault;

#[derive(Parser)]
#[command(version, about = "Marginalia - live-preview decorations for markdown notes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a config file (.toml or .json)
    #[arg(long, global = true, env = "MARGINALIA_CONFIG")]
    config: Option<PathBuf>,

    /// More logging; repeat for trace output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the decorations the editor would apply to a note
    Decorate {
        /// Markdown file
        file: PathBuf,

        /// Editing mode: source, live-preview or reading
        #[arg(long)]
        mode: Option<String>,

        /// Caret offsets (in chars); each reveals its line in live preview
        #[arg(long = "cursor")]
        cursors: Vec<usize>,

        /// Notes directory used to resolve wikilinks
        #[arg(long)]
        vault: Option<PathBuf>,
    },
    /// Print every table in a note, normalized
    Tables {
        /// Markdown file
        file: PathBuf,
    },
    /// List the wikilinks in a note and what they resolve to
    Links {
        /// Markdown file
        file: PathBuf,

        /// Notes directory used to resolve wikilinks
        #[arg(long)]
        vault: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();

    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => None,
        1 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    };
    let mut telemetry_config = TelemetryConfig::from_env("marginalia-cli");
    if let Some(level) = level {
        telemetry_config = telemetry_config.with_level(level);
    }
    telemetry::init(telemetry_config);

    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Decorate {
            file,
            mode,
            cursors,
            vault,
        } => {
            let vault = match vault {
                Some(root) => Vault::open(root).await?,
                None => Vault::default(),
            };
            decorate(&file, config, mode.as_deref(), &cursors, &vault).await?;
        }
        Commands::Tables { file } => tables(&file).await?,
        Commands::Links { file, vault } => {
            let vault = Vault::open(vault).await?;
            links(&file, &config, &vault).await?;
        }
    }

    Ok(())
}

async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(EngineConfig::default()),
        },
    };
    let store = FileStore::new(path);
    Ok(store.load_or_default().await?)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("marginalia").join("config.toml"))
}

async fn read_note(file: &Path) -> Result<(EditorRope, SyntaxTree)> {
    let text = tokio::fs::read_to_string(file)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("could not read {}", file.display()))?;
    let doc = EditorRope::from_str(&text);
    let tree = SyntaxTree::parse(&doc);
    Ok((doc, tree))
}

async fn decorate(
    file: &Path,
    config: EngineConfig,
    mode: Option<&str>,
    cursors: &[usize],
    vault: &Vault,
) -> Result<()> {
    let (doc, tree) = read_note(file).await?;
    let mut engine = DecorationEngine::with_context(EditorContext::new(config));
    let mut events: Vec<HostEvent> = Vec::new();
    if let Some(mode) = mode {
        engine.set_mode_str(mode, &mut events)?;
    }
    let selections: Vec<_> = cursors.iter().map(|&c| Selection::collapsed(c)).collect();
    engine.on_selection_or_doc_change(&selections, &doc);

    let refresh = engine.refresh(&doc, &tree, &[], vault.titles(), &());
    if refresh.stats.overlapping + refresh.stats.clamped > 0 {
        tracing::info!(?refresh.stats, "decorations adjusted");
    }

    println!("mode: {}", engine.mode().as_str());
    for d in engine.decorations() {
        let text = doc.slice(d.range()).unwrap_or_default();
        let what = match &d.kind {
            DecorationKind::Mark(style) => format!("mark   {}", style.class()),
            DecorationKind::Hide => "hide".to_string(),
            DecorationKind::Replace(spec) => {
                let block = if spec.is_block() { "block" } else { "inline" };
                format!("widget {} ({block})", spec.kind().as_str())
            }
        };
        println!("{:>6}..{:<6} {what:<40} {:?}", d.from, d.to, text);
    }
    if !refresh.widgets.tasks.is_empty() {
        println!(
            "{} diagram(s) awaiting a renderer",
            refresh.widgets.tasks.len()
        );
    }
    Ok(())
}

async fn tables(file: &Path) -> Result<()> {
    let (doc, tree) = read_note(file).await?;
    let mut found = 0;
    for id in tree.walk(0..doc.len_chars()) {
        if !matches!(tree.kind(id), NodeKind::Table { .. }) {
            continue;
        }
        found += 1;
        let range = tree.range(id);
        let line = doc.line_number(range.start);
        let raw = doc.slice(range).unwrap_or_default();
        match TableModel::parse(&raw) {
            Ok(model) => println!("line {line}:\n{}\n", model.serialize()),
            Err(err) => {
                let report = miette::Report::new(err);
                println!("line {line}: left as text: {report}\n");
            }
        }
    }
    if found == 0 {
        println!("no tables in {}", file.display());
    }
    Ok(())
}

async fn links(file: &Path, config: &EngineConfig, vault: &Vault) -> Result<()> {
    let (doc, tree) = read_note(file).await?;
    let index: &TitleMap = vault.titles();
    let links = wikilink::scan(&doc, &tree, 0..doc.len_chars());
    if links.is_empty() {
        println!("no wikilinks in {}", file.display());
        return Ok(());
    }
    for link in &links {
        let line = doc.line_number(link.range.start);
        match wikilink::resolve(&link.title, index) {
            Resolution::Resolved(id) => {
                println!("line {line}: [[{}]] -> {id}", link.title);
                if let Some(card) = wikilink::preview(link, index, vault, config.preview_chars) {
                    let first = card.excerpt.lines().find(|l| !l.trim().is_empty());
                    if let Some(first) = first {
                        println!("    {first}");
                    }
                }
            }
            Resolution::Unresolved => {
                println!("line {line}: [[{}]] unresolved", link.title);
            }
        }
    }
    Ok(())
}

fn init_miette() {
    let hook = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    if hook.is_err() {
        tracing::warn!("miette hook already installed");
    }
    miette::set_panic_hook();
}
