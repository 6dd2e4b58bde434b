use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use fd_seek::config::{Config, VolumeConfig};
use fd_seek::core::volume::is_boot_mount;
use fd_seek::core::{Entry, VolumeClass};
use fd_seek::index::{ListFilter, SessionIndex};
use fd_seek::ops::{self, RenameReceipt};
use fd_seek::query::SearchResult;

#[derive(Parser)]
#[command(name = "fd-seek", version, about = "Session-scoped file name search")]
struct Cli {
    /// TOML 配置文件
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 只索引这些卷（可重复；`/` 视为系统卷）
    #[arg(long = "volume", global = true)]
    volumes: Vec<PathBuf>,

    /// JSON 输出
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 按名字搜索
    Search {
        query: String,
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
    /// 列出目录的直接子项
    List {
        dir: PathBuf,
        #[arg(long, conflicts_with = "files")]
        folders: bool,
        #[arg(long)]
        files: bool,
    },
    /// 索引统计（可先预热扫描若干目录）
    Stats {
        #[arg(long, default_value_t = 0)]
        warm: usize,
    },
    /// 交互模式：一个会话内连续搜索与操作
    Shell,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if !cli.volumes.is_empty() {
        cfg.volumes = cli
            .volumes
            .iter()
            .map(|p| {
                let class = if is_boot_mount(p) {
                    VolumeClass::System
                } else {
                    VolumeClass::Data
                };
                VolumeConfig::new(p.clone(), class)
            })
            .collect();
    }
    Ok(cfg.discover())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let mut index = SessionIndex::new(cfg);

    match &cli.command {
        Commands::Search { query, k } => {
            let results = index.search(query, *k)?;
            print_results(&results, cli.json)?;
        }
        Commands::List { dir, folders, files } => {
            let filter = match (folders, files) {
                (true, _) => ListFilter::Folders,
                (_, true) => ListFilter::Files,
                _ => ListFilter::All,
            };
            index.index_dir(dir)?;
            print_entries(&index.entries_in(dir, filter), cli.json)?;
        }
        Commands::Stats { warm } => {
            if *warm > 0 {
                let report = index.scan_steps(*warm);
                info!("Warm-up scanned {} directories", report.directories);
            }
            print_stats(&index, cli.json)?;
        }
        Commands::Shell => shell(&mut index, cli.json)?,
    }
    Ok(())
}

fn print_results(results: &[SearchResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("no matches");
    }
    for r in results {
        println!(
            "{:.2}  {:<9} {:<6} {}",
            r.confidence,
            r.strategy.label(),
            r.entry.kind.label(),
            r.entry.canonical_path.display()
        );
    }
    Ok(())
}

fn print_entries(entries: &[&Entry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    for e in entries {
        println!("{:<6} {}", e.kind.label(), e.base_name);
    }
    println!("{} items", entries.len());
    Ok(())
}

fn print_stats(index: &SessionIndex, json: bool) -> Result<()> {
    let stats = index.stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", stats);
    }
    Ok(())
}

const SHELL_HELP: &str = "\
commands:
  search <query>          search by name
  list <dir> [folders|files]
  touch <dir> <name>      create a file
  mkdir <dir> <name>      create a folder
  mv <path> <new name>    rename in place
  undo                    undo the last rename
  rm <path>               delete a file or folder
  stats
  quit";

/// `<path> <rest...>`：第一个空白前是路径，其余原样作为名字/查询
fn split_path_arg(rest: &str) -> Option<(&Path, &str)> {
    let rest = rest.trim();
    let (path, tail) = rest.split_once(char::is_whitespace)?;
    Some((Path::new(path), tail.trim()))
}

fn shell(index: &mut SessionIndex, json: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut last_rename: Option<RenameReceipt> = None;
    let k = index.config().confident_k;

    loop {
        print!("fd-seek> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let outcome: Result<()> = match cmd {
            "" => Ok(()),
            "quit" | "exit" => break,
            "help" => {
                println!("{}", SHELL_HELP);
                Ok(())
            }
            "search" => index
                .search(rest, k)
                .map_err(Into::into)
                .and_then(|r| print_results(&r, json)),
            "list" => {
                let (dir, filter) = match split_path_arg(rest) {
                    Some((dir, "folders")) => (dir, ListFilter::Folders),
                    Some((dir, "files")) => (dir, ListFilter::Files),
                    _ => (Path::new(rest), ListFilter::All),
                };
                index
                    .index_dir(dir)
                    .map_err(Into::into)
                    .and_then(|_| print_entries(&index.entries_in(dir, filter), json))
            }
            "touch" | "mkdir" => match split_path_arg(rest) {
                Some((dir, name)) => {
                    let created = if cmd == "touch" {
                        ops::create_file(index, dir, name, "")
                    } else {
                        ops::create_folder(index, dir, name)
                    };
                    created.map(|p| println!("created {}", p.display())).map_err(Into::into)
                }
                None => Err(anyhow::anyhow!("usage: {} <dir> <name>", cmd)),
            },
            "mv" => match split_path_arg(rest) {
                Some((path, name)) => ops::rename_item(index, path, name)
                    .map(|receipt| {
                        println!("renamed to {}", receipt.to.display());
                        last_rename = Some(receipt);
                    })
                    .map_err(Into::into),
                None => Err(anyhow::anyhow!("usage: mv <path> <new name>")),
            },
            "undo" => match last_rename.take() {
                Some(receipt) => ops::undo_rename(index, &receipt)
                    .map(|back| println!("restored {}", back.to.display()))
                    .map_err(Into::into),
                None => Err(anyhow::anyhow!("nothing to undo")),
            },
            "rm" => ops::delete_item(index, Path::new(rest))
                .map(|n| println!("deleted ({} index entries dropped)", n))
                .map_err(Into::into),
            "stats" => print_stats(index, json),
            other => Err(anyhow::anyhow!("unknown command {:?}, try `help`", other)),
        };

        if let Err(e) = outcome {
            eprintln!("error: {:#}", e);
        }
    }
    Ok(())
}
