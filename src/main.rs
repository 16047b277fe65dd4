//! rspagemod 命令行：加载 PageMod 定义，对给定 URL 模拟文档加载并报告注入结果

use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rspagemod::{
    ConfigManager, DocumentId, InjectionTiming, MemoryHost, PageModDefinition, PageModManager,
    RecordingSandbox,
};

#[derive(Parser)]
#[command(name = "rspagemod")]
#[command(about = "Match URLs against page-mod rules and report which content scripts attach")]
#[command(version)]
struct Cli {
    /// JSON file holding an array of page-mod definitions
    #[arg(short, long)]
    mods: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// URLs to load, each as a new document
    #[arg(required = true)]
    urls: Vec<String>,
}

/// 单次注入
#[derive(Debug, Clone, Serialize)]
struct AttachRecord {
    name: String,
    mod_id: u64,
    timing: InjectionTiming,
    sandbox: u64,
    #[serde(skip)]
    document: DocumentId,
}

/// 单个 URL 的报告
#[derive(Debug, Serialize)]
struct UrlReport {
    url: String,
    attached: Vec<AttachRecord>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("rspagemod=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let raw = std::fs::read_to_string(&cli.mods)
        .with_context(|| format!("failed to read {}", cli.mods.display()))?;
    let definitions = PageModDefinition::list_from_json(&raw)
        .with_context(|| format!("failed to parse page-mod definitions in {}", cli.mods.display()))?;

    let host = Rc::new(MemoryHost::new());
    let sandbox = Rc::new(RecordingSandbox::new());
    let manager = PageModManager::new(host.clone(), sandbox.clone(), ConfigManager::get_default());

    let records: Rc<RefCell<Vec<AttachRecord>>> = Rc::new(RefCell::new(Vec::new()));
    for (idx, definition) in definitions.into_iter().enumerate() {
        let name = definition
            .name
            .clone()
            .unwrap_or_else(|| format!("mod-{}", idx + 1));
        let options = definition
            .into_options()
            .with_context(|| format!("invalid definition '{name}'"))?;
        let page_mod = manager
            .create_mod(options)
            .with_context(|| format!("failed to create page mod '{name}'"))?;

        let sink = Rc::clone(&records);
        let timing = page_mod.timing();
        page_mod.on_attach(move |event| {
            sink.borrow_mut().push(AttachRecord {
                name: name.clone(),
                mod_id: event.mod_id.0,
                timing,
                sandbox: event.handle.id(),
                document: event.document.id(),
            });
        });
        manager.register_mod(&page_mod)?;
    }

    let mut reports = Vec::with_capacity(cli.urls.len());
    for url in &cli.urls {
        let document = host
            .open_document_strict(url)
            .with_context(|| format!("invalid URL '{url}'"))?;
        host.load_document(&document);
        // 命令行不会再触发脚本错误，释放本文档的错误回调
        sandbox.release_document(document.id());

        let attached = records
            .borrow()
            .iter()
            .filter(|record| record.document == document.id())
            .cloned()
            .collect();
        reports.push(UrlReport {
            url: document.href().to_string(),
            attached,
        });
    }
    manager.shutdown();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_text(&reports);
    }
    Ok(())
}

fn print_text(reports: &[UrlReport]) {
    for report in reports {
        println!("{}", report.url);
        if report.attached.is_empty() {
            println!("  (no page mod attached)");
            continue;
        }
        for record in &report.attached {
            println!(
                "  {} [mod#{}] at {} -> sandbox#{}",
                record.name, record.mod_id, record.timing, record.sandbox
            );
        }
    }
}
