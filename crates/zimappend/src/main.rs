use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zimappend_core::backend::{DirectBackend, PageBackend, Presentation};
use zimappend_core::clipboard::read_clipboard;
use zimappend_core::content::{Placement, Spacing};
use zimappend_core::dispatch::{AppendReport, AppendRequest, WriteMode, apply};
use zimappend_core::host::{HostBackend, HostCommand, HostStatus, detect_host};
use zimappend_core::notebook::{NotebookInfo, load_notebook_list, select_notebook};
use zimappend_core::page::{PageTarget, resolve_target};
use zimappend_core::runtime::{
    PathOverrides, ResolutionContext, Runtime, init_config, load_runtime,
};
use zimappend_core::text::{TextSources, assemble};

const AFTER_HELP: &str = "\
EXAMPLES:
    Log a line on today's journal page, prefixed with the time:
        $ zim-append --journal --time --literal 'Deployed v2.3'

    Append a command's output to a page, quoted:
        $ make test 2>&1 | zim-append --page Projects:CI --stdin --quote

    File a scanned receipt on a page and show it:
        $ zim-append --page Finance:Receipts --attach ~/scan.pdf --show

When no host instance is running, page files are edited directly.";

#[derive(Debug, Parser)]
#[command(
    name = "zim-append",
    version,
    about = "Append or create entries in Zim notebook pages from the command line",
    after_help = AFTER_HELP,
    disable_help_flag = true,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file to load")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Host notebook list to read")]
    notebooks_list: Option<PathBuf>,
    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Log more (repeat for debug output)")]
    verbose: u8,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short = '?', long, visible_alias = "usage", action = ArgAction::Help, help = "Print this help text and exit")]
    help: Option<bool>,
    #[command(flatten)]
    append: AppendArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    notebooks_list: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            notebooks_list: cli.notebooks_list.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Write a commented default config file")]
    Init(InitArgs),
    #[command(about = "List the notebooks known to the host")]
    Notebooks,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct AppendArgs {
    #[arg(short = 'p', long, value_name = "NAME", conflicts_with_all = ["journal", "date"], help = "The full page name that the text (and/or files) should be applied to")]
    page: Option<String>,
    #[arg(short = 'j', long, conflicts_with = "date", help = "Use today's journal page as a target")]
    journal: bool,
    #[arg(short = 'k', long, value_name = "DATE", help = "Use a different day's journal page as a target (YYYY-mm-dd)")]
    date: Option<String>,
    #[arg(short = 'N', long, value_name = "NAME", help = "Select the notebook that the page is in")]
    notebook: Option<String>,

    #[arg(short = 'l', long, value_name = "TEXT", num_args = 0..=1, default_missing_value = "", allow_hyphen_values = true, action = ArgAction::Append, help = "Use the given string as text to apply to the page (can be repeated; the text may start with '-', so give a bare -l last)")]
    literal: Vec<String>,
    #[arg(short = 'f', long, value_name = "PATH", action = ArgAction::Append, help = "Use the contents of the given file as text (can be repeated)")]
    file: Vec<PathBuf>,
    #[arg(short = 'C', long, help = "Use the system clipboard as a source of text")]
    clipboard: bool,
    #[arg(short = 'i', long, help = "Read text from standard input")]
    stdin: bool,
    #[arg(short = 'q', long, help = "Wrap the appended text in a block quote")]
    quote: bool,
    #[arg(short = 't', long, help = "Include the current time (today's journal) or the full date and time before the entry")]
    time: bool,

    #[arg(short = '0', long, conflicts_with_all = ["prefix", "header"], help = "Apply the text to the very start of the page (before the title)")]
    early: bool,
    #[arg(short = '1', long, conflicts_with = "header", help = "Apply the text to the beginning of the page (after the title)")]
    prefix: bool,
    #[arg(short = 'h', long, value_name = "NAME", help = "Append under the named heading, creating it if need be")]
    header: Option<String>,
    #[arg(short = 'n', long, help = "Don't add newlines that would keep the text well-spaced from the page content")]
    oldline: bool,

    #[arg(short = 'c', long, conflicts_with = "exists", help = "Only create a new page, do not append to an existing one")]
    create: bool,
    #[arg(short = 'e', long, help = "Only add to a pre-existing page, do not create one")]
    exists: bool,

    #[arg(short = 'a', long, value_name = "PATH", action = ArgAction::Append, help = "Attach this file (or directory) to the page (can be repeated)")]
    attach: Vec<PathBuf>,
    #[arg(short = 'd', long, value_name = "DIR", action = ArgAction::Append, help = "Attach every file in the given directory to the page (can be repeated)")]
    directory: Vec<PathBuf>,

    #[arg(short = 's', long, help = "Navigate the host to the page")]
    show: bool,
    #[arg(short = 'r', long = "raise", help = "Bring the host to the user's attention (implies --show)")]
    raise_window: bool,

    #[arg(long, help = "Never use a running host; edit page files directly")]
    direct: bool,
    #[arg(long, help = "Print the result as JSON")]
    json: bool,
}

impl AppendArgs {
    fn target(&self) -> Option<PageTarget> {
        if let Some(page) = &self.page {
            Some(PageTarget::Explicit(page.clone()))
        } else if self.journal {
            Some(PageTarget::TodaysJournal)
        } else {
            self.date.clone().map(PageTarget::JournalOn)
        }
    }

    fn placement(&self) -> Placement {
        if let Some(header) = &self.header {
            Placement::UnderHeading(header.clone())
        } else if self.early {
            Placement::Early
        } else if self.prefix {
            Placement::Top
        } else {
            Placement::End
        }
    }

    fn spacing(&self) -> Spacing {
        if self.oldline {
            Spacing::Raw
        } else {
            Spacing::WellSpaced
        }
    }

    fn mode(&self) -> WriteMode {
        if self.create {
            WriteMode::CreateOnly
        } else if self.exists {
            WriteMode::ExistingOnly
        } else {
            WriteMode::Any
        }
    }

    fn presentation(&self) -> Option<Presentation> {
        if self.raise_window {
            Some(Presentation::Raise)
        } else if self.show {
            Some(Presentation::Show)
        } else {
            None
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Notebooks) => run_notebooks(&runtime),
        None => run_append(&runtime, cli.append),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run_append(runtime: &RuntimeOptions, args: AppendArgs) -> Result<()> {
    let (context, resolved) = resolve_runtime(runtime)?;
    let config = &resolved.config;
    let now = Local::now();
    let namespace = config.journal_namespace().to_string();

    let target = resolve_target(
        args.target().as_ref(),
        &namespace,
        now.naive_local(),
        config.hours_past_midnight(),
    )?;
    debug!(page = %target.page, todays_journal = target.is_todays_journal, "resolved page");

    let home = resolved.paths.home_dir.as_deref();
    let list = load_notebook_list(&resolved.paths.notebooks_list_path, home)?;
    let notebook = select_notebook(args.notebook.as_deref(), config, &list, &context.cwd, home)?;
    debug!(notebook = %notebook.name, root = %notebook.root.display(), "resolved notebook");

    let sources = TextSources {
        literals: args.literal.clone(),
        files: args.file.clone(),
        clipboard: args.clipboard.then(read_clipboard),
        stdin: if args.stdin {
            Some(read_stdin()?)
        } else {
            None
        },
        quote: args.quote,
        time: args.time,
    };
    let payload = assemble(&sources, now.naive_local(), target.is_todays_journal)?;

    let placement = args.placement();
    let host_status = detect_host(&config.host, args.direct || placement != Placement::End);
    let mut backend: Box<dyn PageBackend> = match &host_status {
        HostStatus::Running { version } => Box::new(HostBackend {
            command: HostCommand::from_config(&config.host, *version),
            notebook: notebook.clone(),
        }),
        HostStatus::Disabled | HostStatus::NotRunning => Box::new(DirectBackend {
            notebook: notebook.clone(),
            journal_namespace: namespace.clone(),
            placement,
            spacing: args.spacing(),
            now: now.fixed_offset(),
            launcher: config
                .host
                .enabled
                .then(|| HostCommand::from_config(&config.host, None)),
        }),
    };

    let request = AppendRequest {
        page: target.page,
        journal_namespace: namespace,
        text: payload.requested.then_some(payload.text),
        mode: args.mode(),
        attach: args.attach.clone(),
        directories: args.directory.clone(),
        presentation: args.presentation(),
    };
    let report = apply(backend.as_mut(), &notebook, &request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&notebook, &host_status, &report);
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", resolved.paths.diagnostics());
    }
    Ok(())
}

fn print_report(notebook: &NotebookInfo, host: &HostStatus, report: &AppendReport) {
    println!("notebook: {}", report.notebook);
    println!("notebook_uri: {}", notebook.uri());
    println!("page: {}", report.page);
    println!("page_file: {}", normalize_path(&report.page_file));
    println!("backend: {}", report.backend.as_str());
    match host {
        HostStatus::Running {
            version: Some(version),
        } => println!("host: running ({version})"),
        other => println!("host: {}", other.as_str()),
    }
    println!("action: {}", report.action.as_str());
    println!("attachments.count: {}", report.attachments.len());
    for outcome in &report.attachments {
        println!(
            "attachments.stored: {} ({:?})",
            normalize_path(&outcome.stored),
            outcome.status
        );
    }
    println!("presented: {}", format_flag(report.presented));
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let (_, resolved) = resolve_runtime(runtime)?;
    let wrote = init_config(&resolved.paths, args.force)?;
    if wrote {
        println!(
            "Wrote config: {}",
            normalize_path(&resolved.paths.config_path)
        );
    } else {
        println!(
            "Config already exists: {} (use --force to overwrite)",
            normalize_path(&resolved.paths.config_path)
        );
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", resolved.paths.diagnostics());
    }
    Ok(())
}

fn run_notebooks(runtime: &RuntimeOptions) -> Result<()> {
    let (_, resolved) = resolve_runtime(runtime)?;
    let list = load_notebook_list(
        &resolved.paths.notebooks_list_path,
        resolved.paths.home_dir.as_deref(),
    )?;

    println!(
        "notebooks_list: {}",
        normalize_path(&resolved.paths.notebooks_list_path)
    );
    println!("notebooks.count: {}", list.notebooks.len());
    if list.notebooks.is_empty() {
        println!("notebooks: <none>");
    }
    for notebook in &list.notebooks {
        println!(
            "notebook: {} ({})",
            notebook.name,
            normalize_path(&notebook.root)
        );
    }
    println!("default: {}", list.default.as_deref().unwrap_or("<none>"));
    if let Some(configured) = resolved.config.default_notebook() {
        println!("configured_default: {configured}");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", resolved.paths.diagnostics());
    }
    Ok(())
}

fn resolve_runtime(runtime: &RuntimeOptions) -> Result<(ResolutionContext, Runtime)> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        config: runtime.config.clone(),
        notebooks_list: runtime.notebooks_list.clone(),
    };
    let resolved = load_runtime(&context, &overrides)?;
    Ok((context, resolved))
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read standard input")?;
    Ok(buffer)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
