use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use bomify_model::outline::{outline, DrawingOptions};
use bomify_model::{dot, parse, Document};
use bomify_module_query::Engine;
use log::warn;

use crate::printer::{self, PrinterOptions};

#[derive(clap::Subcommand, Debug)]
pub enum DocumentCommand {
    /// Draw the structure of an SPDX document
    Outline(OutlineArgs),
    /// Search for information in an SBOM
    Query(QueryArgs),
    /// Render an SPDX document as a Graphviz digraph
    Todot(TodotArgs),
}

#[derive(clap::Args, Debug)]
#[command(disable_version_flag = true)]
pub struct OutlineArgs {
    /// SPDX file or URL, `-` for stdin
    source: String,

    /// Recursion level, -1 for unlimited
    #[arg(long, short = 'd', default_value_t = -1)]
    depth: i32,

    /// Use SPDX identifiers in tree nodes instead of names
    #[arg(long = "spdx-ids")]
    spdx_ids: bool,

    /// Show versions along with package names
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    version: bool,

    /// Show package urls instead of name@version
    #[arg(long)]
    purl: bool,

    /// Find a node in the graph and draw only branches leading to it
    #[arg(long, short = 'f')]
    find: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// SPDX file or URL, `-` for stdin
    source: String,

    /// Filter expression, e.g. "depth:1 name:log4j"
    expression: Vec<String>,

    /// Output package urls instead of name@version
    #[arg(long)]
    purl: bool,

    /// Output format: text, csv or json
    #[arg(long, default_value = "text")]
    format: String,

    /// Fields to include in the output, comma separated:
    /// name,version,license,supplier,originator,url
    #[arg(long, value_delimiter = ',', default_value = "name")]
    fields: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct TodotArgs {
    /// SPDX file or URL, `-` for stdin
    source: String,

    /// Recursion level, -1 for unlimited
    #[arg(long, short = 'd', default_value_t = -1)]
    depth: i32,

    /// Start the graph at the first element matching this name
    #[arg(long, short = 'f')]
    find: Option<String>,

    /// Render only the subgraph of the found element
    #[arg(long)]
    subgraph: bool,
}

pub async fn run(cmd: DocumentCommand) -> anyhow::Result<ExitCode> {
    match cmd {
        DocumentCommand::Outline(args) => run_outline(args).await,
        DocumentCommand::Query(args) => run_query(args).await,
        DocumentCommand::Todot(args) => run_todot(args).await,
    }
}

/// Open a document from a local path, stdin (`-`) or an http(s) URL.
async fn open_document(source: &str) -> anyhow::Result<Document> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let data = reqwest::get(source)
            .await
            .and_then(|r| r.error_for_status())
            .context("fetching document")?
            .text()
            .await
            .context("fetching document body")?;
        return parse::from_str(&data).context("opening doc");
    }
    parse::open(source).context("opening doc")
}

async fn run_outline(args: OutlineArgs) -> anyhow::Result<ExitCode> {
    let mut doc = open_document(&args.source).await?;

    if let Some(find) = &args.find {
        if !doc.filter_reverse_dependencies(find, args.depth) {
            warn!("no element matching {find} found in the document");
        }
    }

    let opts = DrawingOptions {
        depth: args.depth,
        only_ids: args.spdx_ids,
        version: args.version,
        purls: args.purl,
    };
    let output = outline(&doc, &opts).context("generating document outline")?;
    println!("{output}");
    Ok(ExitCode::SUCCESS)
}

async fn run_query(args: QueryArgs) -> anyhow::Result<ExitCode> {
    if args.expression.is_empty() {
        anyhow::bail!("a query expression is required");
    }

    let doc = open_document(&args.source).await?;
    let engine = Engine::with_document(doc);
    let results = engine
        .query(&args.expression.join(" "))
        .context("querying document")?;

    if let Some(err) = results.error {
        return Err(anyhow::Error::from(err).context("filter query returned an error"));
    }
    if results.objects.is_empty() {
        warn!("no objects in the SBOM match the query");
    }

    let opts = PrinterOptions {
        purl: args.purl,
        fields: args.fields.clone(),
    };
    let stdout = std::io::stdout();
    let mut out: Box<dyn Write> = Box::new(stdout.lock());
    match args.format.as_str() {
        "text" => printer::print_lines(&results.objects, &opts, &mut out)?,
        "csv" => printer::print_csv(&results.objects, &opts, &mut out)?,
        "json" => printer::print_json(&results.objects, &opts, &mut out)?,
        other => anyhow::bail!("unrecognized output format, must be text, csv or json: {other}"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_todot(args: TodotArgs) -> anyhow::Result<ExitCode> {
    let mut doc = open_document(&args.source).await?;

    let output = match &args.find {
        Some(find) if args.subgraph => {
            let start = doc
                .elements()
                .find(|e| e.name.contains(find.as_str()))
                .map(|e| e.id().to_string())
                .with_context(|| format!("no element matching {find} found"))?;
            dot::dot_subgraph(&doc, &start, args.depth)
        }
        Some(find) => {
            doc.filter_reverse_dependencies(find, args.depth);
            dot::dot(&doc, args.depth)
        }
        None => dot::dot(&doc, args.depth),
    };
    println!("{output}");
    Ok(ExitCode::SUCCESS)
}
