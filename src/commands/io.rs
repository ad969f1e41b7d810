//! Import, export, template and validate command handlers.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use dataport::io::Format;
use dataport::models::{ExchangeContext, Paging, RowError};
use dataport::transfer::{
    ExportRequest, ExportResponse, ImportChunk, ImportRequest, PayloadSource, StreamedExport,
    TemplateRequest,
};
use dataport::{Error, Result};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::Workspace;

/// Row errors printed before the list is cut short.
const MAX_PRINTED_ERRORS: usize = 20;

/// Arguments shared by `import` and `validate`.
#[derive(Args)]
pub struct ImportArgs {
    /// Payload file.
    pub file: Option<PathBuf>,

    /// Remote URL to download the payload from instead of a file.
    #[arg(long)]
    pub source: Option<String>,

    /// Exchange profile.
    #[arg(short, long, default_value = "customers")]
    pub profile: String,

    /// Payload format: json, csv, excel or xml (default: from file extension).
    #[arg(short, long)]
    pub format: Option<String>,

    /// Tenant scope for the batch.
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Send the payload through the chunked streaming path.
    #[arg(long)]
    pub stream: bool,
}

/// Arguments for `export`.
#[derive(Args)]
pub struct ExportArgs {
    /// Exchange profile.
    #[arg(short, long, default_value = "customers")]
    pub profile: String,

    /// Payload format (default: from output extension).
    #[arg(short, long)]
    pub format: Option<String>,

    /// Output file (default: stdout).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Upload the payload to this URL instead of writing it locally.
    #[arg(long)]
    pub destination: Option<String>,

    /// Tenant scope.
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Free-text search over searchable fields.
    #[arg(short, long)]
    pub search: Option<String>,

    /// Status filter.
    #[arg(long)]
    pub status: Option<String>,

    /// Sort field; prefix with `-` for descending.
    #[arg(long)]
    pub order_by: Option<String>,

    /// Culture for localized values.
    #[arg(long)]
    pub language: Option<String>,

    /// 1-based page number (requires --page-size).
    #[arg(long, requires = "page_size")]
    pub page: Option<usize>,

    /// Page size.
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Extra `field=value` filters.
    #[arg(long = "param", value_name = "FIELD=VALUE")]
    pub params: Vec<String>,

    /// Receive the payload through the chunked streaming path.
    #[arg(long)]
    pub stream: bool,
}

/// Arguments for `template`.
#[derive(Args)]
pub struct TemplateArgs {
    /// Exchange profile.
    #[arg(short, long, default_value = "customers")]
    pub profile: String,

    /// Payload format.
    #[arg(short, long, default_value = "csv")]
    pub format: String,

    /// Include one blank example record.
    #[arg(long)]
    pub example: bool,

    /// Output file (default: `<profile>_template.<ext>`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Executes the import command.
pub async fn cmd_import(workspace: &Workspace, args: ImportArgs) -> Result<()> {
    let format = resolve_format(args.format.as_deref(), args.file.as_deref())?;

    let outcome = if args.stream {
        let mut first = ImportChunk::open(&args.profile, &format);
        if let Some(tenant) = &args.tenant {
            first = first.with_tenant(tenant);
        }
        let chunks = match (&args.file, &args.source) {
            (_, Some(url)) => stream::iter([Ok(first), Ok(ImportChunk::url(url))]).boxed(),
            (Some(file), None) => stream::iter([Ok(first)])
                .chain(file_chunks(file, workspace.chunk_size).await?)
                .boxed(),
            (None, None) => return Err(no_payload()),
        };
        workspace.gateway.import_stream(chunks).await?
    } else {
        let mut request = ImportRequest::new(&args.profile, &format, payload_source(&args).await?);
        request.tenant = args.tenant.clone();
        workspace.gateway.import(request).await?
    };

    workspace.save()?;

    println!("{}", outcome.summary());
    print_row_errors(&outcome.errors);
    Ok(())
}

/// Executes the validate command.
pub async fn cmd_validate(workspace: &Workspace, args: ImportArgs) -> Result<()> {
    let format = resolve_format(args.format.as_deref(), args.file.as_deref())?;
    let request = ImportRequest::new(&args.profile, &format, payload_source(&args).await?);
    let report = workspace.gateway.validate(request).await?;

    println!("Rows: {}, valid: {}", report.total, report.valid);
    print_row_errors(&report.errors);
    if report.is_valid() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} of {} rows are invalid",
            report.total - report.valid,
            report.total
        )))
    }
}

/// Executes the export command.
pub async fn cmd_export(workspace: &Workspace, args: ExportArgs) -> Result<()> {
    let format = resolve_format(args.format.as_deref(), args.output.as_deref())?;
    let mut request = ExportRequest::new(&args.profile, &format).with_context(export_context(&args)?);
    if let Some(url) = &args.destination {
        request = request.with_destination(url);
    }

    if args.stream {
        match workspace.gateway.export_stream(request).await? {
            StreamedExport::Chunks(mut chunks) => {
                let mut written = 0usize;
                let mut count = 0usize;
                let mut output = open_output(args.output.as_deref()).await?;
                while let Some(chunk) = chunks.try_next().await? {
                    written += chunk.len();
                    count += 1;
                    output
                        .write_all(&chunk)
                        .await
                        .map_err(|e| Error::operation("write_output", e))?;
                }
                output
                    .flush()
                    .await
                    .map_err(|e| Error::operation("write_output", e))?;
                eprintln!("Received {written} bytes in {count} chunks");
            },
            StreamedExport::Uploaded { bytes } => println!("Uploaded {bytes} bytes"),
        }
        return Ok(());
    }

    match workspace.gateway.export(request).await? {
        ExportResponse::Inline(payload) => {
            write_output(args.output.as_deref(), &payload.content).await?;
            if let Some(path) = &args.output {
                println!("Exported {} bytes to {}", payload.content.len(), path.display());
            }
        },
        ExportResponse::Uploaded { bytes } => println!("Uploaded {bytes} bytes"),
    }
    Ok(())
}

/// Executes the template command.
pub fn cmd_template(workspace: &Workspace, args: TemplateArgs) -> Result<()> {
    let mut request = TemplateRequest::new(&args.profile, &args.format);
    if args.example {
        request = request.with_example();
    }
    let payload = workspace.gateway.template(&request)?;

    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(&payload.filename));
    std::fs::write(&path, &payload.content)
        .map_err(|e| Error::operation("write_template", format!("{}: {e}", path.display())))?;
    println!("Wrote {} ({})", path.display(), payload.content_type);
    Ok(())
}

/// Executes the profiles command.
pub fn cmd_profiles(workspace: &Workspace) {
    let registry = workspace.gateway.registry();
    for name in registry.names() {
        let Ok(registered) = registry.lookup(name) else {
            continue;
        };
        let profile = &registered.profile;
        println!("{} (key: {})", profile.name(), profile.key().label());
        for field in profile.fields() {
            let marker = if field.required { "*" } else { " " };
            println!("  {marker} {:<28} {}", field.name, field.kind.as_str());
        }
        for collection in profile.collections() {
            println!("  [{}]", collection.name);
            for field in &collection.fields {
                let marker = if field.required { "*" } else { " " };
                println!("    {marker} {:<26} {}", field.name, field.kind.as_str());
            }
        }
    }
}

fn resolve_format(explicit: Option<&str>, path: Option<&Path>) -> Result<String> {
    match (explicit, path) {
        (Some(format), _) => Ok(format.to_string()),
        (None, Some(path)) => Format::from_path(path).map(|f| f.as_str().to_string()),
        (None, None) => Err(Error::InvalidInput(
            "--format is required when no file name is given".to_string(),
        )),
    }
}

fn no_payload() -> Error {
    Error::InvalidInput("give a payload file or --source URL".to_string())
}

async fn payload_source(args: &ImportArgs) -> Result<PayloadSource> {
    match (&args.file, &args.source) {
        (Some(_), Some(_)) => Err(Error::InvalidInput(
            "give either a payload file or --source, not both".to_string(),
        )),
        (Some(file), None) => tokio::fs::read(file)
            .await
            .map(PayloadSource::Inline)
            .map_err(|e| Error::operation("read_input", format!("{}: {e}", file.display()))),
        (None, Some(url)) => Ok(PayloadSource::Url(url.clone())),
        (None, None) => Err(no_payload()),
    }
}

async fn file_chunks(
    path: &Path,
    chunk_size: usize,
) -> Result<BoxStream<'static, Result<ImportChunk>>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::operation("read_input", format!("{}: {e}", path.display())))?;
    Ok(stream::try_unfold(file, move |file| read_chunk(file, chunk_size)).boxed())
}

async fn read_chunk(
    mut file: tokio::fs::File,
    chunk_size: usize,
) -> Result<Option<(ImportChunk, tokio::fs::File)>> {
    let mut buf = vec![0; chunk_size.max(1)];
    let read = file
        .read(&mut buf)
        .await
        .map_err(|e| Error::operation("read_input", e))?;
    if read == 0 {
        return Ok(None);
    }
    buf.truncate(read);
    Ok(Some((ImportChunk::bytes(buf), file)))
}

fn export_context(args: &ExportArgs) -> Result<ExchangeContext> {
    let mut context = ExchangeContext::new();
    context.tenant = args.tenant.clone();
    context.search = args.search.clone();
    context.status = args.status.clone();
    context.order_by = args.order_by.clone();
    context.language = args.language.clone();
    if let Some(size) = args.page_size {
        context = context.with_paging(Paging::page(args.page.unwrap_or(1), size));
    }
    for param in &args.params {
        let (key, value) = param.split_once('=').ok_or_else(|| {
            Error::InvalidInput(format!("--param expects FIELD=VALUE, got '{param}'"))
        })?;
        context = context.with_parameter(key.trim(), value.trim());
    }
    Ok(context)
}

async fn open_output(path: Option<&Path>) -> Result<Box<dyn tokio::io::AsyncWrite + Unpin + Send>> {
    match path {
        Some(path) => tokio::fs::File::create(path)
            .await
            .map(|f| Box::new(f) as Box<dyn tokio::io::AsyncWrite + Unpin + Send>)
            .map_err(|e| Error::operation("write_output", format!("{}: {e}", path.display()))),
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

async fn write_output(path: Option<&Path>, content: &[u8]) -> Result<()> {
    match path {
        Some(path) => tokio::fs::write(path, content)
            .await
            .map_err(|e| Error::operation("write_output", format!("{}: {e}", path.display()))),
        None => std::io::stdout()
            .write_all(content)
            .map_err(|e| Error::operation("write_output", e)),
    }
}

fn print_row_errors(errors: &[RowError]) {
    if errors.is_empty() {
        return;
    }
    println!();
    println!("Row errors ({}):", errors.len());
    for error in errors.iter().take(MAX_PRINTED_ERRORS) {
        println!("  - {error}");
    }
    if errors.len() > MAX_PRINTED_ERRORS {
        println!("  ... and {} more", errors.len() - MAX_PRINTED_ERRORS);
    }
}
