//! Transfer gateway.
//!
//! Every call stages its payload in a [`TransferSession`] and runs the import
//! or export pipeline over the staged file. The session is dropped, and its
//! file deleted, on every exit path.

use super::remote::RemoteTransfer;
use super::session::{ChunkStream, TransferSession};
use crate::config::TransferSettings;
use crate::io::services::template::{self, TemplatePayload};
use crate::io::{
    ExportService, Format, ImportService, RowSource, create_record_sink, create_row_source,
};
use crate::models::{ExchangeContext, ImportOutcome, ValidationReport};
use crate::schema::{ProfileRegistry, ResolvedProfile};
use crate::{Error, Result};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{Span, debug, info, instrument};
use uuid::Uuid;

/// Where an import payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// Bytes carried in the request.
    Inline(Vec<u8>),
    /// Remote URL to download.
    Url(String),
}

/// A unary import or validate call.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Profile name.
    pub profile: String,
    /// Format identifier (`json`, `csv`, `excel`, `xml`).
    pub format: String,
    /// Payload.
    pub source: PayloadSource,
    /// Tenant scope for the batch.
    pub tenant: Option<String>,
}

impl ImportRequest {
    /// Creates an unscoped import request.
    #[must_use]
    pub fn new(profile: impl Into<String>, format: impl Into<String>, source: PayloadSource) -> Self {
        Self {
            profile: profile.into(),
            format: format.into(),
            source,
            tenant: None,
        }
    }

    /// Scopes the batch to a tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// A unary or streaming export call.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Profile name.
    pub profile: String,
    /// Format identifier.
    pub format: String,
    /// Filters, ordering and paging.
    pub context: ExchangeContext,
    /// Upload destination. Without one the payload is returned to the caller.
    pub destination_url: Option<String>,
}

impl ExportRequest {
    /// Creates an export of every record of a profile.
    #[must_use]
    pub fn new(profile: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            format: format.into(),
            context: ExchangeContext::new(),
            destination_url: None,
        }
    }

    /// Sets filters, ordering and paging.
    #[must_use]
    pub fn with_context(mut self, context: ExchangeContext) -> Self {
        self.context = context;
        self
    }

    /// Uploads the payload instead of returning it.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination_url = Some(url.into());
        self
    }
}

/// An export payload returned inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPayload {
    /// Encoded records.
    pub content: Vec<u8>,
    /// MIME type of the content.
    pub content_type: &'static str,
    /// Suggested file name, `<profile>.<ext>`.
    pub filename: String,
}

/// Result of a unary export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportResponse {
    /// The payload itself.
    Inline(ExportPayload),
    /// The payload went to the destination URL.
    Uploaded {
        /// Bytes uploaded.
        bytes: u64,
    },
}

/// Result of a streaming export.
pub enum StreamedExport {
    /// Fixed-size chunks of the payload, in order.
    Chunks(ChunkStream),
    /// The payload went to the destination URL; nothing is streamed back.
    Uploaded {
        /// Bytes uploaded.
        bytes: u64,
    },
}

impl std::fmt::Debug for StreamedExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chunks(_) => f.write_str("Chunks(..)"),
            Self::Uploaded { bytes } => f.debug_struct("Uploaded").field("bytes", bytes).finish(),
        }
    }
}

/// One message of a streaming import.
///
/// The first chunk must name the profile and format. Any chunk carries either
/// a byte fragment or a source URL, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportChunk {
    /// Profile name. Read from the first chunk only.
    pub profile: Option<String>,
    /// Format identifier. Read from the first chunk only.
    pub format: Option<String>,
    /// Tenant scope. Read from the first chunk only.
    pub tenant: Option<String>,
    /// Byte fragment to append.
    pub content: Vec<u8>,
    /// Remote source to download instead of inline bytes.
    pub source_url: Option<String>,
}

impl ImportChunk {
    /// A metadata chunk opening the stream.
    #[must_use]
    pub fn open(profile: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            profile: Some(profile.into()),
            format: Some(format.into()),
            ..Self::default()
        }
    }

    /// A chunk carrying a byte fragment.
    #[must_use]
    pub fn bytes(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// A chunk carrying a source URL.
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            source_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Adds a byte fragment.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    /// Adds a source URL.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Adds a tenant scope.
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// A template call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRequest {
    /// Profile name.
    pub profile: String,
    /// Format identifier.
    pub format: String,
    /// Whether to include one blank example record.
    pub include_example: bool,
}

impl TemplateRequest {
    /// Creates a template request without an example record.
    #[must_use]
    pub fn new(profile: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            format: format.into(),
            include_example: false,
        }
    }

    /// Includes one blank example record.
    #[must_use]
    pub const fn with_example(mut self) -> Self {
        self.include_example = true;
        self
    }
}

/// Externally facing orchestrator for imports, exports and templates.
///
/// Holds no per-call state; calls may run concurrently.
pub struct TransferGateway {
    registry: Arc<ProfileRegistry>,
    remote: Arc<dyn RemoteTransfer>,
    settings: TransferSettings,
}

impl TransferGateway {
    /// Creates a gateway.
    #[must_use]
    pub fn new(
        registry: Arc<ProfileRegistry>,
        remote: Arc<dyn RemoteTransfer>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            registry,
            remote,
            settings,
        }
    }

    /// The profile registry.
    #[must_use]
    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Imports a payload given inline or by URL.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported format, unknown profile, failed
    /// download, malformed payload or fatal store failure. Row-level problems
    /// are reported in the outcome.
    #[instrument(
        skip_all,
        fields(transfer_id = %Uuid::now_v7(), profile = %request.profile, format = %request.format)
    )]
    pub async fn import(&self, request: ImportRequest) -> Result<ImportOutcome> {
        let format: Format = request.format.parse()?;
        self.registry.lookup(&request.profile)?;

        let mut session = self.open_session(&request.profile, format)?;
        self.stage(&mut session, request.source).await?;
        self.import_staged(session, request.tenant.as_deref()).await
    }

    /// Imports a payload sent as a sequence of chunks.
    ///
    /// Chunks are appended in arrival order; the batch runs once the stream
    /// ends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingMetadata`] if the stream is empty or its first
    /// chunk lacks profile or format, [`Error::AmbiguousSource`] if inline
    /// bytes and a source URL are mixed, and otherwise the errors of
    /// [`Self::import`]. Input after the failing chunk is not consumed.
    #[instrument(
        skip_all,
        fields(transfer_id = %Uuid::now_v7(), profile = tracing::field::Empty, format = tracing::field::Empty)
    )]
    pub async fn import_stream<S>(&self, mut chunks: S) -> Result<ImportOutcome>
    where
        S: Stream<Item = Result<ImportChunk>> + Send + Unpin,
    {
        let first = chunks
            .next()
            .await
            .transpose()?
            .ok_or_else(|| Error::MissingMetadata("stream ended before the first chunk".to_string()))?;
        let profile = non_blank(first.profile.as_deref())
            .ok_or_else(|| Error::MissingMetadata("first chunk must name the profile".to_string()))?
            .to_string();
        let format: Format = non_blank(first.format.as_deref())
            .ok_or_else(|| Error::MissingMetadata("first chunk must name the format".to_string()))?
            .parse()?;
        let span = Span::current();
        span.record("profile", profile.as_str());
        span.record("format", format.as_str());
        self.registry.lookup(&profile)?;

        let tenant = first.tenant.clone();
        let mut session = self.open_session(&profile, format)?;
        let mut staging = Staging::default();
        let mut received = 1usize;
        self.accept_chunk(&mut session, &mut staging, first).await?;
        while let Some(chunk) = chunks.next().await {
            received += 1;
            self.accept_chunk(&mut session, &mut staging, chunk?).await?;
        }
        debug!(
            chunks = received,
            bytes = session.bytes_written(),
            "Import stream complete"
        );

        self.import_staged(session, tenant.as_deref()).await
    }

    /// Exports records, returning the payload or uploading it.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported format, unknown profile, store or
    /// encoder failure, or [`Error::UploadFailed`] if the destination rejects
    /// the payload.
    #[instrument(
        skip_all,
        fields(transfer_id = %Uuid::now_v7(), profile = %request.profile, format = %request.format)
    )]
    pub async fn export(&self, request: ExportRequest) -> Result<ExportResponse> {
        let session = self.export_staged(&request).await?;
        let format = session.format();
        let content = session.read_all().await?;

        if let Some(url) = &request.destination_url {
            let bytes = self.upload(url, content, format).await?;
            return Ok(ExportResponse::Uploaded { bytes });
        }
        Ok(ExportResponse::Inline(ExportPayload {
            content,
            content_type: format.mime_type(),
            filename: format!("{}.{}", session.profile(), format.extension()),
        }))
    }

    /// Exports records as a stream of fixed-size chunks, or uploads them.
    ///
    /// The payload is produced once into a staged file; chunks are read from
    /// it in order. The file is deleted when the stream ends or is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Self::export`]. Read failures while streaming surface as
    /// stream items.
    #[instrument(
        skip_all,
        fields(transfer_id = %Uuid::now_v7(), profile = %request.profile, format = %request.format)
    )]
    pub async fn export_stream(&self, request: ExportRequest) -> Result<StreamedExport> {
        let session = self.export_staged(&request).await?;

        if let Some(url) = &request.destination_url {
            let format = session.format();
            let content = session.read_all().await?;
            let bytes = self.upload(url, content, format).await?;
            return Ok(StreamedExport::Uploaded { bytes });
        }
        debug!(
            bytes = session.bytes_written(),
            chunk_size = self.settings.chunk_size,
            "Streaming export"
        );
        Ok(StreamedExport::Chunks(
            session.into_chunks(self.settings.chunk_size),
        ))
    }

    /// Generates an import template. Touches no storage.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported format or unknown profile.
    pub fn template(&self, request: &TemplateRequest) -> Result<TemplatePayload> {
        let format: Format = request.format.parse()?;
        let profile = self.registry.get_profile(&request.profile, format)?;
        template::generate(&profile, request.include_example)
    }

    /// Decodes and validates a payload without touching storage.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported format, unknown profile, failed
    /// download or malformed payload.
    #[instrument(
        skip_all,
        fields(transfer_id = %Uuid::now_v7(), profile = %request.profile, format = %request.format)
    )]
    pub async fn validate(&self, request: ImportRequest) -> Result<ValidationReport> {
        let format: Format = request.format.parse()?;
        let profile = self.registry.get_profile(&request.profile, format)?;

        let mut session = self.open_session(&request.profile, format)?;
        self.stage(&mut session, request.source).await?;
        session.seal().await?;

        let mut source = open_rows(&session, &profile).await?;
        ImportService::validate_rows(source.as_mut(), &profile)
    }

    fn open_session(&self, profile: &str, format: Format) -> Result<TransferSession> {
        let dir = self.settings.temp_dir();
        std::fs::create_dir_all(&dir).map_err(|e| Error::operation("create_temp_dir", e))?;
        TransferSession::create(&dir, profile, format)
    }

    async fn stage(&self, session: &mut TransferSession, source: PayloadSource) -> Result<()> {
        match source {
            PayloadSource::Inline(bytes) => session.append(&bytes).await,
            PayloadSource::Url(url) => self.remote.download(&url, session).await.map(|_| ()),
        }
    }

    async fn accept_chunk(
        &self,
        session: &mut TransferSession,
        staging: &mut Staging,
        chunk: ImportChunk,
    ) -> Result<()> {
        match (chunk.source_url, chunk.content.is_empty()) {
            (Some(_), false) => Err(Error::AmbiguousSource(
                "a chunk carries both bytes and a source URL".to_string(),
            )),
            (Some(_), true) if staging.downloaded => Err(Error::AmbiguousSource(
                "only one source URL may be given".to_string(),
            )),
            (Some(_), true) if staging.inline => Err(Error::AmbiguousSource(
                "source URL sent after inline bytes".to_string(),
            )),
            (Some(url), true) => {
                staging.downloaded = true;
                self.remote.download(&url, session).await.map(|_| ())
            },
            (None, false) if staging.downloaded => Err(Error::AmbiguousSource(
                "inline bytes sent after a source URL".to_string(),
            )),
            (None, false) => {
                staging.inline = true;
                session.append(&chunk.content).await
            },
            (None, true) => Ok(()),
        }
    }

    async fn import_staged(
        &self,
        mut session: TransferSession,
        tenant: Option<&str>,
    ) -> Result<ImportOutcome> {
        session.seal().await?;
        let profile = self.registry.get_profile(session.profile(), session.format())?;
        let store = self.registry.store(session.profile())?;

        let mut source = open_rows(&session, &profile).await?;
        let outcome =
            ImportService::import_rows(source.as_mut(), &profile, store.as_ref(), tenant, None)
                .await?;
        info!(
            transfer_session = %session.id(),
            bytes = session.bytes_written(),
            processed = outcome.processed,
            failed = outcome.failed,
            "Import transfer finished"
        );
        Ok(outcome)
    }

    async fn export_staged(&self, request: &ExportRequest) -> Result<TransferSession> {
        let format: Format = request.format.parse()?;
        let profile = self.registry.get_profile(&request.profile, format)?;
        let store = self.registry.store(&request.profile)?;

        let mut session = self.open_session(profile.profile.name(), format)?;
        let sink = create_record_sink(session.writer()?, &profile);
        ExportService::export_records(sink, &profile, store.as_ref(), &request.context).await?;
        session.refresh_size().await?;
        Ok(session)
    }

    async fn upload(&self, url: &str, content: Vec<u8>, format: Format) -> Result<u64> {
        let bytes = content.len() as u64;
        self.remote.upload(url, content, format.mime_type()).await?;
        metrics::counter!("dataport_transfer_bytes_total", "direction" => "out").increment(bytes);
        info!(bytes, "Uploaded export to destination");
        Ok(bytes)
    }
}

/// What a streaming import has staged so far.
#[derive(Debug, Default)]
struct Staging {
    inline: bool,
    downloaded: bool,
}

/// Opens the staged payload on the blocking pool.
///
/// JSON, XML and spreadsheet payloads are parsed whole when the source is
/// opened; CSV rows are read lazily afterwards, one buffered line at a time.
async fn open_rows(
    session: &TransferSession,
    profile: &ResolvedProfile,
) -> Result<Box<dyn RowSource>> {
    let reader = session.reader()?;
    let profile = profile.clone();
    tokio::task::spawn_blocking(move || create_row_source(reader, &profile))
        .await
        .map_err(|e| Error::operation("decode_payload", e))?
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customers::{InMemoryCustomerStore, customer_profile};
    use crate::schema::Localization;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const STOREFRONT: &str = "6f1c1c2e-6a53-4a43-9d2e-3f4f7f0d9a11";

    #[derive(Default)]
    struct FakeRemote {
        sources: HashMap<String, Vec<u8>>,
        uploads: Mutex<Vec<(String, Vec<u8>, String)>>,
        reject_uploads: bool,
    }

    #[async_trait]
    impl RemoteTransfer for FakeRemote {
        async fn download(&self, url: &str, session: &mut TransferSession) -> Result<u64> {
            let bytes = self.sources.get(url).ok_or_else(|| Error::DownloadFailed {
                url: url.to_string(),
                cause: "HTTP 404".to_string(),
            })?;
            session.append(bytes).await?;
            Ok(bytes.len() as u64)
        }

        async fn upload(&self, url: &str, content: Vec<u8>, content_type: &str) -> Result<()> {
            if self.reject_uploads {
                return Err(Error::UploadFailed {
                    status: 403,
                    body: "denied".to_string(),
                });
            }
            self.uploads
                .lock()
                .unwrap()
                .push((url.to_string(), content, content_type.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        gateway: TransferGateway,
        store: Arc<InMemoryCustomerStore>,
        remote: Arc<FakeRemote>,
        temp: tempfile::TempDir,
    }

    fn fixture(remote: FakeRemote) -> Fixture {
        let store = Arc::new(InMemoryCustomerStore::new());
        let mut registry = ProfileRegistry::new(Localization::default());
        registry
            .register(customer_profile().unwrap(), store.clone())
            .unwrap();
        let temp = tempfile::tempdir().unwrap();
        let settings = TransferSettings {
            temp_dir: Some(temp.path().to_path_buf()),
            chunk_size: 16,
            ..TransferSettings::default()
        };
        let remote = Arc::new(remote);
        let gateway = TransferGateway::new(Arc::new(registry), remote.clone(), settings);
        Fixture {
            gateway,
            store,
            remote,
            temp,
        }
    }

    fn csv_payload() -> Vec<u8> {
        format!("storefrontId,userId,firstName\n{STOREFRONT},u-1,Ann\n{STOREFRONT},u-2,Bob\n")
            .into_bytes()
    }

    fn staged_files(fixture: &Fixture) -> usize {
        std::fs::read_dir(fixture.temp.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_unary_import_inline() {
        let fixture = fixture(FakeRemote::default());
        let outcome = fixture
            .gateway
            .import(ImportRequest::new(
                "customers",
                "csv",
                PayloadSource::Inline(csv_payload()),
            ))
            .await
            .unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.created, 2);
        assert_eq!(fixture.store.len(), 2);
        assert_eq!(staged_files(&fixture), 0);
    }

    fn json_payload(storefront: &str, count: usize) -> Vec<u8> {
        let items: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "storefrontId": storefront,
                    "userId": format!("u-{i}"),
                    "firstName": format!("Name {i}"),
                })
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({ "items": items })).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_imports_decode_off_the_runtime() {
        let fixture = fixture(FakeRemote::default());
        let other = "0b6e1f6a-3c1d-4f59-8f0e-2a7d9c4b5e60";
        let first = ImportRequest::new(
            "customers",
            "json",
            PayloadSource::Inline(json_payload(STOREFRONT, 150)),
        );
        let second = ImportRequest::new(
            "customers",
            "json",
            PayloadSource::Inline(json_payload(other, 150)),
        );
        let broken = ImportRequest::new(
            "customers",
            "json",
            PayloadSource::Inline(b"{\"items\": [".to_vec()),
        );

        let (a, b, c) = tokio::join!(
            fixture.gateway.import(first),
            fixture.gateway.import(second),
            fixture.gateway.import(broken),
        );

        assert_eq!(a.unwrap().created, 150);
        assert_eq!(b.unwrap().created, 150);
        assert!(matches!(c, Err(Error::MalformedPayload(_))));
        assert_eq!(fixture.store.len(), 300);
        assert_eq!(staged_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_unary_import_from_url() {
        let mut remote = FakeRemote::default();
        remote
            .sources
            .insert("https://files.test/c.csv".to_string(), csv_payload());
        let fixture = fixture(remote);

        let outcome = fixture
            .gateway
            .import(ImportRequest::new(
                "customers",
                "csv",
                PayloadSource::Url("https://files.test/c.csv".to_string()),
            ))
            .await
            .unwrap();
        assert_eq!(outcome.created, 2);
        assert_eq!(staged_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_failed_download_cleans_up() {
        let fixture = fixture(FakeRemote::default());
        let err = fixture
            .gateway
            .import(ImportRequest::new(
                "customers",
                "csv",
                PayloadSource::Url("https://files.test/missing.csv".to_string()),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed { .. }));
        assert_eq!(staged_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_unknown_format_and_profile() {
        let fixture = fixture(FakeRemote::default());
        let err = fixture
            .gateway
            .import(ImportRequest::new("customers", "yaml", PayloadSource::Inline(vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref f) if f == "yaml"));

        let err = fixture
            .gateway
            .import(ImportRequest::new("orders", "csv", PayloadSource::Inline(vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn test_stream_import_matches_unary() {
        let fixture = fixture(FakeRemote::default());
        let payload = csv_payload();
        let (head, tail) = payload.split_at(13);
        let chunks = futures::stream::iter(vec![
            Ok(ImportChunk::open("customers", "csv").with_content(head.to_vec())),
            Ok(ImportChunk::bytes(tail.to_vec())),
        ]);

        let outcome = fixture.gateway.import_stream(chunks).await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.created, 2);
        assert_eq!(staged_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_stream_requires_metadata() {
        let fixture = fixture(FakeRemote::default());

        let empty = futures::stream::iter(Vec::<Result<ImportChunk>>::new());
        let err = fixture.gateway.import_stream(empty).await.unwrap_err();
        assert!(matches!(err, Error::MissingMetadata(_)));

        let no_format = futures::stream::iter(vec![Ok(ImportChunk {
            profile: Some("customers".to_string()),
            ..ImportChunk::default()
        })]);
        let err = fixture.gateway.import_stream(no_format).await.unwrap_err();
        assert!(matches!(err, Error::MissingMetadata(_)));
    }

    #[tokio::test]
    async fn test_stream_rejects_mixed_sources() {
        let mut remote = FakeRemote::default();
        remote
            .sources
            .insert("https://files.test/c.csv".to_string(), csv_payload());
        let fixture = fixture(remote);

        let bytes_then_url = futures::stream::iter(vec![
            Ok(ImportChunk::open("customers", "csv").with_content(b"storefrontId".to_vec())),
            Ok(ImportChunk::url("https://files.test/c.csv")),
        ]);
        let err = fixture.gateway.import_stream(bytes_then_url).await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousSource(_)));

        let url_then_bytes = futures::stream::iter(vec![
            Ok(ImportChunk::open("customers", "csv").with_source_url("https://files.test/c.csv")),
            Ok(ImportChunk::bytes(b"more".to_vec())),
        ]);
        let err = fixture.gateway.import_stream(url_then_bytes).await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousSource(_)));

        let both = futures::stream::iter(vec![Ok(ImportChunk::open("customers", "csv")
            .with_content(b"x".to_vec())
            .with_source_url("https://files.test/c.csv"))]);
        let err = fixture.gateway.import_stream(both).await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousSource(_)));

        assert_eq!(fixture.store.len(), 0);
        assert_eq!(staged_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_stream_import_from_url() {
        let mut remote = FakeRemote::default();
        remote
            .sources
            .insert("https://files.test/c.csv".to_string(), csv_payload());
        let fixture = fixture(remote);

        let chunks = futures::stream::iter(vec![
            Ok(ImportChunk::open("customers", "csv")),
            Ok(ImportChunk::url("https://files.test/c.csv")),
        ]);
        let outcome = fixture.gateway.import_stream(chunks).await.unwrap();
        assert_eq!(outcome.created, 2);
    }

    #[tokio::test]
    async fn test_export_inline_and_stream() {
        let fixture = fixture(FakeRemote::default());
        fixture
            .gateway
            .import(ImportRequest::new(
                "customers",
                "csv",
                PayloadSource::Inline(csv_payload()),
            ))
            .await
            .unwrap();

        let ExportResponse::Inline(payload) = fixture
            .gateway
            .export(ExportRequest::new("customers", "json"))
            .await
            .unwrap()
        else {
            panic!("expected inline payload");
        };
        assert_eq!(payload.filename, "customers.json");
        assert_eq!(payload.content_type, "application/json");

        let StreamedExport::Chunks(chunks) = fixture
            .gateway
            .export_stream(ExportRequest::new("customers", "json"))
            .await
            .unwrap()
        else {
            panic!("expected chunks");
        };
        let chunks: Vec<Vec<u8>> = chunks.try_collect().await.unwrap();
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.len() == 16));
        assert_eq!(chunks.concat(), payload.content);
        assert_eq!(staged_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_export_upload() {
        let fixture = fixture(FakeRemote::default());
        let response = fixture
            .gateway
            .export(ExportRequest::new("customers", "csv").with_destination("https://files.test/out.csv"))
            .await
            .unwrap();

        let uploads = fixture.remote.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "https://files.test/out.csv");
        assert_eq!(uploads[0].2, "text/csv");
        assert_eq!(
            response,
            ExportResponse::Uploaded {
                bytes: uploads[0].1.len() as u64
            }
        );
    }

    #[tokio::test]
    async fn test_export_upload_rejected() {
        let fixture = fixture(FakeRemote {
            reject_uploads: true,
            ..FakeRemote::default()
        });
        let err = fixture
            .gateway
            .export_stream(ExportRequest::new("customers", "xml").with_destination("https://files.test/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UploadFailed { status: 403, .. }));
        assert_eq!(staged_files(&fixture), 0);
    }

    #[tokio::test]
    async fn test_validate_does_not_store() {
        let fixture = fixture(FakeRemote::default());
        let payload = format!("storefrontId,userId,firstName\n{STOREFRONT},u-1,\n{STOREFRONT},u-2,Bob\n");
        let report = fixture
            .gateway
            .validate(ImportRequest::new(
                "customers",
                "csv",
                PayloadSource::Inline(payload.into_bytes()),
            ))
            .await
            .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.valid, 1);
        assert_eq!(report.errors[0].field, "firstName");
        assert!(fixture.store.is_empty());
    }

    #[test]
    fn test_template() {
        let fixture = fixture(FakeRemote::default());
        let payload = fixture
            .gateway
            .template(&TemplateRequest::new("customers", "excel"))
            .unwrap();
        assert_eq!(payload.filename, "customers_template.xlsx");
        assert!(payload.content.starts_with(b"PK"));
    }
}
