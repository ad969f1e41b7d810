//! Transfer gateway and staging.
//!
//! | Call | Payload in | Payload out |
//! |------|------------|-------------|
//! | [`TransferGateway::import`] | inline bytes or source URL | [`ImportOutcome`](crate::ImportOutcome) |
//! | [`TransferGateway::import_stream`] | chunk stream | [`ImportOutcome`](crate::ImportOutcome) |
//! | [`TransferGateway::export`] | - | inline bytes or destination URL |
//! | [`TransferGateway::export_stream`] | - | chunk stream or destination URL |
//! | [`TransferGateway::template`] | - | template bytes |
//! | [`TransferGateway::validate`] | inline bytes or source URL | [`ValidationReport`](crate::ValidationReport) |

mod gateway;
mod remote;
mod session;

pub use gateway::{
    ExportPayload, ExportRequest, ExportResponse, ImportChunk, ImportRequest, PayloadSource,
    StreamedExport, TemplateRequest, TransferGateway,
};
pub use remote::{HttpRemoteTransfer, RemoteTransfer, redact_url};
pub use session::{ChunkStream, TransferSession};
