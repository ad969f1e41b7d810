//! Property-based tests for the transfer paths.
//!
//! - Streaming import matches unary import for any chunking of the payload
//! - Text values survive export followed by import in every format

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use dataport::config::TransferSettings;
use dataport::customers::{InMemoryCustomerStore, customer_profile};
use dataport::schema::{Localization, ProfileRegistry};
use dataport::transfer::{
    ExportRequest, ExportResponse, ImportChunk, ImportRequest, PayloadSource, RemoteTransfer,
    TransferGateway, TransferSession,
};
use dataport::{Error, Result};
use proptest::prelude::*;
use std::sync::Arc;

const STOREFRONT: &str = "3b7e5a0c-1d2f-4c8b-9a6e-0f1e2d3c4b5a";

struct NoRemote;

#[async_trait]
impl RemoteTransfer for NoRemote {
    async fn download(&self, url: &str, _session: &mut TransferSession) -> Result<u64> {
        Err(Error::DownloadFailed {
            url: url.to_string(),
            cause: "offline".to_string(),
        })
    }

    async fn upload(&self, _url: &str, _content: Vec<u8>, _content_type: &str) -> Result<()> {
        Err(Error::UploadFailed {
            status: 0,
            body: "offline".to_string(),
        })
    }
}

fn gateway() -> (TransferGateway, Arc<InMemoryCustomerStore>, tempfile::TempDir) {
    let store = Arc::new(InMemoryCustomerStore::new());
    let mut registry = ProfileRegistry::new(Localization::default());
    registry
        .register(customer_profile().unwrap(), store.clone())
        .unwrap();
    let temp = tempfile::tempdir().unwrap();
    let settings = TransferSettings {
        temp_dir: Some(temp.path().to_path_buf()),
        ..TransferSettings::default()
    };
    let gateway = TransferGateway::new(Arc::new(registry), Arc::new(NoRemote), settings);
    (gateway, store, temp)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn payload() -> Vec<u8> {
    format!(
        "storefrontId,userId,firstName,totalOrdersCount\n\
         {STOREFRONT},u-1,Ann,1\n\
         {STOREFRONT},u-2,,2\n\
         {STOREFRONT},u-1,Anna,3\n\
         {STOREFRONT},u-3,Cid,many\n\
         {STOREFRONT},u-4,Dee,4\n"
    )
    .into_bytes()
}

/// Splits `bytes` at the given per-mille positions.
fn split(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut offsets: Vec<usize> = cuts.iter().map(|c| bytes.len() * c / 1000).collect();
    offsets.push(bytes.len());
    offsets.sort_unstable();
    let mut chunks = Vec::new();
    let mut start = 0;
    for end in offsets {
        chunks.push(bytes[start..end].to_vec());
        start = end;
    }
    chunks
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: chunk boundaries never change the import outcome.
    #[test]
    fn prop_streaming_matches_unary(cuts in prop::collection::vec(0usize..=1000, 0..8)) {
        let rt = runtime();
        let bytes = payload();

        let (unary_gateway, unary_store, _unary_temp) = gateway();
        let unary = rt
            .block_on(unary_gateway.import(ImportRequest::new(
                "customers",
                "csv",
                PayloadSource::Inline(bytes.clone()),
            )))
            .unwrap();

        let (stream_gateway, stream_store, stream_temp) = gateway();
        let mut chunks = vec![Ok(ImportChunk::open("customers", "csv"))];
        chunks.extend(split(&bytes, &cuts).into_iter().map(|c| Ok(ImportChunk::bytes(c))));
        let streamed = rt
            .block_on(stream_gateway.import_stream(futures::stream::iter(chunks)))
            .unwrap();

        prop_assert_eq!(&streamed, &unary);
        prop_assert_eq!(streamed.processed, 5);
        prop_assert_eq!(streamed.failed, 2);
        prop_assert_eq!(stream_store.len(), unary_store.len());
        prop_assert_eq!(std::fs::read_dir(stream_temp.path()).unwrap().count(), 0);
    }

    /// Property: a first name survives export and re-import in every format.
    #[test]
    fn prop_names_survive_round_trip(
        name in "[A-Za-z0-9][A-Za-z0-9 ,.'\"&<>-]{0,18}[A-Za-z0-9]",
        format in prop::sample::select(vec!["json", "csv", "excel", "xml"]),
    ) {
        let rt = runtime();
        let (source, source_store, _source_temp) = gateway();
        let (target, target_store, _target_temp) = gateway();

        let record = serde_json::json!([{
            "storefrontId": STOREFRONT,
            "userId": "u-1",
            "firstName": name.as_str(),
        }]);
        let outcome = rt
            .block_on(source.import(ImportRequest::new(
                "customers",
                "json",
                PayloadSource::Inline(serde_json::to_vec(&record).unwrap()),
            )))
            .unwrap();
        prop_assert_eq!(outcome.created, 1);

        let ExportResponse::Inline(exported) = rt
            .block_on(source.export(ExportRequest::new("customers", format)))
            .unwrap()
        else {
            panic!("expected inline payload");
        };
        let outcome = rt
            .block_on(target.import(ImportRequest::new(
                "customers",
                format,
                PayloadSource::Inline(exported.content),
            )))
            .unwrap();
        prop_assert_eq!(outcome.created, 1);

        let imported = target_store.find("u-1").unwrap();
        prop_assert_eq!(&imported.first_name, &name);
        prop_assert_eq!(imported.id, source_store.find("u-1").unwrap().id);
    }
}
