//! Command handlers module.
//!
//! - `io.rs`: import, export, template, validate and profile listing
//!
//! Every command runs through a [`Workspace`]: the customer store loaded from
//! its snapshot, the profile registry and the transfer gateway.

mod io;

use std::path::PathBuf;
use std::sync::Arc;

use dataport::config::DataportConfig;
use dataport::customers::{InMemoryCustomerStore, customer_profile};
use dataport::schema::ProfileRegistry;
use dataport::transfer::{HttpRemoteTransfer, TransferGateway};
use dataport::Result;

pub use io::{
    ExportArgs, ImportArgs, TemplateArgs, cmd_export, cmd_import, cmd_profiles, cmd_template,
    cmd_validate,
};

/// Store, registry and gateway for one CLI invocation.
pub struct Workspace {
    store: Arc<InMemoryCustomerStore>,
    store_path: PathBuf,
    gateway: TransferGateway,
    chunk_size: usize,
}

impl Workspace {
    /// Loads the store snapshot and wires the gateway.
    pub fn open(config: &DataportConfig) -> Result<Self> {
        let store = Arc::new(InMemoryCustomerStore::load(&config.store_path)?);
        let mut registry = ProfileRegistry::new(config.localization());
        registry.register(customer_profile()?, store.clone())?;

        let remote = Arc::new(HttpRemoteTransfer::new(&config.transfer));
        let gateway = TransferGateway::new(Arc::new(registry), remote, config.transfer.clone());
        Ok(Self {
            store,
            store_path: config.store_path.clone(),
            gateway,
            chunk_size: config.transfer.chunk_size,
        })
    }

    /// Writes the store back to its snapshot.
    pub fn save(&self) -> Result<()> {
        self.store.save(&self.store_path)
    }
}
