//! Machine and product catalog: storage and spreadsheet ingestion.

pub mod ingest;
pub mod store;
pub mod types;

pub use {
    ingest::{IngestError, IngestOutcome, IngestReport, ingest_row},
    store::{CatalogStore, SqliteCatalog},
    types::{Dimensions, DoseInfo, Dosage, Machine, MachineFilter, Product, ProductCategory},
};
