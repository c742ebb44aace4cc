//! Client for the FastOpenData address enrichment service.
//!
//! Look up one address:
//!
//! ```no_run
//! use fastopendata::{AddressFields, Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig::new("YOUR_API_KEY"))?;
//! let data = client.request(&AddressFields::free_form("123 Main Street, Tallahassee, FL, 12345"))?;
//! println!("{}", serde_json::to_string_pretty(&data)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Or append the results to every row of a [`Table`] with [`Client::enrich`],
//! naming the column(s) that hold the address through [`ColumnSelectors`].
//! An evaluation key can be requested with [`get_free_api_key`].

mod client;
mod config;
mod csv_io;
mod enrich;
mod error;
mod keys;
mod query;
mod table;
mod transport;
mod util;

#[cfg(test)]
mod testing;

pub use client::{Client, EnrichmentResult};
pub use config::{
    load_file_config, ClientConfig, ConfigOverrides, FileConfig, API_KEY_ENV, CONFIG_ENV,
    TIMEOUT_ENV, URL_ENV, WORKERS_ENV,
};
pub use csv_io::{append_to_csv, read_csv, read_csv_from, write_csv, write_csv_to};
pub use enrich::{
    disambiguate, enrich, flatten_result, ColumnAssignment, ColumnSelectors, EnrichOptions,
    EnrichReport, FailurePolicy, RowFailure, DEFAULT_COLLISION_SUFFIX,
};
pub use error::{ClientError, Result, SERVICE_DETAILS};
pub use keys::{get_free_api_key, request_free_api_key, validate_email, ApiKeyGrant, KeyStatus};
pub use query::{build_query, AddressFields, AddressQuery};
pub use table::Table;
pub use transport::{EnrichmentRequest, HttpTransport, Transport};
