use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use fastopendata::{AddressFields, ColumnSelectors, FailurePolicy};

#[derive(Parser)]
#[command(name = "fastopendata")]
#[command(about = "Look up and append FastOpenData attributes for US addresses", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// API key (falls back to $FASTOPENDATA_API_KEY)
    #[arg(long, global = true)]
    pub(crate) api_key: Option<String>,
    /// Service base URL, e.g. https://fastopendata.com:443
    #[arg(long, global = true)]
    pub(crate) url: Option<String>,
    /// JSON config file (falls back to $FASTOPENDATA_CONFIG)
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub(crate) timeout: Option<u64>,
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Get a single data payload for one address.
    Get {
        #[command(flatten)]
        address: AddressArgs,
    },

    /// Append data from FastOpenData to an existing CSV file.
    Csv {
        /// Input CSV file with addresses
        #[arg(long)]
        input_csv: PathBuf,
        /// Target CSV with appended data (must not exist)
        #[arg(long)]
        output_csv: PathBuf,
        #[command(flatten)]
        columns: ColumnArgs,
        /// What to do when one row's lookup fails
        #[arg(long, value_enum, default_value_t = OnError::Null)]
        on_error: OnError,
        /// Rows looked up concurrently
        #[arg(long)]
        workers: Option<usize>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Get a free, rate-limited API key for evaluation.
    GetApiKey {
        /// Email address (prompted for when omitted)
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct AddressArgs {
    /// Unstructured United States address
    #[arg(long)]
    pub(crate) free_form_query: Option<String>,
    /// Street address line one
    #[arg(long)]
    pub(crate) address1: Option<String>,
    /// Street address line two
    #[arg(long)]
    pub(crate) address2: Option<String>,
    #[arg(long)]
    pub(crate) city: Option<String>,
    #[arg(long)]
    pub(crate) state: Option<String>,
    #[arg(long)]
    pub(crate) zip_code: Option<String>,
}

impl From<AddressArgs> for AddressFields {
    fn from(args: AddressArgs) -> Self {
        AddressFields {
            free_form_query: args.free_form_query,
            address1: args.address1,
            address2: args.address2,
            city: args.city,
            state: args.state,
            zip_code: args.zip_code,
        }
    }
}

/// Column names holding each address component.
#[derive(Args, Debug, Default)]
pub(crate) struct ColumnArgs {
    /// Column with unstructured addresses
    #[arg(long = "free-form-query", value_name = "COLUMN")]
    pub(crate) free_form_query: Option<String>,
    /// Column with street address line one
    #[arg(long, value_name = "COLUMN")]
    pub(crate) address1: Option<String>,
    /// Column with street address line two
    #[arg(long, value_name = "COLUMN")]
    pub(crate) address2: Option<String>,
    #[arg(long, value_name = "COLUMN")]
    pub(crate) city: Option<String>,
    #[arg(long, value_name = "COLUMN")]
    pub(crate) state: Option<String>,
    #[arg(long, value_name = "COLUMN")]
    pub(crate) zip_code: Option<String>,
}

impl From<ColumnArgs> for ColumnSelectors {
    fn from(args: ColumnArgs) -> Self {
        ColumnSelectors {
            free_form_query: args.free_form_query,
            address1: args.address1,
            address2: args.address2,
            city: args.city,
            state: args.state,
            zip_code: args.zip_code,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OnError {
    /// Leave the failed row's new columns empty
    Null,
    /// Stop at the first failed row
    Abort,
}

impl From<OnError> for FailurePolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::Null => FailurePolicy::Nullify,
            OnError::Abort => FailurePolicy::Abort,
        }
    }
}
