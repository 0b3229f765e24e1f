//! Tome engine: network transport, payload decoding, chapter fetching with
//! failover, persistence and the pass-based run coordinator.
mod charset;
pub mod cipher;
mod coordinator;
mod decode;
mod endpoint;
mod extract;
mod fetcher;
mod filename;
mod index;
pub mod markup;
mod store;
mod transport;
mod types;

pub use charset::decode_text;
pub use cipher::CipherMode;
pub use coordinator::{Coordinator, CoordinatorConfig, LogProgressSink, ProgressSink, RunError};
pub use decode::{decode, DecodeError, DecodedChapter, PayloadFormat};
pub use endpoint::{default_endpoints, EndpointConfig, ID_PLACEHOLDER};
pub use extract::{extract_reader_page, ReaderPageText};
pub use fetcher::{ChapterFetcher, RetryPolicy, SharedHealth};
pub use filename::{document_filename, output_stem, progress_filename};
pub use index::{
    parse_work_page, IndexError, SiteIndex, WorkIndex, DEFAULT_PAGE_TEMPLATE, UNKNOWN_AUTHOR,
};
pub use store::{ensure_output_dir, DocumentStore, ProgressStore, StoreError};
pub use transport::{default_user_agents, FetchSettings, ReqwestTransport, Transport};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput, RunEvent};
