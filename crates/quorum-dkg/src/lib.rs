//! # Quorum DKG
//!
//! One node's participation in a ledger-synchronized threshold BLS
//! distributed key generation.
//!
//! The ledger channel is the only means of coordination between members:
//! broadcasts, alright notes, complaints and responses are transactions, and
//! every wait is a poll of ledger state. All curve arithmetic is delegated to
//! the secure key service.
//!
//! ## Modules
//!
//! - **scanner**: incremental discovery of broadcast events
//! - **session**: per-group state and every key service interaction
//! - **orchestrator**: broadcast, alright and complaint phases
//! - **complaint**: complaint/response sub-protocol and failure detection
//! - **keygen**: BLS key assembly after a successful run
//! - **runner**: one DKG attempt end to end, with its terminal status
//! - **host**: concurrent sessions for many groups
//! - **storage**: key bundle persistence
//! - **config**, **timer**, **key_client**: runtime settings, cancellable
//!   polling and the retrying key service boundary

pub mod complaint;
pub mod config;
pub mod errors;
pub mod host;
pub mod key_client;
pub mod keygen;
pub mod orchestrator;
pub mod runner;
pub mod scanner;
pub mod session;
pub mod storage;
pub mod timer;

pub use config::DkgRuntimeConfig;
pub use errors::{DkgError, DkgResult, Gate, Submission};
pub use host::DkgHost;
pub use key_client::KeyServiceClient;
pub use keygen::generate_bls_keys;
pub use orchestrator::{broadcast_and_check_data, run_protocol, BroadcastResult};
pub use runner::{get_session, run_dkg, run_session, DkgContext, DkgRunResult};
pub use scanner::{BroadcastEvent, BroadcastScanner};
pub use session::{bls_key_name, poly_name, DkgSession, SessionRequest};
pub use storage::{FileKeyBundleStore, KeyBundleStore, MemoryKeyBundleStore};
pub use timer::{PollTimer, ShutdownSignal};
