// bot/src/lib.rs
// Library interface shared by the daemon binary and the integration tests.

pub mod bindings;
pub mod config;
pub mod encoding;
pub mod error;
pub mod event_loop;
pub mod gas;
pub mod ledger;
pub mod logging;
pub mod reconcile;
pub mod rpc;
pub mod scheduler;
pub mod signer;
pub mod state;
pub mod timing;
pub mod transaction;
pub mod utils;

// Public types re-exported for convenience
pub use config::{load_configs, parse_configs, BotConfig};
pub use encoding::{AbiEncoder, CompounderAbi, FunctionCall, TargetFunction};
pub use error::{BotError, BotResult};
pub use event_loop::{Agent, AgentReport, AgentSettings, Mode};
pub use gas::{GasPolicy, GasTracker};
pub use ledger::{JsonlLedger, Ledger, LogLedger, MemoryLedger, ReconciliationRecord};
pub use reconcile::ReconciliationScanner;
pub use rpc::{ChainClient, RpcChainClient};
pub use scheduler::{Scheduler, SchedulerState};
pub use signer::TxSigner;
pub use state::AccountState;
pub use timing::{Clock, MockClock, SystemClock};
pub use transaction::{NonceManager, PendingTransaction, TransactionBuilder};
