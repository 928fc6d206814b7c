// bot/src/main.rs

// --- Imports ---
use clap::Parser;
use compound_bot::{
    config::{load_configs, BotConfig},
    encoding::CompounderAbi,
    event_loop::Agent,
    ledger::{JsonlLedger, Ledger, LogLedger},
    logging::setup_logging,
    rpc::RpcChainClient,
    state::AccountState,
    timing::{Clock, SystemClock},
    transaction::{NonceManager, TransactionBuilder},
};
use dotenv::dotenv;
use ethers::{signers::LocalWallet, types::Address};
use eyre::{Result, WrapErr};
use futures_util::future::join_all;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tracing::{error, info};

// --- CLI Argument Parsing ---
#[derive(Parser, Debug)]
#[command(author, version, about = "Scheduled compounding bot for EVM chains", long_about = None)]
struct Cli {
    /// JSON file holding one bot object or an array of them.
    #[arg(short, long, env = "BOT_CONFIG", value_name = "FILE")]
    config: PathBuf,

    /// Append reconciliation records to this JSON-lines file instead of the log.
    #[arg(long, value_name = "FILE")]
    ledger: Option<PathBuf>,

    /// Level or filter directives; RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

/// Handles shared between agents built from the same file.
#[derive(Default)]
struct SharedHandles {
    clients: HashMap<String, Arc<RpcChainClient>>,
    nonces: HashMap<(u64, Address), Arc<NonceManager>>,
}

impl SharedHandles {
    fn client(&mut self, url: &str) -> Result<Arc<RpcChainClient>> {
        if let Some(client) = self.clients.get(url) {
            return Ok(client.clone());
        }
        let client = Arc::new(RpcChainClient::connect(url)?);
        self.clients.insert(url.to_string(), client.clone());
        Ok(client)
    }

    fn nonce(&mut self, chain_id: u64, wallet: Address) -> Arc<NonceManager> {
        self.nonces
            .entry((chain_id, wallet))
            .or_insert_with(|| Arc::new(NonceManager::new(wallet)))
            .clone()
    }
}

fn build_agent(
    config: &BotConfig,
    shared: &mut SharedHandles,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
) -> Result<Agent<RpcChainClient, LocalWallet>> {
    let mode = config.mode()?;
    let settings = config.settings()?;
    let wallet = config.load_wallet()?;
    let client = shared.client(&config.url)?;
    let account = AccountState::new(
        config.wallet,
        config.contract,
        shared.nonce(config.chain_id, config.wallet),
        config.gas_tracker(),
    );
    let builder = TransactionBuilder::new(Box::new(CompounderAbi), wallet, config.chain_id, account);
    Ok(Agent::new(settings, mode, client, builder, ledger, clock))
}

// --- Main Execution ---
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    setup_logging(&cli.log_level, cli.json_logs);

    let configs = load_configs(&cli.config).wrap_err("loading bot configuration")?;

    let ledger: Arc<dyn Ledger> = match &cli.ledger {
        Some(path) => {
            info!(path = %path.display(), "Writing reconciliation records to file.");
            Arc::new(JsonlLedger::open(path)?)
        }
        None => Arc::new(LogLedger),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Every bot is validated and built before any of them starts.
    let mut shared = SharedHandles::default();
    let mut agents = Vec::with_capacity(configs.len());
    for config in &configs {
        let agent = build_agent(config, &mut shared, ledger.clone(), clock.clone())
            .wrap_err_with(|| format!("setting up bot #{} ({})", config.id, config.name))?;
        agents.push((config.id, config.name.clone(), agent));
    }
    info!(bots = agents.len(), endpoints = shared.clients.len(), "Starting agents.");

    let handles = agents.into_iter().map(|(id, name, agent)| {
        tokio::spawn(async move { (id, name, agent.run().await) })
    });

    let mut failures = 0usize;
    for joined in join_all(handles).await {
        match joined {
            Ok((id, name, Ok(report))) => info!(
                bot_id = id,
                bot = %name,
                submitted = report.submitted,
                failed = report.failed,
                reconciled = report.reconciled,
                "Agent stopped."
            ),
            Ok((id, name, Err(e))) => {
                failures += 1;
                error!(bot_id = id, bot = %name, error = %e, "Agent stopped on a fatal error.");
            }
            Err(e) => {
                failures += 1;
                error!(error = %e, "Agent task aborted.");
            }
        }
    }

    if failures > 0 {
        eyre::bail!("{} of {} bots stopped with an error", failures, configs.len());
    }
    Ok(())
}
