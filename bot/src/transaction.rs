// bot/src/transaction.rs

use crate::encoding::{AbiEncoder, FunctionCall, TargetFunction};
use crate::error::{BotError, BotResult};
use crate::rpc::{CallRequest, ChainClient};
use crate::signer::TxSigner;
use crate::state::AccountState;
use ethers::{
    core::types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, TxHash, U256},
    utils::keccak256,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

// --- Structs ---

/// Hands out nonces for one account.
/// Clones of an `AccountState` share it through an `Arc`.
///
/// The first call reads the account's transaction count from the chain; every
/// later call increments locally. There is no resync: a prepared transaction
/// that is never submitted leaves a gap the caller must avoid.
#[derive(Debug)]
pub struct NonceManager {
    current_nonce: Mutex<Option<U256>>,
    wallet_address: Address,
}

/// A signed, wire-encoded transaction waiting for its firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub raw: Bytes,
    pub target: TargetFunction,
    pub nonce: U256,
    pub hash: TxHash,
}

// --- NonceManager Impl ---
impl NonceManager {
    pub fn new(wallet_address: Address) -> Self {
        Self {
            current_nonce: Mutex::new(None),
            wallet_address,
        }
    }

    pub fn wallet_address(&self) -> Address {
        self.wallet_address
    }

    /// Reads the on-chain count once. Later calls are no-ops.
    pub async fn initialize<C: ChainClient + ?Sized>(&self, client: &C) -> BotResult<U256> {
        let mut nonce_guard = self.current_nonce.lock().await;
        if let Some(nonce) = *nonce_guard {
            return Ok(nonce);
        }
        let initial_nonce = client.transaction_count(self.wallet_address).await?;
        info!(wallet = %self.wallet_address, nonce = %initial_nonce, "Initial nonce fetched from chain.");
        *nonce_guard = Some(initial_nonce);
        Ok(initial_nonce)
    }

    /// Returns the current nonce and advances it.
    pub async fn get_next_nonce<C: ChainClient + ?Sized>(&self, client: &C) -> BotResult<U256> {
        let mut nonce_guard = self.current_nonce.lock().await;
        let nonce = match *nonce_guard {
            Some(nonce) => nonce,
            None => client.transaction_count(self.wallet_address).await?,
        };
        *nonce_guard = Some(nonce + U256::one());
        Ok(nonce)
    }

    /// The value the next `get_next_nonce` will return, if known.
    pub async fn peek(&self) -> Option<U256> {
        *self.current_nonce.lock().await
    }
}

// --- Transaction Builder ---

/// Assembles and signs legacy transactions against the configured contract.
pub struct TransactionBuilder<S> {
    encoder: Box<dyn AbiEncoder>,
    signer: S,
    chain_id: u64,
    account: AccountState,
}

impl<S: TxSigner> TransactionBuilder<S> {
    pub fn new(encoder: Box<dyn AbiEncoder>, signer: S, chain_id: u64, account: AccountState) -> Self {
        Self {
            encoder,
            signer,
            chain_id,
            account,
        }
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn encoder(&self) -> &dyn AbiEncoder {
        self.encoder.as_ref()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Encodes, prices, numbers and signs `call`.
    ///
    /// Gas is refreshed before the nonce is taken so that a failure never
    /// burns a nonce. Encoding and signing failures are fatal to the caller.
    #[instrument(skip(self, client), fields(function = call.name(), chain_id = self.chain_id))]
    pub async fn prepare<C: ChainClient + ?Sized>(
        &mut self,
        client: &C,
        call: &FunctionCall,
    ) -> BotResult<PendingTransaction> {
        let target = call.target().ok_or_else(|| {
            BotError::Encoding(format!("{} is read-only and cannot be submitted", call.name()))
        })?;
        let calldata = self.encoder.encode(call)?;

        let estimate = CallRequest {
            from: self.account.address,
            to: self.account.contract,
            data: calldata.clone(),
        };
        let gas = self.account.gas.refresh(client, &estimate).await;
        let nonce = self.account.nonce.get_next_nonce(client).await?;

        debug!(%nonce, gas_price = %gas.gas_price, gas_limit = %gas.gas_limit, "Building transaction.");

        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.account.address)
            .to(self.account.contract)
            .nonce(nonce)
            .gas_price(gas.gas_price)
            .gas(gas.gas_limit)
            .value(U256::zero())
            .data(calldata)
            .chain_id(self.chain_id)
            .into();

        let signature = self.signer.sign(&tx, self.chain_id)?;
        let raw = tx.rlp_signed(&signature);
        let hash = TxHash::from(keccak256(raw.as_ref()));

        info!(%nonce, ?hash, "Prepared {} transaction.", target);
        Ok(PendingTransaction { raw, target, nonce, hash })
    }
}
