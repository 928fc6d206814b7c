// bot/src/signer.rs

use crate::error::{BotError, BotResult};
use ethers::{
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, Signature},
};
use std::path::Path;

/// Signing capability. The chain id is bound into the signature (EIP-155).
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;
    fn sign(&self, tx: &TypedTransaction, chain_id: u64) -> BotResult<Signature>;
}

impl TxSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    fn sign(&self, tx: &TypedTransaction, chain_id: u64) -> BotResult<Signature> {
        let mut tx = tx.clone();
        tx.set_chain_id(chain_id);
        self.clone()
            .with_chain_id(chain_id)
            .sign_transaction_sync(&tx)
            .map_err(|e| BotError::Signing(e.to_string()))
    }
}

/// Builds a wallet from a hex private key (with or without `0x`).
pub fn wallet_from_secret(secret: &str) -> BotResult<LocalWallet> {
    secret
        .trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|e| BotError::Signing(format!("invalid private key: {}", e)))
}

/// Decrypts a JSON keystore file.
pub fn wallet_from_keystore(path: impl AsRef<Path>, password: &str) -> BotResult<LocalWallet> {
    LocalWallet::decrypt_keystore(path.as_ref(), password)
        .map_err(|e| BotError::Signing(format!("keystore {:?}: {}", path.as_ref(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{TransactionRequest, U256};

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn signature_recovers_wallet_and_binds_chain() {
        let wallet = wallet_from_secret(KEY).unwrap();
        let tx: TypedTransaction = TransactionRequest::new()
            .nonce(3u64)
            .gas_price(1_000_000_000u64)
            .gas(100_000u64)
            .to(Address::zero())
            .value(U256::zero())
            .chain_id(56u64)
            .into();
        let sig = TxSigner::sign(&wallet, &tx, 56).unwrap();
        // EIP-155: v = chain_id * 2 + 35 + recovery id
        assert!(sig.v == 56 * 2 + 35 || sig.v == 56 * 2 + 36);
        assert_eq!(sig.recover(tx.sighash()).unwrap(), TxSigner::address(&wallet));
    }

    #[test]
    fn rejects_malformed_secret() {
        assert!(matches!(wallet_from_secret("not-a-key"), Err(BotError::Signing(_))));
    }
}
