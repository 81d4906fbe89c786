//! Spend-transaction construction for `sendToAddress` (spec.md §6).
//!
//! spec.md's CLI table takes only `(address, amount)` — no fee parameter —
//! so this module charges a flat [`FLAT_FEE`] and returns any leftover as
//! change to the spending wallet's own address. See DESIGN.md.

use thunderbolt_core::address::Address;
use thunderbolt_core::model::{LockType, Output, Transaction, UtxoEntry};

use crate::error::{Result, WalletError};
use crate::keys::KeyPair;

/// Flat fee, in the same base units as `Output::amount`, charged on every
/// wallet-originated transaction.
pub const FLAT_FEE: u64 = 1_000;

/// Selects UTXOs (oldest first) until their sum covers `amount + FLAT_FEE`,
/// builds the transaction, and signs every input with `keypair`.
///
/// `utxos` must already be filtered to ones this `keypair` can spend.
pub fn build_send_transaction(
    keypair: &KeyPair,
    utxos: &[UtxoEntry],
    destination: &Address,
    amount: u64,
) -> Result<Transaction> {
    let target = amount.checked_add(FLAT_FEE).ok_or(WalletError::InsufficientFunds)?;

    let mut selected = Vec::new();
    let mut total = 0u64;
    let mut ordered: Vec<&UtxoEntry> = utxos.iter().collect();
    ordered.sort_by_key(|u| u.block_height);
    for utxo in ordered {
        if total >= target {
            break;
        }
        total += utxo.output.amount;
        selected.push(utxo);
    }
    if total < target {
        return Err(WalletError::InsufficientFunds);
    }

    let mut outputs = vec![Output {
        amount,
        lock_type: LockType::SingleSig,
        lock_params: destination.hash160.to_vec(),
    }];
    let change = total - target;
    if change > 0 {
        outputs.push(Output {
            amount: change,
            lock_type: LockType::SingleSig,
            lock_params: keypair.address().hash160.to_vec(),
        });
    }

    let inputs: Vec<_> = selected.iter().map(|u| u.key()).map(|(txid, index)| thunderbolt_core::model::Outpoint { ref_tx: txid, index }).collect();

    let witnesses = selected
        .iter()
        .zip(inputs.iter())
        .map(|(utxo, input)| keypair.sign_single_sig(input, &utxo.output))
        .collect();

    Ok(Transaction {
        version: 1,
        inputs,
        outputs,
        lock_time: 0,
        witnesses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderbolt_core::crypto::ripemd160_sha256;

    fn utxo_for(keypair: &KeyPair, amount: u64, height: u64, seed: u8) -> UtxoEntry {
        UtxoEntry {
            txid: [seed; 32],
            index: 0,
            block_height: height,
            version: 1,
            is_coinbase: false,
            output: Output {
                amount,
                lock_type: LockType::SingleSig,
                lock_params: ripemd160_sha256(&keypair.public_key_bytes()).to_vec(),
            },
        }
    }

    #[test]
    fn spends_a_single_utxo_with_change() {
        let kp = KeyPair::generate();
        let dest = KeyPair::generate().address();
        let utxo = utxo_for(&kp, 10_000, 1, 1);
        let tx = build_send_transaction(&kp, &[utxo], &dest, 3_000).unwrap();
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].amount, 3_000);
        assert_eq!(tx.outputs[1].amount, 10_000 - 3_000 - FLAT_FEE);
    }

    #[test]
    fn exact_amount_produces_no_change_output() {
        let kp = KeyPair::generate();
        let dest = KeyPair::generate().address();
        let utxo = utxo_for(&kp, 3_000 + FLAT_FEE, 1, 2);
        let tx = build_send_transaction(&kp, &[utxo], &dest, 3_000).unwrap();
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn insufficient_funds_is_rejected() {
        let kp = KeyPair::generate();
        let dest = KeyPair::generate().address();
        let utxo = utxo_for(&kp, 500, 1, 3);
        assert!(matches!(
            build_send_transaction(&kp, &[utxo], &dest, 3_000),
            Err(WalletError::InsufficientFunds)
        ));
    }

    #[test]
    fn selects_multiple_utxos_oldest_first() {
        let kp = KeyPair::generate();
        let dest = KeyPair::generate().address();
        let older = utxo_for(&kp, 2_000, 1, 4);
        let newer = utxo_for(&kp, 2_000, 5, 5);
        let tx = build_send_transaction(&kp, &[newer, older], &dest, 3_000).unwrap();
        assert_eq!(tx.inputs.len(), 2);
    }
}
