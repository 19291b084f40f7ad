//! Market lifecycle example
//!
//! Walks one market through its whole life: create, stake, resolve, claim,
//! with the router emitting activity events and the payout transfer along
//! the way.

use anyhow::Result;
use std::sync::Arc;
use stakecast_core::{
    Broadcast, Category, Command, CommandEnvelope, CommandOutput, MarketContract, MarketStore,
    MemoryStore, Outcome, Protocol, Side, SystemClock, ValueTransfer,
};

struct PrintlnBroadcast;

impl Broadcast for PrintlnBroadcast {
    fn send(&self, channel: &str, payload: &str) -> Result<()> {
        println!("   [{channel}] {payload}");
        Ok(())
    }
}

struct PrintlnTransfer;

impl ValueTransfer for PrintlnTransfer {
    fn transfer(&self, to: &str, amount: u64, memo: &str) -> Result<()> {
        println!("   [transfer] {amount} -> {to} ({memo})");
        Ok(())
    }
}

fn main() -> Result<()> {
    println!("Stakecast market lifecycle");
    println!("==========================\n");

    let store = MarketStore::new(Arc::new(MemoryStore::new()));
    let contract = Arc::new(MarketContract::new(store, Arc::new(SystemClock)));
    let protocol = Protocol::new(contract, Arc::new(PrintlnBroadcast), Arc::new(PrintlnTransfer));

    // 1. Create a market. The signer becomes the creator.
    println!("1. Creating a market...");
    let output = protocol.execute(&CommandEnvelope {
        signer: "addr-creator".to_string(),
        command: Command::MarketCreate {
            question: "Will it rain tomorrow in San Francisco?".to_string(),
            category: Category::Science,
            closes_in: Some(3600),
            resolve_by: Some(7200),
            oracle_address: "addr-oracle".to_string(),
        },
    })?;
    let CommandOutput::Created(market) = output else {
        unreachable!("create returns the market");
    };
    println!("   Market ID: {}", market.id);
    println!("   Question:  {}", market.question);
    println!();

    // 2. Alice and Bob stake opposite sides.
    println!("2. Placing stakes...");
    protocol.execute(&CommandEnvelope {
        signer: "addr-alice".to_string(),
        command: Command::MarketStake {
            market_id: market.id.clone(),
            side: Side::Yes,
            amount: 100,
        },
    })?;
    protocol.execute(&CommandEnvelope {
        signer: "addr-bob".to_string(),
        command: Command::MarketStake {
            market_id: market.id.clone(),
            side: Side::No,
            amount: 50,
        },
    })?;
    println!();

    // 3. The oracle resolves YES early.
    println!("3. Oracle resolves YES...");
    protocol.execute(&CommandEnvelope {
        signer: "addr-oracle".to_string(),
        command: Command::MarketResolve {
            market_id: market.id.clone(),
            outcome: Outcome::Yes,
        },
    })?;
    println!();

    // 4. Alice claims the whole 150 pool.
    println!("4. Alice claims...");
    let output = protocol.execute(&CommandEnvelope {
        signer: "addr-alice".to_string(),
        command: Command::MarketClaim {
            market_id: market.id.clone(),
        },
    })?;
    let CommandOutput::Claimed(receipt) = output else {
        unreachable!("claim returns a receipt");
    };
    println!("   Payout: {}", receipt.payout);
    println!();

    // 5. Bob staked the losing side; his claim fails.
    println!("5. Bob tries to claim...");
    let err = protocol
        .execute(&CommandEnvelope {
            signer: "addr-bob".to_string(),
            command: Command::MarketClaim {
                market_id: market.id.clone(),
            },
        })
        .unwrap_err();
    println!("   Rejected: {err}");

    Ok(())
}
