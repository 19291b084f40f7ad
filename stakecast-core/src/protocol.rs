//! # Command Protocol
//!
//! Maps incoming signed commands to contract operations. The signer is the
//! externally verified identity supplied by the replication layer, never
//! part of the command payload; the router substitutes it as the
//! creator/staker/resolver/claimant role argument.
//!
//! After a successful mutation the router emits side effects that are not
//! market state: an activity event on the shared channel, and — for a
//! claim — the value transfer to the claimant. Both collaborators are
//! fire-and-forget from the contract's perspective: their failures are
//! logged and do not fail the command, because the mutation is already
//! persisted and this layer cannot roll it back.

use crate::clock::format_timestamp_ms;
use crate::contract::{ClaimReceipt, ListFilter, MarketContract, ResolveReceipt, StakeReceipt};
use crate::error::{MarketError, Result};
use crate::market::{Category, Market, MarketState, MarketSummary, Outcome, Side, StakeView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared channel carrying all market lifecycle events.
pub const ACTIVITY_CHANNEL: &str = "stakecast-activity";

/// Per-oracle channel for resolve reminders.
pub fn oracle_channel(oracle_address: &str) -> String {
    format!("oracle:{oracle_address}")
}

/// Fire-and-forget event broadcast. No delivery guarantee is assumed.
pub trait Broadcast: Send + Sync {
    fn send(&self, channel: &str, payload: &str) -> anyhow::Result<()>;
}

/// Value-transfer primitive, invoked after a successful claim. Its outcome
/// is never consumed by market state.
pub trait ValueTransfer: Send + Sync {
    fn transfer(&self, to: &str, amount: u64, memo: &str) -> anyhow::Result<()>;
}

/// Lifecycle event payloads broadcast on the activity and oracle channels.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    MarketCreated {
        market_id: String,
        question: String,
        category: Category,
        closes_at: i64,
        resolve_at: i64,
    },
    StakePlaced {
        market_id: String,
        side: Side,
        amount: u64,
        staker: String,
    },
    MarketResolved {
        market_id: String,
        outcome: Outcome,
    },
    WinningsClaimed {
        market_id: String,
        winner: String,
        amount: u64,
    },
    StakingClosed {
        market_id: String,
        question: String,
        oracle_address: String,
        yes_pool: u64,
        no_pool: u64,
        resolve_by: String,
    },
    ResolveReminder {
        market_id: String,
        question: String,
        deadline: String,
    },
    MarketVoided {
        market_id: String,
        reason: String,
    },
}

/// Serialize and send an event, logging instead of failing when the
/// broadcast collaborator errors.
pub(crate) fn send_event(broadcast: &dyn Broadcast, channel: &str, event: &ActivityEvent) {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(%channel, error = %err, "failed to encode activity event");
            return;
        }
    };
    if let Err(err) = broadcast.send(channel, &payload) {
        tracing::warn!(%channel, error = %err, "failed to broadcast activity event");
    }
}

/// One signed command: the op plus its arguments, tagged by `op`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    MarketCreate {
        question: String,
        category: Category,
        #[serde(default)]
        closes_in: Option<u64>,
        #[serde(default)]
        resolve_by: Option<u64>,
        oracle_address: String,
    },
    MarketStake {
        market_id: String,
        side: Side,
        amount: u64,
    },
    MarketResolve {
        market_id: String,
        outcome: Outcome,
    },
    MarketClaim {
        market_id: String,
    },
    MarketList {
        #[serde(default)]
        category: Option<Category>,
        #[serde(default)]
        state: Option<MarketState>,
        #[serde(default)]
        limit: Option<usize>,
    },
    MarketGet {
        market_id: String,
    },
    MyStakes {},
}

const KNOWN_OPS: [&str; 7] = [
    "market_create",
    "market_stake",
    "market_resolve",
    "market_claim",
    "market_list",
    "market_get",
    "my_stakes",
];

/// A command paired with its verified signer identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommandEnvelope {
    pub signer: String,
    pub command: Command,
}

/// Successful command result.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum CommandOutput {
    Created(Market),
    Staked(StakeReceipt),
    Resolved(ResolveReceipt),
    Claimed(ClaimReceipt),
    Markets(Vec<MarketSummary>),
    Market(Option<Market>),
    Stakes(Vec<StakeView>),
}

/// Routes signed commands to the contract and emits post-success side
/// effects.
pub struct Protocol {
    contract: Arc<MarketContract>,
    broadcast: Arc<dyn Broadcast>,
    transfer: Arc<dyn ValueTransfer>,
}

impl Protocol {
    pub fn new(
        contract: Arc<MarketContract>,
        broadcast: Arc<dyn Broadcast>,
        transfer: Arc<dyn ValueTransfer>,
    ) -> Self {
        Self {
            contract,
            broadcast,
            transfer,
        }
    }

    pub fn contract(&self) -> &Arc<MarketContract> {
        &self.contract
    }

    /// Execute one signed command.
    pub fn execute(&self, envelope: &CommandEnvelope) -> Result<CommandOutput> {
        let signer = envelope.signer.as_str();
        match &envelope.command {
            Command::MarketCreate {
                question,
                category,
                closes_in,
                resolve_by,
                oracle_address,
            } => {
                let market = self.contract.create(
                    signer,
                    question,
                    *category,
                    *closes_in,
                    *resolve_by,
                    oracle_address,
                )?;
                send_event(
                    self.broadcast.as_ref(),
                    ACTIVITY_CHANNEL,
                    &ActivityEvent::MarketCreated {
                        market_id: market.id.clone(),
                        question: market.question.clone(),
                        category: market.category,
                        closes_at: market.closes_at,
                        resolve_at: market.resolve_at,
                    },
                );
                Ok(CommandOutput::Created(market))
            }

            Command::MarketStake {
                market_id,
                side,
                amount,
            } => {
                let receipt = self.contract.stake(signer, market_id, *side, *amount)?;
                send_event(
                    self.broadcast.as_ref(),
                    ACTIVITY_CHANNEL,
                    &ActivityEvent::StakePlaced {
                        market_id: receipt.market_id.clone(),
                        side: receipt.side,
                        amount: receipt.amount,
                        staker: signer.to_string(),
                    },
                );
                Ok(CommandOutput::Staked(receipt))
            }

            Command::MarketResolve { market_id, outcome } => {
                let receipt = self.contract.resolve(signer, market_id, *outcome)?;
                send_event(
                    self.broadcast.as_ref(),
                    ACTIVITY_CHANNEL,
                    &ActivityEvent::MarketResolved {
                        market_id: receipt.market_id.clone(),
                        outcome: receipt.outcome,
                    },
                );
                Ok(CommandOutput::Resolved(receipt))
            }

            Command::MarketClaim { market_id } => {
                let receipt = self.contract.claim(signer, market_id)?;
                // Claims never succeed with a zero payout, so every
                // successful claim pays out.
                if let Err(err) = self.transfer.transfer(
                    signer,
                    receipt.payout,
                    &format!("stakecast winnings: {market_id}"),
                ) {
                    tracing::warn!(
                        %market_id,
                        claimant = %signer,
                        error = %err,
                        "value transfer failed after claim"
                    );
                }
                send_event(
                    self.broadcast.as_ref(),
                    ACTIVITY_CHANNEL,
                    &ActivityEvent::WinningsClaimed {
                        market_id: receipt.market_id.clone(),
                        winner: signer.to_string(),
                        amount: receipt.payout,
                    },
                );
                Ok(CommandOutput::Claimed(receipt))
            }

            Command::MarketList {
                category,
                state,
                limit,
            } => {
                let summaries = self.contract.list(&ListFilter {
                    category: *category,
                    state: *state,
                    limit: *limit,
                })?;
                Ok(CommandOutput::Markets(summaries))
            }

            Command::MarketGet { market_id } => {
                Ok(CommandOutput::Market(self.contract.get(market_id)?))
            }

            Command::MyStakes {} => Ok(CommandOutput::Stakes(self.contract.stakes_of(signer)?)),
        }
    }

    /// Parse a raw JSON command and execute it.
    ///
    /// An unrecognized `op` is rejected before any contract call; other
    /// parse failures surface as validation errors.
    pub fn execute_json(&self, signer: &str, raw: &serde_json::Value) -> Result<CommandOutput> {
        let command: Command = serde_json::from_value(raw.clone()).map_err(|err| {
            match raw.get("op").and_then(serde_json::Value::as_str) {
                Some(op) if !KNOWN_OPS.contains(&op) => MarketError::UnknownOp(op.to_string()),
                Some(_) => MarketError::Validation(err.to_string()),
                None => MarketError::UnknownOp("<missing op>".to_string()),
            }
        })?;
        self.execute(&CommandEnvelope {
            signer: signer.to_string(),
            command,
        })
    }
}

/// Build a `staking_closed` event from a freshly closed market.
pub(crate) fn staking_closed_event(market: &Market) -> ActivityEvent {
    ActivityEvent::StakingClosed {
        market_id: market.id.clone(),
        question: market.question.clone(),
        oracle_address: market.oracle_address.clone(),
        yes_pool: market.yes_pool,
        no_pool: market.no_pool,
        resolve_by: format_timestamp_ms(market.resolve_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::constants::{ALICE, BOB, CAROL, ORACLE};
    use crate::test_utils::{test_protocol, RecordingTransfer};
    use serde_json::json;

    fn create_market(protocol: &Protocol) -> Market {
        let output = protocol
            .execute(&CommandEnvelope {
                signer: ALICE.to_string(),
                command: Command::MarketCreate {
                    question: "Will BTC close above 100k this year?".to_string(),
                    category: Category::Crypto,
                    closes_in: Some(60),
                    resolve_by: Some(120),
                    oracle_address: ORACLE.to_string(),
                },
            })
            .unwrap();
        match output {
            CommandOutput::Created(market) => market,
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn test_signer_becomes_creator() {
        let (protocol, _clock, _broadcast, _transfer) = test_protocol();
        let market = create_market(&protocol);
        assert_eq!(market.creator, ALICE);
    }

    #[test]
    fn test_command_json_shape() {
        let command: Command = serde_json::from_value(json!({
            "op": "market_stake",
            "market_id": "m1",
            "side": "yes",
            "amount": 42
        }))
        .unwrap();
        assert_eq!(
            command,
            Command::MarketStake {
                market_id: "m1".to_string(),
                side: Side::Yes,
                amount: 42
            }
        );
    }

    #[test]
    fn test_unknown_op_fails_before_dispatch() {
        let (protocol, _clock, broadcast, _transfer) = test_protocol();
        let err = protocol
            .execute_json(ALICE, &json!({"op": "market_burn", "market_id": "m1"}))
            .unwrap_err();
        assert!(matches!(err, MarketError::UnknownOp(op) if op == "market_burn"));
        assert!(broadcast.events().is_empty());
    }

    #[test]
    fn test_malformed_known_op_is_validation_error() {
        let (protocol, _clock, _broadcast, _transfer) = test_protocol();
        let err = protocol
            .execute_json(ALICE, &json!({"op": "market_stake", "side": "maybe"}))
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[test]
    fn test_stake_broadcasts_activity() {
        let (protocol, _clock, broadcast, _transfer) = test_protocol();
        let market = create_market(&protocol);
        broadcast.clear();

        protocol
            .execute_json(
                BOB,
                &json!({
                    "op": "market_stake",
                    "market_id": market.id,
                    "side": "yes",
                    "amount": 100
                }),
            )
            .unwrap();

        let events = broadcast.events_on(ACTIVITY_CHANNEL);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            ActivityEvent::StakePlaced {
                market_id: market.id.clone(),
                side: Side::Yes,
                amount: 100,
                staker: BOB.to_string(),
            }
        );
    }

    #[test]
    fn test_failed_stake_emits_nothing() {
        let (protocol, _clock, broadcast, _transfer) = test_protocol();
        let market = create_market(&protocol);
        broadcast.clear();

        let err = protocol
            .execute(&CommandEnvelope {
                signer: ORACLE.to_string(),
                command: Command::MarketStake {
                    market_id: market.id,
                    side: Side::No,
                    amount: 10,
                },
            })
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
        assert!(broadcast.events().is_empty());
    }

    #[test]
    fn test_claim_transfers_then_broadcasts() {
        let (protocol, _clock, broadcast, transfer) = test_protocol();
        let market = create_market(&protocol);

        protocol
            .execute(&CommandEnvelope {
                signer: BOB.to_string(),
                command: Command::MarketStake {
                    market_id: market.id.clone(),
                    side: Side::Yes,
                    amount: 100,
                },
            })
            .unwrap();
        protocol
            .execute(&CommandEnvelope {
                signer: CAROL.to_string(),
                command: Command::MarketStake {
                    market_id: market.id.clone(),
                    side: Side::No,
                    amount: 50,
                },
            })
            .unwrap();
        protocol
            .execute(&CommandEnvelope {
                signer: ORACLE.to_string(),
                command: Command::MarketResolve {
                    market_id: market.id.clone(),
                    outcome: Outcome::Yes,
                },
            })
            .unwrap();
        broadcast.clear();

        let output = protocol
            .execute(&CommandEnvelope {
                signer: BOB.to_string(),
                command: Command::MarketClaim {
                    market_id: market.id.clone(),
                },
            })
            .unwrap();
        let CommandOutput::Claimed(receipt) = output else {
            panic!("expected claim receipt");
        };
        assert_eq!(receipt.payout, 150);

        let transfers = transfer.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].0, BOB);
        assert_eq!(transfers[0].1, 150);
        assert!(transfers[0].2.contains(&market.id));

        let events = broadcast.events_on(ACTIVITY_CHANNEL);
        assert_eq!(
            events,
            vec![ActivityEvent::WinningsClaimed {
                market_id: market.id.clone(),
                winner: BOB.to_string(),
                amount: 150,
            }]
        );
    }

    #[test]
    fn test_failed_claim_never_transfers() {
        let (protocol, _clock, _broadcast, transfer) = test_protocol();
        let market = create_market(&protocol);

        let err = protocol
            .execute(&CommandEnvelope {
                signer: BOB.to_string(),
                command: Command::MarketClaim {
                    market_id: market.id,
                },
            })
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
        assert!(transfer.transfers().is_empty());
    }

    #[test]
    fn test_read_ops_emit_no_side_effects() {
        let (protocol, _clock, broadcast, transfer) = test_protocol();
        let market = create_market(&protocol);
        broadcast.clear();

        protocol
            .execute_json(BOB, &json!({"op": "market_list"}))
            .unwrap();
        protocol
            .execute_json(BOB, &json!({"op": "market_get", "market_id": market.id}))
            .unwrap();
        protocol.execute_json(BOB, &json!({"op": "my_stakes"})).unwrap();

        assert!(broadcast.events().is_empty());
        assert!(transfer.transfers().is_empty());
    }

    #[test]
    fn test_my_stakes_uses_signer() {
        let (protocol, _clock, _broadcast, _transfer) = test_protocol();
        let market = create_market(&protocol);
        protocol
            .execute_json(
                BOB,
                &json!({
                    "op": "market_stake",
                    "market_id": market.id,
                    "side": "no",
                    "amount": 25
                }),
            )
            .unwrap();

        let CommandOutput::Stakes(stakes) = protocol
            .execute_json(BOB, &json!({"op": "my_stakes"}))
            .unwrap()
        else {
            panic!("expected stakes");
        };
        assert_eq!(stakes.len(), 1);
        assert_eq!(stakes[0].your_no, 25);

        let CommandOutput::Stakes(stakes) = protocol
            .execute_json(CAROL, &json!({"op": "my_stakes"}))
            .unwrap()
        else {
            panic!("expected stakes");
        };
        assert!(stakes.is_empty());
    }

    #[test]
    fn test_broadcast_failure_does_not_fail_command() {
        use crate::test_utils::FailingBroadcast;
        use crate::test_utils::test_contract;
        let (contract, _clock) = test_contract();
        let protocol = Protocol::new(
            Arc::new(contract),
            Arc::new(FailingBroadcast),
            Arc::new(RecordingTransfer::default()),
        );
        // The mutation persists even though every broadcast errors.
        let market = create_market(&protocol);
        assert!(protocol.contract().get(&market.id).unwrap().is_some());
    }

    #[test]
    fn test_activity_event_wire_format() {
        let event = ActivityEvent::MarketVoided {
            market_id: "m1".to_string(),
            reason: "oracle_missed_deadline".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "market_voided", "market_id": "m1", "reason": "oracle_missed_deadline"})
        );
    }
}
