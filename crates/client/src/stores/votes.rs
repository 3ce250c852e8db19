//! Optimistic vote engine.
//!
//! Converts vote intents into wallet debits and hub submissions while
//! keeping a limit-respecting view of per-option totals. Each option holds
//! an authoritative `confirmed` value and a locally pending delta; the two
//! are collapsed into the displayed total by a pure merge, so the
//! reconcile-while-in-flight race stays independently testable.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crowdplay_shared::{ClientInvoke, VoteError, VoteOption, VoteTally};
use parking_lot::Mutex;

use crate::hub::HubHandle;
use crate::stores::wallet::CoinWallet;

/// Maximum coin total any single option may accumulate. Reaching it on any
/// option closes the whole poll.
pub const VOTE_LIMIT: u32 = 2_000;

/// How long the in-flight guard holds if no acknowledgement arrives.
pub const VOTE_GUARD_MS: i64 = 750;

/// A cast that has been applied locally but not yet confirmed by a
/// `VoteUpdate` broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVote {
    pub option_id: String,
    pub amount: u32,
    pub issued_at: DateTime<Utc>,
    /// Correlates the hub submission with a later acknowledgement.
    pub nonce: String,
}

/// One option's standing as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionStanding {
    pub id: String,
    pub label: String,
    pub description: String,
    pub total: u32,
}

struct OptionEntry {
    id: String,
    label: String,
    description: String,
    /// Authoritative server total; only reconciliation writes this.
    confirmed: u32,
}

/// Collapse an option's authoritative total and its locally pending delta
/// into the displayed value. Never exceeds the poll limit.
fn merged_total(confirmed: u32, pending: u32, limit: u32) -> u32 {
    confirmed.saturating_add(pending).min(limit)
}

fn pending_sum(pending: &[PendingVote], option_id: &str) -> u32 {
    pending
        .iter()
        .filter(|vote| vote.option_id == option_id)
        .map(|vote| vote.amount)
        .sum()
}

/// Owns the option set and pending votes; references (never owns) the
/// wallet and the hub send handle.
pub struct VoteAggregator {
    options: Vec<OptionEntry>,
    pending: Vec<PendingVote>,
    wallet: Arc<Mutex<CoinWallet>>,
    hub: HubHandle,
    limit: u32,
    busy_until: Option<DateTime<Utc>>,
    closed: bool,
}

impl VoteAggregator {
    pub fn new(options: Vec<VoteOption>, wallet: Arc<Mutex<CoinWallet>>, hub: HubHandle) -> Self {
        Self::with_limit(options, wallet, hub, VOTE_LIMIT)
    }

    pub fn with_limit(
        options: Vec<VoteOption>,
        wallet: Arc<Mutex<CoinWallet>>,
        hub: HubHandle,
        limit: u32,
    ) -> Self {
        let mut aggregator = Self {
            options: Vec::new(),
            pending: Vec::new(),
            wallet,
            hub,
            limit,
            busy_until: None,
            closed: false,
        };
        aggregator.load_options(options);
        aggregator
    }

    /// Swap in a new poll context wholesale. Pending votes and the busy
    /// guard are discarded with the old option set.
    pub fn load_options(&mut self, options: Vec<VoteOption>) {
        self.options = options
            .into_iter()
            .map(|option| OptionEntry {
                id: option.id,
                label: option.label,
                description: option.description,
                confirmed: option.server_votes,
            })
            .collect();
        self.pending.clear();
        self.busy_until = None;
        self.closed = false;
        self.recompute_closed();
    }

    /// Displayed total for one option.
    pub fn total(&self, option_id: &str) -> Option<u32> {
        self.options
            .iter()
            .find(|option| option.id == option_id)
            .map(|option| {
                merged_total(
                    option.confirmed,
                    pending_sum(&self.pending, &option.id),
                    self.limit,
                )
            })
    }

    /// Options sorted by descending displayed total, ties broken by
    /// ascending id, for stable presentation.
    pub fn standings(&self) -> Vec<OptionStanding> {
        let mut standings: Vec<OptionStanding> = self
            .options
            .iter()
            .map(|option| OptionStanding {
                id: option.id.clone(),
                label: option.label.clone(),
                description: option.description.clone(),
                total: merged_total(
                    option.confirmed,
                    pending_sum(&self.pending, &option.id),
                    self.limit,
                ),
            })
            .collect();
        standings.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.id.cmp(&b.id)));
        standings
    }

    /// True once any option's displayed total reached the limit. Terminal
    /// for the session.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn pending_votes(&self) -> &[PendingVote] {
        &self.pending
    }

    /// Convert a vote intent into a wallet debit, an optimistic increment,
    /// and a best-effort hub submission.
    pub fn cast_vote(&mut self, option_id: &str, amount: u32) -> Result<(), VoteError> {
        self.cast_vote_at(option_id, amount, Utc::now())
    }

    pub(crate) fn cast_vote_at(
        &mut self,
        option_id: &str,
        amount: u32,
        now: DateTime<Utc>,
    ) -> Result<(), VoteError> {
        if self.closed {
            return Err(VoteError::PollClosed);
        }
        if let Some(busy_until) = self.busy_until {
            if now < busy_until {
                return Err(VoteError::VotingBusy);
            }
            self.busy_until = None;
        }
        let Some(current) = self.total(option_id) else {
            crate::log_error!("cast on unregistered option {}; rejected", option_id);
            return Err(VoteError::UnknownOption(option_id.to_string()));
        };
        if amount == 0 {
            // Zero-coin casts are a no-op.
            return Ok(());
        }
        if current.saturating_add(amount) > self.limit {
            return Err(VoteError::LimitExceeded {
                option_id: option_id.to_string(),
                amount,
            });
        }
        // Debit and optimistic increment happen under the same borrow: no
        // other event can observe one without the other.
        self.wallet.lock().spend(amount)?;
        let vote = PendingVote {
            option_id: option_id.to_string(),
            amount,
            issued_at: now,
            nonce: uuid::Uuid::new_v4().to_string(),
        };
        let nonce = vote.nonce.clone();
        self.pending.push(vote);
        self.busy_until = Some(now + Duration::milliseconds(VOTE_GUARD_MS));
        self.recompute_closed();

        // Best-effort notification: the hub rebroadcast is the source of
        // truth for totals, but a send rejected for connection state never
        // rolls back the debit or the increment.
        let _ = self.hub.invoke_with_correlation(
            ClientInvoke::SubmitVote(option_id.to_string(), amount),
            nonce,
        );
        Ok(())
    }

    /// Authoritative overwrite from a `VoteUpdate` broadcast: for every
    /// option present, the server value replaces the displayed total and
    /// pending optimism for that option is dropped. Options absent from
    /// the update keep their last known value. The wallet is untouched.
    /// Also acknowledges any in-flight cast.
    pub fn reconcile(&mut self, tallies: &[VoteTally]) {
        for tally in tallies {
            let Some(entry) = self.options.iter_mut().find(|option| option.id == tally.id)
            else {
                // Contract violation: the hub referenced an option that was
                // never registered here.
                crate::log_error!(
                    "vote update for unregistered option {}; entry ignored",
                    tally.id
                );
                continue;
            };
            entry.confirmed = tally.votes;
            self.pending.retain(|vote| vote.option_id != tally.id);
        }
        self.busy_until = None;
        self.recompute_closed();
    }

    fn recompute_closed(&mut self) {
        // Latching: a closed poll never reopens within the session.
        if self.closed {
            return;
        }
        let closed = self.options.iter().any(|option| {
            merged_total(
                option.confirmed,
                pending_sum(&self.pending, &option.id),
                self.limit,
            ) >= self.limit
        });
        self.closed = closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ConnectionManager;

    fn aggregator(limit: u32, balance: u32, ids: &[&str]) -> (VoteAggregator, Arc<Mutex<CoinWallet>>) {
        let manager = ConnectionManager::new("ws://hub.test/widget");
        let wallet = Arc::new(Mutex::new(CoinWallet::new(balance)));
        let options = ids
            .iter()
            .map(|id| VoteOption {
                id: id.to_string(),
                label: format!("Option {id}"),
                description: String::new(),
                server_votes: 0,
            })
            .collect();
        let votes = VoteAggregator::with_limit(options, wallet.clone(), manager.handle(), limit);
        (votes, wallet)
    }

    fn tally(id: &str, votes: u32) -> VoteTally {
        VoteTally {
            id: id.to_string(),
            votes,
        }
    }

    #[test]
    fn cast_debits_and_applies_optimistically() {
        let (mut votes, wallet) = aggregator(2000, 2000, &["a", "b"]);
        votes.cast_vote("a", 10).unwrap();
        assert_eq!(votes.total("a"), Some(10));
        assert_eq!(wallet.lock().balance(), 1990);
        assert_eq!(votes.pending_votes().len(), 1);
    }

    #[test]
    fn reconcile_overwrites_local_optimism() {
        let (mut votes, wallet) = aggregator(2000, 2000, &["a", "b"]);
        votes.cast_vote("a", 10).unwrap();

        // A slightly stale broadcast that has not caught up with our own
        // vote still wins: the displayed total drops below the optimistic
        // value and the wallet stays debited.
        votes.reconcile(&[tally("a", 5)]);
        assert_eq!(votes.total("a"), Some(5));
        assert_eq!(wallet.lock().balance(), 1990);
        assert!(votes.pending_votes().is_empty());

        votes.reconcile(&[tally("a", 15)]);
        assert_eq!(votes.total("a"), Some(15));
        // Options absent from the update keep their last value.
        assert_eq!(votes.total("b"), Some(0));
        assert_eq!(wallet.lock().balance(), 1990);
    }

    #[test]
    fn overshoot_is_rejected_wholesale() {
        let (mut votes, wallet) = aggregator(2000, 5000, &["a"]);
        votes.reconcile(&[tally("a", 1995)]);
        let err = votes.cast_vote("a", 10).unwrap_err();
        assert!(matches!(err, VoteError::LimitExceeded { .. }));
        assert_eq!(votes.total("a"), Some(1995));
        assert_eq!(wallet.lock().balance(), 5000);

        // Exactly reaching the limit is allowed.
        votes.cast_vote("a", 5).unwrap();
        assert_eq!(votes.total("a"), Some(2000));
        assert!(votes.is_closed());
    }

    #[test]
    fn insufficient_funds_leaves_everything_untouched() {
        let (mut votes, wallet) = aggregator(2000, 3, &["a"]);
        let err = votes.cast_vote("a", 5).unwrap_err();
        assert!(matches!(err, VoteError::InsufficientFunds(_)));
        assert_eq!(votes.total("a"), Some(0));
        assert_eq!(wallet.lock().balance(), 3);
        assert!(votes.pending_votes().is_empty());
    }

    #[test]
    fn poll_closed_locks_every_option() {
        let (mut votes, wallet) = aggregator(100, 500, &["a", "b"]);
        votes.cast_vote("a", 100).unwrap();
        assert!(votes.is_closed());

        let err = votes.cast_vote("b", 1).unwrap_err();
        assert_eq!(err, VoteError::PollClosed);
        assert_eq!(votes.total("b"), Some(0));
        assert_eq!(wallet.lock().balance(), 400);
    }

    #[test]
    fn reconcile_can_close_the_poll() {
        let (mut votes, _wallet) = aggregator(100, 500, &["a", "b"]);
        votes.reconcile(&[tally("b", 100)]);
        assert!(votes.is_closed());
        assert_eq!(votes.cast_vote("a", 1), Err(VoteError::PollClosed));
    }

    #[test]
    fn reconcile_clamps_runaway_server_totals() {
        let (mut votes, _wallet) = aggregator(100, 500, &["a"]);
        votes.reconcile(&[tally("a", 250)]);
        assert_eq!(votes.total("a"), Some(100));
        assert!(votes.is_closed());
    }

    #[test]
    fn in_flight_guard_rejects_rapid_casts() {
        let (mut votes, _wallet) = aggregator(2000, 2000, &["a"]);
        let now = Utc::now();
        votes.cast_vote_at("a", 10, now).unwrap();
        assert_eq!(
            votes.cast_vote_at("a", 10, now + Duration::milliseconds(1)),
            Err(VoteError::VotingBusy)
        );

        // The guard clears on its deadline...
        votes
            .cast_vote_at("a", 10, now + Duration::milliseconds(VOTE_GUARD_MS))
            .unwrap();

        // ...or earlier, on acknowledgement.
        let later = now + Duration::milliseconds(VOTE_GUARD_MS + 1);
        assert_eq!(
            votes.cast_vote_at("a", 10, later),
            Err(VoteError::VotingBusy)
        );
        votes.reconcile(&[tally("a", 30)]);
        votes.cast_vote_at("a", 10, later).unwrap();
    }

    #[test]
    fn unknown_options_are_rejected_or_ignored() {
        let (mut votes, wallet) = aggregator(2000, 2000, &["a"]);
        assert!(matches!(
            votes.cast_vote("nope", 10),
            Err(VoteError::UnknownOption(_))
        ));
        assert_eq!(wallet.lock().balance(), 2000);

        // A broadcast mixing known and unknown ids applies the known part.
        votes.reconcile(&[tally("ghost", 40), tally("a", 7)]);
        assert_eq!(votes.total("a"), Some(7));
    }

    #[test]
    fn standings_sort_by_total_then_id() {
        let (mut votes, _wallet) = aggregator(2000, 2000, &["c", "a", "b"]);
        votes.reconcile(&[tally("b", 50), tally("a", 50), tally("c", 10)]);
        let standings = votes.standings();
        let ids: Vec<&str> = standings.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn wallet_conservation_across_a_session() {
        let (mut votes, wallet) = aggregator(2000, 500, &["a", "b"]);
        let now = Utc::now();
        let mut spent = 0u32;
        let mut step = 0i64;
        for (option, amount) in [("a", 100u32), ("b", 300), ("a", 450), ("b", 100)] {
            step += VOTE_GUARD_MS + 1;
            if votes
                .cast_vote_at(option, amount, now + Duration::milliseconds(step))
                .is_ok()
            {
                spent += amount;
            }
        }
        // The 450 cast failed on funds; everything else went through.
        assert_eq!(spent, 500);
        assert_eq!(wallet.lock().balance(), 500 - spent);
    }

    #[test]
    fn zero_amount_casts_are_a_no_op() {
        let (mut votes, wallet) = aggregator(2000, 2000, &["a"]);
        votes.cast_vote("a", 0).unwrap();
        assert_eq!(votes.total("a"), Some(0));
        assert_eq!(wallet.lock().balance(), 2000);
        assert!(votes.pending_votes().is_empty());
    }
}
