//! Actor decision policies
//!
//! A policy maps the balance read inside the critical section plus a handful
//! of uniform random draws to an [`Outcome`]. Policies never touch the ledger
//! themselves; the actor loop writes `outcome.balance()` back when
//! `outcome.is_mutation()`.
//!
//! | Role                | Deposits / withdraws            | Declines when        |
//! |---------------------|---------------------------------|----------------------|
//! | Primary depositor   | `[0, 100]` on even, even draws  | balance >= 100       |
//! | Secondary depositor | `[50, 125]` always              | balance > 100        |
//! | Withdrawer          | need `[0, 50]` on an even draw  | need > balance       |

use crate::types::{Balance, Outcome, Role};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::VecDeque;

/// Primary depositor stops giving at this balance
pub const PRIMARY_SUFFICIENT_BALANCE: Balance = 100;

/// Secondary depositor gives while the balance is at most this
pub const SECONDARY_TOP_UP_CEILING: Balance = 100;

/// Primary depositor deposit range (inclusive)
pub const PRIMARY_DEPOSIT_RANGE: (Balance, Balance) = (0, 100);

/// Secondary depositor deposit range (inclusive)
pub const SECONDARY_DEPOSIT_RANGE: (Balance, Balance) = (50, 125);

/// Withdrawer need range (inclusive)
pub const WITHDRAW_NEED_RANGE: (Balance, Balance) = (0, 50);

/// Range of the coin-flip draws (inclusive); parity decides
const DECISION_RANGE: (i64, i64) = (0, 99);

/// Source of uniform integer draws
pub trait Draw {
    /// Uniform integer in `[min, max]`
    fn draw(&mut self, min: i64, max: i64) -> i64;
}

impl Draw for StdRng {
    fn draw(&mut self, min: i64, max: i64) -> i64 {
        self.gen_range(min..=max)
    }
}

/// Replays a fixed sequence of draws
///
/// Useful for reproducing an exact decision path. Once the script runs out
/// every draw returns the lower bound of the requested range.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDraws {
    values: VecDeque<i64>,
}

impl ScriptedDraws {
    /// Create from the values to replay, in order
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Draws not yet consumed
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl Draw for ScriptedDraws {
    fn draw(&mut self, min: i64, max: i64) -> i64 {
        match self.values.pop_front() {
            Some(value) => value.clamp(min, max),
            None => min,
        }
    }
}

/// Decide what an actor of `role` does with `balance`
pub fn decide<D: Draw + ?Sized>(role: Role, balance: Balance, draws: &mut D) -> Outcome {
    match role {
        Role::PrimaryDepositor => primary_depositor(balance, draws),
        Role::SecondaryDepositor => secondary_depositor(balance, draws),
        Role::Withdrawer => withdrawer(balance, draws),
    }
}

/// Ticks to sleep before the next cycle
pub fn sleep_ticks<D: Draw + ?Sized>(role: Role, draws: &mut D) -> u64 {
    let max = role.max_sleep_ticks() as i64;
    draws.draw(0, max).max(0) as u64
}

fn coin_flip<D: Draw + ?Sized>(draws: &mut D) -> bool {
    draws.draw(DECISION_RANGE.0, DECISION_RANGE.1) % 2 == 0
}

/// Primary depositor: even draw considers a deposit, odd draw only checks
pub fn primary_depositor<D: Draw + ?Sized>(balance: Balance, draws: &mut D) -> Outcome {
    if !coin_flip(draws) {
        return Outcome::CheckedBalance { balance };
    }

    if balance >= PRIMARY_SUFFICIENT_BALANCE {
        return Outcome::BalanceSufficient { balance };
    }

    if !coin_flip(draws) {
        return Outcome::NoMoneyToGive { balance };
    }

    let amount = draws.draw(PRIMARY_DEPOSIT_RANGE.0, PRIMARY_DEPOSIT_RANGE.1);
    Outcome::Deposited {
        amount,
        balance: balance + amount,
    }
}

/// Secondary depositor: tops up whenever the balance is low
pub fn secondary_depositor<D: Draw + ?Sized>(balance: Balance, draws: &mut D) -> Outcome {
    if balance > SECONDARY_TOP_UP_CEILING {
        return Outcome::BalanceSufficient { balance };
    }

    let amount = draws.draw(SECONDARY_DEPOSIT_RANGE.0, SECONDARY_DEPOSIT_RANGE.1);
    Outcome::Deposited {
        amount,
        balance: balance + amount,
    }
}

/// Withdrawer: even draw tries to withdraw, odd draw only checks
pub fn withdrawer<D: Draw + ?Sized>(balance: Balance, draws: &mut D) -> Outcome {
    if !coin_flip(draws) {
        return Outcome::CheckedBalance { balance };
    }

    let need = draws.draw(WITHDRAW_NEED_RANGE.0, WITHDRAW_NEED_RANGE.1);
    if need > balance {
        return Outcome::InsufficientFunds { need, balance };
    }

    Outcome::Withdrew {
        need,
        balance: balance - need,
    }
}
