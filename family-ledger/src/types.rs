//! Core types shared by the ledger, the policies and the actors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger balance in whole dollars
pub type Balance = i64;

/// Role an actor plays for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Deposits small amounts, sometimes
    PrimaryDepositor,
    /// Tops the account up generously whenever it runs low
    SecondaryDepositor,
    /// Withdraws what it needs when the balance allows
    Withdrawer,
}

impl Role {
    /// All roles, in spawn order
    pub const ALL: [Role; 3] = [
        Role::PrimaryDepositor,
        Role::SecondaryDepositor,
        Role::Withdrawer,
    ];

    /// Machine-readable name, used for thread names and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PrimaryDepositor => "primary_depositor",
            Role::SecondaryDepositor => "secondary_depositor",
            Role::Withdrawer => "withdrawer",
        }
    }

    /// Name used in human-readable status lines
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::PrimaryDepositor => "Dear Old Dad",
            Role::SecondaryDepositor => "Lovable Mom",
            Role::Withdrawer => "Poor Student",
        }
    }

    /// Upper bound (inclusive) of the random sleep between cycles, in ticks
    pub fn max_sleep_ticks(&self) -> u64 {
        match self {
            Role::PrimaryDepositor => 5,
            Role::SecondaryDepositor => 10,
            Role::Withdrawer => 5,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Actor identifier: role plus ordinal within that role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId {
    /// Role of the actor
    pub role: Role,
    /// Zero-based ordinal among actors of the same role
    pub ordinal: usize,
}

impl ActorId {
    /// Create new actor ID
    pub fn new(role: Role, ordinal: usize) -> Self {
        Self { role, ordinal }
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.role, self.ordinal)
    }
}

/// Actor lifecycle state
///
/// `Running -> Stopping -> Stopped`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActorState {
    /// Cycling
    Running = 0,
    /// Stop observed at the top of a cycle
    Stopping = 1,
    /// Loop exited (terminal)
    Stopped = 2,
}

impl ActorState {
    /// Decode from the atomic representation
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ActorState::Running,
            1 => ActorState::Stopping,
            _ => ActorState::Stopped,
        }
    }

    /// Is this the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActorState::Stopped)
    }
}

/// Result of one policy decision
///
/// Every variant carries the balance after the cycle: the new balance for a
/// mutation, the observed balance otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Money added to the account
    Deposited {
        /// Deposited amount
        amount: Balance,
        /// Balance after the deposit
        balance: Balance,
    },
    /// Primary depositor considered depositing but had nothing to give
    NoMoneyToGive {
        /// Observed balance
        balance: Balance,
    },
    /// Depositor decided the account holds enough already
    BalanceSufficient {
        /// Observed balance
        balance: Balance,
    },
    /// Balance was only looked at
    CheckedBalance {
        /// Observed balance
        balance: Balance,
    },
    /// Money taken out of the account
    Withdrew {
        /// Withdrawn amount
        need: Balance,
        /// Balance after the withdrawal
        balance: Balance,
    },
    /// Withdrawal refused, balance too low
    InsufficientFunds {
        /// Requested amount
        need: Balance,
        /// Observed balance
        balance: Balance,
    },
}

impl Outcome {
    /// Signed change this outcome applies to the balance
    pub fn delta(&self) -> Balance {
        match self {
            Outcome::Deposited { amount, .. } => *amount,
            Outcome::Withdrew { need, .. } => -*need,
            _ => 0,
        }
    }

    /// Balance after the cycle
    pub fn balance(&self) -> Balance {
        match self {
            Outcome::Deposited { balance, .. }
            | Outcome::NoMoneyToGive { balance }
            | Outcome::BalanceSufficient { balance }
            | Outcome::CheckedBalance { balance }
            | Outcome::Withdrew { balance, .. }
            | Outcome::InsufficientFunds { balance, .. } => *balance,
        }
    }

    /// Does this outcome write the ledger
    pub fn is_mutation(&self) -> bool {
        matches!(self, Outcome::Deposited { .. } | Outcome::Withdrew { .. })
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Deposited { .. } => "deposited",
            Outcome::NoMoneyToGive { .. } => "no_money_to_give",
            Outcome::BalanceSufficient { .. } => "balance_sufficient",
            Outcome::CheckedBalance { .. } => "checked_balance",
            Outcome::Withdrew { .. } => "withdrew",
            Outcome::InsufficientFunds { .. } => "insufficient_funds",
        }
    }

    /// Human-readable status sentence for the given role
    pub fn describe(&self, role: Role) -> String {
        let who = role.display_name();
        match self {
            Outcome::Deposited { amount, balance } => {
                format!("{}: Deposits ${} / Balance = ${}", who, amount, balance)
            }
            Outcome::NoMoneyToGive { .. } => {
                format!("{}: Doesn't have any money to give", who)
            }
            Outcome::BalanceSufficient { balance } => {
                format!("{}: Thinks the balance is sufficient (${})", who, balance)
            }
            Outcome::CheckedBalance { balance } => {
                format!("{}: Last Checking Balance = ${}", who, balance)
            }
            Outcome::Withdrew { need, balance } => {
                format!("{}: Withdraws ${} / Balance = ${}", who, need, balance)
            }
            Outcome::InsufficientFunds { need, balance } => {
                format!("{}: Needs ${} but there is Not Enough Cash (${})", who, need, balance)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id_display() {
        let id = ActorId::new(Role::Withdrawer, 2);
        assert_eq!(id.to_string(), "withdrawer-2");
    }

    #[test]
    fn test_outcome_delta() {
        assert_eq!(Outcome::Deposited { amount: 40, balance: 40 }.delta(), 40);
        assert_eq!(Outcome::Withdrew { need: 30, balance: 80 }.delta(), -30);
        assert_eq!(Outcome::InsufficientFunds { need: 50, balance: 40 }.delta(), 0);
        assert_eq!(Outcome::CheckedBalance { balance: 7 }.delta(), 0);
    }

    #[test]
    fn test_actor_state_roundtrip() {
        for state in [ActorState::Running, ActorState::Stopping, ActorState::Stopped] {
            assert_eq!(ActorState::from_u8(state as u8), state);
        }
        assert!(ActorState::Stopped.is_terminal());
        assert!(!ActorState::Stopping.is_terminal());
    }

    #[test]
    fn test_describe_mentions_role_and_balance() {
        let line = Outcome::Deposited { amount: 70, balance: 110 }.describe(Role::PrimaryDepositor);
        assert_eq!(line, "Dear Old Dad: Deposits $70 / Balance = $110");
    }
}
