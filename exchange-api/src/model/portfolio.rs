use crate::model::ids::AgentId;
use crate::model::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cash and mark-to-market equity for one agent.
/// Mutated only by trade settlement and the periodic equity refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub agent_id: AgentId,
    pub cash_balance: f64,
    pub equity: f64,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(agent_id: AgentId, initial_cash: f64) -> Self {
        Self {
            agent_id,
            cash_balance: initial_cash,
            equity: initial_cash,
            updated_at: Utc::now(),
        }
    }
}

/// A position in one symbol, carried at weighted-average cost.
/// Created on first buy, removed when quantity drops to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: f64,
    pub average_cost: f64,
    pub updated_at: DateTime<Utc>,
}

impl Holding {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            quantity: 0.0,
            average_cost: 0.0,
            updated_at: Utc::now(),
        }
    }

    /// Weighted-average cost update on a buy:
    /// `new_avg = (old_avg*old_qty + price*buy_qty) / (old_qty+buy_qty)`.
    pub fn apply_buy(&mut self, quantity: f64, price: f64) {
        let total = self.quantity + quantity;
        self.average_cost = if total > 0.0 {
            (self.average_cost * self.quantity + price * quantity) / total
        } else {
            price
        };
        self.quantity = total;
        self.updated_at = Utc::now();
    }

    /// Sells never change the cost basis of the remainder; the basis
    /// resets to zero when the position is fully closed.
    pub fn apply_sell(&mut self, quantity: f64) {
        self.quantity -= quantity;
        if self.quantity <= 0.0 {
            self.quantity = 0.0;
            self.average_cost = 0.0;
        }
        self.updated_at = Utc::now();
    }

    pub fn is_closed(&self) -> bool {
        self.quantity <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding() -> Holding {
        Holding::new(Symbol::new("ABC").unwrap())
    }

    #[test]
    fn test_first_buy_sets_average_cost_to_price() {
        let mut h = holding();
        h.apply_buy(10.0, 50.0);
        assert_eq!(h.quantity, 10.0);
        assert!((h.average_cost - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_average_on_second_buy() {
        let mut h = holding();
        h.apply_buy(10.0, 50.0);
        h.apply_buy(5.0, 80.0);
        // (50*10 + 80*5) / 15 = 60
        assert!((h.average_cost - 60.0).abs() < 1e-9);
        assert_eq!(h.quantity, 15.0);
    }

    #[test]
    fn test_partial_sell_keeps_cost_basis() {
        let mut h = holding();
        h.apply_buy(10.0, 50.0);
        h.apply_sell(4.0);
        assert_eq!(h.quantity, 6.0);
        assert!((h.average_cost - 50.0).abs() < 1e-9);
        assert!(!h.is_closed());
    }

    #[test]
    fn test_full_sell_resets_cost_basis() {
        let mut h = holding();
        h.apply_buy(10.0, 50.0);
        h.apply_sell(10.0);
        assert_eq!(h.quantity, 0.0);
        assert_eq!(h.average_cost, 0.0);
        assert!(h.is_closed());
    }
}
