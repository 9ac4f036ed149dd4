//! Token pricing for cost tracking.

use std::collections::BTreeMap;

use crate::io::config::ModelPrice;

const FALLBACK: &str = "default";
const PER_TOKENS: f64 = 1_000_000.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pricing {
    prices: BTreeMap<String, ModelPrice>,
}

impl Pricing {
    pub fn new(prices: BTreeMap<String, ModelPrice>) -> Self {
        Self { prices }
    }

    /// Exact model match, else the `default` entry.
    pub fn price_for(&self, model: &str) -> Option<ModelPrice> {
        self.prices
            .get(model)
            .or_else(|| self.prices.get(FALLBACK))
            .copied()
    }

    /// USD for one call; zero when no price is known.
    pub fn cost(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        match self.price_for(model) {
            Some(price) => {
                (prompt_tokens as f64 * price.input + completion_tokens as f64 * price.output)
                    / PER_TOKENS
            }
            None => 0.0,
        }
    }
}
