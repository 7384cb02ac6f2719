//! Currency display for the admin cost lookup.

use crate::types::MoneyFormat;

/// Where the currency symbol goes relative to the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolPosition {
    Left,
    Right,
    LeftSpace,
    RightSpace,
}

/// Store currency settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub position: SymbolPosition,
    pub decimals: usize,
    pub thousand_separator: String,
    pub decimal_separator: String,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self {
            symbol: "$".to_string(),
            position: SymbolPosition::Left,
            decimals: 2,
            thousand_separator: ",".to_string(),
            decimal_separator: ".".to_string(),
        }
    }
}

impl CurrencyFormat {
    fn group_thousands(&self, digits: &str) -> String {
        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push_str(&self.thousand_separator);
            }
            out.push(c);
        }
        out
    }

    fn number(&self, amount: f64) -> String {
        let fixed = format!("{:.*}", self.decimals, amount.abs());
        let (whole, frac) = match fixed.split_once('.') {
            Some((w, f)) => (w.to_string(), Some(f.to_string())),
            None => (fixed, None),
        };
        let mut out = self.group_thousands(&whole);
        if let Some(frac) = frac {
            out.push_str(&self.decimal_separator);
            out.push_str(&frac);
        }
        out
    }
}

impl MoneyFormat for CurrencyFormat {
    fn format_money(&self, amount: f64) -> String {
        let amount = if amount.is_finite() { amount } else { 0.0 };
        let number = self.number(amount);
        // -0.00 displays without a sign
        let negative = amount < 0.0 && number.chars().any(|c| c.is_ascii_digit() && c != '0');
        let sign = if negative { "-" } else { "" };
        match self.position {
            SymbolPosition::Left => format!("{}{}{}", sign, self.symbol, number),
            SymbolPosition::Right => format!("{}{}{}", sign, number, self.symbol),
            SymbolPosition::LeftSpace => format!("{}{} {}", sign, self.symbol, number),
            SymbolPosition::RightSpace => format!("{}{} {}", sign, number, self.symbol),
        }
    }
}
