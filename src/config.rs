// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Tunables for the billing engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Daily spending ceiling per account, in the account currency.
    pub daily_cap: Decimal,
    /// Currency assigned to accounts created without an explicit one.
    pub default_currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daily_cap: dec!(50000),
            default_currency: "XOF".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_baseline() {
        let config = Config::default();
        assert_eq!(config.daily_cap, dec!(50000));
        assert_eq!(config.default_currency, "XOF");
    }
}
