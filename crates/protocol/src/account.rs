//! Account snapshot returned by `account_info`.

use serde::{Deserialize, Serialize};

/// Error produced when an enum discriminant is outside the known range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDiscriminant {
	pub kind: &'static str,
	pub value: i64,
}

impl std::fmt::Display for UnknownDiscriminant {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "unknown {} value {}", self.kind, self.value)
	}
}

impl std::error::Error for UnknownDiscriminant {}

macro_rules! int_enum {
	($(#[$meta:meta])* $name:ident, $label:literal { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(try_from = "i64", into = "i64")]
		pub enum $name {
			$($(#[$vmeta])* $variant = $value),+
		}

		impl TryFrom<i64> for $name {
			type Error = UnknownDiscriminant;

			fn try_from(value: i64) -> Result<Self, Self::Error> {
				match value {
					$($value => Ok(Self::$variant),)+
					_ => Err(UnknownDiscriminant { kind: $label, value }),
				}
			}
		}

		impl From<$name> for i64 {
			fn from(value: $name) -> Self {
				value as i64
			}
		}
	};
}

int_enum!(
	/// Account trade mode.
	TradeMode, "trade mode" {
		Demo = 0,
		Contest = 1,
		Real = 2,
	}
);

int_enum!(
	/// Mode for setting the minimal allowed margin.
	MarginSoMode, "margin stop-out mode" {
		/// Stop-out level expressed in percents.
		Percent = 0,
		/// Stop-out level expressed in the deposit currency.
		Money = 1,
	}
);

int_enum!(
	/// Margin calculation mode.
	MarginMode, "margin mode" {
		/// OTC netting: one position per symbol.
		RetailNetting = 0,
		/// Exchange markets, margin from exchange discounts.
		Exchange = 1,
		/// Independent positions per symbol, hedged margin applies.
		RetailHedging = 2,
	}
);

/// Account properties as reported by the terminal.
///
/// Monetary fields are in the deposit currency. `fifo_close` is always false
/// for accounts that are not in [`MarginMode::RetailHedging`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
	pub login: u64,
	pub trade_mode: TradeMode,
	#[serde(default)]
	pub leverage: i64,
	#[serde(default)]
	pub limit_orders: i64,
	pub margin_so_mode: MarginSoMode,
	#[serde(default)]
	pub trade_allowed: bool,
	#[serde(default)]
	pub trade_expert: bool,
	pub margin_mode: MarginMode,
	#[serde(default)]
	pub currency_digits: i64,
	#[serde(default)]
	pub fifo_close: bool,
	#[serde(default)]
	pub balance: f64,
	#[serde(default)]
	pub credit: f64,
	#[serde(default)]
	pub profit: f64,
	#[serde(default)]
	pub equity: f64,
	#[serde(default)]
	pub margin: f64,
	#[serde(default)]
	pub margin_free: f64,
	#[serde(default)]
	pub margin_level: f64,
	#[serde(default)]
	pub margin_so_call: f64,
	#[serde(default)]
	pub margin_so_so: f64,
	#[serde(default)]
	pub margin_initial: f64,
	#[serde(default)]
	pub margin_maintenance: f64,
	#[serde(default)]
	pub assets: f64,
	#[serde(default)]
	pub liabilities: f64,
	#[serde(default)]
	pub commission_blocked: f64,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub server: String,
	#[serde(default)]
	pub currency: String,
	#[serde(default)]
	pub company: String,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn decodes_integer_enums() {
		let info: AccountInfo = serde_json::from_value(json!({
			"login": 111,
			"trade_mode": 0,
			"margin_so_mode": 0,
			"margin_mode": 2,
			"leverage": 100,
			"balance": 10000.0,
			"server": "Broker-Demo",
			"currency": "USD",
		}))
		.unwrap();

		assert_eq!(info.login, 111);
		assert_eq!(info.trade_mode, TradeMode::Demo);
		assert_eq!(info.margin_mode, MarginMode::RetailHedging);
		assert_eq!(info.leverage, 100);
		assert!(!info.fifo_close);
	}

	#[test]
	fn rejects_unknown_trade_mode() {
		let err = serde_json::from_value::<AccountInfo>(json!({
			"login": 1,
			"trade_mode": 7,
			"margin_so_mode": 0,
			"margin_mode": 0,
		}))
		.unwrap_err();
		assert!(err.to_string().contains("unknown trade mode value 7"), "{err}");
	}

	#[test]
	fn enums_encode_as_integers() {
		assert_eq!(serde_json::to_value(MarginSoMode::Money).unwrap(), json!(1));
		assert_eq!(i64::from(TradeMode::Real), 2);
	}
}
