/// Formats a base-unit amount as a decimal string with trailing zeros trimmed.
///
/// `format_token_amount(500_000_000_000_000_000, 18)` yields `"0.5"`.
pub fn format_token_amount(amount: u128, decimals: u32) -> String {
	let Some(scale) = 10u128.checked_pow(decimals) else {
		return amount.to_string();
	};
	if decimals == 0 {
		return amount.to_string();
	}

	let whole = amount / scale;
	let fraction = amount % scale;
	if fraction == 0 {
		return whole.to_string();
	}

	let fraction = format!("{:0width$}", fraction, width = decimals as usize);
	format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Parses a decimal display amount into base units.
///
/// Returns `None` for malformed input, for more fractional digits than the
/// token supports, or when the result does not fit in a `u128`.
pub fn parse_units(value: &str, decimals: u32) -> Option<u128> {
	let value = value.trim();
	let (whole, fraction) = match value.split_once('.') {
		Some((whole, fraction)) => (whole, fraction),
		None => (value, ""),
	};

	if whole.is_empty() && fraction.is_empty() {
		return None;
	}
	if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
	{
		return None;
	}
	if fraction.len() > decimals as usize {
		return None;
	}

	let scale = 10u128.checked_pow(decimals)?;
	let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
	let fraction: u128 = if fraction.is_empty() {
		0
	} else {
		let padding = 10u128.checked_pow(decimals - fraction.len() as u32)?;
		fraction.parse::<u128>().ok()?.checked_mul(padding)?
	};

	whole.checked_mul(scale)?.checked_add(fraction)
}
