//! Per-token prices for known models (USD).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) cost per token. Unknown models are free.
pub fn model_costs(model: &str) -> (Decimal, Decimal) {
    let model = model.trim_start_matches("models/");
    if model.starts_with("gemini-2.5-flash-lite") {
        (dec!(0.0000001), dec!(0.0000004))
    } else if model.starts_with("gemini-2.5-flash") {
        (dec!(0.0000003), dec!(0.0000025))
    } else if model.starts_with("gemini-2.5-pro") {
        (dec!(0.00000125), dec!(0.00001))
    } else if model.starts_with("gemini-2.0-flash") {
        (dec!(0.0000001), dec!(0.0000004))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    }
}

/// Cost of one exchange given token counts.
pub fn exchange_cost(costs: (Decimal, Decimal), input_tokens: u32, output_tokens: u32) -> Decimal {
    let (input, output) = costs;
    input * Decimal::from(input_tokens) + output * Decimal::from(output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_lite_is_not_priced_as_flash() {
        assert_eq!(model_costs("gemini-2.5-flash-lite").0, dec!(0.0000001));
        assert_eq!(model_costs("models/gemini-2.5-flash").1, dec!(0.0000025));
        assert_eq!(model_costs("local-llama"), (Decimal::ZERO, Decimal::ZERO));
    }

    #[test]
    fn exchange_cost_sums_both_directions() {
        let cost = exchange_cost(model_costs("gemini-2.5-flash-lite"), 1_000_000, 1_000_000);
        assert_eq!(cost, dec!(0.5));
    }
}
