use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;

use crate::domain::{ChargeType, PricingBand, PricingOwner};
use crate::error::AppError;
use crate::ports::LedgerStore;

/// Fee, tax and the total debited for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub fee: BigDecimal,
    pub tax: BigDecimal,
    pub transaction_amount: BigDecimal,
}

/// Currency columns hold two decimal places.
pub const MONEY_SCALE: i64 = 2;

/// Whether `value` fits a currency column without rounding.
pub fn fits_money_scale(value: &BigDecimal) -> bool {
    value.with_scale(MONEY_SCALE) == *value
}

/// Rounds a non-negative amount half-up to two decimal places.
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    let half_cent = BigDecimal::from_str("0.005").unwrap_or_else(|_| BigDecimal::from(0));
    (value + half_cent).with_scale(2)
}

/// Picks the band with `start_value <= amount <= end_value`.
/// Overlapping bands resolve to the one with the greatest `start_value`.
pub fn select_band<'a>(bands: &'a [PricingBand], amount: &BigDecimal) -> Option<&'a PricingBand> {
    bands
        .iter()
        .filter(|band| &band.start_value <= amount && amount <= &band.end_value)
        .max_by(|a, b| a.start_value.cmp(&b.start_value))
}

pub fn quote_from_band(band: &PricingBand, amount: &BigDecimal) -> Quote {
    let hundred = BigDecimal::from(100);
    let fee = match band.fee_type {
        ChargeType::Flat => band.fee.clone(),
        ChargeType::Percentage => amount * &band.fee / &hundred,
    };
    let fee = round_money(&fee);
    let tax = match band.tax_type {
        ChargeType::Flat => band.tax.clone(),
        ChargeType::Percentage => &fee * &band.tax / &hundred,
    };
    let tax = round_money(&tax);
    let transaction_amount = amount + &fee + &tax;

    Quote {
        fee,
        tax,
        transaction_amount,
    }
}

/// Computes charges from merchant pricing, after checking the processor prices the product too.
#[derive(Clone)]
pub struct PricingResolver {
    store: Arc<dyn LedgerStore>,
}

impl PricingResolver {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        merchant_id: &str,
        processor_id: &str,
        product: &str,
        amount: &BigDecimal,
    ) -> Result<Quote, AppError> {
        let merchant_bands = self
            .store
            .pricing_bands(&PricingOwner::Merchant(merchant_id.to_string()), product)
            .await?;
        let band = select_band(&merchant_bands, amount).ok_or_else(|| {
            AppError::NoPricingMatch(format!(
                "no {} band for merchant {} covers {}",
                product, merchant_id, amount
            ))
        })?;

        let processor_bands = self
            .store
            .pricing_bands(&PricingOwner::Processor(processor_id.to_string()), product)
            .await?;
        if processor_bands.is_empty() {
            return Err(AppError::NoPricingMatch(format!(
                "processor {} does not price {}",
                processor_id, product
            )));
        }

        Ok(quote_from_band(band, amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn band(start: &str, end: &str, fee_type: ChargeType, fee: &str, tax_type: ChargeType, tax: &str) -> PricingBand {
        PricingBand {
            product: "IMPS".into(),
            start_value: dec(start),
            end_value: dec(end),
            fee_type,
            fee: dec(fee),
            tax_type,
            tax: dec(tax),
        }
    }

    #[test]
    fn test_flat_fee_with_percentage_tax() {
        let b = band("1", "1000", ChargeType::Flat, "10", ChargeType::Percentage, "10");
        let quote = quote_from_band(&b, &dec("500"));
        assert_eq!(quote.fee, dec("10"));
        assert_eq!(quote.tax, dec("1"));
        assert_eq!(quote.transaction_amount, dec("511"));
    }

    #[test]
    fn test_percentage_fee_rounds_half_up() {
        // 1.5% of 333.33 = 4.99995
        let b = band("1", "1000", ChargeType::Percentage, "1.5", ChargeType::Percentage, "18");
        let quote = quote_from_band(&b, &dec("333.33"));
        assert_eq!(quote.fee, dec("5.00"));
        assert_eq!(quote.tax, dec("0.90"));
        assert_eq!(quote.transaction_amount, dec("339.23"));
    }

    #[test]
    fn test_flat_tax_is_absolute() {
        let b = band("1", "1000", ChargeType::Flat, "7", ChargeType::Flat, "2.5");
        let quote = quote_from_band(&b, &dec("100"));
        assert_eq!(quote.tax, dec("2.50"));
        assert_eq!(quote.transaction_amount, dec("109.5"));
    }

    #[test]
    fn test_amount_on_end_value_uses_that_band() {
        let bands = vec![
            band("1", "1000", ChargeType::Flat, "5", ChargeType::Flat, "0"),
            band("1000.01", "5000", ChargeType::Flat, "9", ChargeType::Flat, "0"),
        ];
        assert_eq!(select_band(&bands, &dec("1000")).unwrap().fee, dec("5"));
        assert_eq!(select_band(&bands, &dec("1000.01")).unwrap().fee, dec("9"));
        assert_eq!(select_band(&bands, &dec("1")).unwrap().fee, dec("5"));
        assert!(select_band(&bands, &dec("5000.01")).is_none());
        assert!(select_band(&bands, &dec("0.5")).is_none());
    }

    #[test]
    fn test_overlapping_bands_prefer_greatest_start() {
        let bands = vec![
            band("1", "5000", ChargeType::Flat, "5", ChargeType::Flat, "0"),
            band("1000", "2000", ChargeType::Flat, "3", ChargeType::Flat, "0"),
        ];
        assert_eq!(select_band(&bands, &dec("1500")).unwrap().fee, dec("3"));
        assert_eq!(select_band(&bands, &dec("999")).unwrap().fee, dec("5"));
    }
}
