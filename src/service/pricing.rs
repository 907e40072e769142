use crate::{
    domain::{DiffClassification, Pickup, PriceDiff, PricingBreakdown},
    error::{AppError, Result},
};

/// Prices `adult_count` adults and `child_count` children at a pickup.
/// Amounts are integer minor units, so the totals are exact.
pub fn calculate(
    pickup: &Pickup,
    currency: &str,
    adult_count: i64,
    child_count: i64,
) -> Result<PricingBreakdown> {
    if adult_count < 1 {
        return Err(AppError::Validation("At least one adult is required".to_string()));
    }
    if child_count < 0 {
        return Err(AppError::Validation("Child count cannot be negative".to_string()));
    }
    if pickup.adult_price_cents < 0 || pickup.child_price_cents.is_some_and(|p| p < 0) {
        return Err(AppError::Validation("Pickup has a negative price".to_string()));
    }

    let adult_total_cents = pickup
        .adult_price_cents
        .checked_mul(adult_count)
        .ok_or_else(overflow)?;

    let child_total_cents = match (child_count, pickup.child_price_cents) {
        (0, _) => 0,
        (_, Some(unit)) => unit.checked_mul(child_count).ok_or_else(overflow)?,
        (_, None) => {
            return Err(AppError::Validation(format!(
                "Pickup '{}' does not accept children",
                pickup.name
            )))
        }
    };

    let total_cents = adult_total_cents
        .checked_add(child_total_cents)
        .ok_or_else(overflow)?;

    Ok(PricingBreakdown {
        adult_price_cents: pickup.adult_price_cents,
        child_price_cents: pickup.child_price_cents,
        adult_total_cents,
        child_total_cents,
        total_cents,
        currency: currency.to_uppercase(),
    })
}

fn overflow() -> AppError {
    AppError::Validation("Booking total is out of range".to_string())
}

/// Compares a booking's current total with a proposed one.
pub fn diff(original: &PricingBreakdown, proposed: &PricingBreakdown) -> Result<PriceDiff> {
    if !original.currency.eq_ignore_ascii_case(&proposed.currency) {
        return Err(AppError::Validation(format!(
            "Cannot compare totals in {} and {}",
            original.currency, proposed.currency
        )));
    }

    let difference_cents = proposed
        .total_cents
        .checked_sub(original.total_cents)
        .ok_or_else(overflow)?;

    let classification = match difference_cents {
        d if d > 0 => DiffClassification::Upcharge,
        d if d < 0 => DiffClassification::Downgrade,
        _ => DiffClassification::NoChange,
    };

    Ok(PriceDiff {
        original_cents: original.total_cents,
        new_cents: proposed.total_cents,
        difference_cents,
        currency: original.currency.clone(),
        classification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn pickup(adult: i64, child: Option<i64>) -> Pickup {
        Pickup {
            id: Uuid::new_v4(),
            bookable_id: Uuid::new_v4(),
            schedule_id: None,
            name: "Harbour".to_string(),
            adult_price_cents: adult,
            child_price_cents: child,
            active: true,
        }
    }

    #[test]
    fn test_total_is_sum_of_parts() {
        for (adults, children) in [(1, 0), (2, 3), (7, 1), (50, 50)] {
            let p = pickup(4999, Some(2550));
            let breakdown = calculate(&p, "usd", adults, children).unwrap();
            assert_eq!(breakdown.adult_total_cents, adults * 4999);
            assert_eq!(breakdown.child_total_cents, children * 2550);
            assert_eq!(
                breakdown.total_cents,
                breakdown.adult_total_cents + breakdown.child_total_cents
            );
            assert_eq!(breakdown.currency, "USD");
        }
    }

    #[test]
    fn test_children_without_child_price() {
        let p = pickup(5000, None);
        assert!(calculate(&p, "USD", 2, 0).is_ok());
        assert!(matches!(calculate(&p, "USD", 2, 1), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_requires_an_adult() {
        let p = pickup(5000, Some(2500));
        assert!(matches!(calculate(&p, "USD", 0, 2), Err(AppError::Validation(_))));
        assert!(matches!(calculate(&p, "USD", 1, -1), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_overflow_is_rejected() {
        let p = pickup(i64::MAX / 2, None);
        assert!(matches!(calculate(&p, "USD", 3, 0), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_diff_classification() {
        let p = pickup(5000, Some(2500));
        let original = calculate(&p, "USD", 2, 0).unwrap();

        let up = diff(&original, &calculate(&p, "USD", 3, 0).unwrap()).unwrap();
        assert_eq!(up.classification, DiffClassification::Upcharge);
        assert_eq!(up.difference_cents, 5000);

        let down = diff(&original, &calculate(&p, "USD", 1, 1).unwrap()).unwrap();
        assert_eq!(down.classification, DiffClassification::Downgrade);
        assert_eq!(down.difference_cents, -2500);

        let same = diff(&original, &calculate(&p, "USD", 2, 0).unwrap()).unwrap();
        assert_eq!(same.classification, DiffClassification::NoChange);
        assert_eq!(same.difference_cents, 0);
    }

    #[test]
    fn test_diff_sign_matches_classification() {
        let p = pickup(3300, Some(1100));
        let original = calculate(&p, "EUR", 2, 2).unwrap();
        for (adults, children) in [(1, 0), (2, 2), (4, 0), (1, 5)] {
            let proposed = calculate(&p, "EUR", adults, children).unwrap();
            let d = diff(&original, &proposed).unwrap();
            assert_eq!(d.difference_cents, d.new_cents - d.original_cents);
            match d.classification {
                DiffClassification::Upcharge => assert!(d.difference_cents > 0),
                DiffClassification::Downgrade => assert!(d.difference_cents < 0),
                DiffClassification::NoChange => assert_eq!(d.difference_cents, 0),
            }
        }
    }

    #[test]
    fn test_diff_rejects_mixed_currencies() {
        let p = pickup(5000, None);
        let usd = calculate(&p, "USD", 1, 0).unwrap();
        let eur = calculate(&p, "EUR", 1, 0).unwrap();
        assert!(diff(&usd, &eur).is_err());
    }
}
