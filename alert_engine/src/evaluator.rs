use domain::{Breach, BreachKind, Watch};

/// Checks a price against a watch's band. Both edges are inclusive.
pub fn decide(watch: &Watch, current_price: f64) -> Option<Breach> {
    if current_price <= watch.min_price {
        Some(Breach {
            kind: BreachKind::BelowMinimum,
            price: current_price,
            limit: watch.min_price,
        })
    } else if current_price >= watch.max_price {
        Some(Breach {
            kind: BreachKind::AtOrAboveMaximum,
            price: current_price,
            limit: watch.max_price,
        })
    } else {
        None
    }
}

/// Text delivered to the subscriber for a triggered watch.
pub fn alert_message(watch: &Watch, breach: &Breach) -> String {
    format!(
        "{} price alert! Current price: ${} ({} ${})",
        watch.symbol,
        breach.price,
        breach.kind.label(),
        breach.limit
    )
}
