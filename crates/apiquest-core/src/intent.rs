use anyhow::{bail, Result};
use apiquest_schema::{BusinessIntent, PaymentMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestedIntent {
    pub text: &'static str,
    pub category: &'static str,
}

pub const SUGGESTED_INTENTS: [SuggestedIntent; 6] = [
    SuggestedIntent {
        text: "Collect one-time payments from customers",
        category: "Payment Collection",
    },
    SuggestedIntent {
        text: "Implement refunds and cancellations",
        category: "Refund Management",
    },
    SuggestedIntent {
        text: "Set up recurring subscription billing",
        category: "Subscriptions",
    },
    SuggestedIntent {
        text: "Accept payments through mobile apps",
        category: "Mobile Payments",
    },
    SuggestedIntent {
        text: "Process bulk payout transactions",
        category: "Payouts",
    },
    SuggestedIntent {
        text: "Integrate payment gateway with e-commerce",
        category: "E-commerce",
    },
];

/// Build an intent from free text, or from the 1-based number of a suggested
/// intent, plus at least one payment method. Duplicate methods are collapsed.
pub fn capture(goal: &str, methods: &[PaymentMethod]) -> Result<BusinessIntent> {
    let goal = goal.trim();
    let goal = match goal.parse::<usize>() {
        Ok(n) if (1..=SUGGESTED_INTENTS.len()).contains(&n) => SUGGESTED_INTENTS[n - 1].text,
        _ => goal,
    };
    if goal.is_empty() {
        bail!("describe what you want to build first");
    }

    let mut payment_methods = Vec::with_capacity(methods.len());
    for method in methods {
        if !payment_methods.contains(method) {
            payment_methods.push(*method);
        }
    }
    if payment_methods.is_empty() {
        bail!("select at least one payment method");
    }

    tracing::debug!(goal, methods = payment_methods.len(), "business intent captured");
    Ok(BusinessIntent {
        goal: goal.to_string(),
        payment_methods,
    })
}

/// Parse a comma separated method list such as `card,upi`.
pub fn parse_methods(list: &str) -> Result<Vec<PaymentMethod>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<PaymentMethod>)
        .collect()
}
