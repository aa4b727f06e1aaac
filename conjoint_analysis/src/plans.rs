//! Pricing plan synthesis from estimated part-worth utilities.

use log::{debug, info};

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::*;
use crate::level_key;

/// Fixed tier label pool, in increasing-quality order. Plans beyond the pool
/// fall back to "Plan N".
const PLAN_NAMES: [&str; 10] = [
    "Good",
    "Better",
    "Best",
    "Premium",
    "Enterprise",
    "Starter",
    "Professional",
    "Ultimate",
    "Advanced",
    "Elite",
];

fn plan_name(idx: usize) -> String {
    PLAN_NAMES
        .get(idx)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Plan {}", idx + 1))
}

/// Extracts the first numeric run (digits and dots) out of a price level
/// string, e.g. `"$12.50/mo"` -> `12.50`.
pub fn parse_price_level(level: &str) -> Option<f64> {
    let start = level.find(|c: char| c.is_ascii_digit())?;
    let run: String = level[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    run.parse::<f64>().ok()
}

fn f64_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

// Prices print the way a person would write them: no trailing ".0".
fn fmt_price(p: f64) -> String {
    format!("{}", p)
}

struct ScoredPlan {
    plan: Plan,
    total_utility: f64,
}

/// Builds `num_plans` pricing tiers by linear interpolation through the
/// utility-sorted levels of every attribute, prices them under the given
/// strategy and goal, and re-orders them by the goal score.
pub fn synthesize_plans(
    num_plans: usize,
    attributes: &[Attribute],
    utilities: &BTreeMap<String, f64>,
    pricing_strategy: PricingStrategy,
    goal: OptimizationGoal,
) -> PlanSynthesis {
    info!(
        "synthesize_plans: {} plans, strategy {:?}, goal {:?}",
        num_plans, pricing_strategy, goal
    );

    let price_attr = attributes.iter().find(|a| a.is_price_attribute);
    let currency = price_attr
        .and_then(|a| a.currency.clone())
        .unwrap_or_else(|| "USD".to_string());

    let mut available_prices: Vec<f64> = price_attr
        .map(|attr| attr.levels.iter().filter_map(|l| parse_price_level(l)).collect())
        .unwrap_or_default();
    available_prices.sort_by(|a, b| f64_cmp(*a, *b));

    let mut warnings: Vec<String> = Vec::new();
    if pricing_strategy == PricingStrategy::Submitted
        && price_attr.is_some()
        && available_prices.len() < num_plans
    {
        warnings.push(format!(
            "Warning: You requested {} plans but only have {} price levels. \
             Plan Builder will recommend pricing for the additional plans.",
            num_plans,
            available_prices.len()
        ));
    }

    // Levels sorted ascending by utility, per attribute.
    let mut sorted_levels: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    for attr in attributes {
        let mut levels: Vec<(String, f64)> = attr
            .levels
            .iter()
            .map(|level| {
                let utility = utilities
                    .get(&level_key(&attr.name, level))
                    .cloned()
                    .unwrap_or(0.0);
                (level.clone(), utility)
            })
            .collect();
        levels.sort_by(|a, b| f64_cmp(a.1, b.1));
        sorted_levels.insert(attr.name.clone(), levels);
    }

    let min_price = available_prices.first().cloned().unwrap_or(1.0);
    let (price_multiplier, utility_influence, utility_multiplier) = match goal {
        OptimizationGoal::Revenue => (0.95, 7.0, 25.0),
        OptimizationGoal::Purchases => (0.75, 3.0, 15.0),
    };

    let mut scored: Vec<ScoredPlan> = Vec::with_capacity(num_plans);
    for i in 0..num_plans {
        let tier = i as f64 / (num_plans.saturating_sub(1).max(1)) as f64;
        let mut features: BTreeMap<String, String> = BTreeMap::new();
        let mut total_utility = 0.0;

        for attr in attributes {
            let levels = &sorted_levels[&attr.name];
            if levels.is_empty() {
                continue;
            }
            let level_idx =
                ((tier * levels.len() as f64).floor() as usize).min(levels.len() - 1);
            let (level, utility) = &levels[level_idx];
            features.insert(attr.name.clone(), level.clone());
            total_utility += utility;
        }
        debug!("tier {}: total utility {:.3}", i, total_utility);

        let willingness_to_pay: f64;
        let suggested_price: f64;

        if pricing_strategy == PricingStrategy::Submitted && !available_prices.is_empty() {
            if i < available_prices.len() {
                suggested_price = available_prices[i].max(min_price);
                willingness_to_pay =
                    (suggested_price + total_utility * utility_influence).max(min_price);
            } else {
                // Ran out of submitted levels: extrapolate from the top one.
                let base_price = available_prices.last().cloned().unwrap_or(10.0);
                willingness_to_pay =
                    (base_price + total_utility * utility_multiplier).max(min_price);
                suggested_price = (willingness_to_pay * price_multiplier).round().max(min_price);
            }
        } else if let Some(base_price) = price_attr
            .and_then(|attr| features.get(&attr.name))
            .map(|level| parse_price_level(level).unwrap_or(50.0))
        {
            willingness_to_pay = (base_price + total_utility * utility_influence).max(min_price);
            suggested_price = (willingness_to_pay * price_multiplier).round().max(min_price);
        } else {
            // No price attribute at all: a flat default anchors the spectrum.
            let base_price = 10.0;
            willingness_to_pay = (base_price + total_utility * utility_multiplier).max(min_price);
            suggested_price = (willingness_to_pay * price_multiplier).round().max(min_price);
        }

        let rationale = plan_rationale(attributes, &sorted_levels, &features);

        scored.push(ScoredPlan {
            plan: Plan {
                name: plan_name(i),
                features,
                suggested_price,
                willingness_to_pay,
                currency: currency.clone(),
                rationale,
            },
            total_utility,
        });
    }

    // Re-order by the goal score, then relabel in the new order.
    match goal {
        OptimizationGoal::Revenue => {
            // Expected-revenue proxy: price discounted by conversion odds.
            scored.sort_by(|a, b| {
                let ra = a.plan.suggested_price * (a.total_utility / 10.0).exp();
                let rb = b.plan.suggested_price * (b.total_utility / 10.0).exp();
                f64_cmp(ra, rb)
            });
        }
        OptimizationGoal::Purchases => {
            scored.sort_by(|a, b| {
                let aa = a.total_utility - a.plan.suggested_price * 0.1;
                let ab = b.total_utility - b.plan.suggested_price * 0.1;
                f64_cmp(aa, ab)
            });
        }
    }
    for (idx, sp) in scored.iter_mut().enumerate() {
        sp.plan.name = plan_name(idx);
    }

    if let Some(note) = goal_note(&scored, goal) {
        warnings.push(note);
    }

    PlanSynthesis {
        plans: scored.into_iter().map(|sp| sp.plan).collect(),
        warning: if warnings.is_empty() {
            None
        } else {
            Some(warnings.join("\n\n"))
        },
    }
}

fn plan_rationale(
    attributes: &[Attribute],
    sorted_levels: &BTreeMap<String, Vec<(String, f64)>>,
    features: &BTreeMap<String, String>,
) -> String {
    let mut descriptions: Vec<String> = Vec::new();
    for attr in attributes {
        let levels = &sorted_levels[&attr.name];
        let selected = match features.get(&attr.name) {
            Some(s) => s,
            None => continue,
        };
        let level_idx = match levels.iter().position(|(l, _)| l == selected) {
            Some(idx) => idx,
            None => continue,
        };
        if level_idx == 0 {
            descriptions.push(format!("{} at {} keeps costs low", attr.name, selected));
        } else if level_idx == levels.len() - 1 {
            descriptions.push(format!("{} at {} maximizes value", attr.name, selected));
        } else {
            descriptions.push(format!("{} at {} provides balance", attr.name, selected));
        }
    }
    format!("{}.", descriptions.join(", "))
}

/// When the plan with the best goal score is not also the most expensive one,
/// explain the tradeoff, worded per goal.
fn goal_note(scored: &[ScoredPlan], goal: OptimizationGoal) -> Option<String> {
    let best = scored.last()?;
    let most_expensive = scored.iter().fold(&scored[0], |cur, sp| {
        if sp.plan.suggested_price > cur.plan.suggested_price {
            sp
        } else {
            cur
        }
    });
    if best.plan.name == most_expensive.plan.name {
        return None;
    }
    let note = match goal {
        OptimizationGoal::Revenue => format!(
            "Note: \"{}\" (${}) is recommended as the best plan for revenue, even though \
             \"{}\" (${}) is more expensive. This is because \"{}\" has a better combination \
             of price and features that maximizes expected revenue through higher conversion rates.",
            best.plan.name,
            fmt_price(best.plan.suggested_price),
            most_expensive.plan.name,
            fmt_price(most_expensive.plan.suggested_price),
            best.plan.name,
        ),
        OptimizationGoal::Purchases => format!(
            "Note: \"{}\" (${}) is recommended as the best plan for maximizing purchases. \
             While \"{}\" (${}) is more expensive, \"{}\" offers the optimal balance of \
             features and affordability to maximize customer adoption.",
            best.plan.name,
            fmt_price(best.plan.suggested_price),
            most_expensive.plan.name,
            fmt_price(most_expensive.plan.suggested_price),
            best.plan.name,
        ),
    };
    Some(note)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn study() -> Vec<Attribute> {
        let mut price = Attribute::standard("Price", &["$5", "$10", "$20"]);
        price.is_price_attribute = true;
        price.currency = Some("USD".to_string());
        vec![
            Attribute::standard("Storage", &["10GB", "100GB", "1TB"]),
            price,
        ]
    }

    fn sample_utilities() -> BTreeMap<String, f64> {
        let mut u = BTreeMap::new();
        u.insert("Storage:10GB".to_string(), -1.0);
        u.insert("Storage:100GB".to_string(), 0.2);
        u.insert("Storage:1TB".to_string(), 0.8);
        u.insert("Price:$5".to_string(), 0.9);
        u.insert("Price:$10".to_string(), 0.1);
        u.insert("Price:$20".to_string(), -1.0);
        u
    }

    #[test]
    fn parse_price_level_variants() {
        assert_eq!(parse_price_level("$5"), Some(5.0));
        assert_eq!(parse_price_level("$12.50/mo"), Some(12.5));
        assert_eq!(parse_price_level("EUR 99"), Some(99.0));
        assert_eq!(parse_price_level("free"), None);
    }

    #[test]
    fn plan_count_and_feature_count_invariant() {
        let attrs = study();
        let utilities = sample_utilities();
        for n in 1..=6usize {
            let res = synthesize_plans(
                n,
                &attrs,
                &utilities,
                PricingStrategy::Suggested,
                OptimizationGoal::Revenue,
            );
            assert_eq!(res.plans.len(), n);
            for plan in &res.plans {
                assert_eq!(plan.features.len(), attrs.len());
                assert_eq!(plan.currency, "USD");
            }
        }
    }

    #[test]
    fn tier_interpolation_is_monotonic_at_the_ends() {
        let attrs = study();
        let utilities = sample_utilities();
        let res = synthesize_plans(
            4,
            &attrs,
            &utilities,
            PricingStrategy::Suggested,
            OptimizationGoal::Purchases,
        );
        // Independently of the final goal ordering, one plan must carry every
        // attribute's lowest-utility level and one the highest-utility level.
        let cheapest_expected = ("10GB".to_string(), "$20".to_string());
        let priciest_expected = ("1TB".to_string(), "$5".to_string());
        assert!(res.plans.iter().any(|p| {
            (p.features["Storage"].clone(), p.features["Price"].clone()) == cheapest_expected
        }));
        assert!(res.plans.iter().any(|p| {
            (p.features["Storage"].clone(), p.features["Price"].clone()) == priciest_expected
        }));
    }

    #[test]
    fn submitted_strategy_uses_sorted_price_levels() {
        let attrs = study();
        let utilities = sample_utilities();
        let res = synthesize_plans(
            3,
            &attrs,
            &utilities,
            PricingStrategy::Submitted,
            OptimizationGoal::Revenue,
        );
        let mut prices: Vec<f64> = res.plans.iter().map(|p| p.suggested_price).collect();
        prices.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(prices, vec![5.0, 10.0, 20.0]);
        assert!(res.warning.is_none() || !res.warning.as_ref().unwrap().contains("price levels"));
    }

    #[test]
    fn shortfall_warning_when_fewer_price_levels_than_plans() {
        let attrs = study();
        let utilities = sample_utilities();
        let res = synthesize_plans(
            5,
            &attrs,
            &utilities,
            PricingStrategy::Submitted,
            OptimizationGoal::Revenue,
        );
        assert_eq!(res.plans.len(), 5);
        let warning = res.warning.expect("expected a shortfall warning");
        assert!(warning.contains("5 plans"));
        assert!(warning.contains("3 price levels"));
    }

    #[test]
    fn prices_never_fall_below_the_cheapest_level() {
        let attrs = study();
        // Strongly negative utilities push raw prices below the floor.
        let mut utilities = sample_utilities();
        for v in utilities.values_mut() {
            *v = -5.0;
        }
        let res = synthesize_plans(
            3,
            &attrs,
            &utilities,
            PricingStrategy::Suggested,
            OptimizationGoal::Purchases,
        );
        for plan in &res.plans {
            assert!(plan.suggested_price >= 5.0);
            assert!(plan.willingness_to_pay >= 5.0);
        }
    }

    #[test]
    fn names_follow_the_pool_in_goal_order() {
        let attrs = study();
        let utilities = sample_utilities();
        let res = synthesize_plans(
            3,
            &attrs,
            &utilities,
            PricingStrategy::Suggested,
            OptimizationGoal::Revenue,
        );
        let names: Vec<&str> = res.plans.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Good", "Better", "Best"]);
    }

    #[test]
    fn overflow_names_use_plan_n() {
        assert_eq!(plan_name(9), "Elite");
        assert_eq!(plan_name(10), "Plan 11");
    }
}
