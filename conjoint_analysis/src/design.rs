//! Randomized choice-task design generation.
//!
//! A design is generated exactly once per survey and then persisted by the
//! caller. Aggregation can only interpret a raw selection if it knows which
//! levels were shown in that (task, alternative) pair, so every respondent
//! must be replayed the same design.

use log::{debug, info};
use rand::Rng;

use std::collections::BTreeMap;

use crate::config::*;
use crate::validate_attributes;

/// Task-count heuristic: one task per attribute level, kept within 8..=15.
///
/// Surveys with many levels need more tasks to observe every level, while
/// respondent fatigue caps the upper end.
pub fn recommended_task_count(attributes: &[Attribute]) -> u32 {
    let total_levels = Attribute::total_level_count(attributes) as u32;
    total_levels.clamp(8, 15)
}

/// Generates a full randomized design for one survey.
///
/// Every task carries `alts_per_task` real alternatives (floored at
/// [DesignRules::MIN_ALTS]) with one uniformly random level per attribute,
/// plus one synthetic "none" alternative taking the next id. The generator
/// always terminates and always produces the configured number of tasks and
/// alternatives.
pub fn generate_design(
    attributes: &[Attribute],
    rules: &DesignRules,
) -> Result<Vec<Task>, ConjointError> {
    validate_attributes(attributes)?;
    let mut rng = rand::thread_rng();
    Ok(generate_design_with(attributes, rules, &mut rng))
}

/// Same as [generate_design] but with an injected random source.
/// Attributes must have been validated by the caller.
pub fn generate_design_with<R: Rng>(
    attributes: &[Attribute],
    rules: &DesignRules,
    rng: &mut R,
) -> Vec<Task> {
    let num_tasks = rules
        .num_tasks
        .clamp(DesignRules::MIN_TASKS, DesignRules::MAX_TASKS);
    let alts_per_task = rules.alts_per_task.max(DesignRules::MIN_ALTS);
    info!(
        "generate_design: {} tasks, {} alternatives per task, {} attributes",
        num_tasks,
        alts_per_task,
        attributes.len()
    );

    let mut tasks: Vec<Task> = Vec::with_capacity(num_tasks as usize);
    for task_id in 1..=num_tasks {
        let mut alternatives: Vec<Alternative> = Vec::new();
        for alt_id in 1..=alts_per_task {
            let levels = draw_distinct_alternative(attributes, &alternatives, rules, rng);
            alternatives.push(Alternative { id: alt_id, levels });
        }

        // The "none" option takes the next id after the real alternatives.
        let none_id = alts_per_task + 1;
        let none_levels: BTreeMap<String, String> = attributes
            .iter()
            .map(|a| (a.name.clone(), NONE_LEVEL.to_string()))
            .collect();
        alternatives.push(Alternative {
            id: none_id,
            levels: none_levels,
        });

        tasks.push(Task {
            id: task_id,
            alternatives,
            none_alternative_id: none_id,
        });
    }
    tasks
}

/// Draws one alternative, redrawing up to the retry budget when it exactly
/// duplicates an already-accepted alternative in the same task. After the
/// budget is exhausted the duplicate is accepted rather than looping forever.
fn draw_distinct_alternative<R: Rng>(
    attributes: &[Attribute],
    accepted: &[Alternative],
    rules: &DesignRules,
    rng: &mut R,
) -> BTreeMap<String, String> {
    let mut levels = draw_alternative(attributes, rng);
    for attempt in 0..rules.max_duplicate_retries {
        let is_duplicate = accepted.iter().any(|alt| alt.levels == levels);
        if !is_duplicate {
            return levels;
        }
        debug!(
            "draw_distinct_alternative: duplicate draw, retry {}/{}",
            attempt + 1,
            rules.max_duplicate_retries
        );
        levels = draw_alternative(attributes, rng);
    }
    levels
}

fn draw_alternative<R: Rng>(attributes: &[Attribute], rng: &mut R) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|attr| {
            let idx = rng.gen_range(0..attr.levels.len());
            (attr.name.clone(), attr.levels[idx].clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_attributes() -> Vec<Attribute> {
        vec![
            Attribute::standard("Storage", &["10GB", "100GB", "1TB"]),
            Attribute::standard("Price", &["$5", "$10", "$20"]),
        ]
    }

    #[test]
    fn every_task_has_alts_plus_none() {
        let attrs = sample_attributes();
        let rules = DesignRules::DEFAULT_RULES;
        let tasks = generate_design(&attrs, &rules).unwrap();
        assert_eq!(tasks.len(), 5);
        for task in &tasks {
            assert_eq!(task.alternatives.len(), (rules.alts_per_task + 1) as usize);
            let last = task.alternatives.last().unwrap();
            assert_eq!(last.id, task.none_alternative_id);
            assert!(last.is_none_alternative());
            for attr in &attrs {
                assert_eq!(last.levels.get(&attr.name).unwrap(), NONE_LEVEL);
            }
        }
    }

    #[test]
    fn real_alternatives_use_defined_levels() {
        let attrs = sample_attributes();
        let tasks = generate_design(&attrs, &DesignRules::DEFAULT_RULES).unwrap();
        for task in &tasks {
            for alt in task.alternatives.iter().filter(|a| !a.is_none_alternative()) {
                for attr in &attrs {
                    let level = alt.levels.get(&attr.name).unwrap();
                    assert!(attr.levels.contains(level), "unknown level {}", level);
                }
            }
        }
    }

    #[test]
    fn task_count_is_clamped() {
        let attrs = sample_attributes();
        let rules = DesignRules {
            num_tasks: 50,
            ..DesignRules::DEFAULT_RULES
        };
        let tasks = generate_design(&attrs, &rules).unwrap();
        assert_eq!(tasks.len(), DesignRules::MAX_TASKS as usize);
    }

    #[test]
    fn duplicate_retries_terminate_on_tiny_level_space() {
        // Two binary attributes can only produce 4 distinct alternatives;
        // asking for 6 must still terminate and yield 6 (with duplicates).
        let attrs = vec![
            Attribute::standard("A", &["a1", "a2"]),
            Attribute::standard("B", &["b1", "b2"]),
        ];
        let rules = DesignRules {
            num_tasks: 1,
            alts_per_task: 6,
            max_duplicate_retries: 50,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let tasks = generate_design_with(&attrs, &rules, &mut rng);
        assert_eq!(tasks[0].alternatives.len(), 7);
    }

    #[test]
    fn alternative_count_is_floored() {
        let attrs = sample_attributes();
        let rules = DesignRules {
            num_tasks: 2,
            alts_per_task: 0,
            ..DesignRules::DEFAULT_RULES
        };
        let tasks = generate_design(&attrs, &rules).unwrap();
        for task in &tasks {
            let real = task
                .alternatives
                .iter()
                .filter(|a| !a.is_none_alternative())
                .count();
            assert_eq!(real, DesignRules::MIN_ALTS as usize);
            assert_eq!(task.none_alternative_id, DesignRules::MIN_ALTS + 1);
        }
    }

    #[test]
    fn generation_fails_on_single_level_attribute() {
        let attrs = vec![Attribute::standard("Broken", &["only"])];
        let res = generate_design(&attrs, &DesignRules::DEFAULT_RULES);
        assert_eq!(
            res,
            Err(ConjointError::InvalidLevels {
                attribute: "Broken".to_string()
            })
        );
    }

    #[test]
    fn heuristic_stays_within_bounds() {
        let small = vec![
            Attribute::standard("A", &["a1", "a2"]),
            Attribute::standard("B", &["b1", "b2"]),
        ];
        assert_eq!(recommended_task_count(&small), 8);

        let mut many: Vec<Attribute> = Vec::new();
        for i in 0..10 {
            many.push(Attribute::standard(
                &format!("Attr{}", i),
                &["l1", "l2", "l3"],
            ));
        }
        assert_eq!(recommended_task_count(&many), 15);

        let mid = vec![
            Attribute::standard("A", &["1", "2", "3", "4", "5"]),
            Attribute::standard("B", &["1", "2", "3", "4", "5"]),
        ];
        assert_eq!(recommended_task_count(&mid), 10);
    }
}
