use std::collections::HashSet;
use std::sync::Mutex;
use lazy_static::lazy_static;
use log::error;

lazy_static! {
    /// Descriptions of the invariants that have held at least once in this process.
    static ref CHECKED_INVARIANTS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Asserts that a sync invariant holds.
///
/// A violation is logged as critical and panics in debug and test builds. Release builds log
/// and carry on so a half-finished copy pass is not abandoned midway.
/// A holding invariant is recorded so tests can confirm the check actually ran.
///
/// # Arguments
/// * `condition` - The boolean result of the check.
/// * `description` - What must hold (e.g., "Every manifest entry receives exactly one decision").
/// * `component` - Optional component tag (e.g., "Planner", "Executor").
pub fn assert_invariant(condition: bool, description: &str, component: Option<&str>) {
    if !condition {
        let msg = format!(
            "CRITICAL INVARIANT VIOLATION [{}]: {}",
            component.unwrap_or("General"),
            description
        );
        error!("{}", msg);

        if cfg!(debug_assertions) || cfg!(test) {
            panic!("{}", msg);
        }
    } else if let Ok(mut set) = CHECKED_INVARIANTS.lock() {
        set.insert(description.to_string());
    }
}

/// Verifies that each of `required_invariants` was asserted (and held) earlier in the process.
#[cfg(test)]
pub fn contract_test(context: &str, required_invariants: &[&str]) {
    let checked = CHECKED_INVARIANTS.lock().unwrap();
    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|req| !checked.contains(*req))
        .collect();

    if !missing.is_empty() {
        panic!(
            "Contract Test Failed for '{}'. The following invariants were NOT checked:\n{:#?}",
            context, missing
        );
    }
}
