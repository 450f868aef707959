//! Structural checks applied to every stage reply before it is handed on.
//!
//! The checks only cover what the next stage relies on. Field contents chosen
//! by the model (QoS numbers, IP addresses, rule ids) are not interpreted.

use std::collections::BTreeSet;

use intentchain_core::errors::SchemaError;
use serde_json::{Map, Value};

pub const MODULES: [&str; 4] = ["ISF", "ULF", "DLF", "ODF"];

const RULE_LISTS: [(&str, &str, &str); 4] = [
    ("pdr_list", "PDR", "pdr_id"),
    ("far_list", "FAR", "far_id"),
    ("qer_list", "QER", "qer_id"),
    ("urr_list", "URR", "urr_id"),
];

const MONITOR_STATUSES: [&str; 3] = ["passed", "nfr_violated", "failed"];
const MONITOR_NEXT_HOPS: [&str; 3] = ["Done", "Operator", "CloudOrchestrator"];

type SchemaResult = Result<(), SchemaError>;

fn fail<T>(message: impl Into<String>) -> Result<T, SchemaError> {
    Err(SchemaError::new(message))
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, SchemaError> {
    value.as_object().ok_or_else(|| SchemaError::new(format!("{what} must be a JSON object")))
}

fn require_keys(object: &Map<String, Value>, keys: &[&str], what: &str) -> SchemaResult {
    match keys.iter().find(|key| !object.contains_key(**key)) {
        Some(missing) => fail(format!("{what} is missing `{missing}`")),
        None => Ok(()),
    }
}

fn is_non_empty_string(value: &Value) -> bool {
    value.as_str().is_some_and(|text| !text.trim().is_empty())
}

fn is_valid_module(module: &str) -> bool {
    MODULES.contains(&module)
}

/// Numeric confidence in 0..=100, a non-empty rationale list of non-empty
/// strings, and an assumptions list of non-empty strings.
fn require_metadata(object: &Map<String, Value>, what: &str) -> SchemaResult {
    match object.get("confidence").and_then(Value::as_f64) {
        Some(confidence) if (0.0..=100.0).contains(&confidence) => {}
        Some(_) => return fail(format!("{what} `confidence` must be between 0 and 100")),
        None => return fail(format!("{what} must include numeric `confidence`")),
    }

    match object.get("rationale").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => {
            if !items.iter().all(is_non_empty_string) {
                return fail(format!("each {what} `rationale` entry must be a non-empty string"));
            }
        }
        _ => return fail(format!("{what} must include a non-empty `rationale` list")),
    }

    match object.get("assumptions").and_then(Value::as_array) {
        Some(items) if items.iter().all(is_non_empty_string) => Ok(()),
        Some(_) => fail(format!("each {what} `assumptions` entry must be a non-empty string")),
        None => fail(format!("{what} must include an `assumptions` list")),
    }
}

pub fn validate_structured_intent(result: &Value) -> SchemaResult {
    let object = as_object(result, "IHF output")?;
    require_keys(
        object,
        &[
            "functional_requirements",
            "service_category",
            "application(s)",
            "non_functional_requirements",
            "constraints",
            "assumptions",
            "confidence",
        ],
        "IHF output",
    )
}

pub fn validate_policy(result: &Value) -> SchemaResult {
    let object = as_object(result, "Policy Creator output")?;
    if !object.get("pcc_rules").is_some_and(Value::is_array) {
        return fail("Policy Creator output must include `pcc_rules` as a list");
    }
    require_keys(object, &["rationale", "assumptions", "confidence"], "Policy Creator output")
}

pub fn validate_selection(result: &Value) -> SchemaResult {
    let object = as_object(result, "Selector output")?;
    let modules = object
        .get("selected_modules")
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::new("Selector output must include `selected_modules` as a list"))?;

    for item in modules {
        let entry = as_object(item, "each selected_modules item")?;
        let module = entry.get("module").and_then(Value::as_str).unwrap_or_default();
        if !is_valid_module(module) {
            return fail(format!("invalid module `{}`", entry.get("module").unwrap_or(&Value::Null)));
        }

        let profile = match entry.get("profile") {
            Some(profile) if is_non_empty_string(profile) => profile.as_str().unwrap_or_default(),
            _ => return fail(format!("profile must be a non-empty string for module `{module}`")),
        };
        let allowed = [format!("{module}_sw"), format!("{module}_hw")];
        if !allowed.iter().any(|candidate| candidate == profile) {
            return fail(format!(
                "invalid profile `{profile}` for module `{module}` (allowed: {}, {})",
                allowed[0], allowed[1]
            ));
        }
    }

    require_metadata(object, "Selector output")
}

pub fn validate_pfcp_config(result: &Value) -> SchemaResult {
    let object = as_object(result, "Configurator output")?;
    let config = object
        .get("pfcp_config")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::new("Configurator output must include `pfcp_config` object"))?;

    for (list, _, _) in RULE_LISTS {
        if !config.get(list).is_some_and(Value::is_array) {
            return fail(format!("Configurator output must include `{list}` as a list"));
        }
    }

    require_metadata(object, "Configurator output")?;

    for (list, label, id_key) in RULE_LISTS {
        for entry in rule_entries(config, list) {
            let id = entry.get(id_key).unwrap_or(&Value::Null);
            match entry.get("bound_module") {
                Some(bound) if is_non_empty_string(bound) => {
                    let module = bound.as_str().unwrap_or_default();
                    if !is_valid_module(module) {
                        return fail(format!("{label} {id} has invalid bound_module `{module}`"));
                    }
                }
                _ => return fail(format!("{label} {id} must include non-empty `bound_module`")),
            }
        }
    }

    let far_ids: Vec<&Value> =
        rule_entries(config, "far_list").filter_map(|far| far.get("far_id")).collect();
    for pdr in rule_entries(config, "pdr_list") {
        let references_far = pdr
            .get("far_id")
            .filter(|far_id| !far_id.is_null())
            .is_some_and(|far_id| far_ids.contains(&far_id));
        if !references_far {
            return fail("each PDR must reference an existing FAR via `far_id`");
        }
    }

    Ok(())
}

/// Checks a deployment plan against the selection and configuration it was
/// built from.
pub fn validate_deployment_plan(
    result: &Value,
    selected_modules: &[Value],
    configuration: &Value,
) -> SchemaResult {
    let object = as_object(result, "Executor output")?;
    if object.get("status").and_then(Value::as_str) != Some("ready_to_deploy") {
        return fail("Executor output status must be `ready_to_deploy`");
    }

    let plan = object
        .get("deployment_plan")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::new("Executor output must include `deployment_plan` object"))?;
    if plan.get("target_system").and_then(Value::as_str) != Some("cloud_orchestrator") {
        return fail("deployment_plan.target_system must be `cloud_orchestrator`");
    }

    let chain = match plan.get("chain").and_then(Value::as_array) {
        Some(chain) if !chain.is_empty() => chain,
        _ => return fail("deployment_plan.chain must be a non-empty list"),
    };
    if chain.len() != selected_modules.len() {
        return fail("deployment_plan.chain length must match selected_modules length exactly");
    }
    for (index, (link, selected)) in chain.iter().zip(selected_modules).enumerate() {
        let (Some(link), Some(selected)) = (link.as_object(), selected.as_object()) else {
            return fail("chain and selected_modules entries must be objects");
        };
        for field in ["module", "profile"] {
            let got = link.get(field).unwrap_or(&Value::Null);
            let expected = selected.get(field).unwrap_or(&Value::Null);
            if got != expected {
                return fail(format!(
                    "chain[{index}].{field}={got} does not match selected_modules[{index}].{field}={expected}"
                ));
            }
        }
    }

    let target = plan.get("orchestrator_target").and_then(Value::as_object).ok_or_else(|| {
        SchemaError::new("deployment_plan.orchestrator_target must be an object")
    })?;
    let is_unset = |key: &str| target.get(key).map_or(true, Value::is_null);
    if !is_unset("cluster") || !is_unset("namespace") {
        return fail("orchestrator_target.cluster and orchestrator_target.namespace must be null");
    }

    let modules: Vec<&str> =
        chain.iter().filter_map(|link| link.get("module").and_then(Value::as_str)).collect();
    let wiring = plan
        .get("wiring")
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::new("deployment_plan.wiring must be a list"))?;
    validate_wiring(&modules, wiring)?;

    let apply_rules = plan
        .get("apply_rules")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::new("deployment_plan.apply_rules must be an object"))?;
    let config = configuration
        .get("pfcp_config")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::new("configuration must contain a `pfcp_config` object"))?;

    let known_ids: Vec<(&str, BTreeSet<&str>)> = [
        ("pdr_ids", "pdr_list", "pdr_id"),
        ("far_ids", "far_list", "far_id"),
        ("qer_ids", "qer_list", "qer_id"),
        ("urr_ids", "urr_list", "urr_id"),
    ]
    .into_iter()
    .map(|(key, list, id_key)| {
        let ids = rule_entries(config, list)
            .filter_map(|entry| entry.get(id_key).and_then(Value::as_str))
            .collect();
        (key, ids)
    })
    .collect();

    for module in &modules {
        let entry = apply_rules.get(*module).and_then(Value::as_object).ok_or_else(|| {
            SchemaError::new(format!("apply_rules must include an object for module `{module}`"))
        })?;
        for (key, allowed) in &known_ids {
            let ids = entry.get(*key).and_then(Value::as_array).ok_or_else(|| {
                SchemaError::new(format!("apply_rules[{module}].{key} must be a list"))
            })?;
            for id in ids {
                let Some(id) = id.as_str() else {
                    return fail(format!("apply_rules[{module}].{key} entries must be strings"));
                };
                if !allowed.contains(id) {
                    return fail(format!("apply_rules[{module}].{key} references unknown id `{id}`"));
                }
            }
        }
    }

    Ok(())
}

fn validate_wiring(modules: &[&str], wiring: &[Value]) -> SchemaResult {
    let edges: Vec<(Option<&str>, Option<&str>)> = wiring
        .iter()
        .map(|edge| {
            (edge.get("from").and_then(Value::as_str), edge.get("to").and_then(Value::as_str))
        })
        .collect();

    let branching = ["ISF", "ULF", "DLF"].iter().all(|module| modules.contains(module));
    if branching {
        let has_edge = |from: &str, to: &str| edges.contains(&(Some(from), Some(to)));
        if !has_edge("ISF", "ULF") || !has_edge("ISF", "DLF") {
            return fail(
                "branching wiring must include edges ISF->ULF and ISF->DLF when ISF, ULF and DLF are present",
            );
        }
        return Ok(());
    }

    let expected: Vec<(&str, &str)> = modules.windows(2).map(|pair| (pair[0], pair[1])).collect();
    if edges.len() != expected.len() {
        return fail(format!(
            "sequential wiring must have {} edges, got {}",
            expected.len(),
            edges.len()
        ));
    }
    for (index, (edge, (from, to))) in edges.iter().zip(&expected).enumerate() {
        if *edge != (Some(*from), Some(*to)) {
            return fail(format!("sequential wiring mismatch at index {index}: expected {from}->{to}"));
        }
    }
    Ok(())
}

pub fn validate_assessment(result: &Value) -> SchemaResult {
    let object = as_object(result, "Monitor output")?;

    let status = object.get("status").and_then(Value::as_str).unwrap_or_default();
    if !MONITOR_STATUSES.contains(&status) {
        return fail(format!("Monitor status must be one of {}", MONITOR_STATUSES.join("|")));
    }
    let next_hop = object.get("next_hop").and_then(Value::as_str).unwrap_or_default();
    if !MONITOR_NEXT_HOPS.contains(&next_hop) {
        return fail(format!("Monitor next_hop must be one of {}", MONITOR_NEXT_HOPS.join("|")));
    }
    require_keys(object, &["checks_summary", "confidence"], "Monitor output")
}

fn rule_entries<'a>(
    config: &'a Map<String, Value>,
    list: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> {
    config
        .get(list)
        .and_then(Value::as_array)
        .map(|items| items.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_object)
}
