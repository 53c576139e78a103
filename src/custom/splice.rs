//! Splicing custom states into a flow definition.
//!
//! Two passes over a copy of the base definition:
//!
//! 1. every handler's state is declared, with its validators and hooks
//!    wrapped so they see the merged view of shared and per-state data;
//! 2. handlers sharing an insertion point `(after, before)` are chained in
//!    registration order. Only `after`'s `next` entry changes outside the
//!    spliced states themselves.

use super::handler::CustomStateHandler;
use super::registry::CustomStateRegistry;
use crate::core::{Action, DataBag, Hook, HookError, StateConfig, StateId, Validator};
use crate::engine::{ConfigError, FlowDefinition};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

const CUSTOM_DATA_PREFIX: &str = "custom.";

/// Data-bag key holding the persisted values of custom state `id`.
pub fn custom_data_key(id: &StateId) -> String {
    format!("{CUSTOM_DATA_PREFIX}{id}")
}

/// Shared data overlaid with the values stored under `key`.
pub fn merged_view(data: &DataBag, key: &str) -> DataBag {
    let mut view = DataBag::from(data.snapshot());
    view.remove(key);
    if let Some(Value::Object(own)) = data.get(key) {
        for (name, value) in own {
            view.set(name.clone(), value.clone());
        }
    }
    view
}

/// Store every key that differs between `before` and `after` under `key`.
fn write_back(data: &mut DataBag, key: &str, before: &DataBag, after: &DataBag) {
    let mut own = match data.get(key) {
        Some(Value::Object(own)) => own.clone(),
        _ => Map::new(),
    };
    let mut changed = false;
    for (name, value) in after.iter() {
        if before.get(name) != Some(value) {
            own.insert(name.clone(), value.clone());
            changed = true;
        }
    }
    for (name, _) in before.iter() {
        if !after.contains(name) && own.remove(name).is_some() {
            changed = true;
        }
    }
    if changed {
        data.set(key, Value::Object(own));
    }
}

fn isolated_validator(key: Arc<str>, inner: Validator) -> Validator {
    Arc::new(move |data: &DataBag| inner(&merged_view(data, &key)))
}

fn isolated_hook(key: Arc<str>, inner: Hook) -> Hook {
    Arc::new(move |data: &mut DataBag| {
        let before = merged_view(data, &key);
        let mut view = before.clone();
        inner(&mut view)?;
        write_back(data, &key, &before, &view);
        Ok(())
    })
}

fn chain_validators(first: Option<Validator>, second: Validator) -> Validator {
    match first {
        None => second,
        Some(first) => Arc::new(move |data: &DataBag| {
            first(data)?;
            second(data)
        }),
    }
}

fn chain_hooks(first: Option<Hook>, second: Hook) -> Hook {
    match first {
        None => second,
        Some(first) => Arc::new(move |data: &mut DataBag| {
            first(data)?;
            second(data)
        }),
    }
}

/// The handler's state configuration with its callbacks bound to isolated data.
fn spliced_config(handler: &Arc<dyn CustomStateHandler>) -> StateConfig {
    let id = handler.state_id();
    let key: Arc<str> = Arc::from(custom_data_key(&id));
    let mut config = handler.config();
    config.id = id;

    let validate: Validator = {
        let handler = handler.clone();
        Arc::new(move |data: &DataBag| -> Result<(), HookError> { handler.validate(data) })
    };
    let enter: Hook = {
        let handler = handler.clone();
        Arc::new(move |data: &mut DataBag| handler.enter(data))
    };
    let leave: Hook = {
        let handler = handler.clone();
        Arc::new(move |data: &mut DataBag| handler.leave(data))
    };

    config.validate_next = Some(isolated_validator(
        key.clone(),
        chain_validators(config.validate_next.take(), validate),
    ));
    config.validate_entry = config
        .validate_entry
        .take()
        .map(|inner| isolated_validator(key.clone(), inner));
    config.validate_exit = config
        .validate_exit
        .take()
        .map(|inner| isolated_validator(key.clone(), inner));
    config.on_enter = Some(isolated_hook(
        key.clone(),
        chain_hooks(config.on_enter.take(), enter),
    ));
    config.on_exit = Some(isolated_hook(key, chain_hooks(config.on_exit.take(), leave)));
    config
}

/// Build a new definition with every registered custom state chained in.
///
/// The base definition is never modified; on error nothing is returned.
pub fn splice(
    base: &FlowDefinition,
    registry: &CustomStateRegistry,
) -> Result<FlowDefinition, ConfigError> {
    let mut definition = base.clone();

    let mut groups: IndexMap<_, Vec<StateId>> = IndexMap::new();
    for handler in registry.iter() {
        let config = spliced_config(handler);
        let id = config.id.clone();
        definition.add_state(config)?;
        groups
            .entry(handler.insertion_point())
            .or_default()
            .push(id);
    }

    let cancel_state = definition.cancel_state().cloned();
    for (point, chain) in &groups {
        for anchor in [&point.after, &point.before] {
            if !base.contains(anchor) {
                return Err(ConfigError::UnknownInsertionPoint {
                    state: chain[0].clone(),
                    anchor: anchor.clone(),
                });
            }
        }

        if let Some(after) = definition.state_mut(&point.after) {
            after.transitions.insert(Action::Next, chain[0].clone());
        }
        for (index, id) in chain.iter().enumerate() {
            let next = chain.get(index + 1).unwrap_or(&point.before).clone();
            let back = match index {
                0 => point.after.clone(),
                _ => chain[index - 1].clone(),
            };
            if let Some(config) = definition.state_mut(id) {
                config.transitions.insert(Action::Next, next);
                config.transitions.insert(Action::Back, back);
                if let Some(cancel) = &cancel_state {
                    config.transitions.insert(Action::Cancel, cancel.clone());
                }
            }
        }
        tracing::debug!(insertion_point = %point, states = chain.len(), "custom states spliced");
    }

    Ok(definition)
}
